use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const V2: &[u8; 26] = b"QWXRTYLPESDFGHUJKZOCVBINMA";
const V2_MAP: [u8; 26] = [
    25, 21, 19, 10, 8, 11, 12, 13, 22, 15, 16, 6, 24, 23, 18, 7, 0, 3, 9, 4, 14, 20, 1, 2, 5, 17,
];

/// Public identifier of a game
///
/// Legacy games use four ASCII letters packed little-endian into a positive
/// integer. Current clients use six letters packed into a negative integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameCode(pub i32);

impl GameCode {
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    /// Draws a random six-letter code
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let letters: String = (0..6)
            .map(|_| V2[rng.gen_range(0..V2.len())] as char)
            .collect();

        // Every letter comes from the alphabet, so parsing cannot fail
        Self::parse(&letters).unwrap_or(Self(0))
    }

    /// Parses a four- or six-letter code (case-insensitive)
    pub fn parse(input: &str) -> Option<Self> {
        let upper = input.to_ascii_uppercase();
        let bytes = upper.as_bytes();

        match bytes.len() {
            4 if bytes.iter().all(u8::is_ascii_uppercase) => {
                Some(Self(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])))
            }
            6 => {
                let mut digits = [0i32; 6];
                for (digit, byte) in digits.iter_mut().zip(bytes) {
                    let index = byte.checked_sub(b'A')? as usize;
                    *digit = i32::from(*V2_MAP.get(index)?);
                }
                let [a, b, c, d, e, f] = digits;

                let one = (a + 26 * b) & 0x3FF;
                let two = c + 26 * (d + 26 * (e + 26 * f));
                let value = (one as u32) | (((two as u32) << 10) & 0x3FFF_FC00) | 0x8000_0000;
                Some(Self(value as i32))
            }
            _ => None,
        }
    }

    pub fn is_v2(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            let a = (self.0 & 0x3FF) as usize;
            let b = ((self.0 >> 10) & 0xFFFFF) as usize;
            let letters = [
                V2[a % 26],
                V2[a / 26 % 26],
                V2[b % 26],
                V2[b / 26 % 26],
                V2[b / 676 % 26],
                V2[b / 17576 % 26],
            ];
            write!(f, "{}", String::from_utf8_lossy(&letters))
        } else {
            let bytes = self.0.to_le_bytes();
            write!(f, "{}", String::from_utf8_lossy(&bytes))
        }
    }
}

impl From<i32> for GameCode {
    fn from(value: i32) -> Self {
        Self(value)
    }
}
