use serde::{Deserialize, Serialize};
use std::fmt;

/// Client build identifier encoded as `year*25000 + month*1800 + day*50 + revision`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameVersion(pub i32);

/// Builds that are always accepted
const SUPPORTED: [(i32, i32, i32); 12] = [
    (2024, 4, 2),
    (2024, 4, 6),
    (2024, 4, 9),
    (2024, 4, 14),
    (2024, 4, 28),
    (2024, 5, 26),
    (2024, 5, 28),
    (2024, 5, 29),
    (2024, 5, 30),
    (2024, 5, 31),
    (2024, 6, 4),
    (2024, 6, 22),
];

/// Builds from this date on are accepted without being listed
const THRESHOLD: (i32, i32, i32) = (2024, 6, 22);

impl GameVersion {
    pub const fn new(year: i32, month: i32, day: i32, revision: i32) -> Self {
        Self(year * 25000 + month * 1800 + day * 50 + revision)
    }

    pub fn components(&self) -> (i32, i32, i32, i32) {
        let mut rest = self.0;
        let year = rest / 25000;
        rest -= year * 25000;
        let month = rest / 1800;
        rest -= month * 1800;
        let day = rest / 50;
        rest -= day * 50;
        (year, month, day, rest)
    }

    pub fn is_supported(&self) -> bool {
        let (year, month, day, _) = self.components();

        SUPPORTED.contains(&(year, month, day)) || (year, month, day) >= THRESHOLD
    }

    /// Versions that can share a game. All supported builds are mutually
    /// compatible; anything else only matches its exact build.
    pub fn compatibility(&self) -> Compatibility {
        if self.is_supported() {
            Compatibility::Supported
        } else {
            Compatibility::Legacy(self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compatibility {
    Supported,
    Legacy(i32),
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (year, month, day, revision) = self.components();
        write!(f, "{}.{}.{}", year, month, day)?;
        if revision != 0 {
            write!(f, ".{}", revision)?;
        }
        Ok(())
    }
}

impl From<i32> for GameVersion {
    fn from(value: i32) -> Self {
        Self(value)
    }
}
