pub mod codec;
pub mod game_code;
pub mod listing;
pub mod options;
pub mod protocol;
pub mod version;

pub use codec::{read_messages, CodecError, MessageReader, MessageWriter};
pub use game_code::GameCode;
pub use listing::GameListing;
pub use options::GameOptions;
pub use protocol::{DisconnectReason, MessageFlags};
pub use version::GameVersion;

pub const DEFAULT_PORT: u16 = 22023;
pub const MAX_PLAYERS: u8 = 15;
pub const MAX_NAME_LENGTH: usize = 12;

/// Client id used by the host for objects it spawns on behalf of nobody
pub const FAKE_CLIENT_ID: i32 = -2;

/// World range for positions in transform data
pub const NET_RANGE: FloatRange = FloatRange::new(-40.0, 40.0);

/// World range for teleports (`SnapTo`)
pub const SNAP_RANGE: FloatRange = FloatRange::new(-50.0, 50.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatRange {
    pub min: f32,
    pub max: f32,
}

impl FloatRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    /// Distance between two adjacent quantized values
    pub fn step(&self) -> f32 {
        self.width() / u16::MAX as f32
    }

    pub fn lerp(&self, t: f32) -> f32 {
        self.min + self.width() * t
    }

    pub fn reverse_lerp(&self, value: f32) -> f32 {
        ((value - self.min) / self.width()).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn quantize(&self, range: FloatRange) -> (u16, u16) {
        let axis = |value: f32| (range.reverse_lerp(value) * u16::MAX as f32) as u16;
        (axis(self.x), axis(self.y))
    }

    pub fn dequantize(x: u16, y: u16, range: FloatRange) -> Self {
        let axis = |value: u16| range.lerp(value as f32 / u16::MAX as f32);
        Self::new(axis(x), axis(y))
    }
}
