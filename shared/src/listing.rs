use serde::{Deserialize, Serialize};

pub const UNKNOWN_HOST: &str = "Unknown host";

/// One row of the public game list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameListing {
    pub host_name: String,
    pub game_id: i32,
    pub player_count_and_max: String,
    pub impostor_count: i32,
}

impl GameListing {
    pub fn new(host_name: Option<&str>, game_id: i32, players: usize, max: u8, impostors: u8) -> Self {
        Self {
            host_name: host_name.unwrap_or(UNKNOWN_HOST).to_string(),
            game_id,
            player_count_and_max: format!("{}/{}", players, max),
            impostor_count: i32::from(impostors),
        }
    }
}

/// Renders the listing payload sent in reply to `GetGameListV2`
pub fn to_json(listings: &[GameListing]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(listings)
}

pub fn from_json(json: &str) -> Result<Vec<GameListing>, serde_json::Error> {
    serde_json::from_str(json)
}
