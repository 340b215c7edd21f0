//! Numeric identifiers used on the wire

macro_rules! byte_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident = $value:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value),*
        }

        impl $name {
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub fn as_u8(self) -> u8 {
                self as u8
            }
        }
    };
}

byte_enum! {
    /// First byte of every datagram
    pub enum SendOption {
        None = 0,
        Reliable = 1,
        Hello = 8,
        Disconnect = 9,
        Acknowledgement = 10,
        Ping = 12,
    }
}

byte_enum! {
    /// Tag of a top-level message
    pub enum MessageFlags {
        HostGame = 0,
        JoinGame = 1,
        StartGame = 2,
        RemoveGame = 3,
        RemovePlayer = 4,
        GameData = 5,
        GameDataTo = 6,
        JoinedGame = 7,
        EndGame = 8,
        AlterGame = 10,
        KickPlayer = 11,
        WaitForHost = 12,
        KickWithReason = 15,
        GetGameListV2 = 16,
    }
}

byte_enum! {
    /// Tag of a message nested inside `GameData`/`GameDataTo`
    pub enum GameDataTag {
        Data = 1,
        Rpc = 2,
        Spawn = 4,
        Despawn = 5,
        SceneChange = 6,
        Ready = 7,
    }
}

byte_enum! {
    pub enum AlterGameTag {
        ChangePrivacy = 1,
    }
}

byte_enum! {
    pub enum SpawnType {
        ShipStatus = 0,
        MeetingHud = 1,
        LobbyBehaviour = 2,
        GameData = 3,
        PlayerControl = 4,
        MiraShipStatus = 5,
        PolusShipStatus = 6,
        DleksShipStatus = 7,
        AirshipStatus = 8,
    }
}

byte_enum! {
    pub enum ChatNoteType {
        DidVote = 0,
    }
}

byte_enum! {
    pub enum DeathReason {
        Exile = 0,
        Kill = 1,
        Disconnect = 2,
    }
}

byte_enum! {
    pub enum SystemType {
        Hallway = 0,
        Storage = 1,
        Cafeteria = 2,
        Reactor = 3,
        UpperEngine = 4,
        Nav = 5,
        Admin = 6,
        Electrical = 7,
        LifeSupp = 8,
        Shields = 9,
        MedBay = 10,
        Security = 11,
        Weapons = 12,
        LowerEngine = 13,
        Comms = 14,
        ShipTasks = 15,
        Doors = 16,
        Sabotage = 17,
    }
}

byte_enum! {
    /// Reason shown to a client when the server drops it
    pub enum DisconnectReason {
        ExitGame = 0,
        GameFull = 1,
        GameStarted = 2,
        GameNotFound = 3,
        IncorrectVersion = 5,
        Banned = 6,
        Kicked = 7,
        Custom = 8,
        InvalidName = 9,
        Destroy = 16,
        Error = 17,
        IncorrectGame = 18,
        ServerRequest = 19,
        ServerFull = 20,
        FocusLostBackground = 207,
        IntentionalLeaving = 208,
        FocusLost = 209,
        NewConnection = 210,
        MapWontExist = 211,
        KickedHacking = 212,
        DifferentMods = 213,
    }
}

pub mod messages {
    pub const DESTROYED: &str = "The game you tried to join is being destroyed.";
    pub const INVALID_CLIENT: &str = "Client is in an invalid state.";
    pub const INVALID_LIMBO: &str = "Invalid limbo state while joining.";
    pub const INCOMPATIBLE_VERSION: &str =
        "You are running an incompatible version of the game for this lobby.";
    pub const INVALID_CLIENT_DATA: &str =
        "Invalid Client Data.\nTry disabling mods or updating the game.";
    pub const INVALID_NAME: &str = "Your name is invalid.\nUse up to 12 letters, digits or spaces.";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_flags() {
        assert_eq!(MessageFlags::from_u8(5), Some(MessageFlags::GameData));
        assert_eq!(MessageFlags::from_u8(16), Some(MessageFlags::GetGameListV2));
        assert_eq!(MessageFlags::from_u8(9), None);
        assert_eq!(MessageFlags::KickWithReason.as_u8(), 15);
    }

    #[test]
    fn test_disconnect_reason_values() {
        assert_eq!(DisconnectReason::Custom.as_u8(), 8);
        assert_eq!(DisconnectReason::from_u8(212), Some(DisconnectReason::KickedHacking));
        assert_eq!(DisconnectReason::from_u8(4), None);
    }

    #[test]
    fn test_only_did_vote_is_a_chat_note() {
        assert_eq!(ChatNoteType::from_u8(0), Some(ChatNoteType::DidVote));
        assert!((1..=u8::MAX).all(|value| ChatNoteType::from_u8(value).is_none()));
    }

    #[test]
    fn test_system_types() {
        assert_eq!(SystemType::from_u8(16), Some(SystemType::Doors));
        assert_eq!(SystemType::from_u8(18), None);
    }
}
