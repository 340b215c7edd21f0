use super::{InnerNetObject, RpcContext};
use crate::error::{HandleError, HandleResult};
use crate::rpc::{RpcRule, SenderRule, TargetRule};
use log::info;
use shared::protocol::{SpawnType, SystemType};
use shared::{CodecError, MessageReader};
use std::collections::BTreeMap;

/// Rpc call numbers of [`ShipStatus`]
pub mod calls {
    pub const CLOSE_DOORS_OF_TYPE: u8 = 0;
    pub const REPAIR_SYSTEM: u8 = 1;
    pub const SET_WINNERS: u8 = 2;
}

const RULES: &[RpcRule] = &[
    RpcRule::new(
        calls::CLOSE_DOORS_OF_TYPE,
        "CloseDoorsOfType",
        SenderRule::Any,
        TargetRule::Host,
    ),
    RpcRule::new(calls::REPAIR_SYSTEM, "RepairSystem", SenderRule::Any, TargetRule::Host),
    RpcRule::new(calls::SET_WINNERS, "SetWinners", SenderRule::Host, TargetRule::Any),
];

/// Map a ship status was spawned for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Map {
    Skeld,
    Mira,
    Polus,
    Dleks,
    Airship,
}

impl Map {
    /// `None` for spawn types that are not ships
    pub fn from_spawn_type(spawn_type: SpawnType) -> Option<Self> {
        match spawn_type {
            SpawnType::ShipStatus => Some(Map::Skeld),
            SpawnType::MiraShipStatus => Some(Map::Mira),
            SpawnType::PolusShipStatus => Some(Map::Polus),
            SpawnType::DleksShipStatus => Some(Map::Dleks),
            SpawnType::AirshipStatus => Some(Map::Airship),
            _ => None,
        }
    }

    /// Number of doors the map's door system tracks, if it has one
    pub fn door_count(self) -> Option<usize> {
        match self {
            Map::Skeld | Map::Dleks => Some(13),
            Map::Polus => Some(12),
            Map::Airship => Some(21),
            Map::Mira => None,
        }
    }
}

/// Sabotage and repair state of one ship system
#[derive(Debug, Clone, PartialEq)]
pub enum System {
    Reactor { countdown: f32, consoles: Vec<(u8, u8)> },
    Switch { expected: u8, actual: u8, value: u8 },
    LifeSupport { countdown: f32, completed: Vec<u32> },
    MedScan { queue: Vec<u8> },
    Security { viewers: Vec<u8> },
    HudOverride { active: bool },
    Doors { open: Vec<bool> },
    Sabotage { timer: f32 },
}

impl System {
    fn deserialize(&mut self, reader: &mut MessageReader<'_>, initial: bool) -> Result<(), CodecError> {
        match self {
            System::Reactor { countdown, consoles } => {
                *countdown = reader.read_f32()?;
                let count = reader.read_packed_u32()?;
                consoles.clear();
                for _ in 0..count {
                    consoles.push((reader.read_u8()?, reader.read_u8()?));
                }
            }
            System::Switch {
                expected,
                actual,
                value,
            } => {
                *expected = reader.read_u8()?;
                *actual = reader.read_u8()?;
                *value = reader.read_u8()?;
            }
            System::LifeSupport {
                countdown,
                completed,
            } => {
                *countdown = reader.read_f32()?;
                if !reader.is_exhausted() {
                    let count = reader.read_packed_u32()?;
                    completed.clear();
                    for _ in 0..count {
                        completed.push(reader.read_packed_u32()?);
                    }
                }
            }
            System::MedScan { queue } => {
                let count = reader.read_packed_u32()? as usize;
                *queue = reader.read_bytes(count)?.to_vec();
            }
            System::Security { viewers } => {
                let count = usize::from(reader.read_u8()?);
                *viewers = reader.read_bytes(count)?.to_vec();
            }
            System::HudOverride { active } => {
                *active = reader.read_bool()?;
            }
            System::Doors { open } => {
                if initial {
                    for door in open.iter_mut() {
                        *door = reader.read_bool()?;
                    }
                } else {
                    let mask = reader.read_packed_u32()?;
                    for (index, door) in open.iter_mut().enumerate() {
                        if mask & (1 << index) != 0 {
                            *door = reader.read_bool()?;
                        }
                    }
                }
            }
            System::Sabotage { timer } => {
                *timer = reader.read_f32()?;
            }
        }
        Ok(())
    }
}

/// Ship systems of the current map, driven entirely by the host
#[derive(Debug, Clone, PartialEq)]
pub struct ShipStatus {
    pub map: Map,
    systems: BTreeMap<u8, System>,
}

impl ShipStatus {
    /// Every system the map has, in its initial state
    pub fn new(map: Map) -> Self {
        let mut systems = BTreeMap::new();
        let mut add = |system: SystemType, state: System| {
            systems.insert(system.as_u8(), state);
        };

        add(
            SystemType::Reactor,
            System::Reactor {
                countdown: 10000.0,
                consoles: Vec::new(),
            },
        );
        add(
            SystemType::Electrical,
            System::Switch {
                expected: 0,
                actual: 0,
                value: u8::MAX,
            },
        );
        add(
            SystemType::LifeSupp,
            System::LifeSupport {
                countdown: 10000.0,
                completed: Vec::new(),
            },
        );
        add(SystemType::MedBay, System::MedScan { queue: Vec::new() });
        add(
            SystemType::Security,
            System::Security {
                viewers: Vec::new(),
            },
        );
        add(SystemType::Comms, System::HudOverride { active: false });
        if let Some(doors) = map.door_count() {
            add(
                SystemType::Doors,
                System::Doors {
                    open: vec![true; doors],
                },
            );
        }
        add(SystemType::Sabotage, System::Sabotage { timer: 0.0 });

        Self { map, systems }
    }

    /// Current state of one system; `None` if the map lacks it
    pub fn system(&self, system: SystemType) -> Option<&System> {
        self.systems.get(&system.as_u8())
    }
}

/// Door and repair requests are addressed to the host, and only the host
/// may declare winners
impl InnerNetObject for ShipStatus {
    fn name(&self) -> &'static str {
        "ShipStatus"
    }

    fn rpc_rules(&self) -> &'static [RpcRule] {
        RULES
    }

    fn handle_rpc(
        &mut self,
        ctx: &mut RpcContext<'_>,
        call: u8,
        reader: &mut MessageReader<'_>,
    ) -> HandleResult {
        match call {
            calls::CLOSE_DOORS_OF_TYPE => {
                reader.read_u8()?;
            }
            calls::REPAIR_SYSTEM => {
                reader.read_u8()?;
                reader.read_packed_u32()?;
                reader.read_u8()?;
            }
            _ => {
                let winners = reader.read_bytes_and_size()?;
                info!("Host of {} sent game over with winners {:?}", ctx.code, winners);
            }
        }
        Ok(())
    }

    fn deserialize(
        &mut self,
        ctx: &mut RpcContext<'_>,
        reader: &mut MessageReader<'_>,
        initial: bool,
    ) -> HandleResult {
        ctx.require_host(self.name())?;
        if ctx.target.is_some() {
            return Err(HandleError::cheat(
                "Client attempted to send ShipStatus data to a specific player, must be broadcast",
            ));
        }

        if initial {
            for system in self.systems.values_mut() {
                system.deserialize(reader, true)?;
            }
            return Ok(());
        }

        let mask = reader.read_packed_u32()?;
        for (system_type, system) in self.systems.iter_mut() {
            if mask & (1 << (system_type & 31)) != 0 {
                system.deserialize(reader, false)?;
            }
        }
        Ok(())
    }
}
