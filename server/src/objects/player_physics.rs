use super::{InnerNetObject, RpcContext};
use crate::error::{HandleError, HandleResult};
use crate::events::GameEvent;
use crate::rpc::{RpcRule, SenderRule, TargetRule};
use shared::MessageReader;

/// Rpc call numbers of [`PlayerPhysics`]
pub mod calls {
    pub const ENTER_VENT: u8 = 0;
    pub const EXIT_VENT: u8 = 1;
}

const RULES: &[RpcRule] = &[
    RpcRule::new(calls::ENTER_VENT, "EnterVent", SenderRule::Owner, TargetRule::Broadcast),
    RpcRule::new(calls::EXIT_VENT, "ExitVent", SenderRule::Owner, TargetRule::Broadcast),
];

/// Vent occupancy of one character
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerPhysics {
    /// Vent the character is hiding in, if any
    pub vent: Option<u32>,
}

impl PlayerPhysics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Vent calls come only from the owner and must be broadcast; each one
/// updates the occupancy and publishes a vent event.
impl InnerNetObject for PlayerPhysics {
    fn name(&self) -> &'static str {
        "PlayerPhysics"
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
        let vent_id = reader.read_packed_u32()?;
        let entered = call == calls::ENTER_VENT;
        self.vent = entered.then_some(vent_id);

        ctx.publish(GameEvent::PlayerVent {
            code: ctx.code,
            client_id: ctx.sender.client_id,
            vent_id,
            entered,
        });
        Ok(())
    }

    fn deserialize(
        &mut self,
        ctx: &mut RpcContext<'_>,
        reader: &mut MessageReader<'_>,
        initial: bool,
    ) -> HandleResult {
        // Spawn data carries nothing we track
        if initial || reader.is_exhausted() {
            return Ok(());
        }

        if !ctx.is_owner() {
            return Err(HandleError::cheat(
                "Client attempted to send unowned PlayerPhysics data",
            ));
        }
        Ok(())
    }
}
