//! Sender and target legality for remote procedure calls
//!
//! Every object kind publishes a table of [`RpcRule`]s, one per call it knows.
//! [`dispatch`] looks the call up, runs the generic [`RpcRule::check`] and only
//! then hands the payload to the object. Keeping the rules as data means the
//! whole policy surface can be tested without building payloads.

use crate::error::{HandleError, HandleResult};
use crate::objects::{InnerNetObject, RpcContext};
use log::warn;
use shared::MessageReader;

/// Who may send a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderRule {
    /// Anyone in the game
    Any,
    /// Only the game host
    Host,
    /// Strict ownership; the host gets no exemption
    Owner,
    /// The owner, or the host acting on anyone's object
    OwnerOrHost,
    /// The host, and only on an object it owns itself
    HostAndOwner,
    /// Host only while the game host runs a supported build, otherwise the
    /// owner is accepted as well
    HostIfSupported,
}

/// Where a call may be addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRule {
    /// Broadcast or directed, to anyone
    Any,
    /// Must be broadcast, never sent to a single player
    Broadcast,
    /// Must be sent to the host alone
    Host,
}

/// Condition under which a call is silently ignored instead of checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Always checked
    None,
    /// Ignored unless the game host runs a supported build, whose client
    /// would otherwise be the one to enforce it
    SupportedHost,
}

/// The parts of a call the rules look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallShape {
    pub sender_is_host: bool,
    pub sender_is_owner: bool,
    /// `None` for a broadcast, otherwise whether the target is the host
    pub target_is_host: Option<bool>,
    pub host_supported: bool,
}

/// Result of a passed check
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the payload to the object
    Handle,
    /// Drop the call without complaint
    Skip,
}

/// Policy for one call number on one object kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcRule {
    pub call: u8,
    pub name: &'static str,
    pub sender: SenderRule,
    pub target: TargetRule,
    pub gate: Gate,
}

impl RpcRule {
    pub const fn new(call: u8, name: &'static str, sender: SenderRule, target: TargetRule) -> Self {
        Self {
            call,
            name,
            sender,
            target,
            gate: Gate::None,
        }
    }

    /// Same rule, skipped rather than checked when `gate` does not hold
    pub const fn gated(self, gate: Gate) -> Self {
        Self { gate, ..self }
    }

    /// Decides whether a call may run. The gate is consulted first, then the
    /// sender, then the target; the first violation becomes a cheat error
    /// naming the call and `object`.
    pub fn check(&self, object: &str, shape: CallShape) -> Result<Verdict, HandleError> {
        if self.gate == Gate::SupportedHost && !shape.host_supported {
            return Ok(Verdict::Skip);
        }

        let name = self.name;
        let sender_ok = match self.sender {
            SenderRule::Any => true,
            SenderRule::Host => shape.sender_is_host,
            SenderRule::Owner => shape.sender_is_owner,
            SenderRule::OwnerOrHost => shape.sender_is_owner || shape.sender_is_host,
            SenderRule::HostAndOwner => shape.sender_is_host && shape.sender_is_owner,
            SenderRule::HostIfSupported => {
                shape.sender_is_host || (!shape.host_supported && shape.sender_is_owner)
            }
        };

        if !sender_ok {
            let reason = match self.sender {
                SenderRule::Host | SenderRule::HostIfSupported => {
                    format!("Client sent {} but was not a host", name)
                }
                SenderRule::OwnerOrHost => {
                    format!("Client sent {} to unowned {} and is not host", name, object)
                }
                _ => format!("Client sent {} to an unowned {}", name, object),
            };
            return Err(HandleError::Cheat(reason));
        }

        match (self.target, shape.target_is_host) {
            (TargetRule::Broadcast, Some(_)) => Err(HandleError::Cheat(format!(
                "Client sent {} to a specific player instead of broadcast",
                name
            ))),
            (TargetRule::Host, None) | (TargetRule::Host, Some(false)) => Err(HandleError::Cheat(
                format!("Client sent {} to the wrong player, must be host", name),
            )),
            _ => Ok(Verdict::Handle),
        }
    }
}

/// Rule for `call`, if the table has one
pub fn lookup(rules: &[RpcRule], call: u8) -> Option<&RpcRule> {
    rules.iter().find(|rule| rule.call == call)
}

/// Validates a call against the object's rules and runs it.
/// Unknown calls are logged and ignored.
pub fn dispatch(
    object: &mut dyn InnerNetObject,
    ctx: &mut RpcContext<'_>,
    call: u8,
    reader: &mut MessageReader<'_>,
) -> HandleResult {
    let Some(rule) = lookup(object.rpc_rules(), call).copied() else {
        warn!("{}: Unknown rpc call {}", object.name(), call);
        return Ok(());
    };

    match rule.check(object.name(), ctx.shape())? {
        Verdict::Handle => object.handle_rpc(ctx, call, reader),
        Verdict::Skip => Ok(()),
    }
}
