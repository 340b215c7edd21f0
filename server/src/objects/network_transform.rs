use super::{InnerNetObject, RpcContext};
use crate::error::{HandleError, HandleResult};
use crate::rpc::{Gate, RpcRule, SenderRule, TargetRule};
use shared::{MessageReader, MessageWriter, Vector2, NET_RANGE, SNAP_RANGE};

/// Rpc call numbers of [`NetworkTransform`]
pub mod calls {
    pub const SNAP_TO: u8 = 21;
}

const RULES: &[RpcRule] = &[RpcRule::new(
    calls::SNAP_TO,
    "SnapTo",
    SenderRule::OwnerOrHost,
    TargetRule::Broadcast,
)
.gated(Gate::SupportedHost)];

/// Whether `new` comes after `prev` on the circular 16 bit sequence space.
///
/// Half the space ahead of `prev` counts as newer, so late packets from the
/// past never rewind a position even across wraparound.
pub fn is_ahead(new: u16, prev: u16) -> bool {
    let limit = prev.wrapping_add(32768);
    if prev < limit {
        new > prev && new <= limit
    } else {
        new > prev || new <= limit
    }
}

/// Position of a character, replicated by its owner
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkTransform {
    pub last_sequence_id: u16,
    pub position: Vector2,
}

impl NetworkTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the position if `sequence_id` is newer than the last one seen
    fn apply(&mut self, sequence_id: u16, position: Vector2) -> bool {
        if !is_ahead(sequence_id, self.last_sequence_id) {
            return false;
        }
        self.last_sequence_id = sequence_id;
        self.position = position;
        true
    }
}

impl InnerNetObject for NetworkTransform {
    fn name(&self) -> &'static str {
        "CustomNetworkTransform"
    }

    fn rpc_rules(&self) -> &'static [RpcRule] {
        RULES
    }

    fn handle_rpc(
        &mut self,
        _ctx: &mut RpcContext<'_>,
        _call: u8,
        reader: &mut MessageReader<'_>,
    ) -> HandleResult {
        let position = reader.read_vector2(SNAP_RANGE)?;
        let min_sequence_id = reader.read_u16()?;
        self.apply(min_sequence_id, position);
        Ok(())
    }

    fn serialize(&self, writer: &mut MessageWriter, initial: bool) -> HandleResult {
        writer.write_u16(self.last_sequence_id);
        if !initial {
            writer.write_packed_u32(1);
        }
        writer.write_vector2(self.position, NET_RANGE);
        Ok(())
    }

    fn deserialize(
        &mut self,
        ctx: &mut RpcContext<'_>,
        reader: &mut MessageReader<'_>,
        initial: bool,
    ) -> HandleResult {
        // Older hosts use a movement format we do not track
        if !ctx.host_supported {
            return Ok(());
        }

        let sequence_id = reader.read_u16()?;
        if initial {
            self.last_sequence_id = sequence_id;
            self.position = reader.read_vector2(NET_RANGE)?;
            return Ok(());
        }

        if !ctx.is_owner() {
            return Err(HandleError::cheat(
                "Client attempted to send unowned CustomNetworkTransform data",
            ));
        }

        let count = reader.read_packed_u32()?;
        for offset in 0..count {
            let position = reader.read_vector2(NET_RANGE)?;
            self.apply(sequence_id.wrapping_add(offset as u16), position);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::test_support::*;
    use crate::objects::{NetObject, ObjectKind};
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_is_ahead_for_every_previous_value() {
        for prev in 0..=u16::MAX {
            assert!(!is_ahead(prev, prev), "prev {}", prev);
            assert!(is_ahead(prev.wrapping_add(1), prev), "prev {}", prev);
            assert!(is_ahead(prev.wrapping_add(32768), prev), "prev {}", prev);
            assert!(!is_ahead(prev.wrapping_add(32769), prev), "prev {}", prev);
        }
    }

    #[test]
    fn test_is_ahead_wraparound() {
        assert!(is_ahead(0, u16::MAX));
        assert!(is_ahead(5, 65530));
        assert!(!is_ahead(65530, 5));
    }

    fn movement(sequence_id: u16, positions: &[Vector2]) -> Vec<u8> {
        payload(|writer| {
            writer.write_u16(sequence_id);
            writer.write_packed_u32(positions.len() as u32);
            for position in positions {
                writer.write_vector2(*position, NET_RANGE);
            }
        })
    }

    #[test]
    fn test_owner_movement_is_applied_in_order() {
        let mut fixture = Fixture::new();
        let mut transform = NetworkTransform::new();

        let bytes = movement(1, &[Vector2::new(1.0, 1.0), Vector2::new(2.0, -3.0)]);
        let mut reader = MessageReader::new(1, &bytes);
        transform
            .deserialize(&mut fixture.ctx(OWNER, OWNER, None), &mut reader, false)
            .unwrap();

        assert_eq!(transform.last_sequence_id, 2);
        assert_approx_eq!(transform.position.x, 2.0, NET_RANGE.step());
        assert_approx_eq!(transform.position.y, -3.0, NET_RANGE.step());
    }

    #[test]
    fn test_stale_movement_is_dropped() {
        let mut fixture = Fixture::new();
        let mut transform = NetworkTransform {
            last_sequence_id: 10,
            position: Vector2::new(5.0, 5.0),
        };

        let bytes = movement(9, &[Vector2::new(0.0, 0.0)]);
        let mut reader = MessageReader::new(1, &bytes);
        transform
            .deserialize(&mut fixture.ctx(OWNER, OWNER, None), &mut reader, false)
            .unwrap();

        assert_eq!(transform.last_sequence_id, 10);
        assert_eq!(transform.position, Vector2::new(5.0, 5.0));
    }

    #[test]
    fn test_movement_from_non_owner_is_cheat() {
        let mut fixture = Fixture::new();
        let mut transform = NetworkTransform::new();

        let bytes = movement(1, &[Vector2::new(1.0, 1.0)]);
        let mut reader = MessageReader::new(1, &bytes);
        let error = transform
            .deserialize(&mut fixture.ctx(HOST, OWNER, None), &mut reader, false)
            .unwrap_err();

        assert!(error.is_cheat());
        assert_eq!(transform, NetworkTransform::new());
    }

    #[test]
    fn test_legacy_host_data_is_ignored() {
        let mut fixture = Fixture::new();
        fixture.host_supported = false;
        let mut transform = NetworkTransform::new();

        let bytes = movement(1, &[Vector2::new(1.0, 1.0)]);
        let mut reader = MessageReader::new(1, &bytes);
        transform
            .deserialize(&mut fixture.ctx(STRANGER, OWNER, None), &mut reader, false)
            .unwrap();
        assert_eq!(transform, NetworkTransform::new());
    }

    fn snap(position: Vector2, sequence_id: u16) -> Vec<u8> {
        payload(|writer| {
            writer.write_vector2(position, SNAP_RANGE);
            writer.write_u16(sequence_id);
        })
    }

    #[test]
    fn test_snap_to() {
        let mut fixture = Fixture::new();
        let mut object = NetObject::new(100, OWNER, 0, ObjectKind::NetworkTransform(NetworkTransform::new()));

        let bytes = snap(Vector2::new(45.0, -45.0), 3);
        let mut reader = MessageReader::new(2, &bytes);
        object
            .handle_rpc(&mut fixture.ctx(HOST, OWNER, None), calls::SNAP_TO, &mut reader)
            .unwrap();

        let ObjectKind::NetworkTransform(transform) = &object.kind else {
            unreachable!();
        };
        assert_eq!(transform.last_sequence_id, 3);
        assert_approx_eq!(transform.position.x, 45.0, SNAP_RANGE.step());
    }

    #[test]
    fn test_snap_to_rules() {
        let mut fixture = Fixture::new();
        let mut object = NetObject::new(100, OWNER, 0, ObjectKind::NetworkTransform(NetworkTransform::new()));
        let bytes = snap(Vector2::new(1.0, 1.0), 3);

        let mut reader = MessageReader::new(2, &bytes);
        assert!(object
            .handle_rpc(&mut fixture.ctx(STRANGER, OWNER, None), calls::SNAP_TO, &mut reader)
            .unwrap_err()
            .is_cheat());

        let mut reader = MessageReader::new(2, &bytes);
        assert!(object
            .handle_rpc(&mut fixture.ctx(OWNER, OWNER, Some(HOST)), calls::SNAP_TO, &mut reader)
            .unwrap_err()
            .is_cheat());

        fixture.host_supported = false;
        let mut reader = MessageReader::new(2, &bytes);
        assert!(object
            .handle_rpc(&mut fixture.ctx(STRANGER, OWNER, None), calls::SNAP_TO, &mut reader)
            .is_ok());
        assert_eq!(
            object.kind.inner().name(),
            "CustomNetworkTransform"
        );
    }

    #[test]
    fn test_serialize_layout() {
        let transform = NetworkTransform {
            last_sequence_id: 7,
            position: Vector2::new(0.0, 0.0),
        };

        let mut initial = MessageWriter::new();
        transform.serialize(&mut initial, true).unwrap();
        assert_eq!(initial.len(), 6);

        let mut delta = MessageWriter::new();
        transform.serialize(&mut delta, false).unwrap();
        let bytes = delta.into_bytes();
        assert_eq!(bytes.len(), 7);
        assert_eq!(&bytes[..3], &[7, 0, 1]);
    }
}
