//! Locators into the external system definition.
//!
//! A [`MessageReference`] does not own any message data; it identifies one
//! per-node copy of a CAN message inside the external store. Equality is
//! structural, so two references naming the same list slot compare equal even
//! when they were produced independently.

use serde::{Deserialize, Serialize};

/// 11-bit mask for standard CAN identifiers.
pub const CAN_SFF_MASK: u32 = 0x7FF;
/// 29-bit mask for extended CAN identifiers.
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// Highest legal CAN-ID for the given identifier format.
#[inline]
pub fn max_can_id(extended: bool) -> u32 {
    if extended { CAN_EFF_MASK } else { CAN_SFF_MASK }
}

/// Normalized hexadecimal form of a CAN-ID (`"0x..."`, uppercase).
pub fn id_to_hex(id: u32) -> String {
    format!("0x{id:X}")
}

/// CAN communication protocol of a message container.
///
/// The protocol decides the placement policy the bit-layout allocator and the
/// validation checker enforce; see [`Protocol::policy`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// Plain layer-2 CAN: free signal placement.
    #[default]
    Layer2,
    /// Safety protocol: signals must be byte aligned and every message needs
    /// at least one signal.
    Safety,
    /// CANopen-style protocol: gapless packing below the highest used bit and
    /// device-mapped CAN-IDs that must not be edited.
    CanOpen,
}

impl Protocol {
    /// Placement and identity rules for this protocol.
    pub fn policy(self) -> LayoutPolicy {
        match self {
            Protocol::Layer2 => LayoutPolicy {
                byte_aligned: false,
                gapless: false,
                signals_required: false,
                fixed_ids: false,
            },
            Protocol::Safety => LayoutPolicy {
                byte_aligned: true,
                gapless: false,
                signals_required: true,
                fixed_ids: false,
            },
            Protocol::CanOpen => LayoutPolicy {
                byte_aligned: false,
                gapless: true,
                signals_required: false,
                fixed_ids: true,
            },
        }
    }

    pub fn to_str(&self) -> String {
        match self {
            Protocol::Layer2 => "Layer 2".to_string(),
            Protocol::Safety => "Safety".to_string(),
            Protocol::CanOpen => "CANopen".to_string(),
        }
    }
}

/// Structural placement rules derived from a [`Protocol`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LayoutPolicy {
    /// Signal start bits and lengths must be multiples of 8.
    pub byte_aligned: bool,
    /// No empty cell may exist below the highest occupied cell.
    pub gapless: bool,
    /// A message without signals is invalid.
    pub signals_required: bool,
    /// CAN-IDs come from a fixed device mapping and are read-only.
    pub fixed_ids: bool,
}

/// Transmission direction of one message copy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Tx,
    #[default]
    Rx,
}

/// The dense message list one reference points into.
///
/// Each `(node, interface, datapool, protocol, direction)` tuple owns one
/// index-based message list in the external store; deleting an entry shifts
/// every later entry of the same container down by one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContainerId {
    pub node: usize,
    pub interface: usize,
    pub datapool: usize,
    pub protocol: Protocol,
    pub direction: Direction,
}

/// Locator for one per-node copy of a CAN message.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageReference {
    /// Node (ECU) index in the system definition.
    pub node: usize,
    /// CAN interface index within the node.
    pub interface: usize,
    /// Datapool index within the node.
    pub datapool: usize,
    /// Protocol of the containing message list.
    pub protocol: Protocol,
    /// Tx or Rx list of the container.
    pub direction: Direction,
    /// Position within the dense message list.
    pub index: usize,
}

impl MessageReference {
    /// Identity of the message list this reference indexes into.
    pub fn container(&self) -> ContainerId {
        ContainerId {
            node: self.node,
            interface: self.interface,
            datapool: self.datapool,
            protocol: self.protocol,
            direction: self.direction,
        }
    }

    /// Same container, different list position.
    pub fn with_index(&self, index: usize) -> Self {
        Self { index, ..*self }
    }

    /// Same node/interface/datapool, opposite message list.
    pub fn with_direction(&self, direction: Direction) -> Self {
        Self { direction, ..*self }
    }

    /// Owner slot of this copy, ignoring direction and list position.
    pub fn owner(&self) -> (usize, usize, usize) {
        (self.node, self.interface, self.datapool)
    }
}

/// Which part of the system definition a [`SyncEngine`](crate::sync::SyncEngine)
/// tracks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncScope {
    /// Every node interface connected to one bus.
    Bus { bus: usize },
    /// A single interface of a single node.
    NodeInterface {
        node: usize,
        interface: usize,
        datapool: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_can_id_ranges() {
        assert_eq!(max_can_id(false), 0x7FF);
        assert_eq!(max_can_id(true), 0x1FFF_FFFF);
    }

    #[test]
    fn test_reference_equality_is_structural() {
        let a = MessageReference {
            node: 1,
            interface: 0,
            datapool: 2,
            protocol: Protocol::Layer2,
            direction: Direction::Tx,
            index: 3,
        };
        let b = MessageReference { ..a };
        assert_eq!(a, b);
        assert_ne!(a, a.with_index(4));
        assert_ne!(a, a.with_direction(Direction::Rx));
        assert_eq!(a.container(), b.with_index(9).container());
    }

    #[test]
    fn test_protocol_policies() {
        assert!(Protocol::Safety.policy().byte_aligned);
        assert!(Protocol::Safety.policy().signals_required);
        assert!(Protocol::CanOpen.policy().gapless);
        assert!(Protocol::CanOpen.policy().fixed_ids);
        assert_eq!(Protocol::Layer2.policy(), LayoutPolicy::default());
    }

    #[test]
    fn test_id_to_hex() {
        assert_eq!(id_to_hex(0x100), "0x100");
        assert_eq!(id_to_hex(0x12DD54E3), "0x12DD54E3");
    }
}
