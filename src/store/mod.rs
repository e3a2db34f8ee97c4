//! External system-definition store.
//!
//! The consistency core does not own the message data; it reads and writes it
//! through [`SystemStore`]. The trait mirrors the dense, index-based message
//! lists of the surrounding editor: each `(node, interface, datapool,
//! protocol, direction)` container is a `Vec`, and deleting an entry shifts
//! every later entry down by one. The synchronization engine compensates for
//! those shifts; the store itself stays oblivious.
//!
//! [`MemoryStore`] is a complete in-memory implementation used by the test
//! suite and by hosts without a persistence layer of their own.

use std::collections::HashMap;

use crate::types::errors::StoreError;
use crate::types::record::{MessageRecord, SignalRecord};
use crate::types::reference::{ContainerId, Direction, MessageReference, Protocol, SyncScope};

/// One `(node, interface, datapool)` slot connected to a bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InterfaceSlot {
    pub node: usize,
    pub interface: usize,
    pub datapool: usize,
}

/// Read/write access to the external system definition.
pub trait SystemStore {
    /// Message record behind `reference`, if the slot exists.
    fn message(&self, reference: &MessageReference) -> Option<&MessageRecord>;

    /// Overwrites the message record behind `reference`.
    fn set_message(
        &mut self,
        reference: &MessageReference,
        record: MessageRecord,
    ) -> Result<(), StoreError>;

    /// Signal list of the message behind `reference`.
    fn signals(&self, reference: &MessageReference) -> Option<&[SignalRecord]>;

    /// Inserts `signal` at `index` of the message's signal list.
    fn insert_signal(
        &mut self,
        reference: &MessageReference,
        index: usize,
        signal: SignalRecord,
    ) -> Result<(), StoreError>;

    /// Removes and returns the signal at `index`.
    fn delete_signal(
        &mut self,
        reference: &MessageReference,
        index: usize,
    ) -> Result<SignalRecord, StoreError>;

    /// Overwrites the signal at `index`.
    fn set_signal(
        &mut self,
        reference: &MessageReference,
        index: usize,
        signal: SignalRecord,
    ) -> Result<(), StoreError>;

    /// Inserts a message (with its signals) at `reference.index` of the
    /// container's list, shifting later entries up.
    fn insert_message(
        &mut self,
        reference: &MessageReference,
        record: MessageRecord,
        signals: Vec<SignalRecord>,
    ) -> Result<(), StoreError>;

    /// Removes the message behind `reference`, shifting later entries down,
    /// and returns the removed record and signals.
    fn delete_message(
        &mut self,
        reference: &MessageReference,
    ) -> Result<(MessageRecord, Vec<SignalRecord>), StoreError>;

    /// Number of messages in the container `reference` points into (the
    /// reference's own `index` is ignored).
    fn message_count(&self, reference: &MessageReference) -> usize;

    /// All message references within `scope` for `protocol`. Used by the
    /// synchronization engine's `init` only.
    fn enumerate_references(
        &self,
        scope: &SyncScope,
        protocol: Protocol,
    ) -> Vec<MessageReference>;

    /// Name of the node owning a reference's container.
    fn node_name(&self, node: usize) -> Option<&str>;

    /// All interface slots connected to `bus` that speak `protocol`.
    fn connected_interfaces(&self, bus: usize, protocol: Protocol) -> Vec<InterfaceSlot>;
}

#[derive(Clone, Debug, Default, PartialEq)]
struct MessageEntry {
    record: MessageRecord,
    signals: Vec<SignalRecord>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct BusConnection {
    bus: usize,
    node: usize,
    interface: usize,
    datapool: usize,
    protocol: Protocol,
}

/// In-memory system definition with dense per-container message lists.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    node_names: Vec<String>,
    containers: HashMap<ContainerId, Vec<MessageEntry>>,
    connections: Vec<BusConnection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its index.
    pub fn add_node(&mut self, name: &str) -> usize {
        self.node_names.push(name.to_string());
        self.node_names.len() - 1
    }

    /// Connects one interface slot of a node to a bus for a protocol.
    pub fn connect(
        &mut self,
        bus: usize,
        node: usize,
        interface: usize,
        datapool: usize,
        protocol: Protocol,
    ) {
        let conn = BusConnection {
            bus,
            node,
            interface,
            datapool,
            protocol,
        };
        if !self.connections.contains(&conn) {
            self.connections.push(conn);
        }
    }

    /// Appends a message to a container and returns the resulting reference.
    pub fn push_message(
        &mut self,
        container: &MessageReference,
        record: MessageRecord,
        signals: Vec<SignalRecord>,
    ) -> MessageReference {
        let list = self.containers.entry(container.container()).or_default();
        list.push(MessageEntry { record, signals });
        container.with_index(list.len() - 1)
    }

    fn entry(&self, reference: &MessageReference) -> Option<&MessageEntry> {
        self.containers
            .get(&reference.container())?
            .get(reference.index)
    }

    fn entry_mut(&mut self, reference: &MessageReference) -> Option<&mut MessageEntry> {
        self.containers
            .get_mut(&reference.container())?
            .get_mut(reference.index)
    }

    fn scope_slots(&self, scope: &SyncScope, protocol: Protocol) -> Vec<InterfaceSlot> {
        match *scope {
            SyncScope::Bus { bus } => self.connected_interfaces(bus, protocol),
            SyncScope::NodeInterface {
                node,
                interface,
                datapool,
            } => vec![InterfaceSlot {
                node,
                interface,
                datapool,
            }],
        }
    }
}

impl SystemStore for MemoryStore {
    fn message(&self, reference: &MessageReference) -> Option<&MessageRecord> {
        self.entry(reference).map(|e| &e.record)
    }

    fn set_message(
        &mut self,
        reference: &MessageReference,
        record: MessageRecord,
    ) -> Result<(), StoreError> {
        let entry = self
            .entry_mut(reference)
            .ok_or(StoreError::MessageMissing {
                reference: *reference,
            })?;
        entry.record = record;
        Ok(())
    }

    fn signals(&self, reference: &MessageReference) -> Option<&[SignalRecord]> {
        self.entry(reference).map(|e| e.signals.as_slice())
    }

    fn insert_signal(
        &mut self,
        reference: &MessageReference,
        index: usize,
        signal: SignalRecord,
    ) -> Result<(), StoreError> {
        let entry = self
            .entry_mut(reference)
            .ok_or(StoreError::MessageMissing {
                reference: *reference,
            })?;
        if index > entry.signals.len() {
            return Err(StoreError::SignalMissing {
                reference: *reference,
                index,
            });
        }
        entry.signals.insert(index, signal);
        Ok(())
    }

    fn delete_signal(
        &mut self,
        reference: &MessageReference,
        index: usize,
    ) -> Result<SignalRecord, StoreError> {
        let entry = self
            .entry_mut(reference)
            .ok_or(StoreError::MessageMissing {
                reference: *reference,
            })?;
        if index >= entry.signals.len() {
            return Err(StoreError::SignalMissing {
                reference: *reference,
                index,
            });
        }
        Ok(entry.signals.remove(index))
    }

    fn set_signal(
        &mut self,
        reference: &MessageReference,
        index: usize,
        signal: SignalRecord,
    ) -> Result<(), StoreError> {
        let entry = self
            .entry_mut(reference)
            .ok_or(StoreError::MessageMissing {
                reference: *reference,
            })?;
        let slot = entry
            .signals
            .get_mut(index)
            .ok_or(StoreError::SignalMissing {
                reference: *reference,
                index,
            })?;
        *slot = signal;
        Ok(())
    }

    fn insert_message(
        &mut self,
        reference: &MessageReference,
        record: MessageRecord,
        signals: Vec<SignalRecord>,
    ) -> Result<(), StoreError> {
        let list = self.containers.entry(reference.container()).or_default();
        if reference.index > list.len() {
            return Err(StoreError::MessageMissing {
                reference: *reference,
            });
        }
        list.insert(reference.index, MessageEntry { record, signals });
        Ok(())
    }

    fn delete_message(
        &mut self,
        reference: &MessageReference,
    ) -> Result<(MessageRecord, Vec<SignalRecord>), StoreError> {
        let list = self
            .containers
            .get_mut(&reference.container())
            .ok_or(StoreError::ContainerMissing {
                reference: *reference,
            })?;
        if reference.index >= list.len() {
            return Err(StoreError::MessageMissing {
                reference: *reference,
            });
        }
        let entry = list.remove(reference.index);
        Ok((entry.record, entry.signals))
    }

    fn message_count(&self, reference: &MessageReference) -> usize {
        self.containers
            .get(&reference.container())
            .map_or(0, Vec::len)
    }

    fn enumerate_references(
        &self,
        scope: &SyncScope,
        protocol: Protocol,
    ) -> Vec<MessageReference> {
        let mut refs: Vec<MessageReference> = Vec::new();
        for slot in self.scope_slots(scope, protocol) {
            for direction in [Direction::Tx, Direction::Rx] {
                let prototype = MessageReference {
                    node: slot.node,
                    interface: slot.interface,
                    datapool: slot.datapool,
                    protocol,
                    direction,
                    index: 0,
                };
                let count = self.message_count(&prototype);
                refs.extend((0..count).map(|i| prototype.with_index(i)));
            }
        }
        refs
    }

    fn node_name(&self, node: usize) -> Option<&str> {
        self.node_names.get(node).map(String::as_str)
    }

    fn connected_interfaces(&self, bus: usize, protocol: Protocol) -> Vec<InterfaceSlot> {
        self.connections
            .iter()
            .filter(|c| c.bus == bus && c.protocol == protocol)
            .map(|c| InterfaceSlot {
                node: c.node,
                interface: c.interface,
                datapool: c.datapool,
            })
            .collect()
    }
}
