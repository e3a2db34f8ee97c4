use std::collections::{HashMap, HashSet};

use slotmap::SlotMap;
use tracing::{debug, warn};

use crate::store::SystemStore;
use crate::sync::group::{CriticalConflict, GroupKey, SyncGroup};
use crate::types::errors::SyncError;
use crate::types::reference::{
    ContainerId, Direction, MessageReference, Protocol, SyncScope, max_can_id,
};

/// Synchronization engine for one scope and protocol.
///
/// Owns the group arena and the reference index. The two are only ever
/// mutated together; [`SyncEngine::check_consistency`] verifies the pairing
/// and every mutating operation re-checks it in debug builds.
///
/// References held by groups and conflicts are live locators into the
/// external store: whenever a store mutation shifts a message list, the
/// matching `remove`/`new message`/`direction change` operation here patches
/// **every** tracked reference of the affected container, not just the group
/// being edited.
#[derive(Clone, Debug)]
pub struct SyncEngine {
    scope: SyncScope,
    protocol: Protocol,
    groups: SlotMap<GroupKey, SyncGroup>,
    group_by_ref: HashMap<MessageReference, GroupKey>,
    conflicts: Vec<CriticalConflict>,
}

impl SyncEngine {
    /// Creates an empty engine; call [`SyncEngine::init`] to populate it.
    pub fn new(scope: SyncScope, protocol: Protocol) -> Self {
        Self {
            scope,
            protocol,
            groups: SlotMap::with_key(),
            group_by_ref: HashMap::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn scope(&self) -> &SyncScope {
        &self.scope
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Rebuilds all groups from scratch for the configured scope.
    ///
    /// Enumerates every message reference in scope, partitions them by
    /// `(CAN-ID, extended)` identity, and diverts partitions with more than
    /// one transmitting copy to the critical-conflict list. All previous
    /// group keys are discarded.
    pub fn init(&mut self, store: &impl SystemStore) {
        self.groups.clear();
        self.group_by_ref.clear();
        self.conflicts.clear();

        let mut buckets: HashMap<(u32, bool), Vec<MessageReference>> = HashMap::new();
        for reference in store.enumerate_references(&self.scope, self.protocol) {
            let Some(record) = store.message(&reference) else {
                warn!(?reference, "enumerated reference has no record; skipped");
                continue;
            };
            buckets
                .entry((record.can_id, record.extended))
                .or_default()
                .push(reference);
        }

        // Deterministic group creation order.
        let mut buckets: Vec<((u32, bool), Vec<MessageReference>)> = buckets.into_iter().collect();
        buckets.sort_by_key(|(identity, _)| *identity);

        for ((can_id, extended), refs) in buckets {
            let tx_count = refs.iter().filter(|r| r.direction == Direction::Tx).count();
            if tx_count > 1 {
                warn!(
                    can_id,
                    extended, tx_count, "colliding transmitters; recording critical conflict"
                );
                self.conflicts.push(CriticalConflict {
                    can_id,
                    extended,
                    protocol: self.protocol,
                    refs,
                });
            } else {
                self.insert_group(SyncGroup {
                    can_id,
                    extended,
                    protocol: self.protocol,
                    refs,
                });
            }
        }

        debug!(
            groups = self.groups.len(),
            conflicts = self.conflicts.len(),
            protocol = %self.protocol.to_str(),
            "synchronization groups initialized"
        );
        self.debug_check();
    }

    // ---- Lookup ----

    pub fn group(&self, key: GroupKey) -> Option<&SyncGroup> {
        self.groups.get(key)
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupKey, &SyncGroup)> {
        self.groups.iter()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn conflicts(&self) -> &[CriticalConflict] {
        &self.conflicts
    }

    /// Whether `reference` is part of a critical conflict.
    pub fn is_critical(&self, reference: &MessageReference) -> bool {
        self.conflicts.iter().any(|c| c.contains(reference))
    }

    /// One representative reference per group (Tx preferred, first Rx
    /// otherwise), ordered by CAN-ID. Conflict members are excluded.
    pub fn unique_messages(&self) -> Vec<MessageReference> {
        let mut out: Vec<(u32, MessageReference)> = self
            .groups
            .values()
            .filter_map(|g| g.representative().map(|r| (g.can_id, *r)))
            .collect();
        out.sort_by_key(|(can_id, _)| *can_id);
        out.into_iter().map(|(_, r)| r).collect()
    }

    /// All references considered the same logical message as `reference`
    /// (itself included). Conflict members report their conflict peers.
    pub fn matching_references(&self, reference: &MessageReference) -> Vec<MessageReference> {
        if let Some(&key) = self.group_by_ref.get(reference) {
            return self.groups[key].refs.clone();
        }
        if let Some(conflict) = self.conflicts.iter().find(|c| c.contains(reference)) {
            return conflict.refs.clone();
        }
        Vec::new()
    }

    /// Stable group id of the group containing `reference`.
    pub fn group_id(&self, reference: &MessageReference) -> Option<GroupKey> {
        self.group_by_ref.get(reference).copied()
    }

    /// Current representative reference of a group id.
    ///
    /// The inverse of [`SyncEngine::group_id`] for any live group. A key
    /// whose group has been removed yields the stale-group error instead of
    /// an arbitrary reference.
    pub fn reference_for_group(&self, key: GroupKey) -> Result<MessageReference, SyncError> {
        let Some(group) = self.groups.get(key) else {
            warn!(?key, "lookup of deleted synchronization group");
            return Err(SyncError::StaleGroup { group: key });
        };
        group
            .representative()
            .copied()
            .ok_or(SyncError::StaleGroup { group: key })
    }

    // ---- Incremental maintenance ----

    /// Tracks a reference created behind the engine's back.
    ///
    /// Finds the group matching the reference's stored identity or creates a
    /// fresh one. A second transmitting copy diverts the whole partition to
    /// the critical-conflict list; the group id is freed in that case.
    /// Returns the group the reference ended up in, `None` for conflicts.
    pub fn register_if_necessary(
        &mut self,
        store: &impl SystemStore,
        reference: &MessageReference,
    ) -> Option<GroupKey> {
        if let Some(&key) = self.group_by_ref.get(reference) {
            return Some(key);
        }
        if self.is_critical(reference) {
            return None;
        }
        let Some(record) = store.message(reference) else {
            warn!(?reference, "cannot register reference without a record");
            return None;
        };
        let (can_id, extended) = (record.can_id, record.extended);

        let key = self.attach(*reference, can_id, extended);
        self.rebuild_reverse_index();
        self.debug_check();
        key
    }

    /// Re-keys the partition of `reference` after its stored records took a
    /// new `(can_id, extended)` identity.
    ///
    /// Property edits rewrite every copy of a group, so the whole group
    /// moves: it keeps its key when the new identity is free, merges into a
    /// matching group or conflict otherwise (diverting to the conflict list
    /// when the merge yields a second transmitter). A conflict member takes
    /// its new identity alone; this is the re-ID resolution path, and the
    /// remaining conflict re-forms into a group once its surplus transmitter
    /// is gone. Returns the group the reference ended up in.
    pub fn update_identity(
        &mut self,
        reference: &MessageReference,
        can_id: u32,
        extended: bool,
    ) -> Option<GroupKey> {
        let result = if let Some(&key) = self.group_by_ref.get(reference) {
            if self.groups[key].matches(can_id, extended) {
                Some(key)
            } else if let Some(pos) = self
                .conflicts
                .iter()
                .position(|c| c.matches(can_id, extended))
            {
                warn!(can_id, "identity change joins an existing critical conflict");
                let group = self.groups.remove(key).unwrap_or_default();
                self.conflicts[pos].refs.extend(group.refs);
                None
            } else {
                let other = self
                    .groups
                    .iter()
                    .find(|(k, g)| *k != key && g.matches(can_id, extended))
                    .map(|(k, _)| k);
                match other {
                    Some(other_key) => {
                        let group = self.groups.remove(key).unwrap_or_default();
                        self.groups[other_key].refs.extend(group.refs);
                        if self.groups[other_key].tx_count() > 1 {
                            warn!(
                                can_id,
                                "identity change produced a second transmitter; diverting group to conflict"
                            );
                            let merged = self.groups.remove(other_key).unwrap_or_default();
                            self.conflicts.push(CriticalConflict {
                                can_id,
                                extended,
                                protocol: self.protocol,
                                refs: merged.refs,
                            });
                            None
                        } else {
                            Some(other_key)
                        }
                    }
                    None => {
                        let group = &mut self.groups[key];
                        group.can_id = can_id;
                        group.extended = extended;
                        Some(key)
                    }
                }
            }
        } else if let Some(pos) = self.conflicts.iter().position(|c| c.contains(reference)) {
            let conflict = &mut self.conflicts[pos];
            conflict.refs.retain(|r| r != reference);
            if conflict.tx_count() < 2 {
                let resolved = self.conflicts.remove(pos);
                debug!(can_id = resolved.can_id, "critical conflict resolved by re-ID");
                if !resolved.refs.is_empty() {
                    self.insert_group(SyncGroup {
                        can_id: resolved.can_id,
                        extended: resolved.extended,
                        protocol: resolved.protocol,
                        refs: resolved.refs,
                    });
                }
            }
            self.attach(*reference, can_id, extended)
        } else {
            None
        };
        self.rebuild_reverse_index();
        self.debug_check();
        result
    }

    /// Untracks `reference` after its message was deleted from the store and
    /// compensates the list shift of every later entry in the same container.
    ///
    /// When the reference was the sole member of its group, the group is
    /// deleted (and its id retired) only if `allow_delete` is set; otherwise
    /// the emptied group survives. A conflict that loses its surplus
    /// transmitter through the removal is re-formed into a normal group.
    pub fn remove_and_update_indices(&mut self, reference: &MessageReference, allow_delete: bool) {
        if let Some(key) = self.group_by_ref.remove(reference) {
            let group = &mut self.groups[key];
            group.refs.retain(|r| r != reference);
            if group.refs.is_empty() && allow_delete {
                self.groups.remove(key);
                debug!(?key, "synchronization group removed");
            }
        } else if let Some(pos) = self.conflicts.iter().position(|c| c.contains(reference)) {
            let conflict = &mut self.conflicts[pos];
            conflict.refs.retain(|r| r != reference);
            if conflict.tx_count() < 2 {
                let resolved = self.conflicts.remove(pos);
                debug!(
                    can_id = resolved.can_id,
                    "critical conflict resolved by removal"
                );
                if !resolved.refs.is_empty() {
                    self.insert_group(SyncGroup {
                        can_id: resolved.can_id,
                        extended: resolved.extended,
                        protocol: resolved.protocol,
                        refs: resolved.refs,
                    });
                }
            }
        }

        self.shift_after_removal(reference.container(), reference.index);
        self.rebuild_reverse_index();
        self.debug_check();
    }

    /// Compensates the list shift caused by inserting a message at
    /// `reference`.
    ///
    /// Must be called **before** [`SyncEngine::register_if_necessary`] for
    /// the inserted reference, so the shift never touches the new entry
    /// itself.
    pub fn update_indices_to_new_message(&mut self, reference: &MessageReference) {
        self.shift_for_insertion(reference.container(), reference.index);
        self.rebuild_reverse_index();
        self.debug_check();
    }

    /// Patches all tracked references after a message moved from
    /// `old_reference`'s list to `new_reference`'s (Rx to Tx or back).
    ///
    /// Performs the insertion shift in the new container, replaces the
    /// reference inside its group or conflict, then the removal shift in the
    /// old container. Only afterwards is the affected partition re-examined:
    /// a group that gained a second transmitter is diverted to the conflict
    /// list, a conflict that lost one is re-formed into a group. Index
    /// shifts therefore never observe a half-updated partition.
    pub fn update_indices_to_direction_change(
        &mut self,
        old_reference: &MessageReference,
        new_reference: &MessageReference,
    ) {
        self.shift_for_insertion(new_reference.container(), new_reference.index);

        let mut touched_group: Option<GroupKey> = None;
        if let Some(key) = self.group_by_ref.remove(old_reference) {
            let group = &mut self.groups[key];
            for r in &mut group.refs {
                if r == old_reference {
                    *r = *new_reference;
                }
            }
            touched_group = Some(key);
        } else if let Some(pos) = self
            .conflicts
            .iter()
            .position(|c| c.contains(old_reference))
        {
            for r in &mut self.conflicts[pos].refs {
                if r == old_reference {
                    *r = *new_reference;
                }
            }
            // The direction change may have removed the surplus transmitter.
            if self.conflicts[pos].tx_count() < 2 {
                let resolved = self.conflicts.remove(pos);
                self.insert_group(SyncGroup {
                    can_id: resolved.can_id,
                    extended: resolved.extended,
                    protocol: resolved.protocol,
                    refs: resolved.refs,
                });
            }
        }

        self.shift_after_removal(old_reference.container(), old_reference.index);

        if let Some(key) = touched_group
            && self.groups[key].tx_count() > 1
        {
            let group = self.groups.remove(key).unwrap_or_default();
            warn!(
                can_id = group.can_id,
                "direction change produced a second transmitter; diverting group to conflict"
            );
            self.conflicts.push(CriticalConflict {
                can_id: group.can_id,
                extended: group.extended,
                protocol: group.protocol,
                refs: group.refs,
            });
        }

        self.rebuild_reverse_index();
        self.debug_check();
    }

    /// Lowest CAN-ID not used by any tracked group or conflict, within the
    /// range implied by `extended`.
    pub fn next_valid_message_id(&self, extended: bool) -> u32 {
        let used: HashSet<u32> = self
            .groups
            .values()
            .filter(|g| g.extended == extended)
            .map(|g| g.can_id)
            .chain(
                self.conflicts
                    .iter()
                    .filter(|c| c.extended == extended)
                    .map(|c| c.can_id),
            )
            .collect();
        (0..=max_can_id(extended))
            .find(|id| !used.contains(id))
            .unwrap_or(0)
    }

    // ---- Invariant checking ----

    /// Verifies that the arena, the reverse index and the conflict list are
    /// mutually consistent.
    ///
    /// A failure here means silent corruption elsewhere; callers should
    /// treat it as fatal.
    pub fn check_consistency(&self) -> Result<(), SyncError> {
        for (reference, &key) in &self.group_by_ref {
            let Some(group) = self.groups.get(key) else {
                return Err(SyncError::IndexInconsistency {
                    details: "reverse index points at a deleted group",
                });
            };
            if !group.contains(reference) {
                return Err(SyncError::IndexInconsistency {
                    details: "reverse index points at a group not containing the reference",
                });
            }
        }
        for group in self.groups.values() {
            for reference in &group.refs {
                if self.group_by_ref.get(reference).is_none() {
                    return Err(SyncError::IndexInconsistency {
                        details: "group member missing from the reverse index",
                    });
                }
                if self.is_critical(reference) {
                    return Err(SyncError::IndexInconsistency {
                        details: "reference tracked by both a group and a conflict",
                    });
                }
            }
            if group.tx_count() > 1 {
                return Err(SyncError::IndexInconsistency {
                    details: "group holds more than one transmitter",
                });
            }
        }
        Ok(())
    }

    // ---- Internals ----

    /// Attaches a detached reference to the partition matching the given
    /// identity, creating a fresh group when none matches. A second
    /// transmitter diverts the receiving group to the conflict list. The
    /// caller rebuilds the reverse index afterwards.
    fn attach(
        &mut self,
        reference: MessageReference,
        can_id: u32,
        extended: bool,
    ) -> Option<GroupKey> {
        if let Some(conflict) = self
            .conflicts
            .iter_mut()
            .find(|c| c.matches(can_id, extended))
        {
            conflict.refs.push(reference);
            return None;
        }
        let existing = self
            .groups
            .iter()
            .find(|(_, g)| g.matches(can_id, extended))
            .map(|(k, _)| k);
        match existing {
            Some(key) => {
                if reference.direction == Direction::Tx && self.groups[key].tx_count() >= 1 {
                    // Second transmitter: the whole partition becomes a
                    // critical conflict and the group id is retired.
                    warn!(
                        can_id,
                        extended, "second transmitter registered; diverting group to conflict"
                    );
                    let mut group = self.groups.remove(key).unwrap_or_default();
                    group.refs.push(reference);
                    self.conflicts.push(CriticalConflict {
                        can_id,
                        extended,
                        protocol: self.protocol,
                        refs: group.refs,
                    });
                    None
                } else {
                    self.groups[key].refs.push(reference);
                    Some(key)
                }
            }
            None => Some(self.insert_group(SyncGroup {
                can_id,
                extended,
                protocol: self.protocol,
                refs: vec![reference],
            })),
        }
    }

    fn insert_group(&mut self, group: SyncGroup) -> GroupKey {
        let refs = group.refs.clone();
        let key = self.groups.insert(group);
        for reference in refs {
            self.group_by_ref.insert(reference, key);
        }
        key
    }

    /// Decrements the list index of every tracked reference in `container`
    /// past the removed `index`. Applied to every group and conflict.
    fn shift_after_removal(&mut self, container: ContainerId, index: usize) {
        let shift = |r: &mut MessageReference| {
            if r.container() == container && r.index > index {
                r.index -= 1;
            }
        };
        for group in self.groups.values_mut() {
            group.refs.iter_mut().for_each(shift);
        }
        for conflict in &mut self.conflicts {
            conflict.refs.iter_mut().for_each(shift);
        }
    }

    /// Increments the list index of every tracked reference in `container`
    /// at or past the inserted `index`.
    fn shift_for_insertion(&mut self, container: ContainerId, index: usize) {
        let shift = |r: &mut MessageReference| {
            if r.container() == container && r.index >= index {
                r.index += 1;
            }
        };
        for group in self.groups.values_mut() {
            group.refs.iter_mut().for_each(shift);
        }
        for conflict in &mut self.conflicts {
            conflict.refs.iter_mut().for_each(shift);
        }
    }

    /// Re-derives the reference index from the arena. Index shifts rewrite
    /// references in place, so the map keys must be rebuilt with them.
    fn rebuild_reverse_index(&mut self) {
        self.group_by_ref.clear();
        for (key, group) in &self.groups {
            for reference in &group.refs {
                self.group_by_ref.insert(*reference, key);
            }
        }
    }

    #[inline]
    fn debug_check(&self) {
        debug_assert_eq!(self.check_consistency(), Ok(()));
    }
}
