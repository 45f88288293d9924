//! Durable metadata store boundary.
//!
//! The manager reads one consistent [`TopologySnapshot`] per operation and
//! writes slot mappings back with compare-and-swap, so two writers racing on
//! the same slot cannot both commit a hop.

pub mod file;
pub mod memory;

use crate::core::{Result, TopomError};
use crate::models::{Group, GroupId, Proxy, SlotId, SlotMapping, TopomModel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use file::FileStore;
pub use memory::InMemoryStore;

/// Immutable view of every group, proxy, and slot mapping at one instant.
///
/// Backed by persistent maps, so taking a snapshot is a pointer copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub groups: im::OrdMap<GroupId, Group>,
    pub proxies: im::OrdMap<String, Proxy>,
    pub slots: im::Vector<SlotMapping>,
}

impl TopologySnapshot {
    pub fn with_slot_count(max_slot_num: u32) -> Self {
        Self {
            groups: im::OrdMap::new(),
            proxies: im::OrdMap::new(),
            slots: (0..max_slot_num).map(SlotMapping::new).collect(),
        }
    }

    pub fn max_slot_num(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn slot(&self, sid: SlotId) -> Option<&SlotMapping> {
        self.slots.get(sid as usize)
    }

    pub fn group(&self, gid: GroupId) -> Option<&Group> {
        self.groups.get(&gid)
    }
}

/// Contract of the metadata store collaborator.
#[async_trait]
pub trait TopomStore: Send + Sync {
    /// Registers `model` as the single online manager.
    async fn acquire(&self, model: &TopomModel) -> Result<()>;

    /// Drops the manager registration.
    async fn release(&self) -> Result<()>;

    /// Returns the manager currently holding the store, if any.
    async fn load_topom(&self) -> Result<Option<TopomModel>>;

    async fn load_snapshot(&self) -> Result<TopologySnapshot>;

    /// Replaces the mapping for `next.id` only if the stored value still equals `expected`.
    async fn compare_and_swap_slot(&self, expected: &SlotMapping, next: SlotMapping)
    -> Result<()>;

    /// Batch form of [`TopomStore::compare_and_swap_slot`]; applies all records or none.
    async fn compare_and_swap_slots(
        &self,
        expected: &[SlotMapping],
        next: Vec<SlotMapping>,
    ) -> Result<()>;

    /// Unconditional write used by administrative tooling.
    async fn update_slot_mapping(&self, mapping: SlotMapping) -> Result<()>;

    /// Reserves `count` consecutive action indexes and returns the first one.
    ///
    /// Every reserved index is greater than every action index ever stored.
    async fn allocate_action_indexes(&self, count: u64) -> Result<u64>;

    /// Allocates a single action index.
    async fn next_action_index(&self) -> Result<u64> {
        self.allocate_action_indexes(1).await
    }

    async fn update_group(&self, group: Group) -> Result<()>;

    async fn remove_group(&self, gid: GroupId) -> Result<()>;

    async fn update_proxy(&self, proxy: Proxy) -> Result<()>;

    async fn remove_proxy(&self, token: &str) -> Result<()>;
}

/// Whole store content; shared by the in-memory and file backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct StoreState {
    #[serde(default)]
    pub topom: Option<TopomModel>,
    #[serde(default)]
    pub action_index: u64,
    pub snapshot: TopologySnapshot,
}

impl StoreState {
    pub fn new(max_slot_num: u32) -> Self {
        Self {
            topom: None,
            action_index: 0,
            snapshot: TopologySnapshot::with_slot_count(max_slot_num),
        }
    }

    pub fn acquire(&mut self, model: &TopomModel) -> Result<()> {
        if let Some(holder) = &self.topom {
            if holder.token != model.token {
                return Err(TopomError::Locked(format!(
                    "product '{}' is held by topom {} at {}",
                    holder.product_name, holder.token, holder.admin_addr
                )));
            }
        }
        self.topom = Some(model.clone());
        Ok(())
    }

    pub fn release(&mut self) {
        self.topom = None;
    }

    fn check_slot_id(&self, sid: SlotId) -> Result<()> {
        if sid >= self.snapshot.max_slot_num() {
            return Err(TopomError::NotFound(format!(
                "slot {} is out of range for max_slot_num {}",
                sid,
                self.snapshot.max_slot_num()
            )));
        }
        Ok(())
    }

    fn check_expected(&self, expected: &SlotMapping, next: &SlotMapping) -> Result<()> {
        if expected.id != next.id {
            return Err(TopomError::Validation(format!(
                "slot id mismatch: expected record for slot {}, new record for slot {}",
                expected.id, next.id
            )));
        }
        self.check_slot_id(next.id)?;
        let current = &self.snapshot.slots[next.id as usize];
        if current != expected {
            return Err(TopomError::Conflict(format!(
                "slot {} was modified concurrently",
                next.id
            )));
        }
        Ok(())
    }

    pub fn compare_and_swap_slot(&mut self, expected: &SlotMapping, next: SlotMapping) -> Result<()> {
        self.check_expected(expected, &next)?;
        self.snapshot.slots.set(next.id as usize, next);
        Ok(())
    }

    pub fn compare_and_swap_slots(
        &mut self,
        expected: &[SlotMapping],
        next: Vec<SlotMapping>,
    ) -> Result<()> {
        if expected.len() != next.len() {
            return Err(TopomError::Validation(format!(
                "batch size mismatch: {} expected records, {} new records",
                expected.len(),
                next.len()
            )));
        }
        for (expected, next) in expected.iter().zip(next.iter()) {
            self.check_expected(expected, next)?;
        }
        for mapping in next {
            self.snapshot.slots.set(mapping.id as usize, mapping);
        }
        Ok(())
    }

    pub fn update_slot_mapping(&mut self, mapping: SlotMapping) -> Result<()> {
        self.check_slot_id(mapping.id)?;
        self.snapshot.slots.set(mapping.id as usize, mapping);
        Ok(())
    }

    /// Returns the first of `count` fresh indexes; `count == 0` reserves nothing.
    pub fn allocate_action_indexes(&mut self, count: u64) -> u64 {
        let stored_max = self
            .snapshot
            .slots
            .iter()
            .map(|mapping| mapping.action.index)
            .max()
            .unwrap_or(0);
        let first = self.action_index.max(stored_max) + 1;
        if count > 0 {
            self.action_index = first + count - 1;
        }
        first
    }

    pub fn update_group(&mut self, group: Group) -> Result<()> {
        if group.id == 0 {
            return Err(TopomError::Validation("group id must be >= 1".to_string()));
        }
        self.snapshot.groups.insert(group.id, group);
        Ok(())
    }

    pub fn remove_group(&mut self, gid: GroupId) -> Result<()> {
        self.snapshot
            .groups
            .remove(&gid)
            .map(|_| ())
            .ok_or_else(|| TopomError::NotFound(format!("group {} does not exist", gid)))
    }

    pub fn update_proxy(&mut self, proxy: Proxy) -> Result<()> {
        if proxy.token.trim().is_empty() {
            return Err(TopomError::Validation(
                "proxy token must not be empty".to_string(),
            ));
        }
        self.snapshot.proxies.insert(proxy.token.clone(), proxy);
        Ok(())
    }

    pub fn remove_proxy(&mut self, token: &str) -> Result<()> {
        self.snapshot
            .proxies
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| TopomError::NotFound(format!("proxy {} does not exist", token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionState;

    #[test]
    fn cas_rejects_stale_expected_value() {
        let mut state = StoreState::new(16);
        let original = state.snapshot.slots[3];
        let pending = original.with_action(ActionState::Pending, 2);
        state.compare_and_swap_slot(&original, pending).unwrap();

        let err = state
            .compare_and_swap_slot(&original, original.with_group(9))
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(state.snapshot.slots[3], pending);
    }

    #[test]
    fn batch_cas_is_all_or_nothing() {
        let mut state = StoreState::new(16);
        let a = state.snapshot.slots[1];
        let b = state.snapshot.slots[2];
        state.update_slot_mapping(b.with_group(5)).unwrap();

        let err = state
            .compare_and_swap_slots(&[a, b], vec![a.with_group(7), b.with_group(7)])
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(state.snapshot.slots[1].group_id, 0);
        assert_eq!(state.snapshot.slots[2].group_id, 5);
    }

    #[test]
    fn action_index_exceeds_every_stored_index() {
        let mut state = StoreState::new(8);
        assert_eq!(state.allocate_action_indexes(1), 1);

        let mut mapping = SlotMapping::new(4).with_action(ActionState::Pending, 1);
        mapping.action.index = 40;
        state.update_slot_mapping(mapping).unwrap();
        assert_eq!(state.allocate_action_indexes(1), 41);
        assert_eq!(state.allocate_action_indexes(1), 42);
    }

    #[test]
    fn batch_allocation_reserves_a_contiguous_block() {
        let mut state = StoreState::new(8);
        assert_eq!(state.allocate_action_indexes(5), 1);
        assert_eq!(state.allocate_action_indexes(0), 6);
        assert_eq!(state.allocate_action_indexes(1), 6);
        assert_eq!(state.allocate_action_indexes(3), 7);
        assert_eq!(state.allocate_action_indexes(1), 10);
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut state = StoreState::new(8);
        let err = state.update_slot_mapping(SlotMapping::new(8)).unwrap_err();
        assert!(matches!(err, TopomError::NotFound(_)));
    }

    #[test]
    fn second_manager_cannot_acquire() {
        let mut state = StoreState::new(8);
        let first = TopomModel::new("codis", "127.0.0.1:1");
        let second = TopomModel::new("codis", "127.0.0.1:2");
        state.acquire(&first).unwrap();
        state.acquire(&first).unwrap();
        assert!(matches!(
            state.acquire(&second).unwrap_err(),
            TopomError::Locked(_)
        ));
        state.release();
        state.acquire(&second).unwrap();
    }
}
