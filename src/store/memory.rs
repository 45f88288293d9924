use super::{StoreState, TopologySnapshot, TopomStore};
use crate::core::Result;
use crate::models::{Group, GroupId, Proxy, SlotMapping, TopomModel};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Process-local store. Every mutation runs against a copy of the state and is
/// swapped in only on success.
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new(max_slot_num: u32) -> Self {
        Self {
            state: RwLock::new(StoreState::new(max_slot_num)),
        }
    }

    async fn mutate<T>(&self, apply: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write().await;
        let mut working = guard.clone();
        let out = apply(&mut working)?;
        *guard = working;
        Ok(out)
    }
}

#[async_trait]
impl TopomStore for InMemoryStore {
    async fn acquire(&self, model: &TopomModel) -> Result<()> {
        self.mutate(|state| state.acquire(model)).await
    }

    async fn release(&self) -> Result<()> {
        self.mutate(|state| {
            state.release();
            Ok(())
        })
        .await
    }

    async fn load_topom(&self) -> Result<Option<TopomModel>> {
        Ok(self.state.read().await.topom.clone())
    }

    async fn load_snapshot(&self) -> Result<TopologySnapshot> {
        Ok(self.state.read().await.snapshot.clone())
    }

    async fn compare_and_swap_slot(
        &self,
        expected: &SlotMapping,
        next: SlotMapping,
    ) -> Result<()> {
        self.mutate(|state| state.compare_and_swap_slot(expected, next))
            .await
    }

    async fn compare_and_swap_slots(
        &self,
        expected: &[SlotMapping],
        next: Vec<SlotMapping>,
    ) -> Result<()> {
        self.mutate(|state| state.compare_and_swap_slots(expected, next))
            .await
    }

    async fn update_slot_mapping(&self, mapping: SlotMapping) -> Result<()> {
        self.mutate(|state| state.update_slot_mapping(mapping)).await
    }

    async fn allocate_action_indexes(&self, count: u64) -> Result<u64> {
        self.mutate(|state| Ok(state.allocate_action_indexes(count)))
            .await
    }

    async fn update_group(&self, group: Group) -> Result<()> {
        self.mutate(|state| state.update_group(group)).await
    }

    async fn remove_group(&self, gid: GroupId) -> Result<()> {
        self.mutate(|state| state.remove_group(gid)).await
    }

    async fn update_proxy(&self, proxy: Proxy) -> Result<()> {
        self.mutate(|state| state.update_proxy(proxy)).await
    }

    async fn remove_proxy(&self, token: &str) -> Result<()> {
        self.mutate(|state| state.remove_proxy(token)).await
    }
}
