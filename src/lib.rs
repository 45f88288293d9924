// ============================================================================
// Topom: topology manager for a sharded key-value proxy cluster
// ============================================================================

//! Owns the slot → group mapping of a proxy cluster and migrates slot ownership
//! between groups while every proxy keeps a consistent routing table.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use topom::{InMemoryProxyFleet, InMemoryStore, Topom, TopomConfig};
//!
//! # tokio_test::block_on(async {
//! let config = TopomConfig::new("demo").max_slot_num(16);
//! let store = Arc::new(InMemoryStore::new(16));
//! let fleet = Arc::new(InMemoryProxyFleet::new(16));
//!
//! let topom = Topom::new(config, store, fleet).unwrap();
//! topom.start().await.unwrap();
//!
//! topom.create_group(1).await.unwrap();
//! topom.group_add_server(1, "10.0.0.1:6379").await.unwrap();
//! topom.create_action(3, 1).await.unwrap();
//!
//! assert_eq!(topom.prepare_action().await.unwrap(), 3);
//! topom.complete_action(3).await.unwrap();
//! assert_eq!(topom.slot_mapping(3).await.unwrap().group_id, 1);
//! # });
//! ```

pub mod core;
pub mod fleet;
pub mod models;
pub mod store;
pub mod topom;

pub use crate::core::{Result, TopomConfig, TopomError};
pub use fleet::{
    FleetSyncReport, FleetSynchronizer, HttpProxyClient, HttpProxyConnector, InMemoryProxyClient,
    InMemoryProxyFleet, ProxyClient, ProxyConnector,
};
pub use models::{
    ActionHop, ActionState, Group, GroupId, GroupServer, MAX_GROUP_ID, MAX_SLOT_NUM, Proxy,
    SlotAction, SlotId, SlotInfo, SlotMapping, TopomModel,
};
pub use store::{FileStore, InMemoryStore, TopologySnapshot, TopomStore};
pub use topom::{Topom, TopomContext, TopomOverview, derive_slot_info, derive_slot_table};
