//! Records owned by the topology manager: groups, proxies, and slot mappings.

pub mod group;
pub mod proxy;
pub mod slot;

pub use group::{Group, GroupId, GroupServer, MAX_GROUP_ID};
pub use proxy::{Proxy, TopomModel};
pub use slot::{
    ActionHop, ActionState, MAX_SLOT_NUM, SlotAction, SlotId, SlotInfo, SlotMapping,
};
