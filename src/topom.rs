use crate::core::{Result, TopomConfig, TopomError};
use crate::fleet::{FleetSynchronizer, ProxyConnector};
use crate::models::{
    ActionState, Group, GroupId, GroupServer, MAX_GROUP_ID, Proxy, SlotAction, SlotId, SlotInfo,
    SlotMapping, TopomModel,
};
use crate::store::{TopologySnapshot, TopomStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{Instrument, Level, event, info_span};

// The manager is split by responsibility; all parts share this module scope.
include!("topom/context.rs");
include!("topom/lifecycle.rs");
include!("topom/slot_actions.rs");
include!("topom/slot_remap.rs");
include!("topom/groups.rs");
include!("topom/proxies.rs");
