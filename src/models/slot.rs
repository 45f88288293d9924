use super::GroupId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slot number in `[0, max_slot_num)`.
pub type SlotId = u32;

/// Default hash slot count.
pub const MAX_SLOT_NUM: u32 = 1024;

/// Lifecycle state of a slot migration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    #[default]
    Nothing,
    Pending,
    Preparing,
    Prepared,
    Migrating,
    Finished,
}

impl ActionState {
    pub const ALL: [ActionState; 6] = [
        ActionState::Nothing,
        ActionState::Pending,
        ActionState::Preparing,
        ActionState::Prepared,
        ActionState::Migrating,
        ActionState::Finished,
    ];

    /// Returns the hop that leaves this state, if any.
    pub fn hop(self) -> Option<ActionHop> {
        ACTION_HOPS.iter().copied().find(|hop| hop.from == self)
    }

    /// States advanced by the prepare walk.
    pub fn is_preparable(self) -> bool {
        matches!(
            self,
            ActionState::Pending | ActionState::Preparing | ActionState::Prepared
        )
    }

    /// States advanced by the complete walk.
    pub fn is_completable(self) -> bool {
        matches!(self, ActionState::Migrating | ActionState::Finished)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionState::Nothing => "nothing",
            ActionState::Pending => "pending",
            ActionState::Preparing => "preparing",
            ActionState::Prepared => "prepared",
            ActionState::Migrating => "migrating",
            ActionState::Finished => "finished",
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the slot action state machine.
///
/// A hop is gated (`requires_sync`) exactly when it asserts a new fact to the
/// proxies: the table derived from `from` must be acknowledged by the whole
/// fleet before `next` may be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionHop {
    pub from: ActionState,
    pub next: ActionState,
    pub requires_sync: bool,
}

const ACTION_HOPS: [ActionHop; 5] = [
    ActionHop {
        from: ActionState::Pending,
        next: ActionState::Preparing,
        requires_sync: false,
    },
    ActionHop {
        from: ActionState::Preparing,
        next: ActionState::Prepared,
        requires_sync: true,
    },
    ActionHop {
        from: ActionState::Prepared,
        next: ActionState::Migrating,
        requires_sync: true,
    },
    ActionHop {
        from: ActionState::Migrating,
        next: ActionState::Finished,
        requires_sync: false,
    },
    // Leaving Finished commits ownership to the target group.
    ActionHop {
        from: ActionState::Finished,
        next: ActionState::Nothing,
        requires_sync: true,
    },
];

/// In-flight migration intent attached to a slot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SlotAction {
    pub state: ActionState,
    pub index: u64,
    pub target_id: GroupId,
}

impl SlotAction {
    pub fn pending(index: u64, target_id: GroupId) -> Self {
        Self {
            state: ActionState::Pending,
            index,
            target_id,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == ActionState::Nothing
    }
}

/// Persisted ownership record of one slot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SlotMapping {
    pub id: SlotId,
    pub group_id: GroupId,
    #[serde(default)]
    pub action: SlotAction,
}

impl SlotMapping {
    pub fn new(id: SlotId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn with_action(mut self, state: ActionState, target_id: GroupId) -> Self {
        self.action.state = state;
        self.action.target_id = target_id;
        self
    }

    /// Returns the mapping as it looks after taking `hop`.
    ///
    /// The committing hop moves ownership to the target and clears the action.
    pub fn advanced(&self, hop: ActionHop) -> Self {
        let mut next = *self;
        if hop.next == ActionState::Nothing {
            next.group_id = self.action.target_id;
            next.action = SlotAction::default();
        } else {
            next.action.state = hop.next;
        }
        next
    }
}

/// Effective routing entry a proxy receives for one slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SlotInfo {
    pub id: SlotId,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub backend_addr: String,
    #[serde(default)]
    pub migrate_from: String,
}

impl SlotInfo {
    pub fn unassigned(id: SlotId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}
