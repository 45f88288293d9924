/// Read-only view used by a single manager operation.
///
/// Built from a fresh store snapshot at the start of every call and dropped at
/// its end; never cached between calls.
#[derive(Debug, Clone)]
pub struct TopomContext {
    snapshot: TopologySnapshot,
}

impl TopomContext {
    pub fn new(snapshot: TopologySnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &TopologySnapshot {
        &self.snapshot
    }

    pub fn max_slot_num(&self) -> u32 {
        self.snapshot.max_slot_num()
    }

    pub fn slot_mapping(&self, sid: SlotId) -> Result<SlotMapping> {
        self.snapshot.slot(sid).copied().ok_or_else(|| {
            TopomError::NotFound(format!(
                "slot {} is out of range for max_slot_num {}",
                sid,
                self.max_slot_num()
            ))
        })
    }

    pub fn group(&self, gid: GroupId) -> Result<&Group> {
        self.snapshot
            .group(gid)
            .ok_or_else(|| TopomError::NotFound(format!("group {} does not exist", gid)))
    }

    /// Returns the group only if it exists and has at least one server.
    pub fn provisioned_group(&self, gid: GroupId) -> Result<&Group> {
        let group = self.group(gid)?;
        if !group.is_provisioned() {
            return Err(TopomError::Validation(format!(
                "group {} has no servers",
                gid
            )));
        }
        Ok(group)
    }

    pub fn proxy(&self, token: &str) -> Result<&Proxy> {
        self.snapshot
            .proxies
            .get(token)
            .ok_or_else(|| TopomError::NotFound(format!("proxy {} does not exist", token)))
    }

    pub fn proxies(&self) -> impl Iterator<Item = &Proxy> {
        self.snapshot.proxies.values()
    }

    /// Active address of `gid`, or an empty string when unassigned or unprovisioned.
    pub fn group_addr(&self, gid: GroupId) -> String {
        group_addr(&self.snapshot.groups, gid)
    }

    pub fn to_slot_info(&self, mapping: &SlotMapping) -> SlotInfo {
        derive_slot_info(mapping, &self.snapshot.groups)
    }

    pub fn to_slot_infos(&self, mappings: &[SlotMapping]) -> Vec<SlotInfo> {
        mappings.iter().map(|m| self.to_slot_info(m)).collect()
    }

    /// The full routing table, one entry per slot in id order.
    pub fn to_slot_table(&self) -> Vec<SlotInfo> {
        derive_slot_table(&self.snapshot)
    }

    /// Oldest slot whose action can still be advanced by the prepare walk.
    pub fn next_preparable(&self) -> Option<SlotMapping> {
        self.snapshot
            .slots
            .iter()
            .filter(|m| m.action.state.is_preparable())
            .min_by_key(|m| (m.action.index, m.id))
            .copied()
    }

    /// Slots owned by `gid` or migrating towards it.
    pub fn slots_referencing(&self, gid: GroupId) -> Vec<SlotMapping> {
        self.snapshot
            .slots
            .iter()
            .filter(|m| m.group_id == gid || (!m.action.is_idle() && m.action.target_id == gid))
            .copied()
            .collect()
    }

    pub fn is_group_in_use(&self, gid: GroupId) -> bool {
        !self.slots_referencing(gid).is_empty()
    }
}

fn group_addr(groups: &im::OrdMap<GroupId, Group>, gid: GroupId) -> String {
    if gid == 0 {
        return String::new();
    }
    groups
        .get(&gid)
        .and_then(|group| group.active_addr())
        .unwrap_or_default()
        .to_string()
}

/// Computes what proxies must see for one slot.
///
/// | state | backend | locked | migrate-from |
/// |---|---|---|---|
/// | nothing, pending | owner | no | - |
/// | preparing | owner | yes | - |
/// | prepared, migrating | target | no | owner |
/// | finished | target | no | - |
pub fn derive_slot_info(mapping: &SlotMapping, groups: &im::OrdMap<GroupId, Group>) -> SlotInfo {
    let mut slot = SlotInfo::unassigned(mapping.id);
    match mapping.action.state {
        ActionState::Nothing | ActionState::Pending => {
            slot.backend_addr = group_addr(groups, mapping.group_id);
        }
        ActionState::Preparing => {
            slot.locked = true;
            slot.backend_addr = group_addr(groups, mapping.group_id);
        }
        ActionState::Prepared | ActionState::Migrating => {
            slot.backend_addr = group_addr(groups, mapping.action.target_id);
            slot.migrate_from = group_addr(groups, mapping.group_id);
        }
        ActionState::Finished => {
            slot.backend_addr = group_addr(groups, mapping.action.target_id);
        }
    }
    slot
}

pub fn derive_slot_table(snapshot: &TopologySnapshot) -> Vec<SlotInfo> {
    snapshot
        .slots
        .iter()
        .map(|m| derive_slot_info(m, &snapshot.groups))
        .collect()
}
