impl Topom {
    /// Queues a migration of `sid` to group `gid`.
    ///
    /// Rejected when the target is unknown or has no servers, when the slot
    /// already has an action, or when the slot is already owned by `gid`.
    pub async fn create_action(&self, sid: SlotId, gid: GroupId) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        let span = info_span!("topom.slot.create_action", slot = sid, target = gid);
        self.create_action_locked(sid, gid).instrument(span).await
    }

    async fn create_action_locked(&self, sid: SlotId, gid: GroupId) -> Result<()> {
        let ctx = self.context().await?;
        let mapping = ctx.slot_mapping(sid)?;
        ctx.provisioned_group(gid)?;
        if !mapping.action.is_idle() {
            return Err(TopomError::Validation(format!(
                "slot {} already has action {}",
                sid, mapping.action.state
            )));
        }
        if mapping.group_id == gid {
            return Err(TopomError::Validation(format!(
                "slot {} is already owned by group {}",
                sid, gid
            )));
        }

        let index = self.store.next_action_index().await?;
        let mut next = mapping;
        next.action = SlotAction::pending(index, gid);
        self.store.compare_and_swap_slot(&mapping, next).await?;
        event!(Level::INFO, index, "slot action created");
        Ok(())
    }

    /// Queues migrations to `gid` for every idle slot in `[begin, end]` not already owned by it.
    ///
    /// Returns the number of actions created. The batch is persisted atomically.
    pub async fn create_action_range(
        &self,
        begin: SlotId,
        end: SlotId,
        gid: GroupId,
    ) -> Result<usize> {
        let _guard = self.begin_mutation().await?;
        let span = info_span!("topom.slot.create_action_range", begin, end, target = gid);
        self.create_action_range_locked(begin, end, gid)
            .instrument(span)
            .await
    }

    async fn create_action_range_locked(
        &self,
        begin: SlotId,
        end: SlotId,
        gid: GroupId,
    ) -> Result<usize> {
        let ctx = self.context().await?;
        if begin > end || end >= ctx.max_slot_num() {
            return Err(TopomError::Validation(format!(
                "invalid slot range [{}, {}] for max_slot_num {}",
                begin,
                end,
                ctx.max_slot_num()
            )));
        }
        ctx.provisioned_group(gid)?;

        let mut expected = Vec::new();
        for sid in begin..=end {
            let mapping = ctx.slot_mapping(sid)?;
            if mapping.action.is_idle() && mapping.group_id != gid {
                expected.push(mapping);
            }
        }

        let created = expected.len();
        if created > 0 {
            let first = self.store.allocate_action_indexes(created as u64).await?;
            let next = expected
                .iter()
                .zip(first..)
                .map(|(mapping, index)| SlotMapping {
                    action: SlotAction::pending(index, gid),
                    ..*mapping
                })
                .collect();
            self.store.compare_and_swap_slots(&expected, next).await?;
        }
        event!(Level::INFO, created, "slot action range created");
        Ok(created)
    }

    /// Drops a queued migration. Only allowed before any proxy has seen it.
    pub async fn remove_action(&self, sid: SlotId) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        let span = info_span!("topom.slot.remove_action", slot = sid);
        self.remove_action_locked(sid).instrument(span).await
    }

    async fn remove_action_locked(&self, sid: SlotId) -> Result<()> {
        let ctx = self.context().await?;
        let mapping = ctx.slot_mapping(sid)?;
        if mapping.action.state != ActionState::Pending {
            return Err(TopomError::Validation(format!(
                "slot {} action is {}, only pending actions can be removed",
                sid, mapping.action.state
            )));
        }
        let mut next = mapping;
        next.action = SlotAction::default();
        self.store.compare_and_swap_slot(&mapping, next).await?;
        event!(Level::INFO, "slot action removed");
        Ok(())
    }

    /// Advances the oldest pending, preparing, or prepared action until it is migrating.
    ///
    /// Returns the slot id once the slot reaches `Migrating`. On a fleet sync
    /// failure the hops already taken stay persisted and the error is returned;
    /// calling again retries the stalled hop.
    pub async fn prepare_action(&self) -> Result<SlotId> {
        let _guard = self.begin_mutation().await?;
        let ctx = self.context().await?;
        let mapping = ctx.next_preparable().ok_or(TopomError::NothingToDo)?;
        let span = info_span!(
            "topom.slot.prepare_action",
            slot = mapping.id,
            index = mapping.action.index,
            target = mapping.action.target_id
        );
        self.advance_slot(&ctx, mapping, ActionState::Migrating)
            .instrument(span)
            .await?;
        Ok(mapping.id)
    }

    /// Advances a migrating or finished action on `sid` until ownership is committed.
    pub async fn complete_action(&self, sid: SlotId) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        let ctx = self.context().await?;
        let mapping = ctx.slot_mapping(sid)?;
        if !mapping.action.state.is_completable() {
            return Err(TopomError::Validation(format!(
                "slot {} action is {}, expected migrating or finished",
                sid, mapping.action.state
            )));
        }
        let span = info_span!(
            "topom.slot.complete_action",
            slot = sid,
            target = mapping.action.target_id
        );
        self.advance_slot(&ctx, mapping, ActionState::Nothing)
            .instrument(span)
            .await?;
        Ok(())
    }

    /// Walks `mapping` along the action state machine until it reaches `stop_at`.
    ///
    /// Gated hops first get the table for the current state acknowledged by
    /// the whole fleet. Every hop is persisted before the next one starts.
    async fn advance_slot(
        &self,
        ctx: &TopomContext,
        mut mapping: SlotMapping,
        stop_at: ActionState,
    ) -> Result<SlotMapping> {
        while mapping.action.state != stop_at {
            let hop = mapping.action.state.hop().ok_or_else(|| {
                TopomError::Validation(format!(
                    "slot {} cannot advance from {}",
                    mapping.id, mapping.action.state
                ))
            })?;

            if hop.requires_sync {
                let slot = ctx.to_slot_info(&mapping);
                if let Err(err) = self.fleet.sync(ctx.proxies(), &[slot]).await {
                    event!(
                        Level::WARN,
                        state = %mapping.action.state,
                        error = %err,
                        "slot action stalled"
                    );
                    return Err(err);
                }
            }

            let next = mapping.advanced(hop);
            self.store.compare_and_swap_slot(&mapping, next).await?;
            event!(
                Level::INFO,
                from = %hop.from,
                to = %hop.next,
                group = next.group_id,
                "slot action advanced"
            );
            mapping = next;
        }
        Ok(mapping)
    }
}
