impl Topom {
    /// Overwrites slot ownership directly, bypassing the migration state machine.
    ///
    /// Every record must carry an idle action and name a group with at least one
    /// server, and the stored slot must not have an action in flight. Either the
    /// whole batch is persisted or nothing is. The new entries are then pushed to
    /// the fleet; a sync failure is reported but does not undo the remap.
    pub async fn remap_group(&self, mappings: Vec<SlotMapping>) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        let span = info_span!("topom.slot.remap_group", slots = mappings.len());
        self.remap_group_locked(mappings).instrument(span).await
    }

    async fn remap_group_locked(&self, mappings: Vec<SlotMapping>) -> Result<()> {
        let ctx = self.context().await?;
        let mut seen = HashSet::new();
        let mut expected = Vec::with_capacity(mappings.len());
        for mapping in &mappings {
            let current = ctx.slot_mapping(mapping.id)?;
            if !seen.insert(mapping.id) {
                return Err(TopomError::Validation(format!(
                    "slot {} appears more than once in remap batch",
                    mapping.id
                )));
            }
            if !mapping.action.is_idle() {
                return Err(TopomError::Validation(format!(
                    "slot {} remap carries action {}",
                    mapping.id, mapping.action.state
                )));
            }
            if !current.action.is_idle() {
                return Err(TopomError::Validation(format!(
                    "slot {} has action {} in flight",
                    mapping.id, current.action.state
                )));
            }
            ctx.provisioned_group(mapping.group_id)?;
            expected.push(current);
        }

        if mappings.is_empty() {
            return Ok(());
        }

        let mappings = mappings
            .into_iter()
            .map(|m| SlotMapping {
                action: SlotAction::default(),
                ..m
            })
            .collect::<Vec<_>>();
        self.store
            .compare_and_swap_slots(&expected, mappings.clone())
            .await?;
        event!(Level::INFO, "slots remapped");

        if let Err(err) = self.resync_slots(&ctx, &mappings).await {
            event!(Level::WARN, error = %err, "remapped slots not acknowledged by fleet");
            return Err(err);
        }
        Ok(())
    }
}
