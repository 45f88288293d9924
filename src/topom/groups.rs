impl Topom {
    pub async fn create_group(&self, gid: GroupId) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        if gid == 0 || gid > MAX_GROUP_ID {
            return Err(TopomError::Validation(format!(
                "group id {} is out of range [1, {}]",
                gid, MAX_GROUP_ID
            )));
        }
        let ctx = self.context().await?;
        if ctx.snapshot().group(gid).is_some() {
            return Err(TopomError::Validation(format!(
                "group {} already exists",
                gid
            )));
        }
        self.store.update_group(Group::new(gid)).await?;
        event!(Level::INFO, group = gid, "group created");
        Ok(())
    }

    /// Removes an empty group that no slot owns or migrates towards.
    pub async fn remove_group(&self, gid: GroupId) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        let ctx = self.context().await?;
        let group = ctx.group(gid)?;
        if group.is_provisioned() {
            return Err(TopomError::Validation(format!(
                "group {} still has {} servers",
                gid,
                group.servers.len()
            )));
        }
        if ctx.is_group_in_use(gid) {
            return Err(TopomError::Validation(format!(
                "group {} is still referenced by slots",
                gid
            )));
        }
        self.store.remove_group(gid).await?;
        event!(Level::INFO, group = gid, "group removed");
        Ok(())
    }

    /// Appends a server to the group.
    ///
    /// The address must not belong to any group. When this is the group's first
    /// server, every slot owned by or migrating to the group is resynced.
    pub async fn group_add_server(&self, gid: GroupId, addr: &str) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(TopomError::Validation(
                "server addr must not be empty".to_string(),
            ));
        }

        let ctx = self.context().await?;
        let mut group = ctx.group(gid)?.clone();
        if let Some(owner) = ctx
            .snapshot()
            .groups
            .values()
            .find(|g| g.contains_server(addr))
        {
            return Err(TopomError::Validation(format!(
                "server {} already belongs to group {}",
                addr, owner.id
            )));
        }

        let activates = !group.is_provisioned();
        group.servers.push(GroupServer::new(addr));
        self.store.update_group(group).await?;
        event!(Level::INFO, group = gid, server = %addr, "group server added");

        if activates {
            let ctx = self.context().await?;
            self.resync_slots(&ctx, &ctx.slots_referencing(gid)).await?;
        }
        Ok(())
    }

    /// Removes a server from the group.
    ///
    /// The active server can only be removed once it is the last one, and the
    /// last server only while no slot references the group.
    pub async fn group_del_server(&self, gid: GroupId, addr: &str) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        let ctx = self.context().await?;
        let mut group = ctx.group(gid)?.clone();
        let position = group
            .servers
            .iter()
            .position(|server| server.addr == addr)
            .ok_or_else(|| {
                TopomError::NotFound(format!("server {} is not in group {}", addr, gid))
            })?;

        if position == 0 && group.servers.len() > 1 {
            return Err(TopomError::Validation(format!(
                "server {} is the active server of group {}",
                addr, gid
            )));
        }
        if group.servers.len() == 1 && ctx.is_group_in_use(gid) {
            return Err(TopomError::Validation(format!(
                "group {} is still referenced by slots",
                gid
            )));
        }

        group.servers.remove(position);
        self.store.update_group(group).await?;
        event!(Level::INFO, group = gid, server = %addr, "group server removed");
        Ok(())
    }
}
