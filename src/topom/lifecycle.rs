/// Cluster-wide counters reported by [`Topom::overview`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopomOverview {
    pub product_name: String,
    pub online: bool,
    pub max_slot_num: u32,
    pub groups: usize,
    pub proxies: usize,
    pub assigned_slots: usize,
    /// Number of slots per non-idle action state.
    pub actions: BTreeMap<String, usize>,
}

/// The topology manager.
///
/// Sole writer of slot, group, and proxy records for one product. Every mutating
/// call holds the mutation lock for its full duration, reads a fresh
/// [`TopomContext`], and persists each state hop with compare-and-swap.
pub struct Topom {
    config: TopomConfig,
    model: TopomModel,
    store: Arc<dyn TopomStore>,
    fleet: FleetSynchronizer,
    mutation: Mutex<()>,
    online: AtomicBool,
}

impl Topom {
    pub fn new(
        config: TopomConfig,
        store: Arc<dyn TopomStore>,
        connector: Arc<dyn ProxyConnector>,
    ) -> Result<Self> {
        config.validate()?;
        let model = TopomModel::new(config.product_name.clone(), config.admin_addr.clone());
        let fleet = FleetSynchronizer::new(connector, config.sync_timeout);
        Ok(Self {
            config,
            model,
            store,
            fleet,
            mutation: Mutex::new(()),
            online: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &TopomConfig {
        &self.config
    }

    pub fn model(&self) -> &TopomModel {
        &self.model
    }

    pub fn store(&self) -> &Arc<dyn TopomStore> {
        &self.store
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Takes the store lock and starts accepting mutations.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.mutation.lock().await;
        if self.is_online() {
            return Ok(());
        }
        let snapshot = self.store.load_snapshot().await?;
        if snapshot.max_slot_num() != self.config.max_slot_num {
            return Err(TopomError::Validation(format!(
                "store holds {} slots, configured max_slot_num is {}",
                snapshot.max_slot_num(),
                self.config.max_slot_num
            )));
        }
        self.store.acquire(&self.model).await?;
        self.online.store(true, Ordering::Release);
        event!(
            Level::INFO,
            product = %self.config.product_name,
            token = %self.model.token,
            "topom online"
        );
        Ok(())
    }

    /// Stops accepting mutations and releases the store lock.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.mutation.lock().await;
        if !self.is_online() {
            return Ok(());
        }
        self.online.store(false, Ordering::Release);
        self.store.release().await?;
        event!(Level::INFO, product = %self.config.product_name, "topom closed");
        Ok(())
    }

    /// Builds a fresh read-only context from the store.
    pub async fn context(&self) -> Result<TopomContext> {
        Ok(TopomContext::new(self.store.load_snapshot().await?))
    }

    async fn begin_mutation(&self) -> Result<MutexGuard<'_, ()>> {
        let guard = self.mutation.lock().await;
        if !self.is_online() {
            return Err(TopomError::Closed);
        }
        Ok(guard)
    }

    /// The routing table as proxies should currently see it.
    pub async fn slots(&self) -> Result<Vec<SlotInfo>> {
        Ok(self.context().await?.to_slot_table())
    }

    pub async fn slot_mapping(&self, sid: SlotId) -> Result<SlotMapping> {
        self.context().await?.slot_mapping(sid)
    }

    pub async fn overview(&self) -> Result<TopomOverview> {
        let ctx = self.context().await?;
        let snapshot = ctx.snapshot();
        let mut actions = BTreeMap::new();
        for mapping in snapshot.slots.iter().filter(|m| !m.action.is_idle()) {
            *actions
                .entry(mapping.action.state.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(TopomOverview {
            product_name: self.config.product_name.clone(),
            online: self.is_online(),
            max_slot_num: snapshot.max_slot_num(),
            groups: snapshot.groups.len(),
            proxies: snapshot.proxies.len(),
            assigned_slots: snapshot.slots.iter().filter(|m| m.group_id != 0).count(),
            actions,
        })
    }

    /// Pushes the derived entries for `mappings` to every registered proxy.
    async fn resync_slots(&self, ctx: &TopomContext, mappings: &[SlotMapping]) -> Result<()> {
        if mappings.is_empty() {
            return Ok(());
        }
        let slots = ctx.to_slot_infos(mappings);
        self.fleet.sync(ctx.proxies(), &slots).await?;
        Ok(())
    }
}
