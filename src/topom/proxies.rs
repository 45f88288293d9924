impl Topom {
    /// Registers the proxy serving its admin API at `admin_addr`.
    ///
    /// The proxy reports its own model; it is persisted and then receives the
    /// full routing table. A proxy that fails that first push stays registered,
    /// so later gated hops keep stalling until it is reinitialized or removed.
    pub async fn create_proxy(&self, admin_addr: &str) -> Result<Proxy> {
        let _guard = self.begin_mutation().await?;
        let client = self.fleet.connector().connect(admin_addr);
        let proxy = client.model().await?;

        let ctx = self.context().await?;
        if ctx.snapshot().proxies.contains_key(&proxy.token) {
            return Err(TopomError::Validation(format!(
                "proxy {} is already registered",
                proxy.token
            )));
        }

        self.store.update_proxy(proxy.clone()).await?;
        event!(
            Level::INFO,
            proxy = %proxy.token,
            admin_addr = %proxy.admin_addr,
            "proxy registered"
        );

        self.fleet.sync([&proxy], &ctx.to_slot_table()).await?;
        Ok(proxy)
    }

    /// Pushes the full routing table to one registered proxy.
    pub async fn reinit_proxy(&self, token: &str) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        let ctx = self.context().await?;
        let proxy = ctx.proxy(token)?;
        self.fleet.sync([proxy], &ctx.to_slot_table()).await?;
        event!(Level::INFO, proxy = %token, "proxy reinitialized");
        Ok(())
    }

    /// Shuts the proxy down and drops its registration.
    ///
    /// If the proxy cannot be reached the registration is kept unless `force` is set.
    pub async fn remove_proxy(&self, token: &str, force: bool) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        let ctx = self.context().await?;
        let proxy = ctx.proxy(token)?;
        let client = self.fleet.client(proxy);

        let shutdown = match tokio::time::timeout(self.config.sync_timeout, client.shutdown()).await
        {
            Ok(result) => result,
            Err(_) => Err(TopomError::Io(format!(
                "proxy {} did not answer shutdown within {:?}",
                token, self.config.sync_timeout
            ))),
        };
        if let Err(err) = shutdown {
            if !force {
                return Err(err);
            }
            event!(Level::WARN, proxy = %token, error = %err, "forcing proxy removal");
        }

        self.store.remove_proxy(token).await?;
        event!(Level::INFO, proxy = %token, "proxy removed");
        Ok(())
    }
}
