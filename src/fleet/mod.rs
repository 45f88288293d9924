//! Proxy fleet access and the all-acknowledge slot table broadcast.

pub mod http;
pub mod in_memory;

use crate::core::{Result, TopomError};
use crate::models::{Proxy, SlotInfo};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Level, event, info_span};

pub use http::{HttpProxyClient, HttpProxyConnector};
pub use in_memory::{InMemoryProxyClient, InMemoryProxyFleet};

/// Admin API of one proxy process.
#[async_trait]
pub trait ProxyClient: Send + Sync {
    /// Returns the proxy's self-reported registration record.
    async fn model(&self) -> Result<Proxy>;

    /// Overwrites the given entries of the proxy's slot table. Idempotent.
    async fn fill_slots(&self, slots: &[SlotInfo]) -> Result<()>;

    /// Returns the proxy's full slot table.
    async fn slots(&self) -> Result<Vec<SlotInfo>>;

    /// Asks the proxy to stop serving.
    async fn shutdown(&self) -> Result<()>;
}

/// Resolves a proxy admin address to a client.
pub trait ProxyConnector: Send + Sync {
    fn connect(&self, admin_addr: &str) -> Arc<dyn ProxyClient>;
}

/// Outcome of one synchronization attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSyncReport {
    pub acknowledged: Vec<String>,
    pub failed: Vec<String>,
}

impl FleetSyncReport {
    pub fn all_acknowledged(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Pushes slot entries to every registered proxy and succeeds only if all of them acknowledge.
///
/// Proxies are contacted concurrently. The attempt as a whole is bounded by `timeout`;
/// a proxy that has not answered by then counts as failed. No retries happen here.
#[derive(Clone)]
pub struct FleetSynchronizer {
    connector: Arc<dyn ProxyConnector>,
    timeout: Duration,
}

impl FleetSynchronizer {
    pub fn new(connector: Arc<dyn ProxyConnector>, timeout: Duration) -> Self {
        Self { connector, timeout }
    }

    pub fn connector(&self) -> &Arc<dyn ProxyConnector> {
        &self.connector
    }

    pub fn client(&self, proxy: &Proxy) -> Arc<dyn ProxyClient> {
        self.connector.connect(proxy.admin_addr.as_str())
    }

    /// Returns `TopomError::Sync` unless every proxy in `proxies` acknowledged `slots`.
    pub async fn sync<'a, I>(&self, proxies: I, slots: &[SlotInfo]) -> Result<FleetSyncReport>
    where
        I: IntoIterator<Item = &'a Proxy>,
    {
        let report = self.broadcast(proxies, slots).await;
        if report.all_acknowledged() {
            Ok(report)
        } else {
            Err(TopomError::Sync {
                acknowledged: report.acknowledged.len(),
                failed: report.failed,
            })
        }
    }

    /// Same fan-out as [`FleetSynchronizer::sync`], returning the raw report.
    pub async fn broadcast<'a, I>(&self, proxies: I, slots: &[SlotInfo]) -> FleetSyncReport
    where
        I: IntoIterator<Item = &'a Proxy>,
    {
        let proxies = proxies.into_iter().collect::<Vec<_>>();
        let span = info_span!(
            "fleet.sync",
            proxies = proxies.len(),
            slots = slots.len()
        );

        async move {
            let attempts = proxies.iter().map(|proxy| {
                let client = self.client(proxy);
                async move {
                    let outcome = match tokio::time::timeout(self.timeout, client.fill_slots(slots))
                        .await
                    {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(err)) => Err(err.to_string()),
                        Err(_) => Err(format!("no response within {:?}", self.timeout)),
                    };
                    (*proxy, outcome)
                }
            });

            let mut report = FleetSyncReport::default();
            for (proxy, outcome) in join_all(attempts).await {
                match outcome {
                    Ok(()) => report.acknowledged.push(proxy.token.clone()),
                    Err(err) => {
                        event!(
                            Level::WARN,
                            proxy = %proxy.token,
                            admin_addr = %proxy.admin_addr,
                            error = %err,
                            "proxy did not acknowledge slot table"
                        );
                        report
                            .failed
                            .push(format!("{}@{} ({})", proxy.token, proxy.admin_addr, err));
                    }
                }
            }
            event!(
                Level::DEBUG,
                acknowledged = report.acknowledged.len(),
                failed = report.failed.len(),
                "fleet sync finished"
            );
            report
        }
        .instrument(span)
        .await
    }
}
