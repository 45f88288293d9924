use super::{ProxyClient, ProxyConnector};
use crate::core::{Result, TopomError};
use crate::models::{Proxy, SlotInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// State of one simulated proxy process.
#[derive(Clone)]
struct InMemoryProxy {
    model: Proxy,
    online: bool,
    slots: Vec<SlotInfo>,
    response_delay: Option<Duration>,
}

/// An in-process proxy fleet for tests and local tooling.
///
/// Simulates the admin API of each proxy by directly locking its state. A proxy
/// that has been shut down refuses every request, like a dead process would.
#[derive(Clone)]
pub struct InMemoryProxyFleet {
    max_slot_num: u32,
    proxies: Arc<Mutex<HashMap<String, InMemoryProxy>>>,
    next_port: Arc<AtomicU32>,
}

impl InMemoryProxyFleet {
    pub fn new(max_slot_num: u32) -> Self {
        Self {
            max_slot_num,
            proxies: Arc::new(Mutex::new(HashMap::new())),
            next_port: Arc::new(AtomicU32::new(11080)),
        }
    }

    /// Starts a proxy with an empty slot table and returns its model.
    ///
    /// The model is not registered with any manager.
    pub async fn start_proxy(&self) -> Proxy {
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let mut model = Proxy::new(
            format!("127.0.0.1:{}", port),
            format!("127.0.0.1:{}", port + 8000),
        );
        model.product_name = "in-memory".to_string();

        let slots = (0..self.max_slot_num).map(SlotInfo::unassigned).collect();
        let mut proxies = self.proxies.lock().await;
        proxies.insert(
            model.admin_addr.clone(),
            InMemoryProxy {
                model: model.clone(),
                online: true,
                slots,
                response_delay: None,
            },
        );
        model
    }

    /// Marks the proxy as dead.
    pub async fn shutdown_proxy(&self, admin_addr: &str) -> Result<()> {
        let mut proxies = self.proxies.lock().await;
        let proxy = proxies.get_mut(admin_addr).ok_or_else(|| refused(admin_addr))?;
        proxy.online = false;
        Ok(())
    }

    /// Delays every subsequent response from the proxy.
    pub async fn set_response_delay(&self, admin_addr: &str, delay: Duration) -> Result<()> {
        let mut proxies = self.proxies.lock().await;
        let proxy = proxies.get_mut(admin_addr).ok_or_else(|| refused(admin_addr))?;
        proxy.response_delay = Some(delay);
        Ok(())
    }

    pub async fn is_online(&self, admin_addr: &str) -> bool {
        let proxies = self.proxies.lock().await;
        proxies.get(admin_addr).map(|p| p.online).unwrap_or(false)
    }

    pub fn client(&self, admin_addr: &str) -> InMemoryProxyClient {
        InMemoryProxyClient {
            fleet: self.clone(),
            admin_addr: admin_addr.to_string(),
        }
    }

    /// Waits out the configured delay, then checks the proxy is alive.
    async fn reach(&self, admin_addr: &str) -> Result<()> {
        let delay = {
            let proxies = self.proxies.lock().await;
            let proxy = proxies.get(admin_addr).ok_or_else(|| refused(admin_addr))?;
            proxy.response_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let proxies = self.proxies.lock().await;
        match proxies.get(admin_addr) {
            Some(proxy) if proxy.online => Ok(()),
            _ => Err(refused(admin_addr)),
        }
    }
}

impl ProxyConnector for InMemoryProxyFleet {
    fn connect(&self, admin_addr: &str) -> Arc<dyn ProxyClient> {
        Arc::new(self.client(admin_addr))
    }
}

fn refused(admin_addr: &str) -> TopomError {
    TopomError::Io(format!("proxy {} refused connection", admin_addr))
}

/// Client handle for one in-memory proxy.
#[derive(Clone)]
pub struct InMemoryProxyClient {
    fleet: InMemoryProxyFleet,
    admin_addr: String,
}

#[async_trait]
impl ProxyClient for InMemoryProxyClient {
    async fn model(&self) -> Result<Proxy> {
        self.fleet.reach(&self.admin_addr).await?;
        let proxies = self.fleet.proxies.lock().await;
        proxies
            .get(&self.admin_addr)
            .map(|proxy| proxy.model.clone())
            .ok_or_else(|| refused(&self.admin_addr))
    }

    async fn fill_slots(&self, slots: &[SlotInfo]) -> Result<()> {
        self.fleet.reach(&self.admin_addr).await?;
        let mut proxies = self.fleet.proxies.lock().await;
        let proxy = proxies
            .get_mut(&self.admin_addr)
            .ok_or_else(|| refused(&self.admin_addr))?;

        if let Some(bad) = slots.iter().find(|slot| slot.id as usize >= proxy.slots.len()) {
            return Err(TopomError::Validation(format!(
                "proxy {} rejected slot {}: out of range",
                self.admin_addr, bad.id
            )));
        }
        for slot in slots {
            proxy.slots[slot.id as usize] = slot.clone();
        }
        Ok(())
    }

    async fn slots(&self) -> Result<Vec<SlotInfo>> {
        self.fleet.reach(&self.admin_addr).await?;
        let proxies = self.fleet.proxies.lock().await;
        proxies
            .get(&self.admin_addr)
            .map(|proxy| proxy.slots.clone())
            .ok_or_else(|| refused(&self.admin_addr))
    }

    async fn shutdown(&self) -> Result<()> {
        self.fleet.reach(&self.admin_addr).await?;
        self.fleet.shutdown_proxy(&self.admin_addr).await
    }
}
