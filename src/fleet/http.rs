use super::{ProxyClient, ProxyConnector};
use crate::core::{Result, TopomError};
use crate::models::{Proxy, SlotInfo};
use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

const MODEL_PATH: &str = "/api/proxy/model";
const SLOTS_PATH: &str = "/api/proxy/slots";
const FILL_SLOTS_PATH: &str = "/api/proxy/fillslots";
const SHUTDOWN_PATH: &str = "/api/proxy/shutdown";

/// JSON-over-HTTP client for a proxy admin API.
#[derive(Clone)]
pub struct HttpProxyClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpProxyClient {
    pub fn new(http: reqwest::Client, admin_addr: &str) -> Self {
        let base_url = if admin_addr.starts_with("http://") || admin_addr.starts_with("https://")
        {
            admin_addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", admin_addr.trim_end_matches('/'))
        };
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request_error(&self, path: &str, err: reqwest::Error) -> TopomError {
        warn!("Proxy request {}{} failed: {}", self.base_url, path, err);
        TopomError::Io(format!("proxy {}{}: {}", self.base_url, path, err))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {}{}", self.base_url, path);
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| self.request_error(path, err))?;
        response
            .json::<T>()
            .await
            .map_err(|err| self.request_error(path, err))
    }
}

#[async_trait]
impl ProxyClient for HttpProxyClient {
    async fn model(&self) -> Result<Proxy> {
        self.get_json(MODEL_PATH).await
    }

    async fn fill_slots(&self, slots: &[SlotInfo]) -> Result<()> {
        debug!("PUT {}{} ({} slots)", self.base_url, FILL_SLOTS_PATH, slots.len());
        self.http
            .put(self.url(FILL_SLOTS_PATH))
            .json(slots)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| self.request_error(FILL_SLOTS_PATH, err))?;
        Ok(())
    }

    async fn slots(&self) -> Result<Vec<SlotInfo>> {
        self.get_json(SLOTS_PATH).await
    }

    async fn shutdown(&self) -> Result<()> {
        debug!("PUT {}{}", self.base_url, SHUTDOWN_PATH);
        self.http
            .put(self.url(SHUTDOWN_PATH))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| self.request_error(SHUTDOWN_PATH, err))?;
        Ok(())
    }
}

/// Builds [`HttpProxyClient`]s sharing one connection pool.
#[derive(Clone)]
pub struct HttpProxyConnector {
    http: reqwest::Client,
}

impl HttpProxyConnector {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| TopomError::Io(format!("build http client: {}", err)))?;
        Ok(Self { http })
    }

    pub fn client(&self, admin_addr: &str) -> HttpProxyClient {
        HttpProxyClient::new(self.http.clone(), admin_addr)
    }
}

impl ProxyConnector for HttpProxyConnector {
    fn connect(&self, admin_addr: &str) -> Arc<dyn ProxyClient> {
        Arc::new(self.client(admin_addr))
    }
}
