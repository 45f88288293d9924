use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registration record of a proxy process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proxy {
    /// Unique per proxy process start.
    pub token: String,
    pub start_time: DateTime<Utc>,
    /// Address of the proxy's admin API.
    pub admin_addr: String,
    /// Client-facing address.
    #[serde(default)]
    pub proxy_addr: String,
    #[serde(default)]
    pub product_name: String,
}

impl Proxy {
    /// Creates a record with a fresh token.
    pub fn new(admin_addr: impl Into<String>, proxy_addr: impl Into<String>) -> Self {
        Self {
            token: uuid::Uuid::new_v4().simple().to_string(),
            start_time: Utc::now(),
            admin_addr: admin_addr.into(),
            proxy_addr: proxy_addr.into(),
            product_name: String::new(),
        }
    }
}

/// Store lock record held by the online topology manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopomModel {
    pub token: String,
    pub start_time: DateTime<Utc>,
    pub admin_addr: String,
    pub product_name: String,
    pub pid: u32,
}

impl TopomModel {
    pub fn new(product_name: impl Into<String>, admin_addr: impl Into<String>) -> Self {
        Self {
            token: uuid::Uuid::new_v4().simple().to_string(),
            start_time: Utc::now(),
            admin_addr: admin_addr.into(),
            product_name: product_name.into(),
            pid: std::process::id(),
        }
    }
}
