use super::{Result, TopomError};
use crate::models::MAX_SLOT_NUM;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Topology manager configuration
///
/// Loaded from a JSON document; every field falls back to its default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopomConfig {
    /// Product (cluster) name this manager owns in the store
    pub product_name: String,

    /// Address the manager advertises in its store lock
    pub admin_addr: String,

    /// Number of hash slots
    pub max_slot_num: u32,

    /// Upper bound for one fleet synchronization attempt
    #[serde(with = "duration_ms", rename = "sync_timeout_ms")]
    pub sync_timeout: Duration,

    /// Timeout of a single proxy admin request
    #[serde(with = "duration_ms", rename = "proxy_request_timeout_ms")]
    pub proxy_request_timeout: Duration,
}

impl Default for TopomConfig {
    fn default() -> Self {
        Self {
            product_name: "topom-demo".to_string(),
            admin_addr: "127.0.0.1:18080".to_string(),
            max_slot_num: MAX_SLOT_NUM,
            sync_timeout: Duration::from_secs(5),
            proxy_request_timeout: Duration::from_secs(3),
        }
    }
}

impl TopomConfig {
    /// Create a configuration for the given product
    pub fn new(product_name: &str) -> Self {
        Self {
            product_name: product_name.to_string(),
            ..Self::default()
        }
    }

    /// Set the advertised admin address
    pub fn admin_addr(mut self, addr: &str) -> Self {
        self.admin_addr = addr.to_string();
        self
    }

    /// Set the slot count
    pub fn max_slot_num(mut self, n: u32) -> Self {
        self.max_slot_num = n;
        self
    }

    /// Set the fleet synchronization timeout
    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Set the per-request proxy timeout
    pub fn proxy_request_timeout(mut self, timeout: Duration) -> Self {
        self.proxy_request_timeout = timeout;
        self
    }

    /// Read and validate a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let config = serde_json::from_slice::<Self>(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.product_name.trim().is_empty() {
            return Err(TopomError::Validation(
                "product_name must not be empty".to_string(),
            ));
        }
        if self.max_slot_num == 0 {
            return Err(TopomError::Validation(
                "max_slot_num must be >= 1".to_string(),
            ));
        }
        if self.sync_timeout.is_zero() || self.proxy_request_timeout.is_zero() {
            return Err(TopomError::Validation(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
