use crate::core::{RegistryError, Result};
use crate::storage::InMemoryStore;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SESSION_KIND: &str = "shard_session";

/// Where and how the work registry keeps its session records
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Tenant namespace of the records; empty for the default namespace
    pub namespace: String,

    /// Record kind of the session records
    pub kind: String,

    /// Inactivity period after which a claimed shard counts as abandoned
    pub session_expiry: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            kind: DEFAULT_SESSION_KIND.to_string(),
            session_expiry: Duration::from_secs(60),
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tenant namespace
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Set the record kind
    pub fn kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    /// Set the session inactivity period
    pub fn session_expiry(mut self, expiry: Duration) -> Self {
        self.session_expiry = expiry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.kind.trim().is_empty() {
            return Err(RegistryError::Config(
                "session record kind must not be empty".to_string(),
            ));
        }
        if self.session_expiry.is_zero() {
            return Err(RegistryError::Config(
                "session expiry must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Backend selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Snapshot file the in-memory store is loaded from and saved to
    pub snapshot_path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Parse from a store URL
    ///
    /// Format: `memory://` or `memory://<snapshot path>`
    ///
    /// # Examples
    ///
    /// ```
    /// use shardwork::config::StoreConfig;
    ///
    /// let config = StoreConfig::from_url("memory:///var/lib/shardwork/sessions.snapshot").unwrap();
    /// assert!(config.snapshot_path.is_some());
    /// assert!(StoreConfig::from_url("memory://").unwrap().snapshot_path.is_none());
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let Some(path) = url.strip_prefix("memory://") else {
            return Err(RegistryError::Config(format!(
                "unsupported store URL '{}': expected memory://[snapshot path]",
                url
            )));
        };

        let path = path.trim();
        if path.is_empty() {
            Ok(Self::in_memory())
        } else {
            Ok(Self::in_memory().snapshot_path(path))
        }
    }

    /// Open the configured store, restoring the snapshot if one exists.
    pub async fn open(&self) -> Result<InMemoryStore> {
        match &self.snapshot_path {
            Some(path) => Ok(InMemoryStore::open(path).await?),
            None => Ok(InMemoryStore::new()),
        }
    }
}
