//! Scale-out runner: stateless turns over an optimistic state store
//!
//! Any number of workers may process turns for the same conversation. Each
//! attempt loads the persisted stack with its etag, runs the host and saves
//! under that etag; a conflicting save means another worker won the race, so
//! the attempt is thrown away and retried from a fresh load. Outbound
//! activities are only returned from an attempt whose save succeeded.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::errors::{DialogError, DialogResult};
use crate::host::{TurnHost, TurnOutput};
use crate::value_objects::Activity;

/// A stored value with its version tag
#[derive(Debug, Clone, PartialEq)]
pub struct StoreItem {
    pub value: Value,
    pub etag: String,
}

/// Result of a conditional save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { etag: String },
    /// The stored etag no longer matches the expected one
    Conflict,
}

/// Durable per-conversation state with optimistic concurrency
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> DialogResult<Option<StoreItem>>;

    /// Save `value` if the stored etag equals `expected_etag`; `None` means
    /// the key must not exist yet.
    async fn save(
        &self,
        key: &str,
        value: Value,
        expected_etag: Option<&str>,
    ) -> DialogResult<SaveOutcome>;
}

#[derive(Debug, Default)]
struct MemoryItems {
    items: HashMap<String, (Value, u64)>,
    last_etag: u64,
}

/// In-process store; etags increase monotonically across all keys
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryItems>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.items.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, key: &str) -> DialogResult<Option<StoreItem>> {
        let inner = self.inner.read().await;
        Ok(inner.items.get(key).map(|(value, etag)| StoreItem {
            value: value.clone(),
            etag: etag.to_string(),
        }))
    }

    async fn save(
        &self,
        key: &str,
        value: Value,
        expected_etag: Option<&str>,
    ) -> DialogResult<SaveOutcome> {
        let mut inner = self.inner.write().await;
        let current = inner.items.get(key).map(|(_, etag)| etag.to_string());
        if current.as_deref() != expected_etag {
            return Ok(SaveOutcome::Conflict);
        }
        inner.last_etag += 1;
        let etag = inner.last_etag;
        inner.items.insert(key.to_string(), (value, etag));
        Ok(SaveOutcome::Saved {
            etag: etag.to_string(),
        })
    }
}

/// Retry policy for the runner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScaleoutConfig {
    pub max_attempts: usize,
}

impl Default for ScaleoutConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Runs turns against a shared store
#[derive(Clone)]
pub struct ScaleoutRunner {
    host: Arc<TurnHost>,
    store: Arc<dyn StateStore>,
    config: ScaleoutConfig,
}

impl ScaleoutRunner {
    pub fn new(host: impl Into<Arc<TurnHost>>, store: Arc<dyn StateStore>) -> Self {
        Self {
            host: host.into(),
            store,
            config: ScaleoutConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ScaleoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(&self) -> &TurnHost {
        &self.host
    }

    /// Process one inbound activity keyed by its conversation id
    pub async fn process(&self, activity: &Activity) -> DialogResult<TurnOutput> {
        let key = activity.conversation_id.as_str();
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            let (old_state, etag) = match self.store.load(key).await? {
                Some(item) => (item.value, Some(item.etag)),
                None => (Value::Null, None),
            };

            let output = self.host.run(activity, &old_state)?;

            match self
                .store
                .save(key, output.new_state.clone(), etag.as_deref())
                .await?
            {
                SaveOutcome::Saved { etag } => {
                    debug!(conversation_id = key, attempt, %etag, "state saved");
                    return Ok(output);
                }
                SaveOutcome::Conflict => {
                    warn!(conversation_id = key, attempt, "state changed underneath this turn, retrying");
                }
            }
        }

        error!(conversation_id = key, attempts, "giving up after repeated save conflicts");
        Err(DialogError::ConcurrencyConflict {
            key: key.to_string(),
            attempts,
        })
    }
}

impl std::fmt::Debug for ScaleoutRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScaleoutRunner")
            .field("host", &self.host)
            .field("config", &self.config)
            .finish()
    }
}
