//! In-memory host with optional JSON persistence
//!
//! Keeps upstream entity states, fans change events out to subscribers and
//! stores every published snapshot. When a persistence file is configured,
//! each publish writes the whole snapshot table through to disk so the
//! learned bounds survive a restart.

use super::{
    EntityStore, PublishedState, RestoredState, SourceState, StateChangeEvent, StateSource,
    StateSubscription, SubscriptionHandle,
};
use crate::error::{CalibrationError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

struct Subscriber {
    id: Uuid,
    sender: mpsc::UnboundedSender<StateChangeEvent>,
}

/// Subscribers per entity. Guarded by a std mutex because unsubscribe runs
/// from a synchronous handle.
#[derive(Default)]
struct SubscriberTable {
    inner: Mutex<HashMap<String, Vec<Subscriber>>>,
}

impl SubscriberTable {
    fn add(&self, entity_id: &str, subscriber: Subscriber) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .entry(entity_id.to_string())
            .or_default()
            .push(subscriber);
    }

    fn remove(&self, entity_id: &str, id: Uuid) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscribers) = inner.get_mut(entity_id) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                inner.remove(entity_id);
            }
        }
    }

    /// Deliver to every live subscriber, pruning closed receivers
    fn notify(&self, event: &StateChangeEvent) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscribers) = inner.get_mut(&event.entity_id) {
            subscribers.retain(|s| s.sender.send(event.clone()).is_ok());
            if subscribers.is_empty() {
                inner.remove(&event.entity_id);
            }
        }
    }

    fn count(&self, entity_id: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.get(entity_id).map_or(0, Vec::len)
    }
}

/// Host implementation backed by in-process maps
pub struct InMemoryHost {
    states: RwLock<HashMap<String, SourceState>>,
    subscribers: Arc<SubscriberTable>,
    published: RwLock<HashMap<String, PublishedState>>,
    persist_path: Option<PathBuf>,
}

impl InMemoryHost {
    /// Create a host that keeps everything in memory
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            subscribers: Arc::new(SubscriberTable::default()),
            published: RwLock::new(HashMap::new()),
            persist_path: None,
        }
    }

    /// Create a host that writes published snapshots through to `path`
    pub fn with_persistence<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            persist_path: Some(path.into()),
            ..Self::new()
        }
    }

    /// Persistence file, if configured
    pub fn persist_path(&self) -> Option<&Path> {
        self.persist_path.as_deref()
    }

    /// Load previously published snapshots from disk.
    ///
    /// A missing file is not an error; an unreadable or corrupt file is
    /// logged and the host starts empty.
    pub async fn load_from_disk(&self) -> Result<usize> {
        let Some(path) = &self.persist_path else {
            return Ok(0);
        };
        if !path.exists() {
            return Ok(0);
        }

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read state file {:?}: {}", path, e);
                return Ok(0);
            }
        };

        match serde_json::from_str::<HashMap<String, PublishedState>>(&contents) {
            Ok(snapshots) => {
                let count = snapshots.len();
                *self.published.write().await = snapshots;
                debug!("Loaded {} persisted snapshots from {:?}", count, path);
                Ok(count)
            }
            Err(e) => {
                warn!("Ignoring corrupt state file {:?}: {}", path, e);
                Ok(0)
            }
        }
    }

    /// Set the state of an upstream entity and notify its subscribers
    pub async fn set_state<S: Into<String>>(&self, entity_id: S, state: SourceState) {
        let entity_id = entity_id.into();
        let mut states = self.states.write().await;
        let old_state = states.insert(entity_id.clone(), state.clone());

        // Notify under the lock so subscribers see transitions in order
        self.subscribers.notify(&StateChangeEvent {
            entity_id,
            old_state,
            new_state: Some(state),
            time_fired: Utc::now(),
        });
    }

    /// Remove an upstream entity; subscribers get an event without a new state
    pub async fn remove_state(&self, entity_id: &str) -> Option<SourceState> {
        let mut states = self.states.write().await;
        let old_state = states.remove(entity_id);
        if old_state.is_some() {
            self.subscribers.notify(&StateChangeEvent {
                entity_id: entity_id.to_string(),
                old_state: old_state.clone(),
                new_state: None,
                time_fired: Utc::now(),
            });
        }
        old_state
    }

    /// Last snapshot published for an entity
    pub async fn published(&self, entity_id: &str) -> Option<PublishedState> {
        self.published.read().await.get(entity_id).cloned()
    }

    /// All published snapshots, sorted by entity id
    pub async fn published_states(&self) -> Vec<PublishedState> {
        let mut states: Vec<_> = self.published.read().await.values().cloned().collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        states
    }

    /// Number of live subscriptions for an entity
    pub fn subscriber_count(&self, entity_id: &str) -> usize {
        self.subscribers.count(entity_id)
    }

    async fn write_through(&self, snapshots: &HashMap<String, PublishedState>) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    CalibrationError::persistence(format!(
                        "Failed to create state directory {:?}: {}",
                        parent, e
                    ))
                })?;
            }
        }

        // The target is only ever replaced whole, by rename
        let json = serde_json::to_string_pretty(snapshots)?;
        let staging = staging_path(path);
        tokio::fs::write(&staging, json).await.map_err(|e| {
            CalibrationError::persistence(format!(
                "Failed to write state file {:?}: {}",
                staging, e
            ))
        })?;
        tokio::fs::rename(&staging, path).await.map_err(|e| {
            CalibrationError::persistence(format!(
                "Failed to replace state file {:?}: {}",
                path, e
            ))
        })
    }
}

/// `state.json` -> `state.json.tmp`
fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateSource for InMemoryHost {
    async fn current_state(&self, entity_id: &str) -> Option<SourceState> {
        self.states.read().await.get(entity_id).cloned()
    }

    async fn subscribe(&self, entity_id: &str) -> Result<StateSubscription> {
        if entity_id.trim().is_empty() {
            return Err(CalibrationError::subscription(
                "Cannot subscribe to an empty entity id",
            ));
        }

        let (sender, events) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers.add(entity_id, Subscriber { id, sender });

        let table = Arc::clone(&self.subscribers);
        let entity_id = entity_id.to_string();
        let handle = SubscriptionHandle::new(move || table.remove(&entity_id, id));

        Ok(StateSubscription { events, handle })
    }
}

#[async_trait]
impl EntityStore for InMemoryHost {
    async fn publish(&self, state: &PublishedState) -> Result<()> {
        let mut published = self.published.write().await;
        published.insert(state.entity_id.clone(), state.clone());
        // Keep the lock so concurrent publishes reach the file in order
        self.write_through(&published).await
    }

    async fn last_state(&self, entity_id: &str) -> Result<Option<RestoredState>> {
        Ok(self
            .published
            .read()
            .await
            .get(entity_id)
            .map(RestoredState::from))
    }
}
