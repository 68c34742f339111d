//! Host ports
//!
//! The calibrated sensor lives inside a host application that owns the
//! entity registry, delivers state-change events and persists whatever the
//! sensor publishes. These traits are the only contact surface:
//!
//! - [`StateSource`]: read the current state of an upstream entity and
//!   subscribe to its changes
//! - [`EntityStore`]: publish the derived entity and read back the last
//!   persisted snapshot on restart
//!
//! [`InMemoryHost`] implements both for tests and the command-line host.

pub mod memory;

pub use memory::InMemoryHost;

use crate::calibration::CalibrationState;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Unit of every published value
pub const UNIT_OF_MEASUREMENT: &str = "%";

/// Device class of every published entity
pub const DEVICE_CLASS: &str = "moisture";

/// State class of every published entity
pub const STATE_CLASS: &str = "measurement";

/// Device an upstream entity belongs to.
///
/// Copied onto the calibrated entity so the host can group both under the
/// same device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLink {
    /// `(domain, id)` identifier pairs
    #[serde(default)]
    pub identifiers: Vec<(String, String)>,
    /// `(type, id)` connection pairs (MAC addresses etc.)
    #[serde(default)]
    pub connections: Vec<(String, String)>,
}

impl DeviceLink {
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty() && self.connections.is_empty()
    }
}

/// Point-in-time state of an upstream entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    /// Textual state as reported by the host (`"512"`, `"unavailable"`, ...)
    pub state: String,
    /// Friendly name the host shows for the entity
    #[serde(default)]
    pub friendly_name: Option<String>,
    /// Device the entity belongs to
    #[serde(default)]
    pub device: Option<DeviceLink>,
}

impl SourceState {
    pub fn new<S: Into<String>>(state: S) -> Self {
        Self {
            state: state.into(),
            friendly_name: None,
            device: None,
        }
    }

    pub fn with_friendly_name<S: Into<String>>(mut self, name: S) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    pub fn with_device(mut self, device: DeviceLink) -> Self {
        self.device = Some(device);
        self
    }
}

/// A state transition of an upstream entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeEvent {
    /// Entity that changed
    pub entity_id: String,
    /// State before the change, if the entity existed
    pub old_state: Option<SourceState>,
    /// State after the change; `None` when the entity was removed
    pub new_state: Option<SourceState>,
    /// When the host fired the event
    pub time_fired: DateTime<Utc>,
}

/// Stops event delivery for one subscription.
///
/// The unsubscribe action runs at most once, either through
/// [`SubscriptionHandle::unsubscribe`] or when the handle is dropped.
pub struct SubscriptionHandle {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SubscriptionHandle {
    pub fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Stop delivery. Returns `false` if this handle was already used.
    pub fn unsubscribe(&mut self) -> bool {
        match self.unsubscribe.take() {
            Some(unsubscribe) => {
                unsubscribe();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Live subscription to one entity's changes
#[derive(Debug)]
pub struct StateSubscription {
    /// Change events, in the order the host fired them
    pub events: mpsc::UnboundedReceiver<StateChangeEvent>,
    /// Handle that ends delivery
    pub handle: SubscriptionHandle,
}

/// Attributes published alongside the calibrated value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationAttributes {
    pub min_raw: Option<f64>,
    pub max_raw: Option<f64>,
    pub raw_value: Option<f64>,
    pub source_entity: String,
}

impl CalibrationAttributes {
    pub fn from_state<S: Into<String>>(state: CalibrationState, source_entity: S) -> Self {
        Self {
            min_raw: state.min_raw,
            max_raw: state.max_raw,
            raw_value: state.raw_value,
            source_entity: source_entity.into(),
        }
    }
}

/// Full entity snapshot pushed to the host on every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedState {
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    /// Calibrated percentage; `None` renders as unknown
    pub native_value: Option<f64>,
    pub unit_of_measurement: String,
    pub device_class: String,
    pub state_class: String,
    pub attributes: CalibrationAttributes,
    #[serde(default)]
    pub device: Option<DeviceLink>,
    pub last_updated: DateTime<Utc>,
}

/// What the host hands back on restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoredState {
    pub min_raw: Option<f64>,
    pub max_raw: Option<f64>,
    pub raw_value: Option<f64>,
    /// Last published calibrated value
    pub last_output: Option<f64>,
}

impl From<&PublishedState> for RestoredState {
    fn from(published: &PublishedState) -> Self {
        Self {
            min_raw: published.attributes.min_raw,
            max_raw: published.attributes.max_raw,
            raw_value: published.attributes.raw_value,
            last_output: published.native_value,
        }
    }
}

/// Read access to upstream entities
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Current state of an entity, `None` if the host does not know it
    async fn current_state(&self, entity_id: &str) -> Option<SourceState>;

    /// Subscribe to every state transition of an entity
    async fn subscribe(&self, entity_id: &str) -> Result<StateSubscription>;
}

/// Publication and persistence of derived entities
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Push the current snapshot; the host persists the last one it saw
    async fn publish(&self, state: &PublishedState) -> Result<()>;

    /// Last persisted snapshot of an entity
    async fn last_state(&self, entity_id: &str) -> Result<Option<RestoredState>>;
}
