//! Registry of configured calibrated sensors
//!
//! Owns one shell and listener task per configured entry and routes the
//! bulk reset command to the matching shells.

use crate::config::SensorEntry;
use crate::error::{CalibrationError, Result};
use crate::host::{EntityStore, PublishedState, StateSource};
use crate::sensor::{spawn_listener, CalibratedSensor, SourceBinding};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Name of the bulk reset command
pub const RESET_SERVICE: &str = "reset_calibration";

struct ActiveEntry {
    entry: SensorEntry,
    output_entity_id: String,
    sensor: Arc<Mutex<CalibratedSensor>>,
    listener: JoinHandle<()>,
}

/// Explicitly owned mapping from entries to their running sensors
pub struct CalibrationRegistry {
    source: Arc<dyn StateSource>,
    store: Arc<dyn EntityStore>,
    entries: HashMap<String, ActiveEntry>,
}

impl CalibrationRegistry {
    pub fn new(source: Arc<dyn StateSource>, store: Arc<dyn EntityStore>) -> Self {
        Self {
            source,
            store,
            entries: HashMap::new(),
        }
    }

    /// Whether the reset command is currently offered
    pub fn reset_service_available(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Activate a sensor for `entry` and start its listener.
    ///
    /// Returns the output entity id.
    pub async fn setup_entry(&mut self, entry: SensorEntry) -> Result<String> {
        if self.entries.contains_key(&entry.entry_id) {
            return Err(CalibrationError::invalid_input(format!(
                "Entry {} is already set up",
                entry.entry_id
            )));
        }

        let current = self.source.current_state(&entry.source_entity).await;
        let binding = SourceBinding::from_entry(&entry, current.as_ref());
        let output_entity_id = binding.entity_id.clone();

        if self
            .entries
            .values()
            .any(|active| active.output_entity_id == output_entity_id)
        {
            return Err(CalibrationError::invalid_input(format!(
                "Output entity {} is already in use",
                output_entity_id
            )));
        }

        let mut sensor = CalibratedSensor::new(binding, self.store.clone());
        let events = sensor.activate(self.source.as_ref()).await?;

        let sensor = Arc::new(Mutex::new(sensor));
        let listener = spawn_listener(sensor.clone(), events);

        if self.entries.is_empty() {
            debug!("Registering {} service", RESET_SERVICE);
        }

        info!(
            "Set up {} for {} (entry {})",
            output_entity_id, entry.source_entity, entry.entry_id
        );

        self.entries.insert(
            entry.entry_id.clone(),
            ActiveEntry {
                entry,
                output_entity_id: output_entity_id.clone(),
                sensor,
                listener,
            },
        );

        Ok(output_entity_id)
    }

    /// Tear down and remove an entry
    pub async fn unload_entry(&mut self, entry_id: &str) -> Result<SensorEntry> {
        let active = self
            .entries
            .remove(entry_id)
            .ok_or_else(|| CalibrationError::not_found(format!("Entry {}", entry_id)))?;

        active.sensor.lock().await.teardown();
        if let Err(e) = active.listener.await {
            warn!("Listener for {} ended abnormally: {}", active.output_entity_id, e);
        }

        info!("Unloaded {}", active.output_entity_id);

        if self.entries.is_empty() {
            debug!("Removing {} service", RESET_SERVICE);
        }

        Ok(active.entry)
    }

    /// Entry id owning an output entity
    pub fn entry_id_for(&self, output_entity_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, active)| active.output_entity_id == output_entity_id)
            .map(|(entry_id, _)| entry_id.as_str())
    }

    /// Reset every sensor whose output entity id is listed.
    ///
    /// Unknown and repeated ids are skipped. Returns the number of sensors
    /// reset.
    pub async fn reset<S: AsRef<str>>(&self, output_entity_ids: &[S]) -> Result<usize> {
        if !self.reset_service_available() {
            return Err(CalibrationError::service_unavailable(format!(
                "{} is not registered",
                RESET_SERVICE
            )));
        }

        let mut seen = HashSet::new();
        let mut count = 0;
        for id in output_entity_ids {
            let id = id.as_ref();
            if !seen.insert(id) {
                continue;
            }
            let Some(active) = self.entries.values().find(|a| a.output_entity_id == id) else {
                debug!("Reset skipped unknown entity {}", id);
                continue;
            };
            active.sensor.lock().await.reset_calibration().await;
            count += 1;
        }

        Ok(count)
    }

    /// Current snapshot of one output entity
    pub async fn snapshot(&self, output_entity_id: &str) -> Option<PublishedState> {
        let active = self
            .entries
            .values()
            .find(|a| a.output_entity_id == output_entity_id)?;
        let sensor = active.sensor.lock().await;
        Some(sensor.snapshot())
    }

    /// Output entity ids, sorted
    pub fn output_entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .values()
            .map(|a| a.output_entity_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Configured entries, ordered by output entity id
    pub fn entries(&self) -> Vec<SensorEntry> {
        let mut active: Vec<&ActiveEntry> = self.entries.values().collect();
        active.sort_by(|a, b| a.output_entity_id.cmp(&b.output_entity_id));
        active.into_iter().map(|a| a.entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unload every entry
    pub async fn shutdown(&mut self) {
        let entry_ids: Vec<String> = self.entries.keys().cloned().collect();
        for entry_id in entry_ids {
            if let Err(e) = self.unload_entry(&entry_id).await {
                warn!("Failed to unload {}: {}", entry_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{InMemoryHost, SourceState};

    fn registry(host: &Arc<InMemoryHost>) -> CalibrationRegistry {
        CalibrationRegistry::new(host.clone(), host.clone())
    }

    #[tokio::test]
    async fn test_reset_requires_loaded_entries() {
        let host = Arc::new(InMemoryHost::new());
        let registry = registry(&host);

        assert!(!registry.reset_service_available());
        let err = registry
            .reset(&["sensor.soil_sensor_calibrated"])
            .await
            .unwrap_err();
        assert!(matches!(err, CalibrationError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_duplicate_entry_id_rejected() {
        let host = Arc::new(InMemoryHost::new());
        host.set_state("sensor.soil_sensor", SourceState::new("10"))
            .await;
        let mut registry = registry(&host);

        let entry = SensorEntry::new("sensor.soil_sensor");
        registry.setup_entry(entry.clone()).await.unwrap();
        assert!(registry.setup_entry(entry).await.is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unload_last_entry_withdraws_service() {
        let host = Arc::new(InMemoryHost::new());
        let mut registry = registry(&host);

        let entry = SensorEntry::new("sensor.soil_sensor");
        let entry_id = entry.entry_id.clone();
        let output = registry.setup_entry(entry).await.unwrap();
        assert!(registry.reset_service_available());
        assert_eq!(registry.entry_id_for(&output), Some(entry_id.as_str()));

        registry.unload_entry(&entry_id).await.unwrap();
        assert!(!registry.reset_service_available());
        assert!(registry.is_empty());
        assert_eq!(host.subscriber_count("sensor.soil_sensor"), 0);
    }
}
