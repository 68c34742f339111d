//! Interactive entry creation
//!
//! Validates a user's choice of source entity before a calibrated sensor is
//! configured for it.

use crate::calibration::{is_placeholder_state, parse_raw_value};
use crate::config::SensorEntry;
use crate::error::{CalibrationError, Result};
use crate::host::StateSource;
use crate::sensor::display_name;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// What the user submitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupRequest {
    pub source_entity: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub object_id: Option<String>,
}

impl SetupRequest {
    pub fn new<S: Into<String>>(source_entity: S) -> Self {
        Self {
            source_entity: source_entity.into(),
            ..Default::default()
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_object_id<S: Into<String>>(mut self, object_id: S) -> Self {
        self.object_id = Some(object_id.into());
        self
    }
}

/// Setup wizard backed by the host's entity states
pub struct SetupFlow {
    source: Arc<dyn StateSource>,
}

impl SetupFlow {
    pub fn new(source: Arc<dyn StateSource>) -> Self {
        Self { source }
    }

    /// Validate `request` and build the entry to configure.
    ///
    /// Checks run in order: already configured, entity exists, state is
    /// numeric or a placeholder.
    pub async fn create_entry(
        &self,
        request: SetupRequest,
        configured: &[SensorEntry],
    ) -> Result<SensorEntry> {
        let source_entity = request.source_entity.trim().to_string();

        if configured.iter().any(|e| e.source_entity == source_entity) {
            return Err(CalibrationError::already_configured(source_entity));
        }

        let current = self
            .source
            .current_state(&source_entity)
            .await
            .ok_or_else(|| CalibrationError::entity_not_found(source_entity.clone()))?;

        if !is_placeholder_state(&current.state) && parse_raw_value(&current.state).is_none() {
            debug!(
                "Rejecting {}: state {:?} is not numeric",
                source_entity, current.state
            );
            return Err(CalibrationError::not_numeric(
                source_entity,
                current.state.clone(),
            ));
        }

        let name = display_name(&source_entity, request.name.as_deref(), Some(&current));
        let object_id = request
            .object_id
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty());

        let mut entry = SensorEntry::new(source_entity);
        entry.name = Some(name);
        entry.object_id = object_id;
        entry.device = current.device.filter(|d| !d.is_empty());

        info!(
            "Created entry {} for {}",
            entry.entry_id, entry.source_entity
        );
        Ok(entry)
    }
}
