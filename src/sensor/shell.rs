//! Observer shell around one calibration engine
//!
//! Binds an engine to a live upstream entity: restores persisted bounds,
//! establishes an initial reading, subscribes to changes and republishes
//! the calibrated entity after every update or reset.

use super::binding::SourceBinding;
use crate::calibration::{CalibrationEngine, IngestOutcome};
use crate::error::{CalibrationError, Result};
use crate::host::{
    CalibrationAttributes, EntityStore, PublishedState, StateChangeEvent, StateSource,
    SubscriptionHandle, DEVICE_CLASS, STATE_CLASS, UNIT_OF_MEASUREMENT,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Subscription lifecycle of a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, not yet activated
    Uninitialized,
    /// Receiving change events
    Subscribed,
    /// Torn down; no further samples are processed
    Unsubscribed,
}

/// Calibrated sensor for one upstream source
pub struct CalibratedSensor {
    binding: SourceBinding,
    engine: CalibrationEngine,
    lifecycle: Lifecycle,
    subscription: Option<SubscriptionHandle>,
    store: Arc<dyn EntityStore>,
    closed: watch::Sender<bool>,
}

impl CalibratedSensor {
    pub fn new(binding: SourceBinding, store: Arc<dyn EntityStore>) -> Self {
        Self {
            binding,
            engine: CalibrationEngine::new(),
            lifecycle: Lifecycle::Uninitialized,
            subscription: None,
            store,
            closed: watch::channel(false).0,
        }
    }

    pub fn binding(&self) -> &SourceBinding {
        &self.binding
    }

    pub fn entity_id(&self) -> &str {
        &self.binding.entity_id
    }

    pub fn engine(&self) -> &CalibrationEngine {
        &self.engine
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Flips to `true` once the sensor is torn down
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Current entity snapshot as it would be published
    pub fn snapshot(&self) -> PublishedState {
        PublishedState {
            entity_id: self.binding.entity_id.clone(),
            unique_id: self.binding.unique_id.clone(),
            name: self.binding.name.clone(),
            native_value: self.engine.display_value(),
            unit_of_measurement: UNIT_OF_MEASUREMENT.to_string(),
            device_class: DEVICE_CLASS.to_string(),
            state_class: STATE_CLASS.to_string(),
            attributes: CalibrationAttributes::from_state(
                self.engine.state(),
                self.binding.source_entity.clone(),
            ),
            device: self.binding.device.clone(),
            last_updated: Utc::now(),
        }
    }

    /// Activate the sensor.
    ///
    /// Restores persisted bounds, ingests the source's current state once,
    /// publishes, and finally subscribes to the source. The returned
    /// receiver must be driven through [`CalibratedSensor::handle_event`],
    /// usually via [`spawn_listener`].
    pub async fn activate(
        &mut self,
        source: &dyn StateSource,
    ) -> Result<mpsc::UnboundedReceiver<StateChangeEvent>> {
        if self.lifecycle != Lifecycle::Uninitialized {
            return Err(CalibrationError::invalid_input(format!(
                "{} was already activated",
                self.binding.entity_id
            )));
        }

        self.restore().await;

        if let Some(current) = source.current_state(&self.binding.source_entity).await {
            self.process_raw_value(&current.state);
        }
        self.publish().await;

        let subscription = source.subscribe(&self.binding.source_entity).await?;
        self.subscription = Some(subscription.handle);
        self.lifecycle = Lifecycle::Subscribed;

        debug!(
            "Subscribed {} to {}",
            self.binding.entity_id, self.binding.source_entity
        );

        Ok(subscription.events)
    }

    /// Apply one change event. Returns `false` when the event was dropped
    /// (not subscribed, or the source was removed).
    pub async fn handle_event(&mut self, event: &StateChangeEvent) -> bool {
        if self.lifecycle != Lifecycle::Subscribed {
            return false;
        }

        let Some(new_state) = &event.new_state else {
            return false;
        };

        self.process_raw_value(&new_state.state);
        self.publish().await;
        true
    }

    /// Forget the learned bounds and publish immediately
    pub async fn reset_calibration(&mut self) {
        info!("Resetting calibration for {}", self.binding.entity_id);
        self.engine.reset();
        self.publish().await;
    }

    /// Stop receiving events. Returns `false` if there was nothing to tear
    /// down.
    pub fn teardown(&mut self) -> bool {
        match self.subscription.take() {
            Some(mut handle) => {
                handle.unsubscribe();
                self.lifecycle = Lifecycle::Unsubscribed;
                self.closed.send_replace(true);
                debug!("Unsubscribed {}", self.binding.entity_id);
                true
            }
            None => false,
        }
    }

    async fn restore(&mut self) {
        let restored = match self.store.last_state(&self.binding.entity_id).await {
            Ok(Some(restored)) => restored,
            Ok(None) => return,
            Err(e) => {
                let code = e.to_error_code();
                warn!(
                    code = code.as_number(),
                    category = code.category(),
                    severity = ?e.severity(),
                    "Failed to load persisted state for {}: {}",
                    self.binding.entity_id,
                    e
                );
                return;
            }
        };

        self.engine
            .restore(restored.min_raw, restored.max_raw, restored.last_output);

        let state = self.engine.state();
        debug!(
            "Restored min_raw={:?}, max_raw={:?} for {}",
            state.min_raw, state.max_raw, self.binding.entity_id
        );
    }

    fn process_raw_value(&mut self, raw: &str) {
        if let IngestOutcome::Accepted {
            value,
            new_min,
            new_max,
        } = self.engine.ingest(raw)
        {
            if new_min {
                debug!("New min_raw={} for {}", value, self.binding.entity_id);
            }
            if new_max {
                debug!("New max_raw={} for {}", value, self.binding.entity_id);
            }
        }
    }

    async fn publish(&self) {
        if let Err(e) = self.store.publish(&self.snapshot()).await {
            let code = e.to_error_code();
            warn!(
                code = code.as_number(),
                category = code.category(),
                severity = ?e.severity(),
                "Failed to publish {}: {}",
                self.binding.entity_id,
                e
            );
        }
    }
}

impl std::fmt::Debug for CalibratedSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibratedSensor")
            .field("binding", &self.binding)
            .field("engine", &self.engine)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// Drive a sensor from its event receiver until the subscription ends or
/// the sensor is torn down.
///
/// Each event is applied under the sensor's lock, so teardown either waits
/// for an in-flight event to finish or causes later events to be dropped.
/// The listener exits on teardown even if the host keeps its sender open.
pub fn spawn_listener(
    sensor: Arc<Mutex<CalibratedSensor>>,
    mut events: mpsc::UnboundedReceiver<StateChangeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut closed = sensor.lock().await.closed_signal();
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = closed.wait_for(|closed| *closed) => None,
            };
            let Some(event) = event else {
                break;
            };

            let mut sensor = sensor.lock().await;
            if sensor.lifecycle() != Lifecycle::Subscribed {
                break;
            }
            sensor.handle_event(&event).await;
        }
    })
}
