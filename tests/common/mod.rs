//! Shared fixtures for integration tests

#![allow(dead_code)]

use auto_calibrate::host::{
    CalibrationAttributes, EntityStore, InMemoryHost, PublishedState, DEVICE_CLASS, STATE_CLASS,
    UNIT_OF_MEASUREMENT,
};
use auto_calibrate::CalibrationRegistry;
use chrono::Utc;
use rstest::fixture;
use std::sync::Arc;
use std::time::Duration;

pub const SOURCE: &str = "sensor.soil_sensor";
pub const OUTPUT: &str = "sensor.soil_sensor_calibrated";

/// Fresh in-memory host without persistence
#[fixture]
pub fn host() -> Arc<InMemoryHost> {
    Arc::new(InMemoryHost::new())
}

/// Registry using `host` for both ports
pub fn registry_for(host: &Arc<InMemoryHost>) -> CalibrationRegistry {
    CalibrationRegistry::new(host.clone(), host.clone())
}

/// Snapshot as a previous run would have persisted it
pub fn persisted_snapshot(
    min_raw: f64,
    max_raw: f64,
    raw_value: f64,
    last_output: f64,
) -> PublishedState {
    PublishedState {
        entity_id: OUTPUT.to_string(),
        unique_id: format!("auto_calibrate_{}", SOURCE),
        name: "Soil Sensor".to_string(),
        native_value: Some(last_output),
        unit_of_measurement: UNIT_OF_MEASUREMENT.to_string(),
        device_class: DEVICE_CLASS.to_string(),
        state_class: STATE_CLASS.to_string(),
        attributes: CalibrationAttributes {
            min_raw: Some(min_raw),
            max_raw: Some(max_raw),
            raw_value: Some(raw_value),
            source_entity: SOURCE.to_string(),
        },
        device: None,
        last_updated: Utc::now(),
    }
}

/// Seed the host's store with a persisted snapshot
pub async fn seed_snapshot(host: &InMemoryHost, snapshot: &PublishedState) {
    host.publish(snapshot)
        .await
        .expect("seeding the store should succeed");
}

/// Wait until the published snapshot of `entity_id` satisfies `predicate`
pub async fn wait_for<F>(host: &InMemoryHost, entity_id: &str, predicate: F) -> PublishedState
where
    F: Fn(&PublishedState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(state) = host.published(entity_id).await {
                if predicate(&state) {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for published state")
}

/// Wait until the published raw value of `entity_id` equals `raw`
pub async fn wait_for_raw(host: &InMemoryHost, entity_id: &str, raw: f64) -> PublishedState {
    wait_for(host, entity_id, |s| s.attributes.raw_value == Some(raw)).await
}

/// Give spawned listeners a chance to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
