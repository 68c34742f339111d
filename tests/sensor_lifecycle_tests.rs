//! Sensor lifecycle through the in-memory host

mod common;

use auto_calibrate::host::{InMemoryHost, SourceState};
use auto_calibrate::sensor::{spawn_listener, CalibratedSensor, Lifecycle, SourceBinding};
use auto_calibrate::SensorEntry;
use common::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

#[rstest]
#[tokio::test]
async fn restored_output_is_published_before_any_sample(host: Arc<InMemoryHost>) {
    seed_snapshot(&host, &persisted_snapshot(0.0, 50.0, 20.0, 40.0)).await;

    let mut registry = registry_for(&host);
    registry
        .setup_entry(SensorEntry::new(SOURCE))
        .await
        .unwrap();

    let published = host.published(OUTPUT).await.unwrap();
    assert_eq!(published.native_value, Some(40.0));
    assert_eq!(published.attributes.min_raw, Some(0.0));
    assert_eq!(published.attributes.max_raw, Some(50.0));
    assert_eq!(published.attributes.raw_value, None);

    host.set_state(SOURCE, SourceState::new("25")).await;
    let published = wait_for_raw(&host, OUTPUT, 25.0).await;
    assert_eq!(published.native_value, Some(50.0));
}

#[rstest]
#[tokio::test]
async fn learns_range_from_events(host: Arc<InMemoryHost>) {
    host.set_state(SOURCE, SourceState::new("10")).await;
    let mut registry = registry_for(&host);
    registry
        .setup_entry(SensorEntry::new(SOURCE))
        .await
        .unwrap();
    assert_eq!(host.published(OUTPUT).await.unwrap().native_value, Some(0.0));

    host.set_state(SOURCE, SourceState::new("20")).await;
    host.set_state(SOURCE, SourceState::new("15")).await;

    let published = wait_for_raw(&host, OUTPUT, 15.0).await;
    assert_eq!(published.native_value, Some(50.0));
    assert_eq!(published.attributes.min_raw, Some(10.0));
    assert_eq!(published.attributes.max_raw, Some(20.0));
    assert_eq!(published.unit_of_measurement, "%");
    assert_eq!(published.unique_id, "auto_calibrate_sensor.soil_sensor");
}

#[rstest]
#[tokio::test]
async fn placeholder_and_garbage_states_change_nothing(host: Arc<InMemoryHost>) {
    host.set_state(SOURCE, SourceState::new("10")).await;
    let mut registry = registry_for(&host);
    registry
        .setup_entry(SensorEntry::new(SOURCE))
        .await
        .unwrap();
    host.set_state(SOURCE, SourceState::new("30")).await;
    wait_for_raw(&host, OUTPUT, 30.0).await;

    host.set_state(SOURCE, SourceState::new("unavailable")).await;
    host.set_state(SOURCE, SourceState::new("abc")).await;
    host.remove_state(SOURCE).await;
    settle().await;

    let published = host.published(OUTPUT).await.unwrap();
    assert_eq!(published.attributes.raw_value, Some(30.0));
    assert_eq!(published.attributes.min_raw, Some(10.0));
    assert_eq!(published.attributes.max_raw, Some(30.0));
    assert_eq!(published.native_value, Some(100.0));
}

#[rstest]
#[tokio::test]
async fn events_after_unload_are_not_applied(host: Arc<InMemoryHost>) {
    let mut registry = registry_for(&host);
    let entry = SensorEntry::new(SOURCE);
    let entry_id = entry.entry_id.clone();
    registry.setup_entry(entry).await.unwrap();

    host.set_state(SOURCE, SourceState::new("5")).await;
    wait_for_raw(&host, OUTPUT, 5.0).await;

    registry.unload_entry(&entry_id).await.unwrap();
    assert_eq!(host.subscriber_count(SOURCE), 0);

    host.set_state(SOURCE, SourceState::new("500")).await;
    settle().await;
    assert_eq!(
        host.published(OUTPUT).await.unwrap().attributes.raw_value,
        Some(5.0)
    );
}

#[rstest]
#[tokio::test]
async fn teardown_racing_events_never_applies_partially(host: Arc<InMemoryHost>) {
    let binding = SourceBinding::new(SOURCE, None, None, None);
    let mut sensor = CalibratedSensor::new(binding, host.clone());
    let events = sensor.activate(host.as_ref()).await.unwrap();
    let sensor = Arc::new(Mutex::new(sensor));
    let listener = spawn_listener(sensor.clone(), events);

    let writer = {
        let host = host.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                host.set_state(SOURCE, SourceState::new(i.to_string())).await;
                tokio::task::yield_now().await;
            }
        })
    };

    tokio::task::yield_now().await;
    let torn_down = sensor.lock().await.teardown();
    assert!(torn_down);
    writer.await.unwrap();
    listener.await.unwrap();

    let sensor = sensor.lock().await;
    assert_eq!(sensor.lifecycle(), Lifecycle::Unsubscribed);

    // Whatever was applied last was also published
    let engine_state = sensor.engine().state();
    let published = host.published(OUTPUT).await.unwrap();
    assert_eq!(published.attributes.raw_value, engine_state.raw_value);
    assert_eq!(published.attributes.min_raw, engine_state.min_raw);
    assert_eq!(published.attributes.max_raw, engine_state.max_raw);
}

#[tokio::test]
async fn learned_bounds_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("auto_calibrate.json");

    {
        let host = Arc::new(InMemoryHost::with_persistence(&path));
        let mut registry = registry_for(&host);
        registry
            .setup_entry(SensorEntry::new(SOURCE))
            .await
            .unwrap();
        host.set_state(SOURCE, SourceState::new("10")).await;
        host.set_state(SOURCE, SourceState::new("20")).await;
        wait_for_raw(&host, OUTPUT, 20.0).await;
        registry.shutdown().await;
    }

    assert!(path.exists());

    let host = Arc::new(InMemoryHost::with_persistence(&path));
    assert_eq!(host.load_from_disk().await.unwrap(), 1);

    let mut registry = registry_for(&host);
    registry
        .setup_entry(SensorEntry::new(SOURCE))
        .await
        .unwrap();

    let published = host.published(OUTPUT).await.unwrap();
    assert_eq!(published.native_value, Some(100.0));
    assert_eq!(published.attributes.raw_value, None);

    host.set_state(SOURCE, SourceState::new("15")).await;
    let published = wait_for_raw(&host, OUTPUT, 15.0).await;
    assert_eq!(published.native_value, Some(50.0));
}
