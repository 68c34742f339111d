//! Self-calibrating moisture sensor
//!
//! Observes a raw numeric source entity (an ADC reading, a capacitance
//! count) and publishes a derived entity that rescales it to 0-100%
//! using the lowest and highest values ever seen.
//!
//! # Layout
//!
//! - [`calibration`]: min/max learning and normalization, no I/O
//! - [`sensor`]: identity derivation and the observer shell around an engine
//! - [`registry`]: configured entries, their listeners and the reset command
//! - [`setup`]: validation of new entries
//! - [`host`]: ports to the host application plus an in-memory host

pub mod calibration;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod registry;
pub mod sensor;
pub mod setup;

pub use calibration::{CalibrationEngine, CalibrationState, IngestOutcome};
pub use config::{AppConfig, SensorEntry};
pub use error::{CalibrationError, Result};
pub use host::{EntityStore, InMemoryHost, PublishedState, SourceState, StateSource};
pub use registry::CalibrationRegistry;
pub use sensor::{CalibratedSensor, SourceBinding};
pub use setup::{SetupFlow, SetupRequest};
