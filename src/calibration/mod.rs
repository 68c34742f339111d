//! Calibration engine
//!
//! Pure state and transition logic: learns the minimum and maximum of a raw
//! signal and rescales the latest sample to a 0-100% range. No I/O happens
//! here; the sensor shell owns one engine per observed source.

pub mod engine;
pub mod value;

pub use engine::{CalibrationEngine, CalibrationState, IngestOutcome};
pub use value::{is_placeholder_state, normalize, parse_raw_value, PLACEHOLDER_STATES};
