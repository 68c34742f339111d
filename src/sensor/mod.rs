//! Calibrated sensor entity
//!
//! [`SourceBinding`] fixes the identity of one calibrated output;
//! [`CalibratedSensor`] is the observer shell that feeds the calibration
//! engine from the bound source and republishes the result.

pub mod binding;
pub mod shell;

pub use binding::{
    derive_object_id, display_name, local_id, slugify, unique_id, SourceBinding, DOMAIN,
    OBJECT_ID_SUFFIX, OUTPUT_DOMAIN,
};
pub use shell::{spawn_listener, CalibratedSensor, Lifecycle};
