//! Error types for the auto-calibrate sensor
//!
//! Only setup validation errors are meant to reach a user. Everything that can
//! fail at runtime (publishing, persisting, subscribing) is contained by the
//! sensor shell and logged instead of propagated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for calibration operations
pub type Result<T> = std::result::Result<T, CalibrationError>;

/// Error types for calibration setup and host interaction
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// The chosen source entity does not exist
    #[error("Source entity not found: {0}")]
    EntityNotFound(String),

    /// The chosen source reports a non-numeric state
    #[error("Source entity {entity_id} is not numeric (state: {state:?})")]
    NotNumeric { entity_id: String, state: String },

    /// The source entity already has a calibrated sensor
    #[error("Source entity already configured: {0}")]
    AlreadyConfigured(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Subscription errors
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found errors (entries, outputs)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Service unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Setup errors (1000-1099)
    EntityNotFound,
    NotNumeric,
    AlreadyConfigured,

    // Configuration errors (1200-1299)
    ConfigurationInvalid,

    // Data errors (1400-1499)
    ParsingFailed,
    InvalidInput,

    // Storage errors (1500-1599)
    PersistenceFailed,

    // Service errors (1600-1699)
    ServiceUnavailable,
    SubscriptionFailed,
    NotFound,

    // Internal errors (1900-1999)
    InternalError,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::EntityNotFound => 1001,
            ErrorCode::NotNumeric => 1002,
            ErrorCode::AlreadyConfigured => 1003,

            ErrorCode::ConfigurationInvalid => 1201,

            ErrorCode::ParsingFailed => 1401,
            ErrorCode::InvalidInput => 1402,

            ErrorCode::PersistenceFailed => 1501,

            ErrorCode::ServiceUnavailable => 1601,
            ErrorCode::SubscriptionFailed => 1602,
            ErrorCode::NotFound => 1603,

            ErrorCode::InternalError => 1901,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1000..=1099 => "setup",
            1200..=1299 => "configuration",
            1400..=1499 => "data",
            1500..=1599 => "storage",
            1600..=1699 => "service",
            1900..=1999 => "internal",
            _ => "unknown",
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Low severity - information only
    Info,
    /// Medium severity - warning condition
    Warning,
    /// High severity - error condition
    Error,
    /// Critical severity - immediate attention required
    Critical,
}

impl CalibrationError {
    /// Create an entity-not-found setup error
    pub fn entity_not_found<S: Into<String>>(entity_id: S) -> Self {
        Self::EntityNotFound(entity_id.into())
    }

    /// Create a not-numeric setup error
    pub fn not_numeric<E: Into<String>, S: Into<String>>(entity_id: E, state: S) -> Self {
        Self::NotNumeric {
            entity_id: entity_id.into(),
            state: state.into(),
        }
    }

    /// Create an already-configured setup error
    pub fn already_configured<S: Into<String>>(entity_id: S) -> Self {
        Self::AlreadyConfigured(entity_id.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a persistence error
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a subscription error
    pub fn subscription<S: Into<String>>(msg: S) -> Self {
        Self::Subscription(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Generic(anyhow::anyhow!(msg.into()))
    }

    /// Map CalibrationError to structured error code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            CalibrationError::EntityNotFound(_) => ErrorCode::EntityNotFound,
            CalibrationError::NotNumeric { .. } => ErrorCode::NotNumeric,
            CalibrationError::AlreadyConfigured(_) => ErrorCode::AlreadyConfigured,
            CalibrationError::Config(_) => ErrorCode::ConfigurationInvalid,
            CalibrationError::Persistence(_) => ErrorCode::PersistenceFailed,
            CalibrationError::Subscription(_) => ErrorCode::SubscriptionFailed,
            CalibrationError::InvalidInput(_) => ErrorCode::InvalidInput,
            CalibrationError::NotFound(_) => ErrorCode::NotFound,
            CalibrationError::ServiceUnavailable(_) => ErrorCode::ServiceUnavailable,
            CalibrationError::Json(_) | CalibrationError::Toml(_) => ErrorCode::ParsingFailed,
            CalibrationError::Io(_) => ErrorCode::PersistenceFailed,
            CalibrationError::Generic(_) => ErrorCode::InternalError,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CalibrationError::EntityNotFound(_)
            | CalibrationError::NotNumeric { .. }
            | CalibrationError::AlreadyConfigured(_)
            | CalibrationError::InvalidInput(_) => ErrorSeverity::Warning,
            CalibrationError::NotFound(_) | CalibrationError::ServiceUnavailable(_) => {
                ErrorSeverity::Warning
            }
            CalibrationError::Config(_) | CalibrationError::Toml(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Short key shown to the user when the setup flow rejects a source.
    ///
    /// Returns `None` for errors that are not setup validation errors.
    pub fn setup_error_key(&self) -> Option<&'static str> {
        match self {
            CalibrationError::EntityNotFound(_) => Some("entity_not_found"),
            CalibrationError::NotNumeric { .. } => Some("not_numeric"),
            CalibrationError::AlreadyConfigured(_) => Some("already_configured"),
            _ => None,
        }
    }
}
