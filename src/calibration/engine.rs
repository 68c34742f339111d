//! Min/max learning state machine for one observed source

use super::value::{normalize, parse_raw_value};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Learned calibration state for one source.
///
/// Whenever both bounds are set, `min_raw <= max_raw`, and a present
/// `raw_value` lies inside them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    /// Last valid raw sample
    pub raw_value: Option<f64>,
    /// Smallest valid sample ever seen (including restored history)
    pub min_raw: Option<f64>,
    /// Largest valid sample ever seen (including restored history)
    pub max_raw: Option<f64>,
}

impl CalibrationState {
    /// True when nothing has been learned yet
    pub fn is_empty(&self) -> bool {
        self.raw_value.is_none() && self.min_raw.is_none() && self.max_raw.is_none()
    }
}

/// Result of feeding one textual sample to the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome {
    /// Not a number; state untouched
    Ignored,
    /// Sample accepted as the current raw value
    Accepted {
        value: f64,
        new_min: bool,
        new_max: bool,
    },
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted { .. })
    }
}

/// Calibration engine: learns bounds and derives the 0-100% output.
#[derive(Debug, Clone, Default)]
pub struct CalibrationEngine {
    state: CalibrationState,
    /// Last published output restored from persistence, shown until the
    /// first live sample arrives.
    restored_output: Option<f64>,
}

impl CalibrationEngine {
    /// Create an engine with nothing learned
    pub fn new() -> Self {
        Self::default()
    }

    /// Current learned state
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Restored display value, if one is still pending
    pub fn restored_output(&self) -> Option<f64> {
        self.restored_output
    }

    /// Feed the newest textual source state.
    ///
    /// Anything that does not parse as a finite number leaves the state
    /// untouched.
    pub fn ingest(&mut self, raw: &str) -> IngestOutcome {
        let Some(value) = parse_raw_value(raw) else {
            trace!(raw, "Ignoring non-numeric sample");
            return IngestOutcome::Ignored;
        };

        let new_min = self.state.min_raw.map_or(true, |min| value < min);
        let new_max = self.state.max_raw.map_or(true, |max| value > max);

        self.state.raw_value = Some(value);
        if new_min {
            self.state.min_raw = Some(value);
        }
        if new_max {
            self.state.max_raw = Some(value);
        }
        self.restored_output = None;

        IngestOutcome::Accepted {
            value,
            new_min,
            new_max,
        }
    }

    /// Normalized output derived from the live state.
    ///
    /// `None` until a raw value and both bounds are known.
    pub fn output(&self) -> Option<f64> {
        let CalibrationState {
            raw_value: Some(raw),
            min_raw: Some(min),
            max_raw: Some(max),
        } = self.state
        else {
            return None;
        };

        Some(normalize(raw, min, max))
    }

    /// Value to display: the live output, or the restored one while no live
    /// sample has been processed.
    pub fn display_value(&self) -> Option<f64> {
        self.output().or(self.restored_output)
    }

    /// Forget everything learned. Calibration restarts with the next sample.
    pub fn reset(&mut self) {
        self.state = CalibrationState::default();
        self.restored_output = None;
    }

    /// Seed bounds and the last-known output from persisted attributes.
    ///
    /// The restored output is a display value only; it never seeds
    /// `raw_value` or the bounds. Non-finite numbers are dropped, and an
    /// inverted bound pair is discarded entirely.
    pub fn restore(&mut self, min_raw: Option<f64>, max_raw: Option<f64>, last_output: Option<f64>) {
        let min_raw = min_raw.filter(|v| v.is_finite());
        let max_raw = max_raw.filter(|v| v.is_finite());

        match (min_raw, max_raw) {
            (Some(min), Some(max)) if min > max => {
                warn!(min, max, "Discarding inverted persisted bounds");
                self.state.min_raw = None;
                self.state.max_raw = None;
            }
            _ => {
                self.state.min_raw = min_raw;
                self.state.max_raw = max_raw;
            }
        }

        self.restored_output = last_output.filter(|v| v.is_finite());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_engine_has_no_output() {
        let engine = CalibrationEngine::new();
        assert!(engine.state().is_empty());
        assert_eq!(engine.output(), None);
        assert_eq!(engine.display_value(), None);
    }

    #[test]
    fn test_learns_range() {
        let mut engine = CalibrationEngine::new();
        engine.ingest("10");
        engine.ingest("20");
        engine.ingest("15");

        let state = engine.state();
        assert_eq!(state.min_raw, Some(10.0));
        assert_eq!(state.max_raw, Some(20.0));
        assert_eq!(state.raw_value, Some(15.0));
        assert_eq!(engine.output(), Some(50.0));
    }

    #[test]
    fn test_first_sample_is_zero() {
        let mut engine = CalibrationEngine::new();
        let outcome = engine.ingest("512");
        assert_eq!(
            outcome,
            IngestOutcome::Accepted {
                value: 512.0,
                new_min: true,
                new_max: true
            }
        );
        assert_eq!(engine.output(), Some(0.0));
    }

    #[test]
    fn test_invalid_sample_is_ignored() {
        let mut engine = CalibrationEngine::new();
        assert_eq!(engine.ingest("abc"), IngestOutcome::Ignored);
        assert_eq!(engine.output(), None);

        engine.ingest("10");
        engine.ingest("20");
        let before = engine.state();
        assert_eq!(engine.ingest("unavailable"), IngestOutcome::Ignored);
        assert_eq!(engine.state(), before);
    }

    #[test]
    fn test_repeated_value_keeps_degenerate_range() {
        let mut engine = CalibrationEngine::new();
        engine.ingest("7");
        assert_eq!(engine.output(), Some(0.0));
        let outcome = engine.ingest("7");
        assert_eq!(
            outcome,
            IngestOutcome::Accepted {
                value: 7.0,
                new_min: false,
                new_max: false
            }
        );
        assert_eq!(engine.output(), Some(0.0));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut engine = CalibrationEngine::new();
        engine.ingest("5");
        engine.reset();
        assert_eq!(engine.output(), None);
        assert!(engine.state().is_empty());
        engine.reset();
        assert!(engine.state().is_empty());
    }

    #[test]
    fn test_restore_shows_last_output_until_live_sample() {
        let mut engine = CalibrationEngine::new();
        engine.restore(Some(0.0), Some(50.0), Some(40.0));

        assert_eq!(engine.output(), None);
        assert_eq!(engine.display_value(), Some(40.0));
        assert_eq!(engine.state().raw_value, None);

        engine.ingest("25");
        assert_eq!(engine.output(), Some(50.0));
        assert_eq!(engine.display_value(), Some(50.0));
        assert_eq!(engine.restored_output(), None);
    }

    #[test]
    fn test_restored_bounds_extend_with_new_samples() {
        let mut engine = CalibrationEngine::new();
        engine.restore(Some(100.0), Some(200.0), None);
        engine.ingest("250");

        let state = engine.state();
        assert_eq!(state.min_raw, Some(100.0));
        assert_eq!(state.max_raw, Some(250.0));
        assert_eq!(engine.output(), Some(100.0));
    }

    #[test]
    fn test_restore_discards_inverted_bounds() {
        let mut engine = CalibrationEngine::new();
        engine.restore(Some(9.0), Some(1.0), Some(12.0));
        assert_eq!(engine.state().min_raw, None);
        assert_eq!(engine.state().max_raw, None);
        assert_eq!(engine.display_value(), Some(12.0));
    }

    #[test]
    fn test_reset_clears_restored_output() {
        let mut engine = CalibrationEngine::new();
        engine.restore(Some(0.0), Some(50.0), Some(40.0));
        engine.reset();
        assert_eq!(engine.display_value(), None);
    }

    #[test]
    fn test_extreme_samples_stay_in_range() {
        let mut engine = CalibrationEngine::new();
        engine.ingest("-1e308");
        engine.ingest("1e308");
        assert_eq!(engine.output(), Some(100.0));

        engine.ingest("0");
        assert_eq!(engine.output(), Some(50.0));
    }
}
