//! Raw sample parsing and percentage math

/// States a source reports while it has no reading.
pub const PLACEHOLDER_STATES: [&str; 2] = ["unavailable", "unknown"];

/// Parse a textual source state into a usable sample.
///
/// Surrounding whitespace is ignored. Non-finite values (`nan`, `inf`) are
/// rejected along with anything that is not a number.
pub fn parse_raw_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Whether the state is one of the host's "no reading" placeholders.
pub fn is_placeholder_state(raw: &str) -> bool {
    PLACEHOLDER_STATES.contains(&raw.trim())
}

/// Rescale `raw` into `[0, 100]` against the learned bounds.
///
/// A degenerate range (`min == max`) yields exactly `0.0`. Operands are
/// halved before subtracting so bounds near `f64::MAX` cannot overflow.
pub fn normalize(raw: f64, min: f64, max: f64) -> f64 {
    if min == max {
        return 0.0;
    }

    let percent = ((raw / 2.0 - min / 2.0) / (max / 2.0 - min / 2.0)) * 100.0;
    // `max`/`min` instead of `clamp`: a NaN maps to 0
    round_one_decimal(percent.max(0.0).min(100.0))
}

/// Round half away from zero to one decimal place.
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
