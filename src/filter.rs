//! Theoretical profit pre-filter.
//!
//! A cheap threshold test applied to every terminal chain before the
//! expensive book-validation pass. The same formula also gates the
//! book-validated value, so one definition holds everywhere:
//!
//! ```text
//! diff = 1 - funding / value      (0 = breakeven, positive = profit)
//! ```

/// Profit fraction of `value` relative to the starting `funding` amount.
pub fn profit_diff(funding: f64, value: f64) -> f64 {
    1.0 - funding / value
}

/// Normalize a configured trigger into a fraction.
///
/// Values of 1.0 or above are read as whole-number percents (2 -> 0.02);
/// anything below 1.0 is already a fraction.
pub fn normalize_trigger(raw: f64) -> f64 {
    if raw >= 1.0 {
        raw / 100.0
    } else {
        raw
    }
}

/// Accept a chain whose terminal `value` clears the (normalized) trigger.
pub fn clears_trigger(funding: f64, value: f64, trigger: f64) -> bool {
    if !value.is_finite() || value <= 0.0 {
        return false;
    }
    profit_diff(funding, value) >= trigger
}
