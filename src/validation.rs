//! Small validators used by configuration checks.

use std::ops::RangeInclusive;
use std::time::Duration;

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates that a threshold is a finite, non-negative number.
pub fn is_valid_threshold(value: f64) -> Result<(), &'static str> {
    if !value.is_finite() {
        Err("Threshold must be finite")
    } else if value < 0.0 {
        Err("Threshold cannot be negative")
    } else {
        Ok(())
    }
}

/// Validates that a duration is longer than zero.
pub fn is_nonzero_duration(value: Duration) -> Result<(), &'static str> {
    if value.is_zero() {
        Err("Duration must be greater than zero")
    } else {
        Ok(())
    }
}
