//! Parameter validation helpers shared by the DAO façades.
//!
//! Every helper fails with a business `invalid_parameter` or `missing_field`
//! error naming the offending key.

use crate::error::{DaoError, Result};

/// `value` must lie in `min..=max`
pub fn check_integer(key: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(DaoError::invalid_parameter(format!(
            "\"{key}\" must be an integer between {min} and {max} (got {value})"
        )));
    }
    Ok(())
}

/// `value` must lie in `min..=max` and be a finite number
pub fn check_number(key: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(DaoError::invalid_parameter(format!(
            "\"{key}\" must be a number between {min} and {max} (got {value})"
        )));
    }
    Ok(())
}

/// `value` must not be empty
pub fn check_non_empty(key: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(DaoError::missing_field(format!("\"{key}\" must be a non-empty string")));
    }
    Ok(())
}

/// Item count within bounds, and no empty item
pub fn check_string_list<S: AsRef<str>>(
    key: &str,
    values: &[S],
    min: usize,
    max: Option<usize>,
) -> Result<()> {
    if values.len() < min || max.is_some_and(|max| values.len() > max) {
        let bounds = match max {
            Some(max) if max == min => format!("exactly {min}"),
            Some(max) => format!("between {min} and {max}"),
            None => format!("at least {min}"),
        };
        return Err(DaoError::invalid_parameter(format!(
            "\"{key}\" must contain {bounds} item(s) (got {})",
            values.len()
        )));
    }
    if values.iter().any(|v| v.as_ref().is_empty()) {
        return Err(DaoError::invalid_parameter(format!(
            "\"{key}\" must not contain empty strings"
        )));
    }
    Ok(())
}

/// `value` must be one of `allowed`
pub fn check_values(key: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if !allowed.contains(&value) {
        return Err(DaoError::invalid_parameter(format!(
            "\"{key}\" must be one of: {} (got \"{value}\")",
            allowed.join(", ")
        )));
    }
    Ok(())
}

/// At most one of the named options may be set
pub fn check_exclusive(keys: &[(&str, bool)]) -> Result<()> {
    let set: Vec<&str> = keys.iter().filter(|(_, set)| *set).map(|(k, _)| *k).collect();
    if set.len() > 1 {
        return Err(DaoError::invalid_parameter(format!(
            "{} are mutually exclusive",
            set.iter()
                .map(|k| format!("\"{k}\""))
                .collect::<Vec<_>>()
                .join(" and ")
        )));
    }
    Ok(())
}
