use anyhow::Result;
use chrono::{Local, NaiveDate};
use chrono_english::{parse_date_string, Dialect};

/// Parses an ISO date or a phrase like "next friday" into a calendar day.
pub fn parse_date(date_str: &str) -> Result<NaiveDate> {
    let trimmed = date_str.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    parse_date_string(trimmed, Local::now(), Dialect::Us)
        .map(|dt| dt.date_naive())
        .map_err(|e| anyhow::anyhow!("Failed to parse date '{}': {}", date_str, e))
}

/// Parses an opacity between 0 and 1.
pub fn parse_opacity(value: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&value) {
        anyhow::bail!("Opacity must be between 0 and 1, got {}", value);
    }
    Ok(value)
}
