//! Plain-text recordings: one value per line, `#` comments and blank lines ignored.

use crate::signal::{Events, RawSignal};
use anyhow::{Context, Result};
use std::{fmt::Display, path::Path, str::FromStr};

fn parse_lines<T>(text: &str, what: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val = trimmed.parse::<T>().map_err(|e| {
            anyhow::anyhow!("line {} is not {}: {} ({})", idx + 1, what, trimmed, e)
        })?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no {} values found", what);
    }
    Ok(out)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Parse a recording of integer ADC codes.
pub fn parse_adc_series(text: &str) -> Result<Vec<i32>> {
    parse_lines(text, "an ADC code")
}

pub fn read_raw_signal(path: &Path, fs: u32) -> Result<RawSignal> {
    let samples = parse_adc_series(&read_text(path)?)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(RawSignal::new(fs, samples))
}

/// Parse newline-delimited floating point series, e.g. an already filtered trace.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    parse_lines(text, "f64")
}

pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    parse_f64_series(&read_text(path)?).with_context(|| format!("parsing {}", path.display()))
}

/// Parse newline-delimited R-peak sample indices.
pub fn parse_event_indices(text: &str) -> Result<Events> {
    parse_lines(text, "an integer index").map(Events::from_indices)
}

pub fn read_event_indices(path: &Path) -> Result<Events> {
    parse_event_indices(&read_text(path)?)
        .with_context(|| format!("parsing {}", path.display()))
}

/// One value per line, the format the readers above accept.
pub fn format_series<T: Display>(values: &[T]) -> String {
    let mut out = String::with_capacity(values.len() * 8);
    for v in values {
        out.push_str(&v.to_string());
        out.push('\n');
    }
    out
}
