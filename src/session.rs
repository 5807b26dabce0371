//! Parsing of interactive selections (`COUNTRY[;START;END[;COMPARE]]`).

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;

use crate::metrics::{DateAxis, DateRange};
use crate::summary::default_window;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub country: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub compare: Option<String>,
}

impl Selection {
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split(';').map(str::trim).collect();
        let country = parts[0];
        if country.is_empty() {
            bail!("missing country name");
        }
        if parts.len() > 4 {
            bail!("expected COUNTRY[;START;END[;COMPARE]], got {} fields", parts.len());
        }

        let date = |idx: usize| -> Result<Option<NaiveDate>> {
            match parts.get(idx).copied() {
                None | Some("") => Ok(None),
                Some(raw) => raw
                    .parse()
                    .map(Some)
                    .with_context(|| format!("invalid date {raw:?}, expected YYYY-MM-DD")),
            }
        };

        Ok(Self {
            country: country.to_string(),
            start: date(1)?,
            end: date(2)?,
            compare: parts
                .get(3)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
        })
    }

    /// The requested window, falling back to the default window for any bound
    /// not given.
    pub fn window(&self, axis: &DateAxis) -> Option<DateRange> {
        resolve_window(axis, self.start, self.end)
    }
}

/// Fills missing bounds from [`default_window`].
pub fn resolve_window(
    axis: &DateAxis,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Option<DateRange> {
    let default = default_window(axis)?;
    Some(DateRange::new(
        start.unwrap_or(default.start),
        end.unwrap_or(default.end),
    ))
}
