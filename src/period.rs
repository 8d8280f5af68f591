//! Fiscal-period label parsing.
//!
//! Labels look like `FY2024 - JANUARY`. The year comes from the last four characters of
//! the `FY` token and the month name is looked up case-insensitively. A month name that is
//! not one of the twelve English names maps to [`DEFAULT_MONTH`]; a label that does not
//! match the pattern at all yields no date.

use crate::error::Diagnostic;
use crate::schema::columns;
use crate::table::{DatedTable, Table};
use crate::utils::month_start;
use chrono::NaiveDate;
use log::{debug, warn};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const MONTH_NAMES: [&str; 12] = [
    "JANUARY",
    "FEBRUARY",
    "MARCH",
    "APRIL",
    "MAY",
    "JUNE",
    "JULY",
    "AUGUST",
    "SEPTEMBER",
    "OCTOBER",
    "NOVEMBER",
    "DECEMBER",
];

/// Month used when the label's month name is not recognised.
pub const DEFAULT_MONTH: u32 = 1;

const PREVIEW_ROWS: usize = 5;

fn fiscal_label_regex() -> &'static Regex {
    static FISCAL_LABEL_RE: OnceLock<Regex> = OnceLock::new();
    FISCAL_LABEL_RE.get_or_init(|| {
        Regex::new(r"(FY[0-9]{4})\s*-\s*(\w+)").expect("fiscal label regex should compile")
    })
}

/// Maps an English month name (any case) to 1..=12, falling back to [`DEFAULT_MONTH`].
pub fn month_number(name: &str) -> u32 {
    let upper = name.trim().to_uppercase();
    MONTH_NAMES
        .iter()
        .position(|m| *m == upper)
        .map(|idx| idx as u32 + 1)
        .unwrap_or(DEFAULT_MONTH)
}

/// Parses a fiscal-period label into the first day of its month.
pub fn parse_fiscal_period(label: &str) -> Option<NaiveDate> {
    let caps = fiscal_label_regex().captures(label)?;
    let year_token = caps.get(1)?.as_str();
    let month_name = caps.get(2)?.as_str();

    let year: i32 = year_token[year_token.len() - 4..].parse().ok()?;
    month_start(year, month_number(month_name))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatePreview {
    pub label: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParseSummary {
    pub column: String,
    pub parsed: usize,
    /// Non-null labels that did not match the pattern.
    pub unparsed: usize,
    pub null_labels: usize,
    /// First few labels that produced a date.
    pub preview: Vec<DatePreview>,
}

/// Result of attaching derived dates to a table.
#[derive(Debug, Clone)]
pub struct DateAttachment<'a> {
    pub view: DatedTable<'a>,
    pub summary: Option<ParseSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct PeriodParser;

impl PeriodParser {
    /// Derives one date per row from the planning-month column.
    ///
    /// A missing column is reported once and the view carries no date column; rows whose
    /// label does not parse get `None`.
    pub fn attach_dates(table: &Table) -> DateAttachment<'_> {
        let Some(labels) = table.text(columns::PLANNING_MONTH) else {
            warn!(
                "Could not parse planning month: column '{}' not found",
                columns::PLANNING_MONTH
            );
            return DateAttachment {
                view: DatedTable::undated(table),
                summary: None,
                diagnostics: vec![Diagnostic::missing_column(
                    "period",
                    columns::PLANNING_MONTH,
                )],
            };
        };

        let mut null_labels = 0;
        let mut unparsed = 0;
        let mut preview = Vec::new();

        let dates: Vec<Option<NaiveDate>> = labels
            .iter()
            .map(|label| {
                let Some(label) = label else {
                    null_labels += 1;
                    return None;
                };
                let date = parse_fiscal_period(label);
                match date {
                    Some(date) if preview.len() < PREVIEW_ROWS => preview.push(DatePreview {
                        label: label.to_string(),
                        date,
                    }),
                    Some(_) => {}
                    None => unparsed += 1,
                }
                date
            })
            .collect();

        let parsed = dates.iter().filter(|d| d.is_some()).count();
        debug!(
            "Parsed {} planning months ({} unparsed, {} null)",
            parsed, unparsed, null_labels
        );

        let mut diagnostics = Vec::new();
        if unparsed > 0 {
            diagnostics.push(Diagnostic::ParseFailure {
                column: columns::PLANNING_MONTH.to_string(),
                rows: unparsed,
            });
        }

        DateAttachment {
            view: DatedTable::new(table, Some(dates)),
            summary: Some(ParseSummary {
                column: columns::PLANNING_MONTH.to_string(),
                parsed,
                unparsed,
                null_labels,
                preview,
            }),
            diagnostics,
        }
    }
}
