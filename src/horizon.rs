use crate::error::Diagnostic;
use crate::schema::columns;
use crate::table::DatedTable;
use crate::utils::{months_between, truncate_to_month};
use chrono::NaiveDate;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodCount {
    pub period: NaiveDate,
    pub records: usize,
}

/// Calendar span of the data. Every scalar is `None` when no row carries a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HorizonSummary {
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub distinct_months: Option<usize>,
    pub duration_months: Option<i32>,
    /// Rows per calendar month, ascending.
    pub period_counts: Vec<PeriodCount>,
}

impl HorizonSummary {
    fn undefined() -> Self {
        Self {
            min_date: None,
            max_date: None,
            distinct_months: None,
            duration_months: None,
            period_counts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HorizonReport {
    pub summary: Option<HorizonSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct HorizonAnalyzer<'a> {
    view: &'a DatedTable<'a>,
}

impl<'a> HorizonAnalyzer<'a> {
    pub fn new(view: &'a DatedTable<'a>) -> Self {
        Self { view }
    }

    pub fn analyze(&self) -> HorizonReport {
        let Some(dates) = self.view.dates() else {
            warn!("Horizon check skipped: no derived date column");
            return HorizonReport {
                summary: None,
                diagnostics: vec![Diagnostic::missing_column("horizon", columns::DATE)],
            };
        };

        let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for date in dates.iter().flatten() {
            *counts.entry(truncate_to_month(*date)).or_default() += 1;
        }

        let (Some(min_date), Some(max_date)) = (
            dates.iter().flatten().min().copied(),
            dates.iter().flatten().max().copied(),
        ) else {
            debug!("Horizon undefined: no row has a parsed date");
            return HorizonReport {
                summary: Some(HorizonSummary::undefined()),
                diagnostics: Vec::new(),
            };
        };

        debug!(
            "Horizon spans {} to {} across {} months",
            min_date,
            max_date,
            counts.len()
        );

        HorizonReport {
            summary: Some(HorizonSummary {
                min_date: Some(min_date),
                max_date: Some(max_date),
                distinct_months: Some(counts.len()),
                duration_months: Some(months_between(min_date, max_date)),
                period_counts: counts
                    .into_iter()
                    .map(|(period, records)| PeriodCount { period, records })
                    .collect(),
            }),
            diagnostics: Vec::new(),
        }
    }
}
