use crate::error::Diagnostic;
use crate::schema::columns;
use crate::table::{DatedTable, NumericColumn};
use chrono::NaiveDate;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Largest accepted gap between units x price and the reported revenue.
pub const ACCURACY_TOLERANCE: f64 = 20.0;

pub const EVERGREEN: &str = "EVERGREEN";
pub const NON_EVERGREEN: &str = "NON EVERGREEN";

const SECTION: &str = "reconciliation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvergreenStatus {
    Evergreen,
    NonEvergreen,
    /// Any value outside the two canonical categories, including null.
    Other,
}

/// Trims and upper-cases the raw status before comparing it with the canonical names.
pub fn classify_evergreen(raw: Option<&str>) -> EvergreenStatus {
    match raw.map(|v| v.trim().to_uppercase()).as_deref() {
        Some(EVERGREEN) => EvergreenStatus::Evergreen,
        Some(NON_EVERGREEN) => EvergreenStatus::NonEvergreen,
        _ => EvergreenStatus::Other,
    }
}

/// Sales-volume dollars for one row. `None` unless both inputs are present.
pub fn sales_volume_dollars(units: Option<f64>, price: Option<f64>) -> Option<f64> {
    units.zip(price).map(|(u, p)| u * p)
}

/// True when both sides are defined and differ by more than [`ACCURACY_TOLERANCE`].
pub fn is_inaccurate(expected: Option<f64>, reported: Option<f64>) -> bool {
    match (expected, reported) {
        (Some(expected), Some(reported)) => (expected - reported).abs() > ACCURACY_TOLERANCE,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EvergreenDistribution {
    pub evergreen: usize,
    pub non_evergreen: usize,
    pub excluded: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PartitionSummary {
    pub category: EvergreenStatus,
    pub rows: usize,
    /// Sums skip null and non-numeric cells. `None` when the source column is absent.
    pub units: Option<f64>,
    pub sales_volume_dollars: Option<f64>,
    pub reported_revenue: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlaggedRow {
    /// Zero-based position in the input table.
    pub row: usize,
    pub date: Option<NaiveDate>,
    pub item: Option<String>,
    pub units: f64,
    pub price: f64,
    pub reported_revenue: f64,
    pub expected_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReconciliationReport {
    pub distribution: Option<EvergreenDistribution>,
    /// Evergreen then non-evergreen.
    pub partitions: Option<Vec<PartitionSummary>>,
    /// Rows failing the accuracy check, in input order.
    pub flagged: Option<Vec<FlaggedRow>>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ReconciliationEngine<'a> {
    view: &'a DatedTable<'a>,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(view: &'a DatedTable<'a>) -> Self {
        Self { view }
    }

    pub fn reconcile(&self) -> ReconciliationReport {
        let mut diagnostics = Vec::new();

        let units = self.numeric_input(columns::SALES_UNITS, &mut diagnostics);
        let price = self.numeric_input(columns::ACTUAL_AUR, &mut diagnostics);
        let revenue = self.numeric_input(columns::SALES_REVENUE, &mut diagnostics);

        let svd: Option<Vec<Option<f64>>> = match (&units, &price) {
            (Some(units), Some(price)) => Some(
                units
                    .values
                    .iter()
                    .zip(&price.values)
                    .map(|(u, p)| sales_volume_dollars(*u, *p))
                    .collect(),
            ),
            _ => None,
        };

        let (distribution, partitions) = match self.view.table().text(columns::EVERGREEN) {
            Some(raw) => {
                let statuses: Vec<EvergreenStatus> =
                    raw.into_iter().map(classify_evergreen).collect();
                let distribution = distribution_of(&statuses);
                let partitions = [EvergreenStatus::Evergreen, EvergreenStatus::NonEvergreen]
                    .into_iter()
                    .map(|category| {
                        partition_summary(
                            category,
                            &statuses,
                            units.as_ref().map(|c| c.values.as_slice()),
                            svd.as_deref(),
                            revenue.as_ref().map(|c| c.values.as_slice()),
                        )
                    })
                    .collect();
                (Some(distribution), Some(partitions))
            }
            None => {
                warn!("Column '{}' not found in dataset", columns::EVERGREEN);
                diagnostics.push(Diagnostic::missing_column(SECTION, columns::EVERGREEN));
                (None, None)
            }
        };

        let flagged = match (&units, &price, &revenue, &svd) {
            (Some(units), Some(price), Some(revenue), Some(svd)) => {
                Some(self.flag_rows(units, price, revenue, svd))
            }
            _ => None,
        };

        if let Some(flagged) = &flagged {
            debug!(
                "{} row(s) exceed the revenue tolerance of {}",
                flagged.len(),
                ACCURACY_TOLERANCE
            );
        }

        ReconciliationReport {
            distribution,
            partitions,
            flagged,
            diagnostics,
        }
    }

    fn numeric_input(
        &self,
        column: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<NumericColumn> {
        match self.view.table().numeric(column) {
            Some(values) => {
                if values.invalid_rows() > 0 {
                    diagnostics.push(Diagnostic::invalid_numeric(
                        SECTION,
                        column,
                        values.invalid_rows(),
                    ));
                }
                Some(values)
            }
            None => {
                warn!("Column '{}' not found in dataset", column);
                diagnostics.push(Diagnostic::missing_column(SECTION, column));
                None
            }
        }
    }

    fn flag_rows(
        &self,
        units: &NumericColumn,
        price: &NumericColumn,
        revenue: &NumericColumn,
        svd: &[Option<f64>],
    ) -> Vec<FlaggedRow> {
        let table = self.view.table();
        svd.iter()
            .zip(&revenue.values)
            .enumerate()
            .filter(|(_, (expected, reported))| is_inaccurate(**expected, **reported))
            .filter_map(|(row, (expected, reported))| {
                Some(FlaggedRow {
                    row,
                    date: self.view.date(row),
                    item: table.value(row, columns::ITEM).map(|s| s.to_string()),
                    units: units.values[row]?,
                    price: price.values[row]?,
                    reported_revenue: (*reported)?,
                    expected_revenue: (*expected)?,
                })
            })
            .collect()
    }
}

fn distribution_of(statuses: &[EvergreenStatus]) -> EvergreenDistribution {
    let count = |wanted: EvergreenStatus| statuses.iter().filter(|s| **s == wanted).count();
    EvergreenDistribution {
        evergreen: count(EvergreenStatus::Evergreen),
        non_evergreen: count(EvergreenStatus::NonEvergreen),
        excluded: count(EvergreenStatus::Other),
    }
}

fn partition_summary(
    category: EvergreenStatus,
    statuses: &[EvergreenStatus],
    units: Option<&[Option<f64>]>,
    svd: Option<&[Option<f64>]>,
    revenue: Option<&[Option<f64>]>,
) -> PartitionSummary {
    let members: Vec<usize> = statuses
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == category)
        .map(|(idx, _)| idx)
        .collect();

    let sum = |values: Option<&[Option<f64>]>| {
        values.map(|values| members.iter().filter_map(|&idx| values[idx]).sum::<f64>())
    };

    PartitionSummary {
        category,
        rows: members.len(),
        units: sum(units),
        sales_volume_dollars: sum(svd),
        reported_revenue: sum(revenue),
    }
}
