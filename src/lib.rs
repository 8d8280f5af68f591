//! # Forecast EDA
//!
//! A library for profiling a monthly sales-forecast export (one row per
//! product/region/channel/month) and deriving the summaries an analyst looks at first.
//!
//! ## Core Concepts
//!
//! - **Fiscal period label**: `FY2024 - JANUARY`, parsed once into a calendar date held
//!   next to the table (the table itself is never modified)
//! - **Quality profile**: shape, duplicates, nulls and semantic types per column, plus the
//!   cardinality of the key dimensions
//! - **Reconciliation**: evergreen / non-evergreen partitions and rows whose reported
//!   revenue is more than 20 away from units x AUR
//! - **Horizon**: the months covered by the data
//! - **Aggregations**: sums of unit sales grouped by month, brand, region, channel,
//!   country or plan level, optionally filtered
//!
//! Problems with the data never abort the run. Each section reports them as
//! [`Diagnostic`]s next to whatever it could compute.
//!
//! ## Example
//!
//! ```rust,ignore
//! use forecast_eda::*;
//!
//! let table = read_csv_path("forecast.csv")?;
//! let report = run_eda(&table, &EdaConfig::default())?;
//!
//! println!("duplicates: {}", report.quality.duplicate_rows);
//! for diagnostic in report.all_diagnostics() {
//!     println!("{}", diagnostic);
//! }
//! ```

pub mod aggregation;
pub mod error;
pub mod horizon;
pub mod ingestion;
pub mod period;
pub mod quality;
pub mod reconciliation;
pub mod schema;
pub mod table;
pub mod utils;

pub use aggregation::{
    AggregationEngine, AggregationQuery, AggregationResult, DimensionValue, GroupSum,
    MeasureSeries, PivotTable, RowFilter, ZeroMeasureItem, ZeroMeasureReport,
};
pub use error::{Diagnostic, EdaError, Result};
pub use horizon::{HorizonAnalyzer, HorizonReport, HorizonSummary, PeriodCount};
pub use ingestion::{read_csv, read_csv_path};
pub use period::{parse_fiscal_period, DateAttachment, ParseSummary, PeriodParser};
pub use quality::{ColumnCount, ColumnType, QualityProfile, QualityProfiler, Shape};
pub use reconciliation::{
    EvergreenDistribution, EvergreenStatus, FlaggedRow, PartitionSummary, ReconciliationEngine,
    ReconciliationReport, ACCURACY_TOLERANCE,
};
pub use schema::*;
pub use table::{DatedTable, Table};

use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Everything produced by one run over one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EdaReport {
    /// `None` when the planning-month column is missing.
    pub parse: Option<ParseSummary>,
    pub quality: QualityProfile,
    pub reconciliation: ReconciliationReport,
    pub horizon: HorizonReport,
    pub aggregations: Vec<AggregationResult>,
    pub pivots: Vec<PivotTable>,
    pub zero_sales: ZeroMeasureReport,
    pub measure_series: MeasureSeries,
    /// Diagnostics raised while attaching dates.
    pub diagnostics: Vec<Diagnostic>,
}

impl EdaReport {
    pub fn aggregation(&self, name: &str) -> Option<&AggregationResult> {
        self.aggregations.iter().find(|a| a.name == name)
    }

    pub fn pivot(&self, name: &str) -> Option<&PivotTable> {
        self.pivots.iter().find(|p| p.name == name)
    }

    /// Diagnostics from every section, pipeline-level ones first.
    pub fn all_diagnostics(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .chain(&self.reconciliation.diagnostics)
            .chain(&self.horizon.diagnostics)
            .chain(self.aggregations.iter().flat_map(|a| &a.diagnostics))
            .chain(self.pivots.iter().flat_map(|p| &p.diagnostics))
            .chain(&self.zero_sales.diagnostics)
            .chain(&self.measure_series.diagnostics)
            .collect()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EdaReport)
    }
}

pub struct EdaProcessor;

impl EdaProcessor {
    pub fn run(table: &Table, config: &EdaConfig) -> Result<EdaReport> {
        config.validate()?;

        info!(
            "Running EDA over {} rows and {} columns",
            table.row_count(),
            table.column_count()
        );

        let DateAttachment {
            view,
            summary,
            diagnostics,
        } = PeriodParser::attach_dates(table);

        let quality = QualityProfiler::new(&view).profile();
        let reconciliation = ReconciliationEngine::new(&view).reconcile();
        let horizon = HorizonAnalyzer::new(&view).analyze();

        let engine = AggregationEngine::new(&view);
        let aggregations: Vec<AggregationResult> = Self::standard_queries(config)
            .iter()
            .map(|query| engine.aggregate(query))
            .collect();
        let pivots = vec![engine.pivot(
            "monthly_volume_by_brand",
            &config.measure,
            Dimension::Month,
            Dimension::Brand,
            None,
        )];
        let zero_sales = engine.zero_measure_items(&config.measure, config.zero_sales_top_n);
        let measure_series = engine.measure_series(&config.measure);

        let report = EdaReport {
            parse: summary,
            quality,
            reconciliation,
            horizon,
            aggregations,
            pivots,
            zero_sales,
            measure_series,
            diagnostics,
        };

        let all_diagnostics = report.all_diagnostics();
        for diagnostic in &all_diagnostics {
            debug!("EDA diagnostic: {}", diagnostic);
        }
        info!("EDA completed with {} diagnostic(s)", all_diagnostics.len());

        Ok(report)
    }

    /// The grouped views a dashboard asks for on every run.
    pub fn standard_queries(config: &EdaConfig) -> Vec<AggregationQuery> {
        let measure = config.measure.as_str();
        vec![
            AggregationQuery::new("monthly_volume", measure, vec![Dimension::Month]),
            AggregationQuery::new("volume_by_region", measure, vec![Dimension::Region]),
            AggregationQuery::new("volume_by_channel", measure, vec![Dimension::Channel]),
            AggregationQuery::new("volume_by_plan_l1", measure, vec![Dimension::PlanL1]),
            AggregationQuery::new("volume_by_country_in_year", measure, vec![Dimension::Country])
                .with_filter(RowFilter::Year(config.focus_year)),
            AggregationQuery::new("volume_by_allowed_channel", measure, vec![Dimension::Channel])
                .with_filter(RowFilter::ChannelIn(config.channel_allow_list.clone())),
        ]
    }
}

pub fn run_eda(table: &Table, config: &EdaConfig) -> Result<EdaReport> {
    EdaProcessor::run(table, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_rejects_invalid_config() {
        let table = Table::from_strings(&["x"], &[]);
        let config = EdaConfig {
            zero_sales_top_n: 0,
            ..EdaConfig::default()
        };
        assert!(matches!(
            run_eda(&table, &config),
            Err(EdaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_table_degrades_per_section() {
        let table = Table::from_strings(&["Unrelated"], &[]);
        let report = run_eda(&table, &EdaConfig::default()).unwrap();

        assert!(report.parse.is_none());
        assert_eq!(report.quality.shape, Shape { rows: 0, columns: 1 });
        assert!(report.horizon.summary.is_none());
        assert!(report.reconciliation.flagged.is_none());
        assert!(report
            .all_diagnostics()
            .iter()
            .all(|d| matches!(d, Diagnostic::MissingColumn { .. })));
    }

    #[test]
    fn test_empty_cells_count_as_missing() {
        let table = Table::new(
            vec![
                schema::columns::REGION.to_string(),
                schema::columns::SALES_UNITS.to_string(),
            ],
            vec![
                vec![Some(String::new()), Some(String::new())],
                vec![Some("EMEA".to_string()), Some("3".to_string())],
            ],
        );
        let report = run_eda(&table, &EdaConfig::default()).unwrap();

        assert_eq!(report.quality.missing_for(schema::columns::REGION), Some(1));
        assert_eq!(report.quality.missing_for(schema::columns::SALES_UNITS), Some(1));
        assert_eq!(report.quality.cardinality_for(schema::columns::REGION), Some(1));
        assert!(!report
            .all_diagnostics()
            .iter()
            .any(|d| matches!(d, Diagnostic::InvalidNumeric { .. })));
    }

    #[test]
    fn test_run_over_deserialized_ragged_table() {
        let table: Table = serde_json::from_str(
            r#"{"columns":["a","Sales (Units)"],"rows":[["x"],["y","4"]]}"#,
        )
        .unwrap();
        let report = run_eda(&table, &EdaConfig::default()).unwrap();

        assert_eq!(report.quality.shape, Shape { rows: 2, columns: 2 });
        assert_eq!(report.quality.missing_for(schema::columns::SALES_UNITS), Some(1));
        assert_eq!(report.measure_series.values, vec![4.0]);
    }

    #[test]
    fn test_standard_queries_use_config() {
        let config = EdaConfig {
            focus_year: 2025,
            ..EdaConfig::default()
        };
        let queries = EdaProcessor::standard_queries(&config);
        let by_country = queries
            .iter()
            .find(|q| q.name == "volume_by_country_in_year")
            .unwrap();
        assert_eq!(by_country.filter, Some(RowFilter::Year(2025)));
    }

    #[test]
    fn test_report_schema_and_json() {
        let table = Table::from_strings(
            &[schema::columns::PLANNING_MONTH, schema::columns::SALES_UNITS],
            &[vec!["FY2024 - MAY", "3"]],
        );
        let report = run_eda(&table, &EdaConfig::default()).unwrap();
        let json = report.to_json_pretty().unwrap();
        assert!(json.contains("monthly_volume"));

        let schema = serde_json::to_value(EdaReport::json_schema()).unwrap();
        assert!(schema["properties"]["quality"].is_object());
    }
}
