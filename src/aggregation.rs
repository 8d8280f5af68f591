//! Grouped sums of a measure over one or more dimensions.
//!
//! A query is a measure column, a list of [`Dimension`]s and an optional [`RowFilter`].
//! Filters compose with [`RowFilter::All`], so new filtered views are just new queries.
//! Pivots and the zero-measure ranking are built on top of [`AggregationEngine::aggregate`].

use crate::error::Diagnostic;
use crate::schema::{columns, Dimension};
use crate::table::{DatedTable, NumericColumn};
use crate::utils::truncate_to_month;
use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const SECTION: &str = "aggregation";

/// One coordinate of a group key.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(untagged)]
pub enum DimensionValue {
    Period(NaiveDate),
    Text(String),
}

impl std::fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionValue::Period(date) => write!(f, "{}", date.format("%Y-%m")),
            DimensionValue::Text(text) => write!(f, "{}", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RowFilter {
    /// Rows whose derived date falls in the calendar year. Undated rows never match.
    Year(i32),
    /// Rows whose channel is one of the listed values (exact match).
    ChannelIn(Vec<String>),
    /// Rows whose measure equals the value exactly. Null measures never match.
    MeasureEquals(f64),
    /// Rows matching every inner filter.
    All(Vec<RowFilter>),
}

impl RowFilter {
    pub fn and(self, other: RowFilter) -> RowFilter {
        match self {
            RowFilter::All(mut filters) => {
                filters.push(other);
                RowFilter::All(filters)
            }
            first => RowFilter::All(vec![first, other]),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RowFilter::Year(year) => format!("year = {}", year),
            RowFilter::ChannelIn(channels) => format!("channel in [{}]", channels.join(", ")),
            RowFilter::MeasureEquals(value) => format!("measure = {}", value),
            RowFilter::All(filters) => filters
                .iter()
                .map(RowFilter::describe)
                .collect::<Vec<_>>()
                .join(" and "),
        }
    }

    fn uses_dates(&self) -> bool {
        match self {
            RowFilter::Year(_) => true,
            RowFilter::All(filters) => filters.iter().any(RowFilter::uses_dates),
            _ => false,
        }
    }

    fn uses_channel(&self) -> bool {
        match self {
            RowFilter::ChannelIn(_) => true,
            RowFilter::All(filters) => filters.iter().any(RowFilter::uses_channel),
            _ => false,
        }
    }

    fn matches(&self, ctx: &FilterContext<'_>, row: usize) -> bool {
        match self {
            RowFilter::Year(year) => ctx
                .view
                .date(row)
                .map(|date| date.year() == *year)
                .unwrap_or(false),
            RowFilter::ChannelIn(allowed) => ctx
                .channel
                .as_ref()
                .and_then(|channel| channel[row])
                .map(|value| allowed.iter().any(|a| a == value))
                .unwrap_or(false),
            RowFilter::MeasureEquals(target) => ctx.measure[row] == Some(*target),
            RowFilter::All(filters) => filters.iter().all(|f| f.matches(ctx, row)),
        }
    }
}

struct FilterContext<'a> {
    view: &'a DatedTable<'a>,
    channel: Option<Vec<Option<&'a str>>>,
    measure: &'a [Option<f64>],
}

/// Where the values of one grouping dimension come from.
enum KeySource<'a> {
    Period(&'a [Option<NaiveDate>]),
    Text(Vec<Option<&'a str>>),
}

impl KeySource<'_> {
    fn value(&self, row: usize) -> Option<DimensionValue> {
        match self {
            KeySource::Period(dates) => {
                dates[row].map(|d| DimensionValue::Period(truncate_to_month(d)))
            }
            KeySource::Text(values) => values[row].map(|v| DimensionValue::Text(v.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregationQuery {
    pub name: String,
    pub measure: String,
    pub group_by: Vec<Dimension>,
    pub filter: Option<RowFilter>,
}

impl AggregationQuery {
    pub fn new(name: &str, measure: &str, group_by: Vec<Dimension>) -> Self {
        Self {
            name: name.to_string(),
            measure: measure.to_string(),
            group_by,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GroupSum {
    pub key: Vec<DimensionValue>,
    pub total: f64,
    /// Rows that fell in the group, including those with a null measure.
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregationResult {
    pub name: String,
    pub measure: String,
    pub dimensions: Vec<Dimension>,
    /// Ascending by key.
    pub groups: Vec<GroupSum>,
    /// Rows that passed the filter (all rows when there is none).
    pub matched_rows: usize,
    /// The filter matched nothing. A zero total with matching rows leaves this false.
    pub empty_filter: bool,
    /// Rows dropped because the measure was not numeric.
    pub excluded_invalid: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl AggregationResult {
    fn unavailable(query: &AggregationQuery, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            name: query.name.clone(),
            measure: query.measure.clone(),
            dimensions: query.group_by.clone(),
            groups: Vec::new(),
            matched_rows: 0,
            empty_filter: false,
            excluded_invalid: 0,
            diagnostics,
        }
    }

    pub fn total(&self) -> f64 {
        self.groups.iter().map(|g| g.total).sum()
    }

    pub fn get(&self, key: &[DimensionValue]) -> Option<f64> {
        self.groups
            .iter()
            .find(|g| g.key == key)
            .map(|g| g.total)
    }
}

/// Dense matrix of a two-dimension aggregation. Missing combinations are 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PivotTable {
    pub name: String,
    pub row_dimension: Dimension,
    pub column_dimension: Dimension,
    pub row_keys: Vec<DimensionValue>,
    pub column_keys: Vec<DimensionValue>,
    /// `cells[r][c]` for `row_keys[r]` and `column_keys[c]`.
    pub cells: Vec<Vec<f64>>,
    pub empty_filter: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl PivotTable {
    /// Cell value, or `None` when either key is not on its axis.
    pub fn cell(&self, row: &DimensionValue, column: &DimensionValue) -> Option<f64> {
        let r = self.row_keys.iter().position(|k| k == row)?;
        let c = self.column_keys.iter().position(|k| k == column)?;
        Some(self.cells[r][c])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ZeroMeasureItem {
    pub item: String,
    pub zero_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ZeroMeasureReport {
    /// Most zero rows first.
    pub items: Vec<ZeroMeasureItem>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Measure values for a downstream distribution plot. Nulls and invalid cells removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MeasureSeries {
    pub measure: String,
    pub values: Vec<f64>,
    pub null_rows: usize,
    pub invalid_rows: usize,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct AggregationEngine<'a> {
    view: &'a DatedTable<'a>,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(view: &'a DatedTable<'a>) -> Self {
        Self { view }
    }

    pub fn aggregate(&self, query: &AggregationQuery) -> AggregationResult {
        self.run_query(query, true)
    }

    /// `report_empty` controls whether a filter matching nothing is logged and surfaced as
    /// a diagnostic. The result's `empty_filter` flag is set either way.
    fn run_query(&self, query: &AggregationQuery, report_empty: bool) -> AggregationResult {
        let table = self.view.table();
        let mut diagnostics = Vec::new();

        let measure = self.measure_column(&query.measure, &mut diagnostics);
        let sources: Vec<Option<KeySource<'_>>> = query
            .group_by
            .iter()
            .map(|dim| self.key_source(*dim, &mut diagnostics))
            .collect();

        let (Some(measure), Some(sources)) =
            (measure, sources.into_iter().collect::<Option<Vec<_>>>())
        else {
            return AggregationResult::unavailable(query, diagnostics);
        };

        let ctx = FilterContext {
            view: self.view,
            channel: table.text(columns::CHANNEL),
            measure: &measure.values,
        };
        if let Some(filter) = &query.filter {
            if filter.uses_dates() && !self.view.has_dates() {
                diagnostics.push(Diagnostic::missing_column(SECTION, columns::DATE));
            }
            if filter.uses_channel() && ctx.channel.is_none() {
                diagnostics.push(Diagnostic::missing_column(SECTION, columns::CHANNEL));
            }
        }

        let mut groups: BTreeMap<Vec<DimensionValue>, (f64, usize)> = BTreeMap::new();
        let mut matched_rows = 0;
        let mut excluded_invalid = 0;

        for row in 0..table.row_count() {
            if let Some(filter) = &query.filter {
                if !filter.matches(&ctx, row) {
                    continue;
                }
            }
            matched_rows += 1;

            if measure.is_invalid(row) {
                excluded_invalid += 1;
                continue;
            }

            let Some(key) = sources
                .iter()
                .map(|source| source.value(row))
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };

            let entry = groups.entry(key).or_insert((0.0, 0));
            if let Some(value) = measure.values[row] {
                entry.0 += value;
            }
            entry.1 += 1;
        }

        let empty_filter = query.filter.is_some() && matched_rows == 0;
        if let Some(filter) = query.filter.as_ref().filter(|_| empty_filter && report_empty) {
            warn!("View '{}': filter {} matched no rows", query.name, filter.describe());
            diagnostics.push(Diagnostic::EmptyFilterResult {
                view: query.name.clone(),
                filter: filter.describe(),
            });
        }
        if excluded_invalid > 0 {
            diagnostics.push(Diagnostic::invalid_numeric(
                SECTION,
                &query.measure,
                excluded_invalid,
            ));
        }

        debug!(
            "View '{}': {} matched rows in {} groups",
            query.name,
            matched_rows,
            groups.len()
        );

        AggregationResult {
            name: query.name.clone(),
            measure: query.measure.clone(),
            dimensions: query.group_by.clone(),
            groups: groups
                .into_iter()
                .map(|(key, (total, rows))| GroupSum { key, total, rows })
                .collect(),
            matched_rows,
            empty_filter,
            excluded_invalid,
            diagnostics,
        }
    }

    /// Aggregates over two dimensions and unstacks the second onto columns.
    pub fn pivot(
        &self,
        name: &str,
        measure: &str,
        row_dimension: Dimension,
        column_dimension: Dimension,
        filter: Option<RowFilter>,
    ) -> PivotTable {
        let mut query =
            AggregationQuery::new(name, measure, vec![row_dimension, column_dimension]);
        query.filter = filter;
        let result = self.aggregate(&query);

        let row_keys: Vec<DimensionValue> = result
            .groups
            .iter()
            .map(|g| g.key[0].clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let column_keys: Vec<DimensionValue> = result
            .groups
            .iter()
            .map(|g| g.key[1].clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut cells = vec![vec![0.0; column_keys.len()]; row_keys.len()];
        for group in &result.groups {
            let r = row_keys.binary_search(&group.key[0]);
            let c = column_keys.binary_search(&group.key[1]);
            if let (Ok(r), Ok(c)) = (r, c) {
                cells[r][c] = group.total;
            }
        }

        PivotTable {
            name: result.name,
            row_dimension,
            column_dimension,
            row_keys,
            column_keys,
            cells,
            empty_filter: result.empty_filter,
            diagnostics: result.diagnostics,
        }
    }

    /// Items ranked by how many of their rows have a measure of exactly zero.
    /// Items with the most zero-measure rows. A dataset with no zero rows gives an empty
    /// ranking, not an empty-filter diagnostic.
    pub fn zero_measure_items(&self, measure: &str, top_n: usize) -> ZeroMeasureReport {
        let query = AggregationQuery::new("zero_sales_by_item", measure, vec![Dimension::Item])
            .with_filter(RowFilter::MeasureEquals(0.0));
        let result = self.run_query(&query, false);

        let mut items: Vec<ZeroMeasureItem> = result
            .groups
            .into_iter()
            .filter_map(|group| match group.key.into_iter().next() {
                Some(DimensionValue::Text(item)) => Some(ZeroMeasureItem {
                    item,
                    zero_rows: group.rows,
                }),
                _ => None,
            })
            .collect();
        items.sort_by(|a, b| b.zero_rows.cmp(&a.zero_rows).then_with(|| a.item.cmp(&b.item)));
        items.truncate(top_n);

        ZeroMeasureReport {
            items,
            diagnostics: result.diagnostics,
        }
    }

    pub fn measure_series(&self, measure: &str) -> MeasureSeries {
        let mut diagnostics = Vec::new();
        let Some(column) = self.measure_column(measure, &mut diagnostics) else {
            return MeasureSeries {
                measure: measure.to_string(),
                values: Vec::new(),
                null_rows: 0,
                invalid_rows: 0,
                diagnostics,
            };
        };

        let values: Vec<f64> = column.values.iter().flatten().copied().collect();
        let invalid_rows = column.invalid_rows();
        if invalid_rows > 0 {
            diagnostics.push(Diagnostic::invalid_numeric(SECTION, measure, invalid_rows));
        }

        MeasureSeries {
            measure: measure.to_string(),
            null_rows: column.values.len() - values.len() - invalid_rows,
            values,
            invalid_rows,
            diagnostics,
        }
    }

    fn measure_column(
        &self,
        measure: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<NumericColumn> {
        let column = self.view.table().numeric(measure);
        if column.is_none() {
            warn!("Measure column '{}' not found in dataset", measure);
            diagnostics.push(Diagnostic::missing_column(SECTION, measure));
        }
        column
    }

    fn key_source(
        &self,
        dimension: Dimension,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<KeySource<'a>> {
        let source = match dimension.column() {
            None => self.view.dates().map(KeySource::Period),
            Some(column) => self.view.table().text(column).map(KeySource::Text),
        };
        if source.is_none() {
            warn!("Dimension column '{}' not found in dataset", dimension.label());
            diagnostics.push(Diagnostic::missing_column(SECTION, dimension.label()));
        }
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::PeriodParser;
    use crate::table::Table;

    fn ymd(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn text(v: &str) -> DimensionValue {
        DimensionValue::Text(v.to_string())
    }

    fn sales_table() -> Table {
        Table::from_strings(
            &[
                columns::PLANNING_MONTH,
                columns::BRAND,
                columns::CHANNEL,
                columns::COUNTRY,
                columns::ITEM,
                columns::SALES_UNITS,
            ],
            &[
                vec!["FY2024 - JANUARY", "Polo", "Retail", "US", "P1", "10"],
                vec!["FY2024 - JANUARY", "Lauren", "Outlet", "US", "P2", "5"],
                vec!["FY2024 - FEBRUARY", "Polo", "Retail", "UK", "P1", "0"],
                vec!["FY2025 - MARCH", "Polo", "Marketplace", "UK", "P3", "7"],
                vec!["garbage", "Lauren", "Retail", "", "P2", "0"],
                vec!["FY2024 - MARCH", "Polo", "Retail", "US", "P2", "oops"],
            ],
        )
    }

    #[test]
    fn test_group_by_single_dimension() {
        let table = sales_table();
        let attachment = PeriodParser::attach_dates(&table);
        let engine = AggregationEngine::new(&attachment.view);

        let result = engine.aggregate(&AggregationQuery::new(
            "by_brand",
            columns::SALES_UNITS,
            vec![Dimension::Brand],
        ));
        assert_eq!(result.get(&[text("Polo")]), Some(17.0));
        assert_eq!(result.get(&[text("Lauren")]), Some(5.0));
        assert_eq!(result.excluded_invalid, 1);
        assert!(result
            .diagnostics
            .contains(&Diagnostic::invalid_numeric("aggregation", columns::SALES_UNITS, 1)));
    }

    #[test]
    fn test_month_grouping_excludes_undated_rows() {
        let table = sales_table();
        let attachment = PeriodParser::attach_dates(&table);
        let engine = AggregationEngine::new(&attachment.view);

        let result = engine.aggregate(&AggregationQuery::new(
            "monthly",
            columns::SALES_UNITS,
            vec![Dimension::Month],
        ));
        let keys: Vec<&DimensionValue> = result.groups.iter().map(|g| &g.key[0]).collect();
        assert_eq!(
            keys,
            vec![
                &DimensionValue::Period(ymd(2024, 1)),
                &DimensionValue::Period(ymd(2024, 2)),
                &DimensionValue::Period(ymd(2025, 3)),
            ]
        );
        assert_eq!(result.total(), 22.0);
    }

    #[test]
    fn test_sums_invariant_to_row_order() {
        let table = sales_table();
        let mut rows = table.rows().to_vec();
        rows.reverse();
        let reversed = Table::new(table.columns().to_vec(), rows);

        let query = AggregationQuery::new(
            "brand_channel",
            columns::SALES_UNITS,
            vec![Dimension::Brand, Dimension::Channel],
        );
        let a = PeriodParser::attach_dates(&table);
        let b = PeriodParser::attach_dates(&reversed);

        assert_eq!(
            AggregationEngine::new(&a.view).aggregate(&query).groups,
            AggregationEngine::new(&b.view).aggregate(&query).groups
        );
    }

    #[test]
    fn test_pivot_fills_missing_cells_with_zero() {
        let table = sales_table();
        let attachment = PeriodParser::attach_dates(&table);
        let pivot = AggregationEngine::new(&attachment.view).pivot(
            "month_by_brand",
            columns::SALES_UNITS,
            Dimension::Month,
            Dimension::Brand,
            None,
        );

        assert_eq!(pivot.row_keys.len(), 3);
        assert_eq!(pivot.column_keys, vec![text("Lauren"), text("Polo")]);
        assert_eq!(
            pivot.cell(&DimensionValue::Period(ymd(2024, 1)), &text("Lauren")),
            Some(5.0)
        );
        assert_eq!(
            pivot.cell(&DimensionValue::Period(ymd(2024, 2)), &text("Lauren")),
            Some(0.0)
        );
        assert!(pivot.cells.iter().all(|row| row.len() == 2));
    }

    #[test]
    fn test_year_filter() {
        let table = sales_table();
        let attachment = PeriodParser::attach_dates(&table);
        let engine = AggregationEngine::new(&attachment.view);

        let query = AggregationQuery::new("country_2024", columns::SALES_UNITS, vec![Dimension::Country])
            .with_filter(RowFilter::Year(2024));
        let result = engine.aggregate(&query);

        assert_eq!(result.matched_rows, 4);
        assert_eq!(result.get(&[text("US")]), Some(15.0));
        assert_eq!(result.get(&[text("UK")]), Some(0.0));
        assert!(!result.empty_filter);
    }

    #[test]
    fn test_empty_filter_is_distinct_from_zero_sum() {
        let table = sales_table();
        let attachment = PeriodParser::attach_dates(&table);
        let engine = AggregationEngine::new(&attachment.view);

        let empty = engine.aggregate(
            &AggregationQuery::new("country_2030", columns::SALES_UNITS, vec![Dimension::Country])
                .with_filter(RowFilter::Year(2030)),
        );
        assert!(empty.empty_filter);
        assert!(empty.groups.is_empty());
        assert!(matches!(
            empty.diagnostics[0],
            Diagnostic::EmptyFilterResult { .. }
        ));

        let zero = engine.aggregate(
            &AggregationQuery::new("zero", columns::SALES_UNITS, vec![Dimension::Item])
                .with_filter(RowFilter::MeasureEquals(0.0)),
        );
        assert!(!zero.empty_filter);
        assert_eq!(zero.total(), 0.0);
    }

    #[test]
    fn test_channel_allow_list_composes_with_year() {
        let table = sales_table();
        let attachment = PeriodParser::attach_dates(&table);
        let engine = AggregationEngine::new(&attachment.view);

        let filter = RowFilter::ChannelIn(vec!["Retail".to_string(), "Outlet".to_string()])
            .and(RowFilter::Year(2024));
        assert_eq!(filter.describe(), "channel in [Retail, Outlet] and year = 2024");

        let result = engine.aggregate(
            &AggregationQuery::new("channels", columns::SALES_UNITS, vec![Dimension::Channel])
                .with_filter(filter),
        );
        assert_eq!(result.get(&[text("Retail")]), Some(10.0));
        assert_eq!(result.get(&[text("Outlet")]), Some(5.0));
        assert_eq!(result.get(&[text("Marketplace")]), None);
    }

    #[test]
    fn test_zero_measure_ranking() {
        let table = sales_table();
        let attachment = PeriodParser::attach_dates(&table);
        let report = AggregationEngine::new(&attachment.view)
            .zero_measure_items(columns::SALES_UNITS, 5);

        assert_eq!(
            report.items,
            vec![
                ZeroMeasureItem {
                    item: "P1".to_string(),
                    zero_rows: 1
                },
                ZeroMeasureItem {
                    item: "P2".to_string(),
                    zero_rows: 1
                },
            ]
        );
    }

    #[test]
    fn test_zero_measure_ranking_without_zero_rows_is_quiet() {
        let table = Table::from_strings(
            &[columns::ITEM, columns::SALES_UNITS],
            &[vec!["P1", "3"], vec!["P2", "4"]],
        );
        let view = DatedTable::undated(&table);
        let report = AggregationEngine::new(&view).zero_measure_items(columns::SALES_UNITS, 5);

        assert!(report.items.is_empty());
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_measure_series_drops_nulls_and_invalid() {
        let table = Table::from_strings(
            &[columns::SALES_UNITS],
            &[vec!["3"], vec![""], vec!["x"], vec!["4.5"]],
        );
        let view = DatedTable::undated(&table);
        let series = AggregationEngine::new(&view).measure_series(columns::SALES_UNITS);

        assert_eq!(series.values, vec![3.0, 4.5]);
        assert_eq!(series.null_rows, 1);
        assert_eq!(series.invalid_rows, 1);
    }

    #[test]
    fn test_missing_dimension_column() {
        let table = Table::from_strings(&[columns::SALES_UNITS], &[vec!["3"]]);
        let view = DatedTable::undated(&table);
        let engine = AggregationEngine::new(&view);

        let result = engine.aggregate(&AggregationQuery::new(
            "by_region",
            columns::SALES_UNITS,
            vec![Dimension::Region],
        ));
        assert!(result.groups.is_empty());
        assert_eq!(
            result.diagnostics,
            vec![Diagnostic::missing_column("aggregation", columns::REGION)]
        );

        let monthly = engine.aggregate(&AggregationQuery::new(
            "monthly",
            columns::SALES_UNITS,
            vec![Dimension::Month],
        ));
        assert_eq!(
            monthly.diagnostics,
            vec![Diagnostic::missing_column("aggregation", columns::DATE)]
        );
    }
}
