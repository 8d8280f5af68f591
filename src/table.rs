use crate::schema::columns;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single field value. `None` is a null/empty cell.
pub type Cell = Option<String>;

/// An in-memory table: one header, rows of optional raw values.
///
/// Columns are addressed by exact name and may be absent, so every column accessor
/// returns an `Option`. Every row holds exactly one cell per column, including tables
/// read back from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(from = "TableRecord")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

#[derive(Deserialize)]
struct TableRecord {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl From<TableRecord> for Table {
    fn from(record: TableRecord) -> Self {
        Table::new(record.columns, record.rows)
    }
}

/// A column read as numbers. Unparseable cells are `None` and their row positions are
/// listed in `invalid`.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    pub values: Vec<Option<f64>>,
    pub invalid: Vec<usize>,
}

impl NumericColumn {
    pub fn invalid_rows(&self) -> usize {
        self.invalid.len()
    }

    pub fn is_invalid(&self, row: usize) -> bool {
        self.invalid.binary_search(&row).is_ok()
    }
}

impl Table {
    /// Builds a table. Rows shorter than the header are padded with nulls, longer rows
    /// are truncated, so every row has exactly one cell per column. Empty strings are
    /// stored as nulls.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|row| {
                let mut row: Vec<Cell> = row
                    .into_iter()
                    .map(|cell| cell.filter(|v| !v.is_empty()))
                    .collect();
                row.resize(width, None);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Convenience constructor from string literals; empty strings become nulls.
    pub fn from_strings(columns: &[&str], rows: &[Vec<&str>]) -> Self {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|v| Some(v.to_string())).collect())
            .collect();
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Raw values of a column, or `None` when the column is absent.
    pub fn text(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_deref()).collect())
    }

    /// Values of a column parsed as `f64`, or `None` when the column is absent.
    pub fn numeric(&self, name: &str) -> Option<NumericColumn> {
        let idx = self.column_index(name)?;
        let mut invalid = Vec::new();
        let values = self
            .rows
            .iter()
            .enumerate()
            .map(|(pos, row)| match row[idx].as_deref() {
                None => None,
                Some(raw) => {
                    let parsed = parse_number(raw);
                    if parsed.is_none() && !is_nan_literal(raw) {
                        invalid.push(pos);
                    }
                    parsed
                }
            })
            .collect();
        Some(NumericColumn { values, invalid })
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }
}

/// Parses a numeric cell. `NaN` parses to `None` so it behaves as a null.
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

pub(crate) fn is_nan_literal(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("nan")
}

/// The input table plus the derived calendar date of each row.
///
/// The source table is only borrowed; the date column is an addition held alongside it.
#[derive(Debug, Clone)]
pub struct DatedTable<'a> {
    table: &'a Table,
    dates: Option<Vec<Option<NaiveDate>>>,
}

impl<'a> DatedTable<'a> {
    pub fn new(table: &'a Table, dates: Option<Vec<Option<NaiveDate>>>) -> Self {
        Self { table, dates }
    }

    /// A view with no derived date column, used when the period label is missing.
    pub fn undated(table: &'a Table) -> Self {
        Self { table, dates: None }
    }

    pub fn table(&self) -> &'a Table {
        self.table
    }

    pub fn has_dates(&self) -> bool {
        self.dates.is_some()
    }

    pub fn dates(&self) -> Option<&[Option<NaiveDate>]> {
        self.dates.as_deref()
    }

    pub fn date(&self, row: usize) -> Option<NaiveDate> {
        self.dates.as_ref()?.get(row).copied().flatten()
    }

    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }

    /// Name the derived column is reported under. Falls back to a suffixed name when the
    /// source already carries a `Date` column.
    pub fn date_column_name(&self) -> String {
        if self.table.has_column(columns::DATE) {
            format!("{} (derived)", columns::DATE)
        } else {
            columns::DATE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pads_short_rows() {
        let table = Table::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![Some("1".to_string())]],
        );
        assert_eq!(table.rows()[0], vec![Some("1".to_string()), None]);
    }

    #[test]
    fn test_new_stores_empty_strings_as_null() {
        let table = Table::new(
            vec!["Region.[Region]".to_string(), "Sales (Units)".to_string()],
            vec![
                vec![Some(String::new()), Some(String::new())],
                vec![Some("EMEA".to_string()), Some("3".to_string())],
            ],
        );
        assert_eq!(table.text("Region.[Region]"), Some(vec![None, Some("EMEA")]));

        let units = table.numeric("Sales (Units)").unwrap();
        assert_eq!(units.values, vec![None, Some(3.0)]);
        assert_eq!(units.invalid_rows(), 0);
    }

    #[test]
    fn test_deserialize_pads_short_rows() {
        let table: Table =
            serde_json::from_str(r#"{"columns":["a","Sales (Units)"],"rows":[["x"],["", "2", "extra"]]}"#)
                .unwrap();
        assert_eq!(table.rows()[0], vec![Some("x".to_string()), None]);
        assert_eq!(table.rows()[1], vec![None, Some("2".to_string())]);
        assert_eq!(table.numeric("Sales (Units)").unwrap().values, vec![None, Some(2.0)]);
    }

    #[test]
    fn test_numeric_counts_invalid_cells() {
        let table = Table::from_strings(&["x"], &[vec!["1.5"], vec!["abc"], vec![""], vec!["NaN"]]);
        let col = table.numeric("x").unwrap();
        assert_eq!(col.values, vec![Some(1.5), None, None, None]);
        assert_eq!(col.invalid_rows(), 1);
        assert!(col.is_invalid(1));
        assert!(!col.is_invalid(3));
    }

    #[test]
    fn test_missing_column_is_none() {
        let table = Table::from_strings(&["x"], &[vec!["1"]]);
        assert!(table.numeric("y").is_none());
        assert!(table.text("y").is_none());
        assert_eq!(table.value(0, "x"), Some("1"));
    }

    #[test]
    fn test_date_column_name_avoids_collision() {
        let plain = Table::from_strings(&["x"], &[]);
        assert_eq!(DatedTable::undated(&plain).date_column_name(), "Date");

        let clashing = Table::from_strings(&["Date"], &[]);
        assert_eq!(
            DatedTable::undated(&clashing).date_column_name(),
            "Date (derived)"
        );
    }
}
