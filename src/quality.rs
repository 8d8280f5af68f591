use crate::schema::{columns, SemanticType};
use crate::table::{is_nan_literal, parse_number, Cell, DatedTable};
use crate::utils::{is_iso_date, parse_bool};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Shape {
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnCount {
    pub column: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnType {
    pub column: String,
    pub dtype: SemanticType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QualityProfile {
    pub shape: Shape,
    pub unique_rows: usize,
    pub duplicate_rows: usize,
    /// Null count for every column, in column order.
    pub missing: Vec<ColumnCount>,
    pub dtypes: Vec<ColumnType>,
    /// Distinct non-null values of the key dimensions present in the table.
    pub cardinality: Vec<ColumnCount>,
    /// Leading rows of the source table.
    pub sample: Vec<Vec<Cell>>,
}

impl QualityProfile {
    pub fn missing_for(&self, column: &str) -> Option<usize> {
        self.missing
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.count)
    }

    pub fn cardinality_for(&self, column: &str) -> Option<usize> {
        self.cardinality
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.count)
    }

    pub fn dtype_for(&self, column: &str) -> Option<SemanticType> {
        self.dtypes
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.dtype)
    }
}

pub struct QualityProfiler<'a> {
    view: &'a DatedTable<'a>,
}

impl<'a> QualityProfiler<'a> {
    pub fn new(view: &'a DatedTable<'a>) -> Self {
        Self { view }
    }

    pub fn profile(&self) -> QualityProfile {
        let table = self.view.table();
        let unique_rows = self.unique_row_count();

        let mut missing = Vec::with_capacity(table.column_count() + 1);
        let mut dtypes = Vec::with_capacity(table.column_count() + 1);

        for (idx, name) in table.columns().iter().enumerate() {
            let values: Vec<Option<&str>> =
                table.rows().iter().map(|row| row[idx].as_deref()).collect();
            missing.push(ColumnCount {
                column: name.clone(),
                count: values.iter().filter(|v| v.is_none()).count(),
            });
            dtypes.push(ColumnType {
                column: name.clone(),
                dtype: infer_type(&values),
            });
        }

        if let Some(dates) = self.view.dates() {
            let name = self.view.date_column_name();
            missing.push(ColumnCount {
                column: name.clone(),
                count: dates.iter().filter(|d| d.is_none()).count(),
            });
            dtypes.push(ColumnType {
                column: name,
                dtype: SemanticType::Date,
            });
        }

        let shape = Shape {
            rows: table.row_count(),
            columns: missing.len(),
        };
        debug!(
            "Profiled {} rows x {} columns, {} unique",
            shape.rows, shape.columns, unique_rows
        );

        QualityProfile {
            shape,
            unique_rows,
            duplicate_rows: shape.rows - unique_rows,
            missing,
            dtypes,
            cardinality: self.cardinality(),
            sample: table.rows().iter().take(SAMPLE_ROWS).cloned().collect(),
        }
    }

    /// Rows that are not a full copy of an earlier row. The derived date is a function of
    /// the label, so comparing source fields is enough.
    pub fn unique_row_count(&self) -> usize {
        let mut seen: HashSet<&[Cell]> = HashSet::new();
        self.view
            .table()
            .rows()
            .iter()
            .filter(|row| seen.insert(row.as_slice()))
            .count()
    }

    pub fn cardinality(&self) -> Vec<ColumnCount> {
        let table = self.view.table();
        columns::KEY_DIMENSIONS
            .iter()
            .filter_map(|name| {
                let values = table.text(name)?;
                let distinct: HashSet<&str> = values.into_iter().flatten().collect();
                Some(ColumnCount {
                    column: name.to_string(),
                    count: distinct.len(),
                })
            })
            .collect()
    }
}

/// Semantic type of a source column from its non-null values. An all-null column is
/// numeric.
pub fn infer_type(values: &[Option<&str>]) -> SemanticType {
    let present: Vec<&str> = values.iter().flatten().copied().collect();
    if present
        .iter()
        .all(|v| parse_number(v).is_some() || is_nan_literal(v))
    {
        SemanticType::Numeric
    } else if present.iter().all(|v| parse_bool(v).is_some()) {
        SemanticType::Boolean
    } else if present.iter().all(|v| is_iso_date(v)) {
        SemanticType::Date
    } else {
        SemanticType::Text
    }
}
