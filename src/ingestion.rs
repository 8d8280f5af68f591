use crate::error::Result;
use crate::table::{Cell, Table};
use log::debug;
use std::io::Read;
use std::path::Path;

/// Tokens read as null, following the defaults of the common CSV readers.
pub const NA_TOKENS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn to_cell(raw: &str) -> Cell {
    if NA_TOKENS.contains(&raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Reads comma-separated values with a header row into a [`Table`].
///
/// Cell text is kept verbatim (no trimming); only NA tokens become nulls. A row with a
/// different field count than the header is an error.
pub fn read_csv<R: Read>(reader: R) -> Result<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let columns: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(record.iter().map(to_cell).collect());
    }

    debug!(
        "Read CSV with {} columns and {} rows",
        columns.len(),
        rows.len()
    );

    Ok(Table::new(columns, rows))
}

pub fn read_csv_path<P: AsRef<Path>>(path: P) -> Result<Table> {
    let file = std::fs::File::open(path)?;
    read_csv(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EdaError;

    #[test]
    fn test_read_csv_maps_na_tokens() {
        let data = "Item.[PPL],Sales (Units)\nA,10\nB,NaN\n,NA\n";
        let table = read_csv(data.as_bytes()).unwrap();
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.value(0, "Sales (Units)"), Some("10"));
        assert_eq!(table.value(1, "Sales (Units)"), None);
        assert_eq!(table.value(2, "Item.[PPL]"), None);
    }

    #[test]
    fn test_read_csv_preserves_whitespace() {
        let data = "Evergreen.[Evergreen]\n\" evergreen \"\n";
        let table = read_csv(data.as_bytes()).unwrap();
        assert_eq!(table.value(0, "Evergreen.[Evergreen]"), Some(" evergreen "));
    }

    #[test]
    fn test_read_csv_rejects_ragged_rows() {
        let data = "a,b\n1,2\n3\n";
        assert!(matches!(read_csv(data.as_bytes()), Err(EdaError::Csv(_))));
    }
}
