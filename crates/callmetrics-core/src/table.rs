//! In-memory tabular data and file loading
//!
//! Parses CSV and spreadsheet files into a column-major table of typed
//! cells. Missing cells are permitted anywhere; downstream consumers see
//! them as absent values (NaN in numeric views, `None` in label views).

use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::errors::{StatsError, StatsResult};

/// A single table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Numeric value
    Number(f64),
    /// Textual value
    Text(String),
    /// Missing cell
    Empty,
}

impl Cell {
    fn from_field(field: &str) -> Cell {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(v) => Cell::Number(v),
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    fn from_spreadsheet(data: &Data) -> Cell {
        match data {
            Data::Int(v) => Cell::Number(*v as f64),
            Data::Float(v) => Cell::Number(*v),
            Data::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::String(s) => Cell::from_field(s),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(_) | Data::Empty => Cell::Empty,
        }
    }
}

/// A collection of named, equal-length columns with rows aligned by position
#[derive(Debug, Clone)]
pub struct DataTable {
    headers: Vec<String>,
    columns: Vec<Vec<Cell>>,
}

impl DataTable {
    /// Build a table from headers and column data.
    ///
    /// # Arguments
    /// * `headers` - Column names, one per column
    /// * `columns` - Column-major cell data, all columns equal length
    pub fn new(headers: Vec<String>, columns: Vec<Vec<Cell>>) -> StatsResult<DataTable> {
        if headers.len() != columns.len() {
            return Err(StatsError::DimensionMismatch {
                y_len: headers.len(),
                x_rows: columns.len(),
            });
        }
        if let Some(first) = columns.first() {
            for col in columns.iter() {
                if col.len() != first.len() {
                    return Err(StatsError::DimensionMismatch {
                        y_len: first.len(),
                        x_rows: col.len(),
                    });
                }
            }
        }
        Ok(DataTable { headers, columns })
    }

    /// Parse comma-separated data from a reader.
    ///
    /// The first record is the header row. Short rows are padded with
    /// missing cells; fields that parse as f64 become numbers.
    pub fn from_csv_reader<R: Read>(reader: R) -> StatsResult<DataTable> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.is_empty() {
            return Err(StatsError::EmptyInput { field: "headers" });
        }

        let n_cols = headers.len();
        let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); n_cols];
        for record in csv_reader.records() {
            let record = record?;
            for (j, column) in columns.iter_mut().enumerate() {
                match record.get(j) {
                    Some(field) => column.push(Cell::from_field(field)),
                    None => column.push(Cell::Empty),
                }
            }
        }

        DataTable::new(headers, columns)
    }

    /// Load a worksheet from a spreadsheet file (xlsx, xls, ods, ...).
    ///
    /// # Arguments
    /// * `path` - Path to the workbook
    /// * `sheet` - Worksheet name; defaults to the first sheet
    pub fn from_spreadsheet_path(path: &Path, sheet: Option<&str>) -> StatsResult<DataTable> {
        let mut workbook = open_workbook_auto(path)?;
        let sheet_name = match sheet {
            Some(name) => name.to_string(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or(StatsError::EmptyInput { field: "sheets" })?,
        };
        let range = workbook.worksheet_range(&sheet_name)?;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header_row) => header_row
                .iter()
                .map(|d| match d {
                    Data::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .collect(),
            None => return Err(StatsError::EmptyInput { field: "headers" }),
        };

        let n_cols = headers.len();
        let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); n_cols];
        for row in rows {
            for (j, column) in columns.iter_mut().enumerate() {
                match row.get(j) {
                    Some(data) => column.push(Cell::from_spreadsheet(data)),
                    None => column.push(Cell::Empty),
                }
            }
        }

        DataTable::new(headers, columns)
    }

    /// Number of data rows
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.len())
    }

    /// Number of columns
    pub fn n_columns(&self) -> usize {
        self.headers.len()
    }

    /// Column names in file order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Whether a column with this name exists
    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Cells of a named column
    pub fn column(&self, name: &str) -> StatsResult<&[Cell]> {
        self.headers
            .iter()
            .position(|h| h == name)
            .map(|idx| self.columns[idx].as_slice())
            .ok_or_else(|| StatsError::MissingColumn(name.to_string()))
    }

    /// Numeric view of a column: numbers pass through, everything else is NaN
    pub fn numeric_column(&self, name: &str) -> StatsResult<Vec<f64>> {
        Ok(self
            .column(name)?
            .iter()
            .map(|cell| match cell {
                Cell::Number(v) => *v,
                _ => f64::NAN,
            })
            .collect())
    }

    /// Label view of a column, for grouping.
    ///
    /// Numbers are canonicalized (integral values render without a decimal
    /// point, so `101` and `101.0` name the same store). Missing cells are
    /// `None` and their rows drop out of grouped fits.
    pub fn label_column(&self, name: &str) -> StatsResult<Vec<Option<String>>> {
        Ok(self
            .column(name)?
            .iter()
            .map(|cell| match cell {
                Cell::Number(v) if v.is_finite() && v.fract() == 0.0 => {
                    Some(format!("{}", *v as i64))
                }
                Cell::Number(v) => Some(format!("{}", v)),
                Cell::Text(s) => Some(s.clone()),
                Cell::Empty => None,
            })
            .collect())
    }
}

/// Load a table from a file path, dispatching on the extension.
///
/// `csv` goes through the CSV parser; spreadsheet extensions go through
/// calamine. Anything else is an unsupported format.
pub fn load_table(path: &Path, sheet: Option<&str>) -> StatsResult<DataTable> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => {
            let file = std::fs::File::open(path)?;
            DataTable::from_csv_reader(file)
        }
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => {
            DataTable::from_spreadsheet_path(path, sheet)
        }
        other => Err(StatsError::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "store_id,m1,prod_A\n101,0.5,12.0\n101,,13.5\n102,0.8,x\n";

    #[test]
    fn test_csv_basic() {
        let table = DataTable::from_csv_reader(CSV.as_bytes()).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.n_columns(), 3);
        assert_eq!(table.headers(), &["store_id", "m1", "prod_A"]);
    }

    #[test]
    fn test_csv_missing_and_text_cells() {
        let table = DataTable::from_csv_reader(CSV.as_bytes()).unwrap();
        let m1 = table.column("m1").unwrap();
        assert_eq!(m1[0], Cell::Number(0.5));
        assert_eq!(m1[1], Cell::Empty);

        let prod = table.numeric_column("prod_A").unwrap();
        assert_eq!(prod[0], 12.0);
        assert!(prod[2].is_nan()); // "x" is not numeric
    }

    #[test]
    fn test_csv_short_rows_pad() {
        let data = "a,b,c\n1,2,3\n4,5\n";
        let table = DataTable::from_csv_reader(data.as_bytes()).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column("c").unwrap()[1], Cell::Empty);
    }

    #[test]
    fn test_label_column_canonicalizes_numbers() {
        let table = DataTable::from_csv_reader(CSV.as_bytes()).unwrap();
        let labels = table.label_column("store_id").unwrap();
        assert_eq!(labels[0].as_deref(), Some("101"));
        assert_eq!(labels[2].as_deref(), Some("102"));
    }

    #[test]
    fn test_missing_column() {
        let table = DataTable::from_csv_reader(CSV.as_bytes()).unwrap();
        assert!(matches!(
            table.numeric_column("nope"),
            Err(StatsError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let result = load_table(Path::new("data.parquet"), None);
        assert!(matches!(result, Err(StatsError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let result = DataTable::new(
            vec!["a".into(), "b".into()],
            vec![vec![Cell::Number(1.0)], vec![]],
        );
        assert!(matches!(result, Err(StatsError::DimensionMismatch { .. })));
    }
}
