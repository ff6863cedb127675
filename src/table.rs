//! In-memory tabular data loaded from CSV and Excel uploads.

use std::fmt;
use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, DataType, Reader, Xlsx};

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(x) => write!(f, "{}", x),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Column type inferred from every non-empty value in the column.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
}

fn infer_column(values: &[&str]) -> ColumnType {
    let present: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if present.is_empty() {
        return ColumnType::Text;
    }
    if present.iter().all(|v| v.parse::<i64>().is_ok()) {
        ColumnType::Int
    } else if present.iter().all(|v| v.parse::<f64>().is_ok()) {
        ColumnType::Float
    } else if present.iter().all(|v| parse_bool(v).is_some()) {
        ColumnType::Bool
    } else {
        ColumnType::Text
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn typed_cell(raw: &str, ty: ColumnType) -> Cell {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Cell::Empty;
    }
    match ty {
        ColumnType::Int => trimmed.parse().map(Cell::Int).unwrap_or(Cell::Empty),
        ColumnType::Float => trimmed.parse().map(Cell::Float).unwrap_or(Cell::Empty),
        ColumnType::Bool => parse_bool(trimmed).map(Cell::Bool).unwrap_or(Cell::Empty),
        ColumnType::Text => Cell::Text(raw.to_string()),
    }
}

/// Rows of typed cells under a header of named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table, padding or truncating every row to the header width.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Parse CSV bytes. The first record is the header; column types are
    /// inferred from the values underneath it.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, String> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| e.to_string())?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            return Err("No columns to parse from file".into());
        }

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| e.to_string())?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(columns.len(), String::new());
            raw_rows.push(row);
        }

        let types: Vec<ColumnType> = (0..columns.len())
            .map(|i| {
                let values: Vec<&str> = raw_rows.iter().map(|r| r[i].as_str()).collect();
                infer_column(&values)
            })
            .collect();

        let rows = raw_rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(types.iter())
                    .map(|(raw, ty)| typed_cell(raw, *ty))
                    .collect()
            })
            .collect();

        Ok(Self::new(columns, rows))
    }

    /// Parse the first worksheet of an xlsx workbook. Cell types come from
    /// the workbook itself.
    pub fn from_xlsx(bytes: &[u8]) -> Result<Self, String> {
        let mut workbook = open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(bytes.to_vec()))
            .map_err(|e| e.to_string())?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or("Workbook has no worksheets")?
            .map_err(|e| e.to_string())?;

        let mut rows = range.rows();
        let columns: Vec<String> = rows
            .next()
            .ok_or("No columns to parse from file")?
            .iter()
            .map(|c| c.to_string().trim().to_string())
            .collect();

        let rows = rows
            .map(|row| row.iter().map(cell_from_xlsx).collect())
            .collect();

        Ok(Self::new(columns, rows))
    }

    /// Serialize back to CSV with the header row first.
    pub fn to_csv(&self) -> Result<Vec<u8>, String> {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer
            .write_record(&self.columns)
            .map_err(|e| e.to_string())?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|c| c.to_string()))
                .map_err(|e| e.to_string())?;
        }
        writer.into_inner().map_err(|e| e.to_string())
    }

    /// One-sentence description handed to the model alongside plot requests.
    pub fn summary(&self) -> String {
        let (rows, cols) = self.shape();
        format!(
            "The uploaded document contains a DataFrame with {} rows and {} columns. \
             Here are the column names: {}.",
            rows,
            cols,
            self.columns.join(", ")
        )
    }

    /// Pipe-separated rendering of the header and the first `limit` rows.
    pub fn preview(&self, limit: usize) -> String {
        let mut lines = vec![self.columns.join(" | ")];
        for row in self.rows.iter().take(limit) {
            let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            lines.push(cells.join(" | "));
        }
        if self.rows.len() > limit {
            lines.push(format!("... ({} more rows)", self.rows.len() - limit));
        }
        lines.join("\n")
    }
}

fn cell_from_xlsx(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Bool(b) => Cell::Bool(*b),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(x) => Cell::Float(*x),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::DateTime(dt) if dt.is_duration() => Cell::Float(dt.as_f64()),
        Data::DateTime(dt) => match data.as_datetime() {
            Some(ts) => Cell::Text(format_timestamp(&ts.to_string())),
            None => Cell::Float(dt.as_f64()),
        },
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}

/// `2024-01-01 00:00:00` becomes `2024-01-01`; other times are kept.
fn format_timestamp(ts: &str) -> String {
    ts.strip_suffix(" 00:00:00").unwrap_or(ts).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_header_and_inferred_types() {
        let csv = b"date,engagement_rate,likes,verified,handle\n\
                    2024-01-01,0.5,10,true,@a\n\
                    2024-01-02,1,,false,@b\n";
        let table = Table::from_csv(csv).unwrap();

        assert_eq!(
            table.columns(),
            &["date", "engagement_rate", "likes", "verified", "handle"]
        );
        assert_eq!(table.shape(), (2, 5));
        assert_eq!(table.rows()[0][0], Cell::Text("2024-01-01".into()));
        assert_eq!(table.rows()[0][1], Cell::Float(0.5));
        assert_eq!(table.rows()[1][1], Cell::Float(1.0));
        assert_eq!(table.rows()[0][2], Cell::Int(10));
        assert_eq!(table.rows()[1][2], Cell::Empty);
        assert_eq!(table.rows()[1][3], Cell::Bool(false));
        assert!(table.has_column("engagement_rate"));
        assert!(!table.has_column("Engagement_Rate"));
    }

    #[test]
    fn test_csv_short_rows_are_padded() {
        let table = Table::from_csv(b"a,b,c\n1,2\n").unwrap();
        assert_eq!(table.rows()[0], vec![Cell::Int(1), Cell::Int(2), Cell::Empty]);
    }

    #[test]
    fn test_csv_empty_input_is_an_error() {
        assert!(Table::from_csv(b"").is_err());
    }

    #[test]
    fn test_to_csv_keeps_header_and_values() {
        let table = Table::new(
            vec!["x".into(), "y".into()],
            vec![
                vec![Cell::Int(1), Cell::Float(2.5)],
                vec![Cell::Text("a,b".into()), Cell::Empty],
            ],
        );
        let out = String::from_utf8(table.to_csv().unwrap()).unwrap();
        assert_eq!(out, "x,y\n1,2.5\n\"a,b\",\n");
    }

    #[test]
    fn test_summary_lists_shape_and_columns() {
        let table = Table::from_csv(b"a,b\n1,2\n3,4\n5,6\n").unwrap();
        assert_eq!(
            table.summary(),
            "The uploaded document contains a DataFrame with 3 rows and 2 columns. \
             Here are the column names: a, b."
        );
    }

    #[test]
    fn test_midnight_timestamps_drop_the_time() {
        assert_eq!(format_timestamp("2024-01-01 00:00:00"), "2024-01-01");
        assert_eq!(format_timestamp("2024-01-01 12:30:00"), "2024-01-01 12:30:00");
    }

    #[test]
    fn test_preview_truncates_rows() {
        let table = Table::from_csv(b"n\n1\n2\n3\n").unwrap();
        assert_eq!(table.preview(2), "n\n1\n2\n... (1 more rows)");
    }
}
