//! In-memory tabular data and its readers

use calamine::{open_workbook_auto, Data, Reader};
use std::cmp::Ordering;
use std::path::Path;

use super::TransformError;

/// One cell value. Numbers are always finite.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Interpret raw text: blank is empty, a finite number is a number,
    /// anything else is trimmed text
    pub fn parse(raw: &str) -> Self {
        let value = raw.trim();
        if value.is_empty() {
            return Cell::Empty;
        }
        match value.parse::<f64>() {
            Ok(n) if n.is_finite() => Cell::Number(n),
            _ => Cell::Text(value.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Descending order by numeric value, non-numeric cells last
    pub fn cmp_desc(&self, other: &Cell) -> Ordering {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => b.total_cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty => Cell::Empty,
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) if f.is_finite() => Cell::Number(*f),
            Data::String(s) => Cell::parse(s),
            other => Cell::parse(&other.to_string()),
        }
    }
}

/// A header row and the data rows under it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { headers, rows }
    }

    /// Index of the column named `name`
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read a delimited text file whose first record is the header
pub fn read_csv(path: &Path) -> Result<Table, TransformError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| TransformError::ParseError(format!("{}: {}", path.display(), e)))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| TransformError::ParseError(format!("{}: {}", path.display(), e)))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(TransformError::EmptyData(path.display().to_string()));
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| TransformError::ParseError(format!("{}: {}", path.display(), e)))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        if record.len() > headers.len() {
            return Err(TransformError::ParseError(format!(
                "{}: record {} has {} fields but the header has {}",
                path.display(),
                index + 1,
                record.len(),
                headers.len()
            )));
        }
        rows.push(pad_row(record.iter().map(Cell::parse).collect(), headers.len()));
    }

    Ok(Table::new(headers, rows))
}

/// Read the first worksheet of an `.xlsx`/`.xls` workbook
pub fn read_spreadsheet(path: &Path) -> Result<Table, TransformError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| TransformError::ParseError(format!("{}: {}", path.display(), e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TransformError::EmptyData(path.display().to_string()))?
        .map_err(|e| TransformError::ParseError(format!("{}: {}", path.display(), e)))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Err(TransformError::EmptyData(path.display().to_string())),
    };

    let rows = rows
        .map(|row| row.iter().map(Cell::from).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|c| *c != Cell::Empty))
        .map(|row| pad_row(row, headers.len()))
        .collect();

    Ok(Table::new(headers, rows))
}

fn pad_row(mut row: Vec<Cell>, width: usize) -> Vec<Cell> {
    if row.len() < width {
        row.resize(width, Cell::Empty);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_cell_parse() {
        assert_eq!(Cell::parse("  "), Cell::Empty);
        assert_eq!(Cell::parse(" 12.5 "), Cell::Number(12.5));
        assert_eq!(Cell::parse("EQ "), Cell::Text("EQ".to_string()));
        assert_eq!(Cell::parse("NaN"), Cell::Text("NaN".to_string()));
        assert_eq!(Cell::parse("-"), Cell::Text("-".to_string()));
    }

    #[test]
    fn test_cmp_desc_puts_text_last() {
        let mut cells = vec![
            Cell::Number(1.0),
            Cell::Text("-".to_string()),
            Cell::Number(9.0),
            Cell::Empty,
            Cell::Number(5.0),
        ];
        cells.sort_by(Cell::cmp_desc);
        assert_eq!(cells[0], Cell::Number(9.0));
        assert_eq!(cells[1], Cell::Number(5.0));
        assert_eq!(cells[2], Cell::Number(1.0));
        assert_eq!(cells[3].as_number(), None);
    }

    #[test]
    fn test_read_csv_trims_and_pads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "a.csv", " SYMBOL , SERIES, CLOSE\nABC , EQ ,10\nXYZ,BE\n");

        let table = read_csv(&path).unwrap();
        assert_eq!(table.headers, vec!["SYMBOL", "SERIES", "CLOSE"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0], Cell::Text("ABC".to_string()));
        assert_eq!(table.rows[0][2], Cell::Number(10.0));
        assert_eq!(table.rows[1][2], Cell::Empty);
    }

    #[test]
    fn test_read_csv_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "empty.csv", "");
        assert!(matches!(read_csv(&path), Err(TransformError::EmptyData(_))));
    }

    #[test]
    fn test_read_csv_header_only_has_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "h.csv", "A,B\n");
        let table = read_csv(&path).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_read_csv_rejects_overlong_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "bad.csv", "A,B\n1,2,3\n");
        assert!(matches!(read_csv(&path), Err(TransformError::ParseError(_))));
    }
}
