//! Spreadsheet output

use chrono::{DateTime, Local};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, Write};
use std::path::{Path, PathBuf};

use super::table::{Cell, Table};
use super::TransformError;

// Suffixes tried after the bare name before giving up
const MAX_SUFFIX: u32 = 1000;

/// Create `{stem}_processed_{YYYYmmdd_HHMMSS_mmm}.xlsx` in `dir`, adding a
/// `_{n}` suffix while the name is taken.
///
/// The file is created with `create_new`, so two writers never get the same
/// name even when they race.
pub fn create_output(dir: &Path, stem: &str, now: DateTime<Local>) -> Result<(PathBuf, File), TransformError> {
    let base = format!("{}_processed_{}", stem, now.format("%Y%m%d_%H%M%S_%3f"));

    for n in 0..=MAX_SUFFIX {
        let path = match n {
            0 => dir.join(format!("{}.xlsx", base)),
            n => dir.join(format!("{}_{}.xlsx", base, n)),
        };
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(TransformError::ProcessingFailure(format!(
                    "Failed to create {}: {}",
                    path.display(),
                    e
                )))
            },
        }
    }

    Err(TransformError::ProcessingFailure(format!(
        "No free output name for {} in {}",
        base,
        dir.display()
    )))
}

/// Write `table` into a freshly created output file and return its path.
///
/// The reserved file is removed again if writing fails.
pub fn save_table(
    table: &Table,
    sheet: &str,
    dir: &Path,
    stem: &str,
    now: DateTime<Local>,
) -> Result<PathBuf, TransformError> {
    let (path, mut file) = create_output(dir, stem, now)?;
    if let Err(e) = write_xlsx(table, sheet, &mut file) {
        drop(file);
        let _ = std::fs::remove_file(&path);
        return Err(e);
    }
    Ok(path)
}

/// Write `table` as the only sheet of a new workbook into `writer`
pub fn write_xlsx<W: Write + Seek + Send>(table: &Table, sheet: &str, writer: W) -> Result<(), TransformError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet).map_err(xlsx_error)?;

    for (col, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, column_index(col)?, header, &header_format)
            .map_err(xlsx_error)?;
    }

    for (i, row) in table.rows.iter().enumerate() {
        let row_index = u32::try_from(i + 1)
            .map_err(|_| TransformError::ProcessingFailure(format!("Too many rows: {}", table.rows.len())))?;
        for (col, cell) in row.iter().enumerate() {
            let col = column_index(col)?;
            let written = match cell {
                Cell::Empty => continue,
                Cell::Number(n) => worksheet.write_number(row_index, col, *n),
                Cell::Text(s) => worksheet.write_string(row_index, col, s),
            };
            written.map_err(xlsx_error)?;
        }
    }

    workbook.save_to_writer(writer).map_err(xlsx_error)
}

fn column_index(col: usize) -> Result<u16, TransformError> {
    u16::try_from(col).map_err(|_| TransformError::ProcessingFailure(format!("Too many columns: {}", col + 1)))
}

fn xlsx_error(e: XlsxError) -> TransformError {
    TransformError::ProcessingFailure(format!("Failed to write spreadsheet: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 5, 18, 45, 7).single().unwrap()
    }

    fn sample() -> Table {
        Table::new(
            vec!["Symbol".to_string(), "Volume".to_string()],
            vec![vec![Cell::Text("AAA".to_string()), Cell::Number(10.0)], vec![Cell::Empty, Cell::Number(1.0)]],
        )
    }

    fn file_name(path: &Path) -> &str {
        path.file_name().unwrap().to_str().unwrap()
    }

    #[test]
    fn test_create_output_reserves_unique_names() {
        let dir = tempfile::tempdir().unwrap();

        let (first, _) = create_output(dir.path(), "EQ050124", now()).unwrap();
        assert_eq!(file_name(&first), "EQ050124_processed_20240105_184507_000.xlsx");
        assert!(first.exists());

        // The first name is held by the empty reserved file
        let (second, _) = create_output(dir.path(), "EQ050124", now()).unwrap();
        assert_eq!(file_name(&second), "EQ050124_processed_20240105_184507_000_1.xlsx");
        let (third, _) = create_output(dir.path(), "EQ050124", now()).unwrap();
        assert_eq!(file_name(&third), "EQ050124_processed_20240105_184507_000_2.xlsx");
    }

    #[test]
    fn test_create_output_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("EQ050124_processed_20240105_184507_000.xlsx");
        std::fs::write(&taken, b"someone else's").unwrap();

        let path = save_table(&sample(), "Equity_Data", dir.path(), "EQ050124", now()).unwrap();

        assert_ne!(path, taken);
        assert_eq!(std::fs::read(&taken).unwrap(), b"someone else's");
        assert!(path.metadata().unwrap().len() > 0);
    }

    #[test]
    fn test_save_table_removes_file_on_failure() {
        let dir = tempfile::tempdir().unwrap();

        // Sheet names are limited to 31 characters
        let err = save_table(&sample(), &"x".repeat(40), dir.path(), "EQ050124", now()).unwrap_err();

        assert!(matches!(err, TransformError::ProcessingFailure(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_xlsx_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        write_xlsx(&sample(), "Equity_Data", File::create(&path).unwrap()).unwrap();
        assert!(path.metadata().unwrap().len() > 0);
    }
}
