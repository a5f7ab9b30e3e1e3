//! Format classification and transformation
//!
//! Turns a downloaded exchange file into a single-sheet `.xlsx` in the
//! processed directory:
//!
//! 1. classify the input by file name ([`classify`])
//! 2. read it into a [`Table`] (zip archives are extracted first and one
//!    member is picked)
//! 3. detect the column layout and normalize it ([`layout`])
//! 4. write the result under a timestamped name ([`writer`])
//!
//! Every failure is returned as a [`TransformError`]; nothing here panics.

pub mod classify;
pub mod layout;
pub mod table;
pub mod writer;

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::decompression::{extract_archive, strip_suffix_ignore_case};
use crate::registry::ArchiveKind;
pub use classify::{classify, FileKind};
pub use table::{Cell, Table};

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("No data in {0}")]
    EmptyData(String),

    #[error("Could not parse input: {0}")]
    ParseError(String),

    #[error("Processing failed: {0}")]
    ProcessingFailure(String),
}

/// Summary of one transformation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformResult {
    pub output_file: String,
    pub rows_processed: usize,
    pub column_count: usize,
    /// Name of the detected layout, `generic` for pass-through
    pub layout: String,
    pub status: String,
    pub message: String,
}

/// Reads from the download directory, writes to the processed directory
#[derive(Debug, Clone)]
pub struct Transformer {
    download_dir: PathBuf,
    processed_dir: PathBuf,
}

impl Transformer {
    pub fn new(download_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            processed_dir: processed_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Relative names are looked up in the download directory
    pub fn resolve_input(&self, input: &str) -> PathBuf {
        let path = Path::new(input);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.download_dir.join(path)
        }
    }

    /// Transform `input` (a path, or a name in the download directory).
    ///
    /// Blocking; call from a blocking-capable thread.
    pub fn transform(&self, input: &str) -> Result<TransformResult, TransformError> {
        let path = self.resolve_input(input);
        if !path.is_file() {
            return Err(TransformError::NotFound(path));
        }

        info!(file = %path.display(), "Processing file");

        let kind = classify(&path).ok_or_else(|| {
            TransformError::UnsupportedFormat(format!(
                "{} (expected .csv, .xlsx, .xls, .zip or an extensionless exchange file)",
                display_name(&path)
            ))
        })?;

        let table = match kind {
            FileKind::Csv | FileKind::BareCsv => table::read_csv(&path)?,
            FileKind::Spreadsheet => table::read_spreadsheet(&path)?,
            FileKind::Zip => self.read_zip(&path)?,
        };

        if table.is_empty() {
            return Err(TransformError::EmptyData(display_name(&path)));
        }
        info!(rows = table.rows.len(), columns = ?table.headers, "Read input");

        let layout = layout::detect(&table);
        if layout.is_generic() {
            warn!(file = %path.display(), "No known column layout, passing data through unchanged");
        }
        let table = layout.apply(table)?;

        std::fs::create_dir_all(&self.processed_dir).map_err(|e| {
            TransformError::ProcessingFailure(format!("Failed to create {}: {}", self.processed_dir.display(), e))
        })?;

        let output = writer::save_table(
            &table,
            layout.sheet,
            &self.processed_dir,
            &output_stem(&path),
            Local::now(),
        )?;

        let rows_processed = table.rows.len();
        let column_count = table.headers.len();
        info!(
            output = %output.display(),
            layout = layout.name,
            rows = rows_processed,
            "Saved processed file"
        );

        Ok(TransformResult {
            message: format!(
                "Processed {} rows into {} ({} layout)",
                rows_processed,
                display_name(&output),
                layout.name
            ),
            output_file: output.display().to_string(),
            rows_processed,
            column_count,
            layout: layout.name.to_string(),
            status: "success".to_string(),
        })
    }

    /// Extract next to the archive and read the best-looking member
    fn read_zip(&self, path: &Path) -> Result<Table, TransformError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let dest = path.with_file_name(format!("{}_extracted", stem));

        let members = extract_archive(path, ArchiveKind::Zip, &dest)
            .map_err(|e| TransformError::ProcessingFailure(format!("{:#}", e)))?;

        let member = classify::select_member(&members)
            .ok_or_else(|| TransformError::EmptyData(format!("{} (archive has no files)", display_name(path))))?;
        info!(archive = %path.display(), member = %member.display(), "Selected archive member");

        match classify(member) {
            Some(FileKind::Spreadsheet) => table::read_spreadsheet(member),
            Some(FileKind::Zip) => Err(TransformError::UnsupportedFormat(format!(
                "{} (nested archive in {})",
                display_name(member),
                display_name(path)
            ))),
            _ => table::read_csv(member),
        }
    }
}

/// Data extensions dropped from the output name, for `X.csv.zip` inputs
const INNER_EXTENSIONS: [&str; 3] = [".csv", ".xlsx", ".xls"];

/// File stem of `path` without a trailing data extension
fn output_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());

    let trimmed = INNER_EXTENSIONS
        .iter()
        .map(|ext| strip_suffix_ignore_case(&stem, ext))
        .find(|trimmed| !trimmed.is_empty() && trimmed.len() < stem.len())
        .map(str::to_string);
    trimmed.unwrap_or(stem)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
