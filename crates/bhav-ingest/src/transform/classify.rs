//! Input classification
//!
//! One ordered list of predicates decides how a file is read. The first
//! predicate that matches wins; nothing matching is an unsupported format.

use std::path::Path;

/// How an input file is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `.csv`
    Csv,
    /// `.xlsx` or `.xls`
    Spreadsheet,
    /// `.zip`: extract, pick a member, read that
    Zip,
    /// No extension, or a numeric one such as a trailing date; tried as CSV
    BareCsv,
}

type Predicate = fn(&Path) -> bool;

const RULES: &[(Predicate, FileKind)] = &[
    (is_csv, FileKind::Csv),
    (is_spreadsheet, FileKind::Spreadsheet),
    (is_zip, FileKind::Zip),
    (is_bare, FileKind::BareCsv),
];

/// Classify `path` by its file name, or `None` if it is not a supported input
pub fn classify(path: &Path) -> Option<FileKind> {
    RULES.iter().find(|(matches, _)| matches(path)).map(|(_, kind)| *kind)
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase())
}

pub fn is_csv(path: &Path) -> bool {
    extension(path).is_some_and(|e| e == "csv")
}

pub fn is_spreadsheet(path: &Path) -> bool {
    extension(path).is_some_and(|e| e == "xlsx" || e == "xls")
}

pub fn is_zip(path: &Path) -> bool {
    extension(path).is_some_and(|e| e == "zip")
}

pub fn is_bare(path: &Path) -> bool {
    match extension(path) {
        None => true,
        Some(e) => !e.is_empty() && e.bytes().all(|b| b.is_ascii_digit()),
    }
}

/// Name prefixes that mark the primary data file inside an exchange archive
const PRIMARY_MEMBER_PREFIXES: &[&str] = &["bhavcopy", "eq", "sec_bhavdata", "cm"];

/// Choose the archive member to read.
///
/// Best effort, in order:
/// 1. a CSV or extensionless member whose name starts with a primary prefix
/// 2. the first CSV member
/// 3. the first member
///
/// Candidates are compared by file name, so an archive holding several
/// members with the same prefix yields the alphabetically first one.
pub fn select_member<P: AsRef<Path>>(members: &[P]) -> Option<&P> {
    let mut sorted: Vec<&P> = members.iter().collect();
    sorted.sort_by_key(|p| file_name(p.as_ref()));

    let readable = |p: &P| is_csv(p.as_ref()) || extension(p.as_ref()).is_none();
    let primary = |p: &P| {
        let name = file_name(p.as_ref()).to_ascii_lowercase();
        PRIMARY_MEMBER_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
    };

    sorted
        .iter()
        .copied()
        .find(|p| readable(*p) && primary(*p))
        .or_else(|| sorted.iter().copied().find(|p| is_csv((*p).as_ref())))
        .or_else(|| sorted.first().copied())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_classification_order() {
        assert_eq!(classify(Path::new("a/sec_bhavdata_full_05012024.csv")), Some(FileKind::Csv));
        assert_eq!(classify(Path::new("report.CSV")), Some(FileKind::Csv));
        assert_eq!(classify(Path::new("report.xlsx")), Some(FileKind::Spreadsheet));
        assert_eq!(classify(Path::new("old.XLS")), Some(FileKind::Spreadsheet));
        assert_eq!(classify(Path::new("EQ050124_CSV.ZIP")), Some(FileKind::Zip));
        assert_eq!(classify(Path::new("bhavcopy")), Some(FileKind::BareCsv));
        assert_eq!(classify(Path::new("fo.20240105")), Some(FileKind::BareCsv));
        assert_eq!(classify(Path::new("notes.txt")), None);
        assert_eq!(classify(Path::new("archive.tar.gz")), None);
    }

    #[test]
    fn test_csv_wins_over_digits_in_stem() {
        // Stem ends in digits but the extension is explicit
        assert!(is_csv(Path::new("data_20240105.csv")));
        assert!(!is_bare(Path::new("data_20240105.csv")));
    }

    #[test]
    fn test_select_member_prefers_primary_csv() {
        let members = vec![
            PathBuf::from("x/readme.txt"),
            PathBuf::from("x/aux.csv"),
            PathBuf::from("x/EQ050124.CSV"),
        ];
        assert_eq!(select_member(&members), Some(&members[2]));
    }

    #[test]
    fn test_select_member_falls_back() {
        let members = vec![PathBuf::from("readme.txt"), PathBuf::from("zz.csv")];
        assert_eq!(select_member(&members), Some(&members[1]));

        let members = vec![PathBuf::from("b.txt"), PathBuf::from("a.dat")];
        assert_eq!(select_member(&members), Some(&members[1]));

        let empty: Vec<PathBuf> = Vec::new();
        assert_eq!(select_member(&empty), None);
    }
}
