//! Integration tests for the transformer
//!
//! Inputs are written into a temporary download directory; outputs are read
//! back with calamine.

use bhav_ingest::transform::{TransformError, Transformer};
use calamine::{open_workbook_auto, Data, Reader};
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

struct Fixture {
    dir: TempDir,
    transformer: Transformer,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let transformer = Transformer::new(dir.path().join("downloads"), dir.path().join("processed"));
        std::fs::create_dir_all(transformer.download_dir()).unwrap();
        Self { dir, transformer }
    }

    fn write(&self, name: &str, content: &[u8]) {
        std::fs::write(self.transformer.download_dir().join(name), content).unwrap();
    }

    fn processed_count(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("processed"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Sheet name and all rows (header first) of the only sheet in `path`
fn read_back(path: &Path) -> (String, Vec<Vec<Data>>) {
    let mut workbook = open_workbook_auto(path).unwrap();
    let names = workbook.sheet_names();
    assert_eq!(names.len(), 1);
    let range = workbook.worksheet_range(&names[0]).unwrap();
    (names[0].clone(), range.rows().map(|r| r.to_vec()).collect())
}

fn text(s: &str) -> Data {
    Data::String(s.to_string())
}

#[test]
fn test_legacy_bhavcopy_scenario() {
    let fx = Fixture::new();
    fx.write(
        "cm05JAN2024bhav.csv",
        b"SYMBOL,SERIES,OPEN,HIGH,LOW,CLOSE,TOTTRDQTY\n\
          LOWVOL,EQ,10,11,9,10.5,100\n\
          BEONLY,BE,20,21,19,20.5,900\n\
          HIGHVOL,EQ,30,31,29,30.5,500\n",
    );

    let result = fx.transformer.transform("cm05JAN2024bhav.csv").unwrap();
    assert_eq!(result.rows_processed, 2);
    assert_eq!(result.column_count, 6);
    assert_eq!(result.layout, "nse_bhavcopy_legacy");
    assert_eq!(result.status, "success");

    let (sheet, rows) = read_back(Path::new(&result.output_file));
    assert_eq!(sheet, "Equity_Data");
    assert_eq!(
        rows[0],
        vec![text("Symbol"), text("Open"), text("High"), text("Low"), text("Close"), text("Volume")]
    );
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1][0], text("HIGHVOL"));
    assert_eq!(rows[1][5], Data::Float(500.0));
    assert_eq!(rows[2][0], text("LOWVOL"));
    assert_eq!(rows[2][5], Data::Float(100.0));
}

#[test]
fn test_delivery_threshold_scenario() {
    let fx = Fixture::new();
    fx.write(
        "sec_bhavdata_full_05012024.csv",
        b"SYMBOL, SERIES, TTL_TRD_QNTY, DELIV_QTY, DELIV_PER\n\
          AAA, EQ, 100, 40, 40.00\n\
          BBB, EQ, 100, 55, 55.00\n\
          CCC, EQ, 100, 70, 70.00\n",
    );

    let result = fx.transformer.transform("sec_bhavdata_full_05012024.csv").unwrap();
    assert_eq!(result.rows_processed, 2);

    let (sheet, rows) = read_back(Path::new(&result.output_file));
    assert_eq!(sheet, "High_Delivery");
    assert_eq!(rows[0][1], text("Delivery_%"));
    let pct: Vec<Data> = rows[1..].iter().map(|r| r[1].clone()).collect();
    assert_eq!(pct, vec![Data::Float(70.0), Data::Float(55.0)]);
}

#[test]
fn test_empty_input_writes_nothing() {
    let fx = Fixture::new();
    fx.write("empty.csv", b"");
    fx.write("header_only.csv", b"SYMBOL,SERIES,TOTTRDQTY\n");

    assert!(matches!(
        fx.transformer.transform("empty.csv"),
        Err(TransformError::EmptyData(_))
    ));
    assert!(matches!(
        fx.transformer.transform("header_only.csv"),
        Err(TransformError::EmptyData(_))
    ));
    assert_eq!(fx.processed_count(), 0);
}

#[test]
fn test_unknown_layout_passes_through() {
    let fx = Fixture::new();
    fx.write("custom.csv", b"Ticker,Price,Note\nX,1.5,first\nY,2,second\n");

    let result = fx.transformer.transform("custom.csv").unwrap();
    assert_eq!(result.layout, "generic");
    assert_eq!(result.rows_processed, 2);
    assert_eq!(result.column_count, 3);

    let (sheet, rows) = read_back(Path::new(&result.output_file));
    assert_eq!(sheet, "Data");
    assert_eq!(rows[0], vec![text("Ticker"), text("Price"), text("Note")]);
    assert_eq!(rows[1], vec![text("X"), Data::Float(1.5), text("first")]);
}

#[test]
fn test_zip_member_is_selected() {
    let fx = Fixture::new();
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("readme.txt", SimpleFileOptions::default()).unwrap();
    writer.write_all(b"not data").unwrap();
    writer.start_file("EQ050124.CSV", SimpleFileOptions::default()).unwrap();
    writer
        .write_all(
            b"SC_CODE,SC_NAME,OPEN,HIGH,LOW,CLOSE,NO_OF_SHRS\n\
              500001,ALPHA,1,2,1,2,10\n\
              500002,BETA,1,2,1,2,30\n",
        )
        .unwrap();
    let bytes = writer.finish().unwrap().into_inner();
    fx.write("EQ050124_CSV.ZIP", &bytes);

    let result = fx.transformer.transform("EQ050124_CSV.ZIP").unwrap();
    assert_eq!(result.layout, "bse_bhavcopy");
    assert!(fx
        .transformer
        .download_dir()
        .join("EQ050124_CSV_extracted")
        .join("EQ050124.CSV")
        .exists());

    let (sheet, rows) = read_back(Path::new(&result.output_file));
    assert_eq!(sheet, "BSE_Data");
    assert_eq!(rows[0][0], text("Code"));
    assert_eq!(rows[1][1], text("BETA"));
}

#[test]
fn test_csv_zip_output_name_drops_inner_extension() {
    let fx = Fixture::new();
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("BhavCopy_NSE_CM_0_0_0_20240105_F_0000.csv", SimpleFileOptions::default())
        .unwrap();
    writer
        .write_all(b"TckrSymb,SctySrs,OpnPric,HghPric,LwPric,ClsPric,TtlTradgVol
AAA,EQ,1,2,1,2,7
")
        .unwrap();
    let bytes = writer.finish().unwrap().into_inner();
    fx.write("BhavCopy_NSE_CM_0_0_0_20240105_F_0000.csv.zip", &bytes);

    let result = fx
        .transformer
        .transform("BhavCopy_NSE_CM_0_0_0_20240105_F_0000.csv.zip")
        .unwrap();
    assert_eq!(result.layout, "nse_bhavcopy");

    let name = Path::new(&result.output_file)
        .file_name()
        .unwrap()
        .to_string_lossy()
        .to_string();
    assert!(name.starts_with("BhavCopy_NSE_CM_0_0_0_20240105_F_0000_processed_"), "{name}");
    assert!(!name.contains(".csv"), "{name}");
    assert!(name.ends_with(".xlsx"), "{name}");
}

#[test]
fn test_extensionless_file_is_read_as_csv() {
    let fx = Fixture::new();
    fx.write(
        "BhavCopy_20240105",
        b"TrdSymb,SctySrs,OpnPric,HghPric,LwPric,ClsPric,TtlTradgVol\nAAA,EQ,1,2,1,2,7\n",
    );

    let result = fx.transformer.transform("BhavCopy_20240105").unwrap();
    assert_eq!(result.layout, "nse_bhavcopy");
    assert_eq!(result.rows_processed, 1);
}

#[test]
fn test_repeated_transforms_never_collide() {
    let fx = Fixture::new();
    fx.write("custom.csv", b"A,B\n1,2\n");

    let first = fx.transformer.transform("custom.csv").unwrap();
    let second = fx.transformer.transform("custom.csv").unwrap();
    assert_ne!(first.output_file, second.output_file);
    assert_eq!(fx.processed_count(), 2);
}

#[test]
fn test_unsupported_and_missing() {
    let fx = Fixture::new();
    fx.write("notes.txt", b"A,B\n1,2\n");

    assert!(matches!(
        fx.transformer.transform("notes.txt"),
        Err(TransformError::UnsupportedFormat(_))
    ));
    assert!(matches!(
        fx.transformer.transform("missing.csv"),
        Err(TransformError::NotFound(_))
    ));
}

#[test]
fn test_sentinel_match_with_missing_column_is_parse_error() {
    let fx = Fixture::new();
    fx.write("bse.csv", b"SC_CODE,SC_NAME\n1,A\n");

    assert!(matches!(
        fx.transformer.transform("bse.csv"),
        Err(TransformError::ParseError(_))
    ));
    assert_eq!(fx.processed_count(), 0);
}
