//! Archive extraction for downloaded payloads
//!
//! - **Zip** (.zip): every file member, flattened into one directory
//! - **Gzip** (.gz): single member, written without the `.gz` suffix
//!
//! Member paths are reduced to their final component so nothing is written
//! outside the destination directory.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::registry::ArchiveKind;

/// Decompress gzip-compressed bytes
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .context("Failed to decompress gzip data")?;
    debug!("Decompressed {} -> {} bytes", data.len(), decompressed.len());
    Ok(decompressed)
}

/// Read every file member of a zip archive into memory.
///
/// Returns `(member file name, contents)` in archive order.
pub fn read_zip_members(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).context("Failed to read zip archive")?;
    let mut members = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .with_context(|| format!("Failed to read zip entry at index {}", i))?;

        if file.is_dir() {
            continue;
        }

        let name = member_file_name(file.name());
        if name.is_empty() {
            continue;
        }

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .with_context(|| format!("Failed to read zip entry: {}", name))?;
        debug!("Extracted {} ({} bytes)", name, contents.len());
        members.push((name, contents));
    }

    Ok(members)
}

/// Final path component of an archive member name
fn member_file_name(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or(name).to_string()
}

/// Extract `archive_path` into `dest_dir`, returning the written paths.
///
/// The whole archive is validated before anything is written.
pub fn extract_archive(archive_path: &Path, kind: ArchiveKind, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let data = std::fs::read(archive_path)
        .with_context(|| format!("Failed to read {}", archive_path.display()))?;

    let members = match kind {
        ArchiveKind::None => return Ok(Vec::new()),
        ArchiveKind::Zip => read_zip_members(&data)?,
        ArchiveKind::Gzip => {
            let name = archive_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let stem = strip_suffix_ignore_case(&name, ".gz").to_string();
            vec![(stem, decompress_gzip(&data)?)]
        },
    };

    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create {}", dest_dir.display()))?;

    let mut written = Vec::with_capacity(members.len());
    for (name, contents) in members {
        let path = dest_dir.join(&name);
        std::fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }

    Ok(written)
}

pub(crate) fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> &'a str {
    let split = name.len().saturating_sub(suffix.len());
    match (name.get(..split), name.get(split..)) {
        (Some(head), Some(tail)) if tail.eq_ignore_ascii_case(suffix) => head,
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(members: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in members {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_decompress_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"SYMBOL,QTY_PER\n").unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(decompress_gzip(&compressed).unwrap(), b"SYMBOL,QTY_PER\n");
        assert!(decompress_gzip(b"not gzip data").is_err());
    }

    #[test]
    fn test_zip_members_are_flattened() {
        let data = zip_bytes(&[("nested/dir/EQ050124.CSV", "SC_CODE\n1\n"), ("../evil.txt", "x")]);
        let members = read_zip_members(&data).unwrap();
        let names: Vec<_> = members.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["EQ050124.CSV", "evil.txt"]);
    }

    #[test]
    fn test_extract_zip_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("EQ050124_CSV.ZIP");
        std::fs::write(&archive, zip_bytes(&[("EQ050124.CSV", "SC_CODE\n1\n")])).unwrap();

        let written = extract_archive(&archive, ArchiveKind::Zip, dir.path()).unwrap();
        assert_eq!(written, vec![dir.path().join("EQ050124.CSV")]);
        assert_eq!(std::fs::read_to_string(&written[0]).unwrap(), "SC_CODE\n1\n");
    }

    #[test]
    fn test_corrupt_zip_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"PK not really").unwrap();
        let out = dir.path().join("out");

        assert!(extract_archive(&archive, ArchiveKind::Zip, &out).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_strip_suffix_ignore_case() {
        assert_eq!(strip_suffix_ignore_case("a.csv.GZ", ".gz"), "a.csv");
        assert_eq!(strip_suffix_ignore_case("a.csv", ".gz"), "a.csv");
        assert_eq!(strip_suffix_ignore_case("gz", ".gz"), "gz");
    }
}
