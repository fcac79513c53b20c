//! Zip extraction for bhavcopy archives.

use std::io::{Cursor, Read};
use thiserror::Error;
use zip::ZipArchive;

/// Cap on the size of the extracted table; real files are a few MB.
const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// Zip local file header magic.
pub const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// End-of-central-directory magic; an archive with no entries starts with it.
const EMPTY_ZIP_MAGIC: &[u8] = b"PK\x05\x06";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("not a readable zip archive: {0}")]
    Unreadable(String),

    #[error("archive contains no files")]
    Empty,

    #[error("failed to read entry '{name}': {reason}")]
    Entry { name: String, reason: String },
}

/// The tabular file pulled out of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTable {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub fn looks_like_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(EMPTY_ZIP_MAGIC)
}

/// Extract the tabular entry of a bhavcopy zip.
///
/// Picks the first entry with a `.csv` extension (case-insensitive), or the
/// first file entry when none has one.
pub fn extract_table(bytes: &[u8]) -> Result<ExtractedTable, ArchiveError> {
    extract_table_capped(bytes, MAX_ENTRY_BYTES)
}

/// `extract_table` with an explicit cap; an entry larger than `limit` is an
/// error rather than a truncated table.
pub(crate) fn extract_table_capped(bytes: &[u8], limit: u64) -> Result<ExtractedTable, ArchiveError> {
    let mut zip =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ArchiveError::Unreadable(e.to_string()))?;

    let mut first_file = None;
    let mut first_csv = None;
    for i in 0..zip.len() {
        let entry = zip
            .by_index(i)
            .map_err(|e| ArchiveError::Unreadable(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        if first_file.is_none() {
            first_file = Some(i);
        }
        if entry.name().to_ascii_lowercase().ends_with(".csv") {
            first_csv = Some(i);
            break;
        }
    }

    let index = first_csv.or(first_file).ok_or(ArchiveError::Empty)?;
    let mut entry = zip
        .by_index(index)
        .map_err(|e| ArchiveError::Unreadable(e.to_string()))?;
    let name = entry.name().to_string();

    // The declared size comes from the archive and is not trusted.
    let mut buf = Vec::new();
    (&mut entry)
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|e| ArchiveError::Entry {
            name: name.clone(),
            reason: e.to_string(),
        })?;
    if buf.len() as u64 > limit {
        return Err(ArchiveError::Entry {
            name,
            reason: format!("entry is larger than {limit} bytes"),
        });
    }

    Ok(ExtractedTable { name, bytes: buf })
}


#[cfg(test)]
mod tests {
    use super::test_support::zip_bytes;
    use super::*;

    #[test]
    fn extracts_single_csv() {
        let z = zip_bytes(&[("BhavCopy_NSE_CM_0_0_0_20240314_F_0000.csv", "A,B\n1,2\n")]);
        assert!(looks_like_zip(&z));
        let t = extract_table(&z).unwrap();
        assert_eq!(t.name, "BhavCopy_NSE_CM_0_0_0_20240314_F_0000.csv");
        assert_eq!(t.bytes, b"A,B\n1,2\n");
    }

    #[test]
    fn prefers_csv_entry() {
        let z = zip_bytes(&[("readme.txt", "hello"), ("data.CSV", "A\n1\n")]);
        assert_eq!(extract_table(&z).unwrap().name, "data.CSV");
    }

    #[test]
    fn falls_back_to_first_file() {
        let z = zip_bytes(&[("bhav.dat", "A\n1\n"), ("other.dat", "B\n2\n")]);
        assert_eq!(extract_table(&z).unwrap().name, "bhav.dat");
    }

    #[test]
    fn empty_archive() {
        let z = zip_bytes(&[]);
        assert!(looks_like_zip(&z));
        assert!(matches!(extract_table(&z), Err(ArchiveError::Empty)));
    }

    #[test]
    fn oversized_entry_is_rejected_not_truncated() {
        let z = zip_bytes(&[("big.csv", "A,B\n1,2\n3,4\n")]);
        match extract_table_capped(&z, 8) {
            Err(ArchiveError::Entry { name, reason }) => {
                assert_eq!(name, "big.csv");
                assert!(reason.contains("larger than 8 bytes"));
            }
            other => panic!("expected entry error, got {other:?}"),
        }
        // Exactly at the limit is fine.
        assert_eq!(extract_table_capped(&z, 12).unwrap().bytes.len(), 12);
    }

    #[test]
    fn garbage_is_unreadable() {
        assert!(!looks_like_zip(b"<html>"));
        assert!(matches!(
            extract_table(b"PK\x03\x04 truncated"),
            Err(ArchiveError::Unreadable(_))
        ));
    }
}
