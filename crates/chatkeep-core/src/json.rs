//! Whole-document JSON file helpers shared by the config and history stores.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::{RecordError, Result};

/// Pretty-print with a 4-space indent. Non-ASCII text is written as UTF-8.
pub(crate) fn to_pretty_vec<T: Serialize + ?Sized>(value: &T) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser).map_err(io::Error::other)?;
    Ok(buf)
}

/// Read a document. `Ok(None)` means the file exists but is zero-length.
pub(crate) fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = std::fs::read(path).map_err(|e| RecordError::access(path, e))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| RecordError::Corrupted {
            path: path.to_path_buf(),
            source,
        })
}

/// Create (or truncate) the file and write the document into it.
pub(crate) fn create_document<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = to_pretty_vec(value).map_err(|e| RecordError::io(path, e))?;
    std::fs::write(path, bytes).map_err(|e| RecordError::io(path, e))
}

/// Replace the contents of an existing file. Never creates it.
pub(crate) fn overwrite_document<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = to_pretty_vec(value).map_err(|e| RecordError::io(path, e))?;
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| RecordError::access(path, e))?;
    file.write_all(&bytes).map_err(|e| RecordError::io(path, e))
}

/// Truncate an existing file to zero length.
pub(crate) fn truncate_existing(path: &Path) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map(drop)
        .map_err(|e| RecordError::access(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_space_indent_and_utf8() {
        let bytes = to_pretty_vec(&serde_json::json!({ "k": "Привет" })).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "{\n    \"k\": \"Привет\"\n}");
    }

    #[test]
    fn test_read_zero_length_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, "").unwrap();
        let doc: Option<Vec<u32>> = read_document(&path).unwrap();
        assert!(doc.is_none());
    }

    #[test]
    fn test_read_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        let err = read_document::<Vec<u32>>(&path).unwrap_err();
        assert!(err.is_missing());

        std::fs::write(&path, "[1, 2,").unwrap();
        let err = read_document::<Vec<u32>>(&path).unwrap_err();
        assert!(err.is_corrupted());
    }

    #[test]
    fn test_overwrite_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        let err = overwrite_document(&path, &[1, 2]).unwrap_err();
        assert!(err.is_missing());
        assert!(!path.exists());

        create_document(&path, &[1, 2, 3]).unwrap();
        overwrite_document(&path, &[4]).unwrap();
        let doc: Option<Vec<u32>> = read_document(&path).unwrap();
        assert_eq!(doc, Some(vec![4]));
    }

    #[test]
    fn test_truncate_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        assert!(truncate_existing(&path).unwrap_err().is_missing());

        std::fs::write(&path, "[1]").unwrap();
        truncate_existing(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}
