//! Whole-document JSON persistence for the record collections.
//!
//! Every call goes back to disk; nothing is cached between operations.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::model::Record;

pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text).map_err(|source| StoreError::Corruption {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let persistence = |source: io::Error| StoreError::Persistence {
        path: path.to_path_buf(),
        source,
    };
    let bytes = to_pretty_json(records)
        .map_err(|e| persistence(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    write_replacing(path, &bytes).map_err(persistence)
}

/// Pretty JSON with 4-space indentation.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Writes a sibling temp file and renames it over `path`, so readers see
/// either the old document or the new one.
pub fn write_replacing(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = temp_sibling(path);
    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("document"));
    name.push(".writing");
    path.with_file_name(name)
}

pub fn find_by_id<T: Record>(records: &[T], id: i64) -> Option<&T> {
    records.iter().find(|r| r.id() == id)
}

pub fn position_by_id<T: Record>(records: &[T], id: i64) -> Option<usize> {
    records.iter().position(|r| r.id() == id)
}

pub fn find_by<T, P>(records: &[T], mut predicate: P) -> Option<&T>
where
    P: FnMut(&T) -> bool,
{
    records.iter().find(|r| predicate(r))
}

pub fn count_by<T, P>(records: &[T], mut predicate: P) -> usize
where
    P: FnMut(&T) -> bool,
{
    records.iter().filter(|r| predicate(r)).count()
}
