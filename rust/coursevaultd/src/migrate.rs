//! Moves assignment files so their location mirrors
//! `<root>/<year>/<season>/<courseCode>/<storedFileName>`, and prunes the
//! directories left empty behind them.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{MigrationError, MigrationStep};
use crate::model::{Assignment, Season};

pub fn assignment_dir(root: &Path, year: &str, season: Season, course_code: &str) -> PathBuf {
    root.join(year).join(season.as_str()).join(course_code)
}

/// Directory the record's file belongs in, given its current cached fields.
pub fn expected_dir(record: &Assignment, root: &Path) -> PathBuf {
    assignment_dir(root, &record.year, record.season, &record.course_code)
}

/// Copies the file into the directory derived from the record's fields under
/// `new_root`, deletes the original and prunes its emptied parents up to
/// `old_root`. The returned record points at the new location.
pub fn move_assignment_file(
    record: &Assignment,
    old_root: &Path,
    new_root: &Path,
) -> Result<Assignment, MigrationError> {
    let id = Some(record.id);
    let old_path = record.file.clone();
    let file_name = old_path.file_name().ok_or_else(|| {
        MigrationError::new(
            id,
            MigrationStep::Name,
            &old_path,
            io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })?;
    let new_dir = expected_dir(record, new_root);
    let mut new_path = new_dir.join(file_name);
    if new_path == old_path {
        return Ok(record.clone());
    }

    fs::create_dir_all(&new_dir)
        .map_err(|e| MigrationError::new(id, MigrationStep::CreateDir, &new_dir, e))?;

    if new_path.exists() {
        let stored = file_name.to_string_lossy();
        let name = next_stored_name(&new_dir, original_name(&stored))
            .map_err(|e| MigrationError::new(id, MigrationStep::Name, &new_dir, e))?;
        new_path = new_dir.join(name);
    }

    copy_verified(&old_path, &new_path).map_err(|mut e| {
        e.assignment_id = id;
        e
    })?;

    if let Err(e) = fs::remove_file(&old_path) {
        // Keep exactly one copy, at the path the record still names.
        let _ = fs::remove_file(&new_path);
        return Err(MigrationError::new(id, MigrationStep::RemoveSource, &old_path, e));
    }

    if let Some(parent) = old_path.parent() {
        prune_empty_ancestors(parent, old_root);
    }

    debug!(
        assignment_id = record.id,
        from = %old_path.display(),
        to = %new_path.display(),
        "moved assignment file"
    );
    let mut moved = record.clone();
    moved.file = new_path;
    Ok(moved)
}

/// Migrates every selected record in place. Failures are collected and the
/// failed record keeps its old `file`.
pub fn migrate_batch<F>(
    assignments: &mut [Assignment],
    select: F,
    old_root: &Path,
    new_root: &Path,
) -> Vec<MigrationError>
where
    F: Fn(&Assignment) -> bool,
{
    let mut failures = Vec::new();
    for record in assignments.iter_mut().filter(|a| select(a)) {
        match move_assignment_file(record, old_root, new_root) {
            Ok(moved) => *record = moved,
            Err(e) => {
                warn!(
                    assignment_id = record.id,
                    step = %e.step,
                    path = %e.path.display(),
                    error = %e.source,
                    "assignment file migration failed"
                );
                failures.push(e);
            }
        }
    }
    failures
}

/// Removes `dir` and then each parent while they are empty. Never removes
/// `root` or anything outside it. Returns how many directories went away.
pub fn prune_empty_ancestors(dir: &Path, root: &Path) -> usize {
    let mut removed = 0;
    let mut current = dir.to_path_buf();
    loop {
        if current == root || !current.starts_with(root) {
            break;
        }
        let empty = match fs::read_dir(&current) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => false,
        };
        if !empty || fs::remove_dir(&current).is_err() {
            break;
        }
        removed += 1;
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
    removed
}

pub fn remove_empty_assignment_dir(dir: &Path, root: &Path) -> usize {
    let removed = prune_empty_ancestors(dir, root);
    if removed > 0 {
        debug!(dir = %dir.display(), removed, "pruned empty assignment directories");
    }
    removed
}

/// `"<n+1>-<original>"` where `n` counts the entries already in `dir`,
/// advanced further while the name is taken.
pub fn next_stored_name(dir: &Path, original: &str) -> io::Result<String> {
    let mut n = match fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => return Err(e),
    };
    loop {
        let candidate = format!("{}-{}", n + 1, original);
        if !dir.join(&candidate).exists() {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Strips the `<digits>-` prefix added at upload time.
fn original_name(stored: &str) -> &str {
    match stored.split_once('-') {
        Some((n, rest)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => stored,
    }
}

/// Copies an external file into `dest_dir` under a fresh stored name.
pub fn place_upload(source: &Path, dest_dir: &Path) -> Result<PathBuf, MigrationError> {
    let original = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            MigrationError::new(
                None,
                MigrationStep::Name,
                source,
                io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
            )
        })?;
    fs::create_dir_all(dest_dir)
        .map_err(|e| MigrationError::new(None, MigrationStep::CreateDir, dest_dir, e))?;
    let name = next_stored_name(dest_dir, &original)
        .map_err(|e| MigrationError::new(None, MigrationStep::Name, dest_dir, e))?;
    let dest = dest_dir.join(name);
    copy_verified(source, &dest)?;
    Ok(dest)
}

/// Deletes the backing file and prunes its emptied parents. A file that is
/// already gone counts as deleted; returns whether anything was removed.
pub fn remove_assignment_file(record: &Assignment, root: &Path) -> Result<bool, MigrationError> {
    let removed = match fs::remove_file(&record.file) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            return Err(MigrationError::new(
                Some(record.id),
                MigrationStep::Remove,
                &record.file,
                e,
            ))
        }
    };
    if let Some(parent) = record.file.parent() {
        remove_empty_assignment_dir(parent, root);
    }
    Ok(removed)
}

/// Copies `src` to `dst` and checks both hash the same. On mismatch the
/// partial copy is removed.
pub fn copy_verified(src: &Path, dst: &Path) -> Result<(), MigrationError> {
    fs::copy(src, dst).map_err(|e| MigrationError::new(None, MigrationStep::Copy, src, e))?;
    let verify = |e: io::Error| MigrationError::new(None, MigrationStep::Verify, dst, e);
    let expected = sha256_file(src).map_err(verify)?;
    let actual = sha256_file(dst).map_err(verify)?;
    if expected != actual {
        let _ = fs::remove_file(dst);
        return Err(verify(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("checksum mismatch: expected {expected}, got {actual}"),
        )));
    }
    Ok(())
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
