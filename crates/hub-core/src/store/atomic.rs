//! Crash-safe file replacement.
//!
//! Content is written to a uniquely named temporary file next to the target,
//! synced, then renamed over the target. Readers see either the old file or
//! the new one, and concurrent writers never share a temporary file, so the
//! last rename wins. On unix the file is created owner-only, since it can
//! carry secrets.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Permission bits for files that may hold secrets
pub const OWNER_ONLY: u32 = 0o600;

/// Suffix of in-flight temporary files
pub const TEMP_SUFFIX: &str = ".tmp";

/// Atomically replace `path` with `contents`
///
/// # Errors
///
/// `StorePersist` if any step fails. The target is untouched in that case
/// and the temporary file is removed.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let target = path.to_path_buf();
    let contents = contents.to_vec();
    tokio::task::spawn_blocking(move || write_then_persist(&target, &contents))
        .await
        .map_err(std::io::Error::other)
        .and_then(|written| written)
        .map_err(|e| Error::persist(path, e))
}

/// Directory holding `path` and its temporary files
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_then_persist(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(&dir)?;

    let mut prefix = std::ffi::OsString::from(".");
    prefix.push(path.file_name().unwrap_or_default());
    prefix.push(".");

    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(TEMP_SUFFIX);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(OWNER_ONLY));
    }

    // Dropped on any early return, which deletes the temporary file
    let mut tmp = builder.tempfile_in(&dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(TEMP_SUFFIX))
            .collect()
    }

    #[tokio::test]
    async fn replaces_file_and_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/hub.toml");

        write_atomic(&path, b"one").await.unwrap();
        write_atomic(&path, b"two").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert!(leftovers(&dir.path().join("nested")).is_empty());
    }

    #[tokio::test]
    async fn unrelated_temporary_files_are_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        let foreign = dir.path().join(".hub.toml.abcdef.tmp");
        std::fs::write(&foreign, "another writer").unwrap();

        write_atomic(&path, b"complete").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "complete");
        assert_eq!(std::fs::read_to_string(&foreign).unwrap(), "another writer");
    }

    #[tokio::test]
    async fn failed_write_leaves_target_untouched() {
        let dir = tempdir().unwrap();
        // The target name fits, the temporary name derived from it does not
        let path = dir.path().join(format!("{}.toml", "h".repeat(245)));
        std::fs::write(&path, "original").unwrap();

        let err = write_atomic(&path, b"replacement").await.unwrap_err();
        assert!(matches!(err, Error::StorePersist { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_all_succeed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");

        let mut writers = tokio::task::JoinSet::new();
        for i in 0..32 {
            let path = path.clone();
            writers.spawn(async move { write_atomic(&path, format!("writer {i}").as_bytes()).await });
        }
        while let Some(joined) = writers.join_next().await {
            joined.unwrap().unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("writer "), "torn content: {text}");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        write_atomic(&path, b"secret").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, OWNER_ONLY);
    }
}
