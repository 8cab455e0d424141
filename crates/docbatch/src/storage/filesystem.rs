use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `content` to `path` so readers only ever observe the old or the new
/// contents: write to a unique sibling file, fsync, then rename over `path`.
pub fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    write_atomic_with(path, content, |_| Ok(()))
}

/// Same as [`write_atomic`], running `before_rename` against the fully
/// written temporary file. An error from the hook aborts the write and leaves
/// `path` untouched.
pub(crate) fn write_atomic_with<F>(path: &Path, content: &[u8], before_rename: F) -> std::io::Result<()>
where
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_directory(&dir)?;

    let temp_path = unique_temp_path(&dir, path);
    let result = (|| {
        // create_new so two writers never share a temporary file
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);
        before_rename(&temp_path)?;
        std::fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

fn unique_temp_path(dir: &Path, target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state");
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(".{}.{}.{}.tmp", name, std::process::id(), counter))
}

pub fn ensure_directory(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Removes a directory tree. Returns `false` when there was nothing to remove.
pub fn remove_dir_if_exists(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Removes a file. Returns `false` when there was nothing to remove.
pub fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/record.json");

        write_atomic(&path, b"{}").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_failed_hook_keeps_previous_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");
        write_atomic(&path, b"original").unwrap();

        let result = write_atomic_with(&path, b"replacement", |_| {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        });

        assert!(result.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"original");
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_remove_helpers_tolerate_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!remove_dir_if_exists(&temp_dir.path().join("absent")).unwrap());
        assert!(!remove_file_if_exists(&temp_dir.path().join("absent.json")).unwrap());

        let dir = temp_dir.path().join("present");
        std::fs::create_dir_all(dir.join("inner")).unwrap();
        assert!(remove_dir_if_exists(&dir).unwrap());
        assert!(!dir.exists());
    }
}
