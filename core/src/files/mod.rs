//! Materializing received files and opening them

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::protocol::TransferItem;
use crate::{Error, Result};

/// Host file handling
pub trait FileStore: Send + Sync {
    /// Write the item's bytes to local storage, returning the path
    fn materialize(&self, item: &TransferItem) -> Result<PathBuf>;
    /// Open a file with the platform's default application
    fn open(&self, path: &Path) -> Result<()>;
}

/// Saves received files into one directory
#[derive(Debug, Clone)]
pub struct DownloadDir {
    root: PathBuf,
}

impl DownloadDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<Downloads>/peerclip`, falling back to the home directory
    pub fn platform_default() -> Self {
        let base = dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join("peerclip"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// First free path for `name`: `name`, then `stem (1).ext`, ...
    fn free_path(&self, name: &str) -> PathBuf {
        let candidate = self.root.join(name);
        if !candidate.exists() {
            return candidate;
        }

        let as_path = Path::new(name);
        let stem = as_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.to_string());
        let ext = as_path.extension().map(|e| e.to_string_lossy().to_string());

        (1..)
            .map(|n| match &ext {
                Some(ext) => self.root.join(format!("{} ({}).{}", stem, n, ext)),
                None => self.root.join(format!("{} ({})", stem, n)),
            })
            .find(|path| !path.exists())
            .unwrap_or(candidate)
    }
}

/// Final path component of an untrusted name, or a fallback
fn sanitize_file_name(name: Option<&str>, fallback: &str) -> String {
    name.and_then(|n| Path::new(n).file_name())
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| fallback.to_string())
}

impl FileStore for DownloadDir {
    fn materialize(&self, item: &TransferItem) -> Result<PathBuf> {
        let bytes = item.file_bytes()?;
        std::fs::create_dir_all(&self.root)?;

        let name = sanitize_file_name(item.file_name.as_deref(), &format!("peerclip-{}", item.id));
        let path = self.free_path(&name);
        std::fs::write(&path, bytes)?;

        tracing::info!("saved {} to {}", name, path.display());
        Ok(path)
    }

    fn open(&self, path: &Path) -> Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", ""]);
            cmd
        } else {
            Command::new("xdg-open")
        };

        let status = command
            .arg(path)
            .status()
            .map_err(|e| Error::File(format!("cannot open {}: {}", path.display(), e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::File(format!("opening {} exited with {}", path.display(), status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DownloadDir::new(dir.path().join("inbox"));
        let item = TransferItem::file("1".into(), "photo.png", &[1, 2, 3], None, "phone");

        let path = store.materialize(&item).unwrap();
        assert_eq!(path, dir.path().join("inbox").join("photo.png"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_materialize_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = DownloadDir::new(dir.path());
        let first = TransferItem::file("1".into(), "notes.txt", b"one", None, "phone");
        let second = TransferItem::file("2".into(), "notes.txt", b"two", None, "phone");

        let a = store.materialize(&first).unwrap();
        let b = store.materialize(&second).unwrap();
        assert_ne!(a, b);
        assert_eq!(b.file_name().unwrap(), "notes (1).txt");
        assert_eq!(std::fs::read(&a).unwrap(), b"one");
    }

    #[test]
    fn test_path_components_are_stripped() {
        assert_eq!(sanitize_file_name(Some("../../etc/passwd"), "x"), "passwd");
        assert_eq!(sanitize_file_name(Some(".."), "x"), "x");
        assert_eq!(sanitize_file_name(None, "peerclip-9"), "peerclip-9");
    }

    #[test]
    fn test_bad_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DownloadDir::new(dir.path());
        let mut item = TransferItem::file("1".into(), "x.bin", b"x", None, "phone");
        item.content = "***not base64***".into();

        assert!(matches!(store.materialize(&item), Err(Error::InvalidContent(_))));
    }
}
