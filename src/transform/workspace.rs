use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};

use crate::core::Hash32;

/// Where transform actions write their outputs.
///
/// Every (step, input) pair gets its own directory named after a hash of the
/// step name, the input path and the input content, so re-running a step on
/// unchanged input reuses the same location.
///
/// The directory does not depend on which set runs the step. Two sets
/// applying the same step to the same file share it, and their runs on it
/// are serialized through [`TransformWorkspace::dir_lock`].
#[derive(Debug, Clone)]
pub struct TransformWorkspace {
    root: Arc<Utf8PathBuf>,
    locks: Arc<Mutex<HashMap<Utf8PathBuf, Arc<Mutex<()>>>>>,
}

impl TransformWorkspace {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
            locks: Arc::default(),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// The output directory for running `step` on `input`, created if missing.
    pub fn dir_for(&self, step: &str, input: &Utf8Path) -> io::Result<Utf8PathBuf> {
        let content = if input.is_file() {
            Hash32::hash_file(input)?
        } else {
            Hash32::default()
        };

        let key = Hash32::hash_parts([
            step.as_bytes(),
            input.as_str().as_bytes(),
            content.as_bytes(),
        ]);

        let dir = self.root.join(key.to_hex());
        fs::create_dir_all(&dir)?;

        Ok(dir)
    }

    /// The lock guarding writes into `dir`, shared by every clone of this
    /// workspace.
    pub fn dir_lock(&self, dir: &Utf8Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(dir.to_path_buf()).or_default().clone()
    }

    /// Persist `data` under a content-addressed path with extension `ext`.
    pub fn store(&self, data: &[u8], ext: &str) -> io::Result<Utf8PathBuf> {
        let hash = Hash32::hash(data).to_hex();
        let dir = self.root.join("store");
        let path = dir.join(hash).with_extension(ext);

        if !path.exists() {
            fs::create_dir_all(&dir)?;
            fs::write(&path, data)?;
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, TransformWorkspace) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, TransformWorkspace::new(root))
    }

    #[test]
    fn test_dir_is_stable_for_same_input() {
        let (_guard, ws) = workspace();
        let input = ws.root().join("lib.jar");
        fs::write(&input, b"classes").unwrap();

        let a = ws.dir_for("unzip", &input).unwrap();
        let b = ws.dir_for("unzip", &input).unwrap();
        let c = ws.dir_for("minify", &input).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.is_dir());
    }

    #[test]
    fn test_dir_changes_with_content() {
        let (_guard, ws) = workspace();
        let input = ws.root().join("lib.jar");

        fs::write(&input, b"v1").unwrap();
        let before = ws.dir_for("unzip", &input).unwrap();

        fs::write(&input, b"v2").unwrap();
        let after = ws.dir_for("unzip", &input).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_clones_share_dir_and_lock() {
        let (_guard, ws) = workspace();
        let other = ws.clone();
        let input = ws.root().join("lib.jar");
        fs::write(&input, b"classes").unwrap();

        let a = ws.dir_for("unzip", &input).unwrap();
        let b = other.dir_for("unzip", &input).unwrap();
        let c = ws.dir_for("minify", &input).unwrap();

        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&ws.dir_lock(&a), &other.dir_lock(&b)));
        assert!(!Arc::ptr_eq(&ws.dir_lock(&a), &ws.dir_lock(&c)));
    }

    #[test]
    fn test_store_is_content_addressed() {
        let (_guard, ws) = workspace();

        let a = ws.store(b"hello", "txt").unwrap();
        let b = ws.store(b"hello", "txt").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.extension(), Some("txt"));
        assert_eq!(fs::read(&a).unwrap(), b"hello");
    }
}
