//! 证据图片存储: <根目录>/accident_frames, <根目录>/fire_frames

use std::path::{Path, PathBuf};

use crate::error::{Result, SentinelError};
use crate::events::EventKind;

#[derive(Clone, Debug)]
pub struct EvidenceStore {
    root: PathBuf,
}

impl EvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 预先创建两个分类目录
    pub fn prepare(&self) -> Result<()> {
        for kind in [EventKind::Collision, EventKind::Fire] {
            std::fs::create_dir_all(self.root.join(kind.folder()))?;
        }
        Ok(())
    }

    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// 写入 JPEG, 返回绝对路径
    pub fn save(&self, relative: &str, jpeg: &[u8]) -> Result<PathBuf> {
        let path = self.absolute(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SentinelError::PersistFailure(format!("{}: {e}", parent.display())))?;
        }
        std::fs::write(&path, jpeg)
            .map_err(|e| SentinelError::PersistFailure(format!("{}: {e}", path.display())))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path().join("evidence"));
        store.prepare().unwrap();
        assert!(store.root().join("accident_frames").is_dir());
        assert!(store.root().join("fire_frames").is_dir());

        let path = store.save("fire_frames/fire_20240101_000000.jpg", b"jpeg").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"jpeg");
    }
}
