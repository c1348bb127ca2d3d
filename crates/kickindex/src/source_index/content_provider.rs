//
// source_index/content_provider.rs
//
// File system and live editor buffer access for the source index
//

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use super::path_resolve::normalize_path;

/// File system capabilities consumed by the orchestrator.
///
/// Every call is a suspension point of the running pass.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;
    async fn last_write_time(&self, path: &Path) -> io::Result<SystemTime>;
}

/// `FileSystem` backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFileSystem;

#[async_trait]
impl FileSystem for DiskFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn last_write_time(&self, path: &Path) -> io::Result<SystemTime> {
        tokio::fs::metadata(path).await?.modified()
    }
}

/// Unsaved editor buffer content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveContent {
    pub content: Arc<str>,
    pub timestamp: SystemTime,
}

impl LiveContent {
    pub fn new(content: impl Into<Arc<str>>, timestamp: SystemTime) -> Self {
        Self {
            content: content.into(),
            timestamp,
        }
    }
}

/// Live buffers supplied fresh for each pass, keyed by normalised absolute path
#[derive(Debug, Clone, Default)]
pub struct LiveOverrides {
    buffers: HashMap<PathBuf, LiveContent>,
}

impl LiveOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, content: LiveContent) {
        let path = path.as_ref();
        let key = normalize_path(path).unwrap_or_else(|| path.to_path_buf());
        self.buffers.insert(key, content);
    }

    pub fn get(&self, path: &Path) -> Option<&LiveContent> {
        self.buffers.get(path)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl<P: AsRef<Path>> FromIterator<(P, LiveContent)> for LiveOverrides {
    fn from_iter<T: IntoIterator<Item = (P, LiveContent)>>(iter: T) -> Self {
        let mut overrides = Self::new();
        for (path, content) in iter {
            overrides.insert(path, content);
        }
        overrides
    }
}
