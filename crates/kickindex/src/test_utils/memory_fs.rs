//! In-memory `FileSystem` for orchestrator tests.
//!
//! Every `write` advances a logical clock so timestamps change on each
//! write, which is what the orchestrator's reuse check keys on. Reads of a
//! path can be held at a gate to simulate slow I/O and exercise cancellation,
//! or made to fail while the file still exists and has a timestamp.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use crate::source_index::FileSystem;

#[derive(Debug, Clone)]
struct MemoryFile {
    content: String,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<PathBuf, MemoryFile>,
    clock: u64,
    reads: HashMap<PathBuf, usize>,
    gated: HashSet<PathBuf>,
    failing: HashMap<PathBuf, io::ErrorKind>,
}

pub struct MemoryFileSystem {
    inner: Mutex<Inner>,
    gate: watch::Sender<bool>,
    gate_reached: Notify,
}

impl std::fmt::Debug for MemoryFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFileSystem").finish_non_exhaustive()
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Mutex::new(Inner::default()),
            gate,
            gate_reached: Notify::new(),
        }
    }

    /// Create or overwrite a file, giving it a fresh timestamp
    pub fn write(&self, path: impl AsRef<Path>, content: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(inner.clock);
        inner.files.insert(
            path.as_ref().to_path_buf(),
            MemoryFile {
                content: content.to_string(),
                modified,
            },
        );
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.inner.lock().unwrap().files.remove(path.as_ref());
    }

    pub fn modified(&self, path: impl AsRef<Path>) -> Option<SystemTime> {
        self.inner
            .lock()
            .unwrap()
            .files
            .get(path.as_ref())
            .map(|f| f.modified)
    }

    /// Number of `read_to_string` calls that reached `path`
    pub fn read_count(&self, path: impl AsRef<Path>) -> usize {
        self.inner
            .lock()
            .unwrap()
            .reads
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Make every read of `path` fail with `kind`. `exists` and
    /// `last_write_time` are unaffected.
    pub fn fail_reads(&self, path: impl AsRef<Path>, kind: io::ErrorKind) {
        self.inner
            .lock()
            .unwrap()
            .failing
            .insert(path.as_ref().to_path_buf(), kind);
    }

    /// Hold reads of `path` until `open_gate` is called
    pub fn gate_reads(&self, path: impl AsRef<Path>) {
        self.inner
            .lock()
            .unwrap()
            .gated
            .insert(path.as_ref().to_path_buf());
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.inner.lock().unwrap().gated.clear();
        self.gate.send_replace(true);
    }

    /// Resolves once some read is blocked at the gate
    pub async fn wait_for_gated_read(&self) {
        self.gate_reached.notified().await;
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().files.contains_key(path)
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let gated = self.inner.lock().unwrap().gated.contains(path);
        if gated {
            let mut rx = self.gate.subscribe();
            self.gate_reached.notify_one();
            loop {
                let open = *rx.borrow_and_update();
                if open || rx.changed().await.is_err() {
                    break;
                }
            }
        }

        let mut inner = self.inner.lock().unwrap();
        *inner.reads.entry(path.to_path_buf()).or_insert(0) += 1;
        if let Some(kind) = inner.failing.get(path) {
            return Err(io::Error::new(*kind, path.display().to_string()));
        }
        inner
            .files
            .get(path)
            .map(|f| f.content.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    async fn last_write_time(&self, path: &Path) -> io::Result<SystemTime> {
        self.modified(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}
