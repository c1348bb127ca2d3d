//
// source_index/import_once.rs
//
// Per-pass registry of files that declared #importonce
//

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::symbols::SymbolSet;
use super::variant::ParsedFileVariant;

#[derive(Debug, Clone)]
pub struct ImportOnceEntry {
    /// Out-symbols of the single parse; redirected references carry these
    pub symbols: SymbolSet,
    pub variant: Arc<ParsedFileVariant>,
}

/// Records the first parse of every parse-once file within one pass
#[derive(Debug, Default)]
pub struct ImportOnceRegistry {
    entries: HashMap<PathBuf, ImportOnceEntry>,
}

impl ImportOnceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&ImportOnceEntry> {
        self.entries.get(path)
    }

    /// Register a parse-once file. The first registration wins; returns
    /// `false` if the path was already registered.
    pub fn register(
        &mut self,
        path: PathBuf,
        symbols: SymbolSet,
        variant: Arc<ParsedFileVariant>,
    ) -> bool {
        if self.entries.contains_key(&path) {
            return false;
        }
        log::trace!(
            "Registered import-once file {} with symbols {}",
            path.display(),
            symbols
        );
        self.entries
            .insert(path, ImportOnceEntry { symbols, variant });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
