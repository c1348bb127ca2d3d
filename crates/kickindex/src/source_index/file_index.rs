//
// source_index/file_index.rs
//
// Path -> variant set index: pass-private builder and published snapshot
//

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::tokenizer::Diagnostic;

use super::reference::ReferencedFileInfo;
use super::symbols::SymbolSet;
use super::variant::{ParsedFileVariant, VariantSet};

/// Mutable index owned by exactly one running pass
#[derive(Debug, Default)]
pub struct FileIndexBuilder {
    files: HashMap<PathBuf, VariantSet>,
}

impl FileIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path, symbols: &SymbolSet) -> bool {
        self.files
            .get(path)
            .map(|set| set.contains(symbols))
            .unwrap_or(false)
    }

    /// Register (or replace) the variant for `(path, symbols)`
    pub fn insert(&mut self, path: PathBuf, symbols: SymbolSet, variant: Arc<ParsedFileVariant>) {
        self.files.entry(path).or_default().insert(symbols, variant);
    }

    pub fn freeze(self) -> FileIndex {
        FileIndex { files: self.files }
    }
}

/// Immutable published snapshot of the project's parsed files.
///
/// Snapshots are never mutated after publish; a new pass replaces the
/// shared `Arc<FileIndex>` wholesale.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    files: HashMap<PathBuf, VariantSet>,
}

impl FileIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&VariantSet> {
        self.files.get(path)
    }

    pub fn variant(&self, path: &Path, symbols: &SymbolSet) -> Option<&Arc<ParsedFileVariant>> {
        self.files.get(path)?.get(symbols)
    }

    /// Find the variant a resolved reference points at.
    ///
    /// References redirected to a parse-once file carry the out-symbols of
    /// the single variant that was parsed; all others are keyed by their
    /// active symbols.
    pub fn variant_for_reference(
        &self,
        reference: &ReferencedFileInfo,
    ) -> Option<&Arc<ParsedFileVariant>> {
        let path = reference.resolved_absolute_path.as_ref()?;
        let set = self.files.get(path)?;
        match &reference.import_once_override_symbols {
            Some(symbols) => set
                .variants()
                .find(|v| v.is_import_once && &v.out_symbols == symbols),
            None => set.get(&reference.active_symbols),
        }
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &VariantSet)> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn variant_count(&self) -> usize {
        self.files.values().map(VariantSet::len).sum()
    }

    /// Every diagnostic of every variant, tagged with its file
    pub fn diagnostics(&self) -> impl Iterator<Item = (&Path, &Diagnostic)> {
        self.files.iter().flat_map(|(path, set)| {
            set.variants()
                .flat_map(move |v| v.all_diagnostics().map(move |d| (path.as_path(), d)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_index::variant::test_variant;

    #[test]
    fn test_builder_contains_by_membership() {
        let mut builder = FileIndexBuilder::new();
        let path = PathBuf::from("/p/main.asm");
        builder.insert(
            path.clone(),
            SymbolSet::new(["A", "B"]),
            test_variant("/p/main.asm", SymbolSet::new(["A", "B"])),
        );

        assert!(builder.contains(&path, &SymbolSet::new(["B", "A"])));
        assert!(!builder.contains(&path, &SymbolSet::new(["A"])));
        assert!(!builder.contains(Path::new("/p/other.asm"), &SymbolSet::new(["A", "B"])));
    }

    #[test]
    fn test_freeze_keeps_identity() {
        let mut builder = FileIndexBuilder::new();
        let v = test_variant("/p/main.asm", SymbolSet::empty());
        builder.insert(PathBuf::from("/p/main.asm"), SymbolSet::empty(), v.clone());

        let index = builder.freeze();
        let stored = index
            .variant(Path::new("/p/main.asm"), &SymbolSet::empty())
            .unwrap();
        assert!(Arc::ptr_eq(stored, &v));
        assert_eq!(index.len(), 1);
        assert_eq!(index.variant_count(), 1);
    }

    #[test]
    fn test_variant_for_reference_follows_override() {
        let once = Arc::new(ParsedFileVariant {
            is_import_once: true,
            out_symbols: SymbolSet::new(["X", "C_LOADED"]),
            ..(*test_variant("/p/c.asm", SymbolSet::new(["X"]))).clone()
        });
        let mut builder = FileIndexBuilder::new();
        builder.insert(PathBuf::from("/p/c.asm"), SymbolSet::new(["X"]), once.clone());
        let index = builder.freeze();

        let reference = ReferencedFileInfo::new(0, 8, "c.asm", SymbolSet::new(["Y"]))
            .with_resolved_path(Path::new("/p/c.asm"));
        assert!(index.variant_for_reference(&reference).is_none());

        let redirected = reference.with_import_once_override(once.out_symbols.clone());
        let found = index.variant_for_reference(&redirected).unwrap();
        assert!(Arc::ptr_eq(found, &once));
    }
}
