//
// source_index/variant.rs
//
// Parse results per (file, incoming symbol set)
//

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use crate::tokenizer::{Diagnostic, Token};

use super::reference::ReferencedFileInfo;
use super::symbols::SymbolSet;

/// One tokenization result for one file under one incoming symbol set.
///
/// Variants are shared as `Arc<ParsedFileVariant>`; identity (`Arc::ptr_eq`)
/// is what change detection compares, so a variant reused across passes is
/// never rebuilt.
#[derive(Debug, Clone)]
pub struct ParsedFileVariant {
    pub path: PathBuf,
    /// Path relative to the project directory when it lies inside it
    pub relative_path: PathBuf,
    pub tokens: Vec<Token>,
    pub references: Vec<ReferencedFileInfo>,
    pub in_symbols: SymbolSet,
    pub out_symbols: SymbolSet,
    /// Disk timestamp, or the live buffer timestamp when `live_content` is set
    pub last_modified: SystemTime,
    pub live_content: Option<Arc<str>>,
    pub is_import_once: bool,
    /// Tokenizer diagnostics
    pub diagnostics: Vec<Diagnostic>,
    /// Diagnostics produced while resolving this file's references
    pub resolution_diagnostics: Vec<Diagnostic>,
}

impl ParsedFileVariant {
    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .chain(self.resolution_diagnostics.iter())
    }

    /// Copy-on-write update of the orchestrator-derived fields
    pub fn with_references(
        &self,
        references: Vec<ReferencedFileInfo>,
        resolution_diagnostics: Vec<Diagnostic>,
    ) -> Self {
        Self {
            references,
            resolution_diagnostics,
            ..self.clone()
        }
    }

    pub fn is_live(&self) -> bool {
        self.live_content.is_some()
    }
}

/// All variants of one path, keyed by incoming symbol set
#[derive(Debug, Clone, Default)]
pub struct VariantSet {
    variants: HashMap<SymbolSet, Arc<ParsedFileVariant>>,
}

impl VariantSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbols: &SymbolSet) -> Option<&Arc<ParsedFileVariant>> {
        self.variants.get(symbols)
    }

    pub fn contains(&self, symbols: &SymbolSet) -> bool {
        self.variants.contains_key(symbols)
    }

    /// Insert or replace the variant for `symbols`, returning the previous one
    pub fn insert(
        &mut self,
        symbols: SymbolSet,
        variant: Arc<ParsedFileVariant>,
    ) -> Option<Arc<ParsedFileVariant>> {
        self.variants.insert(symbols, variant)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SymbolSet, &Arc<ParsedFileVariant>)> {
        self.variants.iter()
    }

    pub fn variants(&self) -> impl Iterator<Item = &Arc<ParsedFileVariant>> {
        self.variants.values()
    }

    /// True when both sets hold the same number of variants and every key in
    /// `self` maps to the reference-identical variant in `other`.
    pub fn same_variants(&self, other: &VariantSet) -> bool {
        self.len() == other.len()
            && self.variants.iter().all(|(symbols, variant)| {
                other
                    .variants
                    .get(symbols)
                    .is_some_and(|old| Arc::ptr_eq(old, variant))
            })
    }
}

#[cfg(test)]
pub(crate) fn test_variant(path: &str, in_symbols: SymbolSet) -> Arc<ParsedFileVariant> {
    Arc::new(ParsedFileVariant {
        path: PathBuf::from(path),
        relative_path: PathBuf::from(path),
        tokens: Vec::new(),
        references: Vec::new(),
        out_symbols: in_symbols.clone(),
        in_symbols,
        last_modified: SystemTime::UNIX_EPOCH,
        live_content: None,
        is_import_once: false,
        diagnostics: Vec::new(),
        resolution_diagnostics: Vec::new(),
    })
}
