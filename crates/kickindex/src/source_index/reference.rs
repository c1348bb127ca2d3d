//
// source_index/reference.rs
//
// Import sites discovered by the tokenizer
//

use std::path::{Path, PathBuf};

use super::symbols::SymbolSet;

/// One import site in a source file.
///
/// Produced by the tokenizer with `resolved_absolute_path` and
/// `import_once_override_symbols` unset; the orchestrator fills them in by
/// substituting a new record, never by editing one in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencedFileInfo {
    /// 0-based line of the directive
    pub line: u32,
    /// 0-based column of the path literal
    pub column: u32,
    /// Path exactly as written in the source
    pub raw_relative_path: String,
    /// Path with separators normalised to `/`
    pub normalized_relative_path: String,
    /// Symbols active at the directive
    pub active_symbols: SymbolSet,
    pub resolved_absolute_path: Option<PathBuf>,
    /// Set when the target is parse-once: the symbols of the single variant it resolves to
    pub import_once_override_symbols: Option<SymbolSet>,
}

impl ReferencedFileInfo {
    pub fn new(line: u32, column: u32, raw_relative_path: &str, active_symbols: SymbolSet) -> Self {
        Self {
            line,
            column,
            raw_relative_path: raw_relative_path.to_string(),
            normalized_relative_path: normalize_relative_path(raw_relative_path),
            active_symbols,
            resolved_absolute_path: None,
            import_once_override_symbols: None,
        }
    }

    /// Symbols the target is parsed (or looked up) with
    pub fn effective_symbols(&self) -> &SymbolSet {
        self.import_once_override_symbols
            .as_ref()
            .unwrap_or(&self.active_symbols)
    }

    pub fn with_resolved_path(&self, path: &Path) -> Self {
        Self {
            resolved_absolute_path: Some(path.to_path_buf()),
            ..self.clone()
        }
    }

    pub fn with_import_once_override(&self, symbols: SymbolSet) -> Self {
        Self {
            import_once_override_symbols: Some(symbols),
            ..self.clone()
        }
    }

    /// Copy with the orchestrator-filled fields cleared
    pub fn unresolved(&self) -> Self {
        Self {
            resolved_absolute_path: None,
            import_once_override_symbols: None,
            ..self.clone()
        }
    }
}

/// Normalise separators in a path as written in source
pub fn normalize_relative_path(raw: &str) -> String {
    raw.trim().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative_path() {
        assert_eq!(normalize_relative_path(" lib\\sprites.asm "), "lib/sprites.asm");
        assert_eq!(normalize_relative_path("a/b.asm"), "a/b.asm");
    }

    #[test]
    fn test_substitution_leaves_original_untouched() {
        let original = ReferencedFileInfo::new(3, 8, "gfx.asm", SymbolSet::new(["PAL"]));
        let resolved = original.with_resolved_path(Path::new("/p/gfx.asm"));
        let redirected = resolved.with_import_once_override(SymbolSet::new(["NTSC"]));

        assert!(original.resolved_absolute_path.is_none());
        assert_eq!(
            resolved.resolved_absolute_path.as_deref(),
            Some(Path::new("/p/gfx.asm"))
        );
        assert!(resolved.import_once_override_symbols.is_none());
        assert_eq!(redirected.effective_symbols(), &SymbolSet::new(["NTSC"]));
        assert_eq!(resolved.effective_symbols(), &SymbolSet::new(["PAL"]));
        assert_eq!(redirected.unresolved(), original);
    }
}
