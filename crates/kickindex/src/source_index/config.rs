//
// source_index/config.rs
//
// Configuration for the source index
//

use std::path::PathBuf;

use serde::Deserialize;

use crate::tokenizer::Severity;

/// Source index configuration.
///
/// Hosts usually pass this as JSON (initialization options or a project
/// settings file); unknown keys are ignored and missing ones take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexerConfig {
    /// Entry file name, relative to the project directory
    pub entry_file: String,
    /// Library directories searched after the referencing file's directory.
    /// Relative entries are resolved against the project directory.
    pub library_directories: Vec<PathBuf>,
    /// Symbols defined for every pass in addition to the per-call ones
    pub initial_symbols: Vec<String>,
    /// Severity for imports that match no search root
    pub unresolved_import_severity: Severity,
    /// Extensions treated as project sources when reporting unreached files
    pub file_extensions: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            entry_file: "main.asm".to_string(),
            library_directories: Vec::new(),
            initial_symbols: Vec::new(),
            unresolved_import_severity: Severity::Warning,
            file_extensions: vec!["asm".to_string(), "s".to_string(), "inc".to_string()],
        }
    }
}

impl IndexerConfig {
    pub fn from_json(value: &serde_json::Value) -> anyhow::Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    /// Check if settings that change how imports resolve differ between two configs
    pub fn search_settings_changed(&self, other: &Self) -> bool {
        self.entry_file != other.entry_file
            || self.library_directories != other.library_directories
            || self.initial_symbols != other.initial_symbols
    }

    /// Whether `path` has one of the configured source extensions
    pub fn is_source_file(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.file_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn test_default_values() {
        let config = IndexerConfig::default();
        assert_eq!(config.entry_file, "main.asm");
        assert!(config.library_directories.is_empty());
        assert!(config.initial_symbols.is_empty());
        assert_eq!(config.unresolved_import_severity, Severity::Warning);
        assert_eq!(config.file_extensions, vec!["asm", "s", "inc"]);
    }

    #[test]
    fn test_from_json_partial() {
        let config = IndexerConfig::from_json(&json!({
            "libraryDirectories": ["lib", "/opt/kick/include"],
            "initialSymbols": ["PAL"],
            "unresolvedImportSeverity": "error",
            "somethingElse": true
        }))
        .unwrap();
        assert_eq!(config.entry_file, "main.asm");
        assert_eq!(
            config.library_directories,
            vec![PathBuf::from("lib"), PathBuf::from("/opt/kick/include")]
        );
        assert_eq!(config.initial_symbols, vec!["PAL"]);
        assert_eq!(config.unresolved_import_severity, Severity::Error);
    }

    #[test]
    fn test_from_json_rejects_wrong_types() {
        assert!(IndexerConfig::from_json(&json!({ "entryFile": 3 })).is_err());
    }

    #[test]
    fn test_search_settings_changed() {
        let config1 = IndexerConfig::default();
        let mut config2 = IndexerConfig::default();
        assert!(!config1.search_settings_changed(&config2));

        config2.library_directories.push(PathBuf::from("lib"));
        assert!(config1.search_settings_changed(&config2));

        config2 = IndexerConfig::default();
        config2.unresolved_import_severity = Severity::Hint;
        assert!(!config1.search_settings_changed(&config2));
    }

    #[test]
    fn test_is_source_file() {
        let config = IndexerConfig::default();
        assert!(config.is_source_file(Path::new("/p/main.asm")));
        assert!(config.is_source_file(Path::new("/p/IRQ.INC")));
        assert!(!config.is_source_file(Path::new("/p/music.sid")));
        assert!(!config.is_source_file(Path::new("/p/Makefile")));
    }
}
