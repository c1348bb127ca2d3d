//
// source_index/mod.rs
//
// Multi-variant source index for KickAssembler projects
//

pub mod condition;
pub mod config;
pub mod content_provider;
pub mod file_index;
pub mod import_once;
pub mod notifier;
pub mod orchestrator;
pub mod path_resolve;
pub mod reference;
pub mod symbols;
pub mod variant;


pub use condition::{Condition, ConditionError};
pub use config::IndexerConfig;
pub use content_provider::{DiskFileSystem, FileSystem, LiveContent, LiveOverrides};
pub use file_index::{FileIndex, FileIndexBuilder};
pub use import_once::{ImportOnceEntry, ImportOnceRegistry};
pub use notifier::{diff_indexes, ChangeNotifier, ChangeSet, FilesChangedEvent, FilesChangedHandler};
pub use orchestrator::{PassOutcome, PassState, PassSummary, SourceIndexer};
pub use path_resolve::{normalize_path, resolve_reference, SearchRoots};
pub use reference::ReferencedFileInfo;
pub use symbols::SymbolSet;
pub use variant::{ParsedFileVariant, VariantSet};
