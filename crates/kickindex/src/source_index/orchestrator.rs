//
// source_index/orchestrator.rs
//
// Parse passes over a project's import graph
//
// A pass walks the graph depth-first from the entry file, one file at a
// time. Each (path, incoming symbols) variant is registered in the builder
// BEFORE its references are followed; the builder lookup at the top of
// `walk` is the only thing that stops cyclic imports from recursing
// forever. Keep that ordering.
//

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

use crate::perf::TimingGuard;
use crate::tokenizer::{Diagnostic, DiagnosticCode, Severity, Tokenizer};

use super::config::IndexerConfig;
use super::content_provider::{FileSystem, LiveOverrides};
use super::file_index::{FileIndex, FileIndexBuilder};
use super::import_once::ImportOnceRegistry;
use super::notifier::{diff_indexes, ChangeNotifier, ChangeSet, FilesChangedEvent};
use super::path_resolve::{
    absolutize_directories, normalize_path, relative_to, resolve_reference, SearchRoots,
};
use super::symbols::SymbolSet;
use super::variant::ParsedFileVariant;

/// Lifecycle of the most recent pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PassSummary {
    pub pass_id: u64,
    pub files: usize,
    pub variants: usize,
    /// Variants carried over from the previous snapshot
    pub reused: usize,
    /// Variants produced by the tokenizer in this pass
    pub tokenized: usize,
    pub changes: ChangeSet,
    /// False when the pass produced an index identical to the published one
    pub published: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub enum PassOutcome {
    Completed(PassSummary),
    /// Superseded by a newer pass or stopped; nothing was published
    Cancelled,
    /// Infrastructure failure; the previous snapshot stays authoritative
    Failed(String),
}

impl PassOutcome {
    pub fn summary(&self) -> Option<&PassSummary> {
        match self {
            PassOutcome::Completed(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PassOutcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PassOutcome::Cancelled)
    }
}

#[derive(Debug, Clone)]
struct Project {
    directory: PathBuf,
    entry_file: PathBuf,
}

impl Project {
    fn new(directory: PathBuf, entry_file: &str) -> Self {
        let entry_path = directory.join(entry_file);
        let entry_file = normalize_path(&entry_path).unwrap_or(entry_path);
        Self {
            directory,
            entry_file,
        }
    }
}

/// Inputs of the most recent `parse` call, replayed after a config change
#[derive(Debug, Clone)]
struct PassRequest {
    live: LiveOverrides,
    initial_symbols: SymbolSet,
    library_directories: Vec<PathBuf>,
}

/// Incremental, multi-variant index of a KickAssembler project.
///
/// At most one pass runs at a time. Starting a pass cancels the active one
/// and waits for it to wind down. Readers take the published snapshot via
/// [`SourceIndexer::all_files`]; it is replaced, never mutated.
pub struct SourceIndexer {
    config: RwLock<IndexerConfig>,
    fs: Arc<dyn FileSystem>,
    tokenizer: Arc<dyn Tokenizer>,
    project: RwLock<Option<Project>>,
    last_request: Mutex<Option<PassRequest>>,
    snapshot: RwLock<Arc<FileIndex>>,
    state: Mutex<PassState>,
    /// Token of the most recently started pass
    active: Mutex<Option<(u64, CancellationToken)>>,
    /// Held by the running pass; serializes passes
    run_lock: tokio::sync::Mutex<()>,
    notifier: ChangeNotifier,
    pass_counter: AtomicU64,
}

impl std::fmt::Debug for SourceIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceIndexer")
            .field("config", &self.config())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SourceIndexer {
    pub fn new(
        config: IndexerConfig,
        fs: Arc<dyn FileSystem>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            fs,
            tokenizer,
            project: RwLock::new(None),
            last_request: Mutex::new(None),
            snapshot: RwLock::new(Arc::new(FileIndex::empty())),
            state: Mutex::new(PassState::Idle),
            active: Mutex::new(None),
            run_lock: tokio::sync::Mutex::new(()),
            notifier: ChangeNotifier::new(),
            pass_counter: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> IndexerConfig {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Replace the configuration.
    ///
    /// When the entry file, library directories or initial symbols changed
    /// and a project is established, the most recent pass's inputs are
    /// parsed again under the new settings and that pass's outcome is
    /// returned. Otherwise the new settings apply from the next pass on.
    pub async fn set_config(&self, config: IndexerConfig) -> Option<PassOutcome> {
        let entry_file = config.entry_file.clone();
        let changed = {
            let mut current = self
                .config
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let changed = current.search_settings_changed(&config);
            *current = config;
            changed
        };
        if !changed {
            return None;
        }

        if let Ok(mut project) = self.project.write() {
            if let Some(current) = project.as_mut() {
                *current = Project::new(current.directory.clone(), &entry_file);
            }
        }
        let request = self.last_request.lock().ok().and_then(|r| r.clone())?;
        log::info!("Import search settings changed; parsing again");
        Some(
            self.parse(request.live, request.initial_symbols, request.library_directories)
                .await,
        )
    }

    /// Current published snapshot
    pub fn all_files(&self) -> Arc<FileIndex> {
        self.snapshot
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn state(&self) -> PassState {
        self.state.lock().map(|s| *s).unwrap_or(PassState::Failed)
    }

    /// Id of the most recently started pass (0 before the first one)
    pub fn pass_count(&self) -> u64 {
        self.pass_counter.load(Ordering::SeqCst)
    }

    pub fn project_directory(&self) -> Option<PathBuf> {
        self.project
            .read()
            .ok()?
            .as_ref()
            .map(|p| p.directory.clone())
    }

    pub fn entry_file(&self) -> Option<PathBuf> {
        self.project
            .read()
            .ok()?
            .as_ref()
            .map(|p| p.entry_file.clone())
    }

    /// Subscribe to files-changed events. Handlers run on the pass's task and
    /// may attach follow-up work that the pass awaits before completing.
    pub fn on_files_changed<F>(&self, handler: F)
    where
        F: Fn(&FilesChangedEvent) + Send + Sync + 'static,
    {
        self.notifier.subscribe(Arc::new(handler));
    }

    /// Establish `project_directory/<entry_file>` as the entry file and run the first pass
    pub async fn initial_parse(
        &self,
        project_directory: &Path,
        live: LiveOverrides,
        initial_symbols: SymbolSet,
        library_directories: Vec<PathBuf>,
    ) -> PassOutcome {
        let directory =
            normalize_path(project_directory).unwrap_or_else(|| project_directory.to_path_buf());
        let established = Project::new(directory, &self.config().entry_file);
        log::info!(
            "Establishing project {} (entry {})",
            established.directory.display(),
            established.entry_file.display()
        );
        if let Ok(mut project) = self.project.write() {
            *project = Some(established);
        }
        self.parse(live, initial_symbols, library_directories).await
    }

    /// Run a pass against the established entry file
    pub async fn parse(
        &self,
        live: LiveOverrides,
        initial_symbols: SymbolSet,
        library_directories: Vec<PathBuf>,
    ) -> PassOutcome {
        let project = self.project.read().ok().and_then(|p| p.clone());
        let Some(project) = project else {
            log::warn!("parse requested before initial_parse established a project");
            self.set_state(PassState::Failed);
            return PassOutcome::Failed("no project established".to_string());
        };
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(PassRequest {
                live: live.clone(),
                initial_symbols: initial_symbols.clone(),
                library_directories: library_directories.clone(),
            });
        }

        let pass_id = self.pass_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        if let Ok(mut active) = self.active.lock() {
            if let Some((previous_id, previous)) = active.replace((pass_id, token.clone())) {
                log::trace!("Pass {} supersedes pass {}", pass_id, previous_id);
                previous.cancel();
            }
        }

        let _running = self.run_lock.lock().await;
        if token.is_cancelled() {
            log::trace!("Pass {} superseded before it started", pass_id);
            return PassOutcome::Cancelled;
        }

        self.set_state(PassState::Running);
        let outcome = match self
            .execute_pass(pass_id, &project, &token, live, initial_symbols, library_directories)
            .await
        {
            Ok(Some(summary)) => {
                log::info!(
                    "Pass {} completed: {} files, {} variants ({} tokenized, {} reused), {} changed, in {:?}",
                    pass_id,
                    summary.files,
                    summary.variants,
                    summary.tokenized,
                    summary.reused,
                    summary.changes.len(),
                    summary.duration
                );
                PassOutcome::Completed(summary)
            }
            Ok(None) => {
                log::info!("Pass {} cancelled", pass_id);
                PassOutcome::Cancelled
            }
            Err(e) => {
                log::warn!("Pass {} failed: {:#}", pass_id, e);
                PassOutcome::Failed(e.to_string())
            }
        };

        self.set_state(match &outcome {
            PassOutcome::Completed(_) => PassState::Completed,
            PassOutcome::Cancelled => PassState::Cancelled,
            PassOutcome::Failed(_) => PassState::Failed,
        });
        if let Ok(mut active) = self.active.lock() {
            if active.as_ref().is_some_and(|(id, _)| *id == pass_id) {
                *active = None;
            }
        }
        outcome
    }

    /// Cancel any in-flight pass and wait until it has stopped. Idempotent.
    pub async fn stop(&self) {
        let active = self.active.lock().ok().and_then(|mut a| a.take());
        if let Some((pass_id, token)) = active {
            log::trace!("Stopping pass {}", pass_id);
            token.cancel();
        }
        let _idle = self.run_lock.lock().await;
    }

    /// Swap in `index` unless `token` was cancelled, checked under the
    /// snapshot lock. Returns whether the index was published.
    fn publish(&self, token: &CancellationToken, index: &Arc<FileIndex>) -> anyhow::Result<bool> {
        let mut snapshot = self
            .snapshot
            .write()
            .map_err(|_| anyhow!("snapshot lock poisoned"))?;
        if token.is_cancelled() {
            return Ok(false);
        }
        *snapshot = index.clone();
        Ok(true)
    }

    fn set_state(&self, state: PassState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Returns `Ok(None)` when cancelled
    async fn execute_pass(
        &self,
        pass_id: u64,
        project: &Project,
        token: &CancellationToken,
        live: LiveOverrides,
        initial_symbols: SymbolSet,
        library_directories: Vec<PathBuf>,
    ) -> anyhow::Result<Option<PassSummary>> {
        let timing = TimingGuard::with_budget("source_index:pass", 500);
        let config = self.config();

        let symbols = initial_symbols.union(&SymbolSet::new(config.initial_symbols.iter().cloned()));
        let mut search_dirs = library_directories;
        search_dirs.extend(config.library_directories.iter().cloned());
        let search_dirs = absolutize_directories(&project.directory, &search_dirs);

        let previous = self.all_files();
        log::trace!(
            "Pass {} starting at {} with symbols {} ({} library directories, {} live buffers)",
            pass_id,
            project.entry_file.display(),
            symbols,
            search_dirs.len(),
            live.len()
        );

        let mut pass = Pass {
            fs: self.fs.as_ref(),
            tokenizer: self.tokenizer.as_ref(),
            token,
            live: &live,
            previous: &previous,
            project_directory: &project.directory,
            library_directories: &search_dirs,
            unresolved_severity: config.unresolved_import_severity,
            builder: FileIndexBuilder::new(),
            registry: ImportOnceRegistry::new(),
            reused: 0,
            tokenized: 0,
        };

        match pass.walk(project.entry_file.clone(), symbols).await {
            Err(Cancelled) => return Ok(None),
            Ok(Visit::Unreadable(e)) => {
                return Err(anyhow!(
                    "cannot read entry file {}: {}",
                    project.entry_file.display(),
                    e
                ));
            }
            Ok(Visit::Parsed) | Ok(Visit::Known) => {}
        }
        if token.is_cancelled() {
            return Ok(None);
        }
        if !pass.registry.is_empty() {
            log::trace!(
                "Pass {} parsed {} files once only",
                pass_id,
                pass.registry.len()
            );
        }

        let reused = pass.reused;
        let tokenized = pass.tokenized;
        let index = Arc::new(pass.builder.freeze());
        let changes = diff_indexes(&previous, &index);
        let published = !changes.is_empty();

        if published {
            if !self.publish(token, &index)? {
                return Ok(None);
            }
            self.notifier
                .notify(changes.clone(), token.clone(), index.clone())
                .await;
        } else {
            log::trace!("Pass {} produced no changes; keeping previous snapshot", pass_id);
        }

        Ok(Some(PassSummary {
            pass_id,
            files: index.len(),
            variants: index.variant_count(),
            reused,
            tokenized,
            changes,
            published,
            duration: timing.finish(),
        }))
    }
}

struct Cancelled;

enum Visit {
    /// A variant was registered by this call
    Parsed,
    /// The (path, symbols) key was already in the builder
    Known,
    /// Content could not be read; nothing was registered
    Unreadable(io::Error),
}

type WalkFuture<'b> = Pin<Box<dyn Future<Output = Result<Visit, Cancelled>> + Send + 'b>>;

/// State exclusively owned by one running pass
struct Pass<'a> {
    fs: &'a dyn FileSystem,
    tokenizer: &'a dyn Tokenizer,
    token: &'a CancellationToken,
    live: &'a LiveOverrides,
    previous: &'a FileIndex,
    project_directory: &'a Path,
    library_directories: &'a [PathBuf],
    unresolved_severity: Severity,
    builder: FileIndexBuilder,
    registry: ImportOnceRegistry,
    reused: usize,
    tokenized: usize,
}

impl<'a> Pass<'a> {
    fn walk<'b>(&'b mut self, path: PathBuf, symbols: SymbolSet) -> WalkFuture<'b> {
        Box::pin(async move {
            if self.token.is_cancelled() {
                return Err(Cancelled);
            }
            if self.builder.contains(&path, &symbols) {
                return Ok(Visit::Known);
            }

            let variant = match self.load_variant(&path, &symbols).await {
                Ok(variant) => variant,
                Err(e) => {
                    log::trace!("Cannot read {}: {}", path.display(), e);
                    return Ok(Visit::Unreadable(e));
                }
            };

            // Register before following references (cycle breaking)
            self.builder
                .insert(path.clone(), symbols.clone(), variant.clone());
            if variant.is_import_once {
                self.registry
                    .register(path.clone(), variant.out_symbols.clone(), variant.clone());
            }

            let library_directories = self.library_directories;
            let file_directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let mut references = Vec::with_capacity(variant.references.len());
            let mut resolution_diagnostics = Vec::new();

            for original in &variant.references {
                if self.token.is_cancelled() {
                    return Err(Cancelled);
                }
                let reference = original.unresolved();
                let roots = SearchRoots::new(&file_directory, library_directories);
                let Some(target) = resolve_reference(self.fs, &reference, &roots).await else {
                    log::trace!(
                        "Unresolved import '{}' in {}:{}",
                        reference.raw_relative_path,
                        path.display(),
                        reference.line + 1
                    );
                    resolution_diagnostics.push(Diagnostic::new(
                        reference.line,
                        reference.column,
                        self.unresolved_severity,
                        DiagnosticCode::UnresolvedImport,
                        format!("cannot find imported file '{}'", reference.raw_relative_path),
                    ));
                    references.push(reference);
                    continue;
                };
                let reference = reference.with_resolved_path(&target);

                if let Some(entry) = self.registry.get(&target) {
                    log::trace!(
                        "Redirecting {} to the parse-once variant of {} with {}",
                        path.display(),
                        target.display(),
                        entry.variant.in_symbols
                    );
                    references.push(reference.with_import_once_override(entry.symbols.clone()));
                    continue;
                }

                if !self.builder.contains(&target, &reference.active_symbols) {
                    let visit = self
                        .walk(target.clone(), reference.active_symbols.clone())
                        .await?;
                    if let Visit::Unreadable(e) = visit {
                        resolution_diagnostics.push(Diagnostic::error(
                            reference.line,
                            reference.column,
                            DiagnosticCode::ReadFailure,
                            format!("cannot read '{}': {}", target.display(), e),
                        ));
                    }
                }

                // The target may have declared #importonce during the walk
                match self.registry.get(&target) {
                    Some(entry) => {
                        references.push(reference.with_import_once_override(entry.symbols.clone()))
                    }
                    None => references.push(reference),
                }
            }

            if references != variant.references
                || resolution_diagnostics != variant.resolution_diagnostics
            {
                let updated = Arc::new(variant.with_references(references, resolution_diagnostics));
                self.builder.insert(path, symbols, updated);
            }
            Ok(Visit::Parsed)
        })
    }

    /// Live content first, then the previous variant if unchanged, then disk
    async fn load_variant(
        &mut self,
        path: &Path,
        symbols: &SymbolSet,
    ) -> io::Result<Arc<ParsedFileVariant>> {
        let previous_index = self.previous;
        let live_buffers = self.live;
        let previous = previous_index.variant(path, symbols);

        if let Some(live) = live_buffers.get(path) {
            if let Some(prev) = previous {
                if prev.live_content.as_deref() == Some(&*live.content)
                    && prev.last_modified == live.timestamp
                {
                    self.reused += 1;
                    return Ok(prev.clone());
                }
            }
            log::trace!("Tokenizing live buffer for {} with {}", path.display(), symbols);
            return Ok(self.tokenize(
                path,
                symbols,
                &live.content,
                live.timestamp,
                Some(live.content.clone()),
            ));
        }

        let modified = self.fs.last_write_time(path).await?;
        if let Some(prev) = previous {
            if prev.live_content.is_none() && prev.last_modified == modified {
                log::trace!("Reusing {} with {}", path.display(), symbols);
                self.reused += 1;
                return Ok(prev.clone());
            }
        }

        let text = self.fs.read_to_string(path).await?;
        log::trace!("Tokenizing {} with {}", path.display(), symbols);
        Ok(self.tokenize(path, symbols, &text, modified, None))
    }

    fn tokenize(
        &mut self,
        path: &Path,
        symbols: &SymbolSet,
        text: &str,
        last_modified: std::time::SystemTime,
        live_content: Option<Arc<str>>,
    ) -> Arc<ParsedFileVariant> {
        self.tokenized += 1;
        let output = self.tokenizer.tokenize(text, symbols);
        Arc::new(ParsedFileVariant {
            path: path.to_path_buf(),
            relative_path: relative_to(path, self.project_directory),
            tokens: output.tokens,
            references: output.references,
            in_symbols: symbols.clone(),
            out_symbols: output.out_symbols,
            last_modified,
            live_content,
            is_import_once: output.is_import_once,
            diagnostics: output.diagnostics,
            resolution_diagnostics: Vec::new(),
        })
    }
}
