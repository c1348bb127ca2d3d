//! Parse passes over real projects on disk.
//!
//! Exercises `DiskFileSystem` timestamps and lexical path handling against a
//! temporary directory, with the default directive tokenizer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use kickindex::source_index::{
    DiskFileSystem, IndexerConfig, LiveContent, LiveOverrides, PassOutcome, PassSummary,
    SourceIndexer, SymbolSet,
};
use kickindex::tokenizer::{DiagnosticCode, DirectiveTokenizer};
use tempfile::TempDir;

struct DiskProject {
    _dir: TempDir,
    root: PathBuf,
    indexer: SourceIndexer,
}

impl DiskProject {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        for (name, content) in files {
            write(&root, name, content);
        }
        let indexer = SourceIndexer::new(
            IndexerConfig::default(),
            Arc::new(DiskFileSystem),
            Arc::new(DirectiveTokenizer::new()),
        );
        Self {
            _dir: dir,
            root,
            indexer,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn initial(&self, symbols: &[&str]) -> PassOutcome {
        self.indexer
            .initial_parse(
                &self.root,
                LiveOverrides::new(),
                SymbolSet::new(symbols.iter().copied()),
                Vec::new(),
            )
            .await
    }
}

fn write(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Give `path` a modification time that no earlier write can share
fn touch_later(path: &Path) {
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    let later = SystemTime::now() + Duration::from_secs(60);
    file.set_modified(later).unwrap();
}

fn completed(outcome: PassOutcome) -> PassSummary {
    match outcome {
        PassOutcome::Completed(summary) => summary,
        other => panic!("expected a completed pass, got {:?}", other),
    }
}

#[tokio::test]
async fn test_project_with_conditional_imports() {
    let project = DiskProject::new(&[
        (
            "main.asm",
            "#import \"lib/setup.asm\"\n#if PAL\n#import \"video/pal.asm\"\n#else\n#import \"video/ntsc.asm\"\n#endif\n",
        ),
        ("lib/setup.asm", "#importonce\n  sei\n  rts\n"),
        ("video/pal.asm", "#import \"../lib/setup.asm\"\n"),
        ("video/ntsc.asm", "nop\n"),
    ]);

    let summary = completed(project.initial(&["PAL"]).await);
    assert_eq!(summary.files, 3);

    let index = project.indexer.all_files();
    assert!(index.contains_path(&project.path("video/pal.asm")));
    assert!(!index.contains_path(&project.path("video/ntsc.asm")));

    let setup = index.get(&project.path("lib/setup.asm")).unwrap();
    assert_eq!(setup.len(), 1);

    let pal = index
        .variant(&project.path("video/pal.asm"), &SymbolSet::new(["PAL"]))
        .unwrap();
    let target = index.variant_for_reference(&pal.references[0]).unwrap();
    assert!(target.is_import_once);
}

#[tokio::test]
async fn test_reparse_picks_up_disk_edits() {
    let project = DiskProject::new(&[("main.asm", "#import \"a.asm\"\n"), ("a.asm", "nop\n")]);
    completed(project.initial(&[]).await);
    let main_before = project
        .indexer
        .all_files()
        .variant(&project.path("main.asm"), &SymbolSet::empty())
        .cloned()
        .unwrap();

    let unchanged = completed(
        project
            .indexer
            .parse(LiveOverrides::new(), SymbolSet::empty(), Vec::new())
            .await,
    );
    assert!(!unchanged.published);

    write(&project.root, "a.asm", "#import \"b.asm\"\n");
    write(&project.root, "b.asm", "rts\n");
    touch_later(&project.path("a.asm"));

    let summary = completed(
        project
            .indexer
            .parse(LiveOverrides::new(), SymbolSet::empty(), Vec::new())
            .await,
    );
    assert!(summary.changes.modified.contains(&project.path("a.asm")));
    assert!(summary.changes.added.contains(&project.path("b.asm")));

    let main_after = project
        .indexer
        .all_files()
        .variant(&project.path("main.asm"), &SymbolSet::empty())
        .cloned()
        .unwrap();
    assert!(Arc::ptr_eq(&main_before, &main_after));
}

#[tokio::test]
async fn test_live_buffer_over_disk_project() {
    let project = DiskProject::new(&[("main.asm", "#import \"a.asm\"\n"), ("a.asm", "nop\n")]);
    let mut live = LiveOverrides::new();
    live.insert(
        project.path("main.asm"),
        LiveContent::new("#import \"missing.asm\"\n", SystemTime::now()),
    );

    let summary = completed(
        project
            .indexer
            .initial_parse(&project.root, live, SymbolSet::empty(), Vec::new())
            .await,
    );
    assert_eq!(summary.files, 1);

    let index = project.indexer.all_files();
    let codes: Vec<_> = index.diagnostics().map(|(_, d)| d.code).collect();
    assert_eq!(codes, vec![DiagnosticCode::UnresolvedImport]);
}

#[tokio::test]
async fn test_missing_entry_on_disk() {
    let project = DiskProject::new(&[("other.asm", "nop\n")]);
    assert!(matches!(
        project.initial(&[]).await,
        PassOutcome::Failed(_)
    ));
    assert!(project.indexer.all_files().is_empty());
}
