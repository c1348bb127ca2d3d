// cli/index_stats.rs - `kickindex stats` subcommand
//
// Runs one parse pass over a project directory from disk and reports what
// the index holds:
//   - files and variants, with the symbol sets each file was parsed under
//   - diagnostics from tokenizing and import resolution
//   - source files under the directory that the import graph never reached

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Serialize;

use crate::perf::TimingGuard;
use crate::source_index::{
    DiskFileSystem, FileIndex, IndexerConfig, LiveOverrides, PassOutcome, SourceIndexer, SymbolSet,
};
use crate::tokenizer::{DirectiveTokenizer, Severity};

/// Parsed arguments for the `stats` subcommand.
#[derive(Debug)]
pub struct IndexStatsArgs {
    pub path: PathBuf,
    pub symbols: Vec<String>,
    pub libraries: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

/// Parse `stats` arguments from the remaining CLI args.
///
/// Expected usage: `kickindex stats <dir> [-D SYM]... [--lib DIR]... [--config FILE] [--json]`
pub fn parse_args(args: &mut impl Iterator<Item = String>) -> Result<IndexStatsArgs, String> {
    let mut path: Option<PathBuf> = None;
    let mut symbols = Vec::new();
    let mut libraries = Vec::new();
    let mut config = None;
    let mut json = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => json = true,
            "-D" | "--define" => {
                let symbol = args
                    .next()
                    .ok_or_else(|| format!("{} requires a symbol name", arg))?;
                symbols.push(symbol);
            }
            "--lib" => {
                let dir = args
                    .next()
                    .ok_or_else(|| "--lib requires a directory".to_string())?;
                libraries.push(PathBuf::from(dir));
            }
            "--config" => {
                let file = args
                    .next()
                    .ok_or_else(|| "--config requires a file".to_string())?;
                config = Some(PathBuf::from(file));
            }
            other if other.starts_with("-D") && other.len() > 2 => {
                symbols.push(other[2..].to_string());
            }
            other if other.starts_with('-') => {
                return Err(format!("Unknown flag: '{}'", other));
            }
            _ => {
                if path.is_some() {
                    return Err("Multiple paths provided; expected exactly one".to_string());
                }
                path = Some(PathBuf::from(arg));
            }
        }
    }

    let path = path.ok_or_else(|| "Missing required <project-dir> argument".to_string())?;
    if !path.is_dir() {
        return Err(format!("Not a directory: {}", path.display()));
    }

    Ok(IndexStatsArgs {
        path,
        symbols,
        libraries,
        config,
        json,
    })
}

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    /// One entry per variant, formatted as `{A, B}`
    pub variants: Vec<String>,
    pub import_once: bool,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct IndexStats {
    pub entry_file: PathBuf,
    pub files: Vec<FileReport>,
    pub variant_count: usize,
    pub diagnostics: Vec<DiagnosticReport>,
    pub unreached: Vec<PathBuf>,
    pub duration_ms: f64,
    pub peak_rss_bytes: Option<u64>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<IndexerConfig> {
    let Some(path) = path else {
        return Ok(IndexerConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    IndexerConfig::from_json(&value)
}

/// Run one pass over `args.path` and collect the report.
pub async fn run_index_stats(args: &IndexStatsArgs) -> anyhow::Result<IndexStats> {
    let _guard = TimingGuard::new("index-stats");
    let config = load_config(args.config.as_deref())?;
    let root = std::fs::canonicalize(&args.path)
        .with_context(|| format!("resolving {}", args.path.display()))?;
    let indexer = SourceIndexer::new(
        config.clone(),
        Arc::new(DiskFileSystem),
        Arc::new(DirectiveTokenizer::new()),
    );

    let outcome = indexer
        .initial_parse(
            &root,
            LiveOverrides::new(),
            SymbolSet::new(args.symbols.iter().cloned()),
            args.libraries.clone(),
        )
        .await;
    let summary = match outcome {
        PassOutcome::Completed(summary) => summary,
        PassOutcome::Cancelled => return Err(anyhow!("pass was cancelled")),
        PassOutcome::Failed(reason) => return Err(anyhow!(reason)),
    };

    let index = indexer.all_files();
    let project_dir = indexer.project_directory().unwrap_or(root);

    Ok(IndexStats {
        entry_file: indexer.entry_file().unwrap_or_default(),
        files: file_reports(&index),
        variant_count: index.variant_count(),
        diagnostics: diagnostic_reports(&index),
        unreached: unreached_files(&project_dir, &config, &index),
        duration_ms: duration_ms(summary.duration),
        peak_rss_bytes: crate::perf::peak_rss_bytes(),
    })
}

fn file_reports(index: &FileIndex) -> Vec<FileReport> {
    let mut files: BTreeMap<&PathBuf, FileReport> = BTreeMap::new();
    for (path, set) in index.iter() {
        let mut variants: Vec<String> = set.iter().map(|(symbols, _)| symbols.to_string()).collect();
        variants.sort();
        files.insert(
            path,
            FileReport {
                path: path.clone(),
                variants,
                import_once: set.variants().any(|v| v.is_import_once),
            },
        );
    }
    files.into_values().collect()
}

fn diagnostic_reports(index: &FileIndex) -> Vec<DiagnosticReport> {
    let mut reports: Vec<DiagnosticReport> = index
        .diagnostics()
        .map(|(path, d)| DiagnosticReport {
            path: path.to_path_buf(),
            line: d.line + 1,
            column: d.column + 1,
            severity: d.severity,
            message: d.message.clone(),
        })
        .collect();
    reports.sort_by(|a, b| (&a.path, a.line, a.column).cmp(&(&b.path, b.line, b.column)));
    // The same diagnostic appears once per variant that produced it
    reports.dedup_by(|a, b| {
        a.path == b.path && a.line == b.line && a.column == b.column && a.message == b.message
    });
    reports
}

/// Source files under `root` that no variant in the index covers
fn unreached_files(root: &Path, config: &IndexerConfig, index: &FileIndex) -> Vec<PathBuf> {
    let mut unreached: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(should_skip_directory)
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && config.is_source_file(entry.path()))
        .map(|entry| entry.into_path())
        .filter(|path| {
            let normalized =
                crate::source_index::normalize_path(path).unwrap_or_else(|| path.clone());
            !index.contains_path(&normalized)
        })
        .collect();
    unreached.sort();
    unreached
}

fn should_skip_directory(name: &str) -> bool {
    matches!(
        name,
        ".git" | ".svn" | ".hg" | "node_modules" | ".vscode" | ".idea" | "target" | "build"
    )
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Print the report in human-readable format.
pub fn print_report(stats: &IndexStats) {
    println!("=== KickIndex Stats ===\n");
    println!("  entry        {}", stats.entry_file.display());
    println!(
        "  indexed      {} files, {} variants in {:.2}ms",
        stats.files.len(),
        stats.variant_count,
        stats.duration_ms
    );
    if let Some(bytes) = stats.peak_rss_bytes {
        println!("  peak RSS     {}", format_bytes(bytes));
    }

    println!("\nFiles:");
    for file in &stats.files {
        let marker = if file.import_once { " (importonce)" } else { "" };
        println!(
            "  {}{}  {}",
            file.path.display(),
            marker,
            file.variants.join(" ")
        );
    }

    if !stats.diagnostics.is_empty() {
        println!("\nDiagnostics:");
        for d in &stats.diagnostics {
            println!(
                "  {}:{}:{}: {:?}: {}",
                d.path.display(),
                d.line,
                d.column,
                d.severity,
                d.message
            );
        }
    }

    if !stats.unreached.is_empty() {
        println!("\nNot reached from the entry file:");
        for path in &stats.unreached {
            println!("  {}", path.display());
        }
    }
    println!();
}

pub fn print_report_json(stats: &IndexStats) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(stats)?);
    Ok(())
}

/// Format a byte count as a human-readable string (e.g., "12.3 MB").
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> std::vec::IntoIter<String> {
        list.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_parse_args_basic() {
        let result = parse_args(&mut args(&["."])).unwrap();
        assert_eq!(result.path, PathBuf::from("."));
        assert!(result.symbols.is_empty());
        assert!(!result.json);
    }

    #[test]
    fn test_parse_args_defines_and_libs() {
        let result = parse_args(&mut args(&[
            ".", "-D", "PAL", "-DMUSIC", "--lib", "lib", "--lib", "/opt/kick", "--json",
        ]))
        .unwrap();
        assert_eq!(result.symbols, vec!["PAL", "MUSIC"]);
        assert_eq!(
            result.libraries,
            vec![PathBuf::from("lib"), PathBuf::from("/opt/kick")]
        );
        assert!(result.json);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&mut args(&[])).is_err());
        assert!(parse_args(&mut args(&[".", "--bogus"])).is_err());
        assert!(parse_args(&mut args(&[".", "-D"])).is_err());
        assert!(parse_args(&mut args(&[".", "."])).is_err());
        assert!(parse_args(&mut args(&["/nonexistent/kickindex/dir"])).is_err());
    }

    #[test]
    fn test_load_config_default_and_file() {
        assert_eq!(load_config(None).unwrap(), IndexerConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("kickindex.json");
        std::fs::write(&file, r#"{ "entryFile": "demo.asm" }"#).unwrap();
        assert_eq!(load_config(Some(&file)).unwrap().entry_file, "demo.asm");

        std::fs::write(&file, "not json").unwrap();
        assert!(load_config(Some(&file)).is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn test_run_reports_unreached_and_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.asm"),
            "#import \"irq.asm\"\n#import \"missing.asm\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("irq.asm"), "#importonce\nrts\n").unwrap();
        std::fs::write(dir.path().join("old.asm"), "nop\n").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("hook.asm"), "nop\n").unwrap();

        let stats = run_index_stats(&IndexStatsArgs {
            path: dir.path().to_path_buf(),
            symbols: vec![],
            libraries: vec![],
            config: None,
            json: false,
        })
        .await
        .unwrap();

        assert_eq!(stats.files.len(), 2);
        assert!(stats.files.iter().any(|f| f.import_once));
        assert_eq!(stats.diagnostics.len(), 1);
        assert!(stats.diagnostics[0].message.contains("missing.asm"));
        let unreached: Vec<_> = stats
            .unreached
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(unreached, vec!["old.asm"]);
    }
}
