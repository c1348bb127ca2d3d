// perf.rs - Opt-in timing for index passes and CLI runs
//
// Switched on by the KICKINDEX_PERF environment variable:
//   KICKINDEX_PERF=1        log how long each pass took
//   KICKINDEX_PERF=verbose  also warn when a pass runs over its budget

use std::sync::OnceLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PerfMode {
    Off,
    Timing,
    Verbose,
}

fn mode() -> PerfMode {
    static MODE: OnceLock<PerfMode> = OnceLock::new();
    *MODE.get_or_init(|| parse_mode(std::env::var("KICKINDEX_PERF").ok().as_deref()))
}

fn parse_mode(value: Option<&str>) -> PerfMode {
    match value.map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("0") | Some("false") => PerfMode::Off,
        Some("verbose") => PerfMode::Verbose,
        Some(_) => PerfMode::Timing,
    }
}

/// Times a named operation until it is finished or dropped.
///
/// ```
/// use kickindex::perf::TimingGuard;
///
/// let guard = TimingGuard::with_budget("reindex", 250);
/// // ... do work ...
/// let took = guard.finish();
/// # let _ = took;
/// ```
pub struct TimingGuard {
    name: &'static str,
    start: Instant,
    budget: Option<Duration>,
    reported: bool,
}

impl TimingGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
            budget: None,
            reported: false,
        }
    }

    /// In verbose mode, warn when the operation takes longer than `budget_ms`
    pub fn with_budget(name: &'static str, budget_ms: u64) -> Self {
        let mut guard = Self::new(name);
        guard.budget = Some(Duration::from_millis(budget_ms));
        guard
    }

    /// Stop the clock, log as a drop would, and return the elapsed time
    pub fn finish(mut self) -> Duration {
        self.report()
    }

    fn report(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if std::mem::replace(&mut self.reported, true) {
            return elapsed;
        }
        let mode = mode();
        if mode == PerfMode::Off {
            return elapsed;
        }

        log::info!("[PERF] {} took {:?}", self.name, elapsed);
        if let Some(budget) = self.budget {
            if mode == PerfMode::Verbose && elapsed > budget {
                log::warn!("[PERF] {} over budget: {:?} > {:?}", self.name, elapsed, budget);
            }
        }
        elapsed
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        self.report();
    }
}

/// Peak resident set size in bytes (`VmHWM`); `None` off Linux
pub fn peak_rss_bytes() -> Option<u64> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let field = status.lines().find_map(|l| l.strip_prefix("VmHWM:"))?;
    let kb: u64 = field.trim().trim_end_matches("kB").trim().parse().ok()?;
    Some(kb * 1024)
}
