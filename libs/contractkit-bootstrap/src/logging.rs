//! Console + rotating file logging driven by [`LoggingConfig`].
//!
//! Every key except `"default"` names a target prefix (`contractkit`,
//! `api_ingress::binding`, ...) with its own console level and, optionally, its
//! own file. Records that match no prefix go to the default section.

use crate::config::{LoggingConfig, Section};
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Keep a guard for non-blocking console to avoid being dropped.
static CONSOLE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

const DEFAULT_MAX_SIZE_MB: u64 = 100;

// ================= level helpers =================

fn parse_tracing_level(s: &str) -> Option<Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

fn level_filter(s: &str) -> LevelFilter {
    parse_tracing_level(s)
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::OFF)
}

/// Returns true if target == prefix or target starts with "prefix::"
fn matches_target_prefix(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// ================= rotating writer for files =================

type SharedRotate = Arc<Mutex<FileRotate<AppendTimestamp>>>;

#[derive(Clone)]
struct RotWriter(SharedRotate);

impl Write for RotWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

/// A writer that may be absent; writes to it are dropped.
struct RoutedWriter(Option<RotWriter>);

impl Write for RoutedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => w.write(buf),
            None => Ok(buf.len()),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Routes records to files by target prefix. The longest matching prefix
/// wins so `contractkit::pipeline` can be split out of `contractkit`.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<RotWriter>,
    by_prefix: Vec<(String, RotWriter)>,
}

impl FileRouter {
    fn resolve_for(&self, target: &str) -> Option<RotWriter> {
        self.by_prefix
            .iter()
            .filter(|(prefix, _)| matches_target_prefix(target, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, w)| w.clone())
            .or_else(|| self.default.clone())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = RoutedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedWriter(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RoutedWriter(self.resolve_for(meta.target()))
    }
}

// ================= config extraction =================

struct ConfigData<'a> {
    default_section: Option<&'a Section>,
    target_sections: Vec<(&'a str, &'a Section)>,
}

fn extract_config_data(cfg: &LoggingConfig) -> ConfigData<'_> {
    ConfigData {
        default_section: cfg.get("default"),
        target_sections: cfg
            .iter()
            .filter(|(k, _)| k.as_str() != "default")
            .map(|(k, v)| (k.as_str(), v))
            .collect(),
    }
}

// ================= file writers =================

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn create_rotating_writer(section: &Section, base_dir: &Path) -> std::io::Result<RotWriter> {
    let log_path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Prefer MaxFiles if provided, else Age
    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(
            i64::from(section.max_age_days.unwrap_or(1)),
        )),
    };
    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) as usize * 1024 * 1024;

    let rot = FileRotate::new(
        log_path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Ok(RotWriter(Arc::new(Mutex::new(rot))))
}

fn file_writer_for(name: &str, section: &Section, base_dir: &Path) -> Option<RotWriter> {
    if section.file.trim().is_empty() {
        return None;
    }
    match create_rotating_writer(section, base_dir) {
        Ok(writer) => Some(writer),
        Err(e) => {
            // The subscriber is not installed yet.
            eprintln!(
                "Failed to init log file '{}' for '{}': {}",
                section.file, name, e
            );
            None
        }
    }
}

fn build_file_router(config: &ConfigData, base_dir: &Path) -> FileRouter {
    FileRouter {
        default: config
            .default_section
            .and_then(|s| file_writer_for("default", s, base_dir)),
        by_prefix: config
            .target_sections
            .iter()
            .filter_map(|(name, section)| {
                file_writer_for(name, section, base_dir).map(|w| (name.to_string(), w))
            })
            .collect(),
    }
}

// ================= targets =================

/// Per-target levels for one sink.
enum SinkKind {
    Console,
    File { has_default_file: bool },
}

fn build_targets(config: &ConfigData, kind: SinkKind) -> Targets {
    let (default_level, fallback) = match kind {
        SinkKind::Console => (
            config.default_section.map(|s| level_filter(&s.console_level)),
            LevelFilter::INFO,
        ),
        SinkKind::File { has_default_file } => (
            config
                .default_section
                .filter(|_| has_default_file)
                .map(|s| level_filter(&s.file_level)),
            LevelFilter::OFF,
        ),
    };

    let mut targets = Targets::new().with_default(default_level.unwrap_or(fallback));
    for (name, section) in &config.target_sections {
        let level = match kind {
            SinkKind::Console => parse_tracing_level(&section.console_level),
            // A target without its own file logs into the default file at its file level.
            SinkKind::File { .. } => parse_tracing_level(&section.file_level),
        };
        if let Some(level) = level {
            targets = targets.with_target(name.to_string(), LevelFilter::from_level(level));
        }
    }
    targets
}

// ================= public init =================

/// Install the global subscriber. Relative log files resolve against `base_dir`
/// (normally `server.home_dir`). Safe to call more than once; later calls are no-ops.
pub fn init_logging_unified(cfg: &LoggingConfig, base_dir: &Path) {
    // Bridge `log` → `tracing` *before* installing the subscriber
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let data = extract_config_data(cfg);
    if data.target_sections.is_empty() && data.default_section.is_none() {
        init_minimal();
        return;
    }

    let file_router = build_file_router(&data, base_dir);
    let console_targets = build_targets(&data, SinkKind::Console);
    let file_targets = build_targets(
        &data,
        SinkKind::File {
            has_default_file: file_router.default.is_some(),
        },
    );

    install_subscriber(console_targets, file_targets, file_router);
}

fn install_subscriber(console_targets: Targets, file_targets: Targets, file_router: FileRouter) {
    // RUST_LOG acts as a global upper-bound for console/file if present.
    let env: Option<EnvFilter> = EnvFilter::try_from_default_env().ok();

    let (nb_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console_layer = fmt::layer()
        .with_writer(nb_stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets);

    let file_layer = (!file_router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(file_router)
            .with_filter(file_targets)
    });

    let _ = tracing_subscriber::registry()
        .with(env)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

fn init_minimal() {
    let env = EnvFilter::try_from_default_env().ok();
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let _ = tracing_subscriber::registry()
        .with(env)
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.to_string(),
            file: file.to_string(),
            file_level: file_level.to_string(),
            max_age_days: None,
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn target_prefix_requires_a_path_boundary() {
        assert!(matches_target_prefix("contractkit", "contractkit"));
        assert!(matches_target_prefix("contractkit::pipeline", "contractkit"));
        assert!(!matches_target_prefix("contractkit_bootstrap", "contractkit"));
    }

    #[test]
    fn unknown_levels_default_to_info_and_off_disables() {
        assert_eq!(parse_tracing_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_tracing_level("loud"), Some(Level::INFO));
        assert_eq!(parse_tracing_level("off"), None);
        assert_eq!(level_filter("none"), LevelFilter::OFF);
    }

    #[test]
    fn longest_prefix_wins_and_unmatched_targets_use_default() {
        let dir = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert("default".into(), section("info", "logs/all.log", "debug"));
        cfg.insert("contractkit".into(), section("info", "logs/core.log", "debug"));
        cfg.insert(
            "contractkit::pipeline".into(),
            section("debug", "logs/pipeline.log", "trace"),
        );

        let data = extract_config_data(&cfg);
        let router = build_file_router(&data, dir.path());
        assert_eq!(router.by_prefix.len(), 2);
        assert!(dir.path().join("logs").is_dir());

        let same = |a: &Option<RotWriter>, b: &RotWriter| {
            a.as_ref().is_some_and(|a| Arc::ptr_eq(&a.0, &b.0))
        };
        let by_name = |name: &str| {
            router
                .by_prefix
                .iter()
                .find(|(p, _)| p == name)
                .map(|(_, w)| w.clone())
                .unwrap()
        };

        let pipeline = by_name("contractkit::pipeline");
        let core = by_name("contractkit");
        assert!(same(&router.resolve_for("contractkit::pipeline::stages"), &pipeline));
        assert!(same(&router.resolve_for("contractkit::registry"), &core));
        let default = router.default.clone().unwrap();
        assert!(same(&router.resolve_for("api_ingress"), &default));
    }

    #[test]
    fn sections_without_files_create_no_writers() {
        let dir = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert("default".into(), section("info", "", "debug"));
        let data = extract_config_data(&cfg);
        let router = build_file_router(&data, dir.path());
        assert!(router.is_empty());
    }
}
