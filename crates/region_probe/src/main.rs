//! Region cache probe
//!
//! Builds a deterministic region layout, warms a chunk cache over it, fires
//! point queries from every core and cross-checks each cached answer against
//! the authoritative store.

mod workload;

use clap::{Arg, Command};
use region_cache::{CacheConfig, ChunkRegionCache, HashMapIndex, RTreeIndex, RegionIndex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use workload::{column_square, cross_check, query_points, region_grid, Lcg};

// ============================================================================
// Configuration
// ============================================================================

/// Application configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chunk cache and worker pool settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter
    pub level: String,
    /// JSON formatting
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file, creating it with defaults if missing
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: AppConfig = toml::from_str(&content)?;
            config.cache.validate()?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            std::fs::write(path, toml_content)?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }
}

// ============================================================================
// CLI Interface
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    HashMap,
    RTree,
}

/// Command line arguments
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub regions: usize,
    pub queries: usize,
    pub radius: i32,
    pub index: IndexKind,
    pub log_level: Option<String>,
    pub json_logs: bool,
}

impl CliArgs {
    fn command() -> Command {
        Command::new("Region Probe")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Warms a chunk region cache and verifies its answers against the store")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("region_probe.toml"),
            )
            .arg(
                Arg::new("regions")
                    .short('r')
                    .long("regions")
                    .value_name("N")
                    .help("Number of regions to lay out")
                    .value_parser(clap::value_parser!(usize))
                    .default_value("1000"),
            )
            .arg(
                Arg::new("queries")
                    .short('q')
                    .long("queries")
                    .value_name("N")
                    .help("Number of point queries to run")
                    .value_parser(clap::value_parser!(usize))
                    .default_value("100000"),
            )
            .arg(
                Arg::new("radius")
                    .long("radius")
                    .value_name("COLUMNS")
                    .help("Columns around the origin to warm")
                    .value_parser(clap::value_parser!(i32).range(0..=1024))
                    .default_value("16"),
            )
            .arg(
                Arg::new("index")
                    .short('i')
                    .long("index")
                    .value_name("KIND")
                    .help("Authoritative store implementation")
                    .value_parser(["hash", "rtree"])
                    .default_value("hash"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        let index = match matches.get_one::<String>("index").map(String::as_str) {
            Some("rtree") => IndexKind::RTree,
            _ => IndexKind::HashMap,
        };
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("region_probe.toml")),
            regions: matches.get_one::<usize>("regions").copied().unwrap_or(1000),
            queries: matches.get_one::<usize>("queries").copied().unwrap_or(100_000),
            radius: matches.get_one::<i32>("radius").copied().unwrap_or(16),
            index,
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }

    /// Parse command line arguments
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

/// Initialize logging system
fn setup_logging(config: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

// ============================================================================
// Probe
// ============================================================================

fn build_store(kind: IndexKind) -> Arc<dyn RegionIndex> {
    match kind {
        IndexKind::HashMap => Arc::new(HashMapIndex::new()),
        IndexKind::RTree => Arc::new(RTreeIndex::new()),
    }
}

/// Runs the probe. Returns whether every cached answer matched the store.
fn run(args: &CliArgs, config: &AppConfig) -> Result<bool, Box<dyn std::error::Error>> {
    info!(
        "📋 Probe: {} region(s), {} quer(ies), radius {} column(s), {:?} store",
        args.regions, args.queries, args.radius, args.index
    );

    let cache = ChunkRegionCache::new(build_store(args.index), config.cache.clone())?;
    let regions = region_grid(args.regions, args.radius, &mut Lcg::new(0x5eed))?;
    cache.add_all(regions);

    let columns = column_square(args.radius);
    let started = Instant::now();
    cache.bias_all(&columns);
    if cache.await_completion(Duration::from_secs(60)) {
        info!("🔥 Warmed {} column(s) in {:?}", columns.len(), started.elapsed());
    } else {
        warn!("Cache still warming after {:?}, continuing with a partial cache", started.elapsed());
    }

    let points = query_points(args.queries, args.radius, &mut Lcg::new(0xfeed));
    let started = Instant::now();
    let check = cross_check(&cache, &points);
    let elapsed = started.elapsed();
    info!(
        "⚡ {} quer(ies) cross-checked in {:?}, {} containing match(es)",
        check.queries, elapsed, check.matches_found
    );

    let stats = cache.stats();
    info!("📊 Hit ratio: {:.1}%", stats.hit_ratio() * 100.0);
    let report = serde_json::json!({ "cross_check": &check, "stats": stats });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !check.passed() {
        error!(
            "❌ {} cached answer(s) disagreed with the store, first at {:?}",
            check.mismatches, check.samples
        );
    }
    Ok(check.passed())
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = match AppConfig::load_from_file(&args.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    setup_logging(&config.logging)?;

    match run(&args, &config) {
        Ok(true) => {
            info!("✅ All cached answers matched the store");
            Ok(())
        }
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("❌ Probe failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_defaults() {
        let matches = CliArgs::command().try_get_matches_from(["region_probe"]).unwrap();
        let args = CliArgs::from_matches(&matches);
        assert_eq!(args.config_path, PathBuf::from("region_probe.toml"));
        assert_eq!(args.regions, 1000);
        assert_eq!(args.queries, 100_000);
        assert_eq!(args.radius, 16);
        assert_eq!(args.index, IndexKind::HashMap);
        assert!(!args.json_logs);
    }

    #[test]
    fn test_cli_overrides() {
        let matches = CliArgs::command()
            .try_get_matches_from([
                "region_probe",
                "--index",
                "rtree",
                "--regions",
                "10",
                "--radius",
                "2",
                "--json-logs",
            ])
            .unwrap();
        let args = CliArgs::from_matches(&matches);
        assert_eq!(args.index, IndexKind::RTree);
        assert_eq!(args.regions, 10);
        assert_eq!(args.radius, 2);
        assert!(args.json_logs);

        assert!(CliArgs::command()
            .try_get_matches_from(["region_probe", "--index", "btree"])
            .is_err());
    }

    #[test]
    fn test_config_created_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("region_probe.toml");

        let created = AppConfig::load_from_file(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, AppConfig::default());

        std::fs::write(&path, "[cache]\nmax_threads = 2\n\n[logging]\nlevel = \"debug\"\njson_format = true\n").unwrap();
        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.cache.max_threads, 2);
        assert!(loaded.logging.json_format);
    }

    #[test]
    fn test_invalid_cache_config_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("region_probe.toml");
        std::fs::write(&path, "[cache]\nmax_threads = 0\n").unwrap();
        assert!(AppConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_small_probe_passes() {
        for index in [IndexKind::HashMap, IndexKind::RTree] {
            let args = CliArgs {
                config_path: PathBuf::from("unused.toml"),
                regions: 100,
                queries: 2_000,
                radius: 2,
                index,
                log_level: None,
                json_logs: false,
            };
            assert!(run(&args, &AppConfig::default()).unwrap());
        }
    }
}
