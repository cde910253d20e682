use std::env;
use std::path::PathBuf;

use crate::parlay_engine::{DEFAULT_MAX_DRAFTS, DEFAULT_MAX_PICKS_PER_FIXTURE};

const DEFAULT_THREADS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Runtime knobs for the binaries. Parlay constraints are deliberately absent:
/// they always come with the request.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub threads: usize,
    pub catalog_path: Option<PathBuf>,
    pub max_drafts: usize,
    pub max_picks_per_fixture: usize,
    pub shared_exposure: bool,
    pub log_format: LogFormat,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let threads = parse_usize(&lookup, "PARLAY_THREADS")
            .unwrap_or(DEFAULT_THREADS)
            .clamp(1, 32);
        let catalog_path = lookup("MARKET_CATALOG_PATH")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let max_drafts = parse_usize(&lookup, "PARLAY_MAX_DRAFTS")
            .unwrap_or(DEFAULT_MAX_DRAFTS)
            .clamp(1, 1_000_000);
        let max_picks_per_fixture = parse_usize(&lookup, "PARLAY_MAX_PICKS_PER_FIXTURE")
            .unwrap_or(DEFAULT_MAX_PICKS_PER_FIXTURE)
            .clamp(1, 32);
        let shared_exposure = env_bool(&lookup, "PARLAY_SHARED_EXPOSURE", false);
        let log_format = match lookup("LOG_FORMAT")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Plain,
        };

        Self {
            threads,
            catalog_path,
            max_drafts,
            max_picks_per_fixture,
            shared_exposure,
            log_format,
        }
    }

    /// Sized rayon pool for batch market computation. `None` falls back to the
    /// global pool.
    pub fn build_pool(&self) -> Option<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .ok()
    }
}

fn parse_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    lookup(key).and_then(|v| v.trim().parse::<usize>().ok())
}

fn env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}
