use std::collections::HashSet;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use parlay_engine::catalog::{MarketCatalog, default_catalog};
use parlay_engine::config::EngineConfig;
use parlay_engine::constraints::ParlayConstraints;
use parlay_engine::error::EngineError;
use parlay_engine::ledger::{ExposureLedger, SharedExposure};
use parlay_engine::logging::init_tracing;
use parlay_engine::market_engine::{FixtureFailure, MarketEngine, MarketProbability, fingerprint};
use parlay_engine::metrics::MatchMetrics;
use parlay_engine::parlay::{DraftOrder, DraftParlay};
use parlay_engine::parlay_engine::{ParlayBatch, ParlayEngine};
use parlay_engine::pick::{CandidatePick, ExposureKey};
use parlay_engine::proposer::{HeuristicProposer, ProposerConfig};

#[derive(Debug, Deserialize)]
struct InputDocument {
    constraints: ParlayConstraints,
    #[serde(default)]
    fixtures: Vec<MatchMetrics>,
    #[serde(default)]
    candidates: Option<Vec<CandidatePick>>,
    #[serde(default)]
    drafts: Option<Vec<DraftParlay>>,
    #[serde(default)]
    draft_order: DraftOrder,
    #[serde(default)]
    proposer: Option<ProposerConfig>,
}

#[derive(Debug, Serialize)]
struct OutputDocument {
    engine_version: String,
    markets: Vec<MarketProbability>,
    market_failures: Vec<FixtureFailure>,
    fingerprint: Option<String>,
    batches: Vec<ParlayBatch>,
}

enum Source {
    Pool(Vec<CandidatePick>),
    Drafts(Vec<DraftParlay>, DraftOrder),
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let cfg = EngineConfig::from_env();
    init_tracing(cfg.log_format);

    let raw = read_input(parse_path_arg("--input"))?;
    let mut doc: InputDocument =
        serde_json::from_str(&raw).context("input document is not valid JSON for the engine")?;
    if let Some(k) = parse_usize_arg("--legs") {
        doc.constraints.picks_per_parlay = k;
    }
    if let Some(n) = parse_usize_arg("--parlays") {
        doc.constraints.parlays_per_batch = n;
    }
    let batches = parse_usize_arg("--batches").unwrap_or(1).clamp(1, 64);

    let loaded;
    let catalog: &MarketCatalog = match &cfg.catalog_path {
        Some(path) => {
            loaded = MarketCatalog::load(path)?;
            &loaded
        }
        None => default_catalog()?,
    };
    let market_engine = MarketEngine::new(catalog);

    let (markets, market_failures) = if doc.fixtures.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        let pool = cfg.build_pool();
        let batch = market_engine
            .compute_batch_in(pool.as_ref(), &doc.fixtures)
            .context("market computation failed")?;
        (batch.records, batch.failures)
    };
    let fingerprint = if markets.is_empty() {
        None
    } else {
        Some(fingerprint(&markets).context("fingerprint markets")?)
    };

    let source = match (doc.drafts, doc.candidates) {
        (Some(_), Some(_)) => bail!("input may carry either candidates or drafts, not both"),
        (Some(drafts), None) => Source::Drafts(drafts, doc.draft_order),
        (None, Some(candidates)) => Source::Pool(candidates),
        (None, None) => {
            if markets.is_empty() {
                bail!("input needs fixtures, candidates or drafts");
            }
            let proposer = HeuristicProposer::new(catalog, doc.proposer.unwrap_or_default());
            Source::Pool(proposer.propose(&markets))
        }
    };

    let engine = ParlayEngine::new(doc.constraints)
        .context("constraints rejected")?
        .with_limits(cfg.max_drafts, cfg.max_picks_per_fixture);
    let shared = cfg.shared_exposure.then(SharedExposure::new);

    let results: Vec<Result<ParlayBatch, EngineError>> = (0..batches)
        .into_par_iter()
        .map(|_| match &shared {
            Some(shared) => run_batch(&engine, &source, &mut &*shared),
            None => {
                let mut ledger: HashSet<ExposureKey> = HashSet::new();
                run_batch(&engine, &source, &mut ledger)
            }
        })
        .collect();
    let batches = results
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .context("parlay construction failed")?;

    info!(
        markets = markets.len(),
        batches = batches.len(),
        parlays = batches.iter().map(|b| b.parlays.len()).sum::<usize>(),
        "run complete"
    );

    let out = OutputDocument {
        engine_version: market_engine.engine_version().to_string(),
        markets,
        market_failures,
        fingerprint,
        batches,
    };
    let rendered = if has_flag("--pretty") {
        serde_json::to_string_pretty(&out)?
    } else {
        serde_json::to_string(&out)?
    };
    println!("{rendered}");
    Ok(())
}

fn run_batch(
    engine: &ParlayEngine,
    source: &Source,
    ledger: &mut dyn ExposureLedger,
) -> Result<ParlayBatch, EngineError> {
    match source {
        Source::Pool(pool) => engine.build_from_pool_with(pool, ledger, None),
        Source::Drafts(drafts, order) => engine.validate_drafts_with(drafts, *order, ledger, None),
    }
}

fn read_input(path: Option<PathBuf>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("read input document {}", path.display())),
        None => {
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .context("read input document from stdin")?;
            Ok(raw)
        }
    }
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next.trim()));
        }
    }
    None
}

fn parse_usize_arg(name: &str) -> Option<usize> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<usize>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<usize>()
        {
            return Some(v);
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
