use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use parlay_engine::catalog::{MarketCatalog, default_catalog};
use parlay_engine::config::EngineConfig;
use parlay_engine::logging::init_tracing;
use parlay_engine::market_engine::{MarketEngine, fingerprint};
use parlay_engine::metrics::MatchMetrics;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let cfg = EngineConfig::from_env();
    init_tracing(cfg.log_format);

    let path = parse_positional_arg()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/metrics_single.json"));
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("read snapshot {}", path.display()))?;
    let metrics: MatchMetrics = serde_json::from_str(&raw).context("parse snapshot")?;

    let loaded;
    let catalog: &MarketCatalog = match &cfg.catalog_path {
        Some(p) => {
            loaded = MarketCatalog::load(p)?;
            &loaded
        }
        None => default_catalog()?,
    };
    let engine = MarketEngine::new(catalog);
    let records = engine.compute(&metrics)?;
    let min_p = parse_f64_arg("--min-p").unwrap_or(0.0);

    // Quick manual inspection of one snapshot; no persistence.
    println!(
        "fixture {}  engine {}  records {}",
        metrics.fixture_id,
        engine.engine_version(),
        records.len()
    );
    println!("{:<28} {:>8} {:>8} {:>12}", "label", "p_model", "band", "model");
    for r in records.iter().filter(|r| r.p_model >= min_p) {
        println!(
            "{:<28} {:>8.4} {:>8.4} {:>12}",
            r.label,
            r.p_model,
            r.uncertainty,
            format!("{:?}", r.model_name)
        );
    }
    println!("fingerprint {}", fingerprint(&records)?);
    Ok(())
}

fn parse_positional_arg() -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut idx = 0;
    while idx < args.len() {
        let arg = &args[idx];
        if arg == "--min-p" {
            idx += 2;
            continue;
        }
        if !arg.starts_with("--") {
            return Some(arg.clone());
        }
        idx += 1;
    }
    None
}

fn parse_f64_arg(name: &str) -> Option<f64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<f64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<f64>()
        {
            return Some(v);
        }
    }
    None
}
