use ge_scanner::loader::{load_catalog, load_snapshot, load_volumes};
use ge_scanner::store::SqliteBlobStore;
use ge_scanner::watchlist::Watchlist;
use ge_scanner::{ScannerConfig, ScannerEngine};
use std::collections::HashMap;
use std::error::Error;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

const USAGE: &str = "usage: ge_scanner <catalog.json> <state.db> [--config cfg.json] [--volumes vol.json] <snapshot.json>...";

struct Args {
    catalog: String,
    state_db: String,
    config: Option<String>,
    volumes: Option<String>,
    snapshots: Vec<String>,
}

fn parse_args() -> Option<Args> {
    let mut positional = Vec::new();
    let mut config = None;
    let mut volumes = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(args.next()?),
            "--volumes" => volumes = Some(args.next()?),
            _ => positional.push(arg),
        }
    }
    if positional.len() < 2 {
        return None;
    }
    let snapshots = positional.split_off(2);
    let state_db = positional.pop()?;
    let catalog = positional.pop()?;
    Some(Args {
        catalog,
        state_db,
        config,
        volumes,
        snapshots,
    })
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let Some(args) = parse_args() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = match &args.config {
        Some(path) => ScannerConfig::load(path)?,
        None => ScannerConfig::default(),
    };
    let catalog = load_catalog(&args.catalog)?;
    let volumes = args.volumes.as_ref().map(load_volumes).transpose()?;

    let mut store = SqliteBlobStore::open(&args.state_db)?;
    let mut engine = ScannerEngine::new(config);
    engine.hydrate_from(&store);
    let watchlist = Watchlist::load(&store);

    let mut latest = HashMap::new();
    for path in &args.snapshots {
        match load_snapshot(path, now_secs()) {
            Ok(snapshot) => {
                latest = snapshot.quotes.iter().map(|(id, q)| (*id, *q)).collect();
                engine.ingest(snapshot);
                engine.flush_if_due(&mut store);
            }
            // A missing cycle is tolerated; the window just doesn't advance.
            Err(e) => warn!(path = %path, error = %e, "skipping snapshot"),
        }
    }
    if engine.persist_pending() {
        engine.flush(&mut store);
    }

    let ranked = engine.compute_ranked(&catalog, &latest, volumes.as_ref());
    info!(
        items = catalog.len(),
        ranked = ranked.len(),
        retained = engine.buffer().len(),
        "scan complete"
    );

    println!(
        "{:<8} {:<32} {:>12} {:>12} {:>10} {:>8} {:>9} {:>9} {:<8}",
        "id", "name", "buy", "sell", "net", "roi%", "vol%", "rank", "tier"
    );
    for e in &ranked {
        let star = if watchlist.contains(e.item.id) { "*" } else { "" };
        println!(
            "{:<8} {:<32} {:>12.0} {:>12.0} {:>10.0} {:>8.2} {:>9.2} {:>9.3} {:<8}{}",
            e.item.id,
            e.item.name,
            e.quote.low,
            e.quote.high,
            e.metrics.net_margin,
            e.metrics.roi,
            e.historical_volatility,
            e.rank_score,
            e.tier.label(),
            star
        );
    }

    if !watchlist.is_empty() {
        let s = watchlist.summary(&ranked);
        println!(
            "watchlist: {} ranked of {} tracked | net {:.0} gp | avg roi {:.2}%",
            s.tracked,
            watchlist.len(),
            s.total_net_margin,
            s.avg_roi
        );
    }

    Ok(())
}
