//! MeterBill rating tool
//!
//! Usage: `meterbill-rate <snapshot.json> <range_start> <range_stop>`
//!
//! The snapshot holds the rate tables and the usage events to rate. Billable
//! events are printed to stdout as JSON.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use meterbill_common::{EventFilter, RateSnapshot, UsageEvent, VERSION};
use meterbill_rating::{InMemoryEventStore, RatingConfig, RatingEngine};

/// Input document: rate tables plus the usage events to rate
#[derive(Debug, Deserialize)]
struct RatingInput {
    #[serde(flatten)]
    rates: RateSnapshot,
    #[serde(default)]
    usage_events: Vec<UsageEvent>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("meterbill_rating=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        bail!("usage: {} <snapshot.json> <range_start> <range_stop>", args[0]);
    }

    info!("Starting MeterBill rating v{}", VERSION);

    let config = RatingConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    let content = std::fs::read_to_string(&args[1])
        .with_context(|| format!("failed to read {}", args[1]))?;
    let input: RatingInput =
        serde_json::from_str(&content).with_context(|| format!("failed to parse {}", args[1]))?;
    let filter = EventFilter::parse(&args[2], &args[3])?;

    let store: InMemoryEventStore = input.usage_events.into_iter().collect();
    let engine = RatingEngine::from_snapshot(Arc::new(store), input.rates, config)?;

    let events = engine.rate_concurrently(&filter).await?;
    info!("Rated {} billable events", events.len());

    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}
