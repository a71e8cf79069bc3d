//! Harvest a feed target end to end: scrape, persist, analyze.
//!
//! Configuration comes from the environment (`TARGET_URL` is required; see
//! `HarvestConfig::from_env` for the rest). Records stream into the SQLite
//! store as they are produced, then pending rows are pushed through the
//! analysis client when an API key is available.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sentinel_harvest::analysis::{AnalysisClient, process_pending, resolve_api_key};
use sentinel_harvest::{HarvestConfig, HarvestStore, StoreSink, harvest_feed, resolve_store_target};

const ANALYSIS_BATCH_LIMIT: u32 = 40;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sentinel_harvest=info")),
        )
        .init();

    if let Err(e) = run().await {
        error!("Harvest run failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> sentinel_harvest::HarvestResult<()> {
    let config = HarvestConfig::from_env()?;

    let target = resolve_store_target(None);
    let store = Arc::new(HarvestStore::connect(&target).await?);
    let sink = StoreSink::new(store.clone());

    let records = harvest_feed(&config, Some(&sink)).await?;
    info!(records = records.len(), target = %config.target_url(), "Harvest complete");

    match resolve_api_key(None) {
        Ok(key) => {
            let client = AnalysisClient::new(key);
            let updated = process_pending(&store, &client, ANALYSIS_BATCH_LIMIT).await?;
            info!(updated, "Analysis pass complete");
        }
        Err(e) => {
            warn!("Skipping analysis pass: {e}");
        }
    }

    Ok(())
}
