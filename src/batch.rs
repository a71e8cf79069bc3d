//! Multi-target batches: independent harvest runs scheduled concurrently.
//!
//! Isolation is by construction, not synchronization: each task owns its
//! browser session and dedup ledger and shares no mutable state with its
//! siblings. A failed task is caught at its boundary and becomes a single
//! `batch_error` record; the batch completes only once every task has
//! finished.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::error::HarvestResult;
use crate::harvest::{ContentRecord, RecordSink, harvest_feed};

/// Result of one target's run within a batch.
#[derive(Debug)]
pub struct TargetHarvest {
    pub target_url: String,
    pub records: Vec<ContentRecord>,
}

type RunFuture = Pin<Box<dyn Future<Output = HarvestResult<Vec<ContentRecord>>> + Send>>;
type Runner = dyn Fn(HarvestConfig, Option<Arc<dyn RecordSink>>) -> RunFuture + Send + Sync;

/// Harvest every target concurrently and return one entry per input, in
/// input order. There is no early exit: a failing target yields its
/// `batch_error` entry while siblings run to completion.
pub async fn harvest_batch(
    configs: Vec<HarvestConfig>,
    sink: Option<Arc<dyn RecordSink>>,
) -> Vec<TargetHarvest> {
    let runner: Arc<Runner> = Arc::new(|config, sink| {
        Box::pin(async move { harvest_feed(&config, sink.as_deref()).await })
    });
    run_batch(configs, sink, runner).await
}

async fn run_batch(
    configs: Vec<HarvestConfig>,
    sink: Option<Arc<dyn RecordSink>>,
    runner: Arc<Runner>,
) -> Vec<TargetHarvest> {
    let total = configs.len();
    let targets: Vec<String> = configs
        .iter()
        .map(|config| config.target_url().to_string())
        .collect();
    let mut tasks = JoinSet::new();

    for (index, config) in configs.into_iter().enumerate() {
        let sink = sink.clone();
        let runner = runner.clone();
        tasks.spawn(async move {
            let target_url = config.target_url().to_string();
            let outcome = runner(config, sink).await;
            (index, target_url, outcome)
        });
    }

    let mut slots: Vec<Option<TargetHarvest>> = (0..total).map(|_| None).collect();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, target_url, outcome)) => {
                let records = match outcome {
                    Ok(mut records) => {
                        for record in &mut records {
                            record.target_url = Some(target_url.clone());
                        }
                        records
                    }
                    Err(e) => {
                        warn!(target_url, "Harvest task failed: {e}");
                        let record = ContentRecord::batch_error(&target_url, &e.to_string());
                        if let Some(sink) = sink.as_deref()
                            && let Err(sink_err) = sink.deliver(&record).await
                        {
                            warn!(target_url, "Record sink failed for batch error: {sink_err:#}");
                        }
                        vec![record]
                    }
                };
                slots[index] = Some(TargetHarvest { target_url, records });
            }
            // A panicking task is isolated the same way a failing one is; its
            // slot stays empty here and is filled with a batch_error below.
            Err(e) => warn!("Harvest task panicked: {e}"),
        }
    }

    let entries: Vec<TargetHarvest> = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                let target_url = targets[index].clone();
                TargetHarvest {
                    records: vec![ContentRecord::batch_error(
                        &target_url,
                        "harvest task panicked before reporting",
                    )],
                    target_url,
                }
            })
        })
        .collect();

    info!(
        targets = total,
        records = entries.iter().map(|t| t.records.len()).sum::<usize>(),
        "Batch harvest complete"
    );
    entries
}
