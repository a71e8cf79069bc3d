//! Incremental persistence: a `RecordSink` backed by the document store.

use std::sync::Arc;

use async_trait::async_trait;

use super::HarvestStore;
use crate::harvest::{ContentRecord, RecordSink};

/// Delivers each record to the store as it is produced, so a run that dies
/// mid-scroll still leaves everything harvested so far persisted.
pub struct StoreSink {
    store: Arc<HarvestStore>,
}

impl StoreSink {
    pub fn new(store: Arc<HarvestStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecordSink for StoreSink {
    async fn deliver(&self, record: &ContentRecord) -> anyhow::Result<()> {
        self.store.upsert_record(record).await?;
        Ok(())
    }
}
