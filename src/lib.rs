pub mod analysis;
pub mod batch;
pub mod config;
pub mod error;
pub mod harvest;
pub mod store;
pub mod surface;

pub use batch::{TargetHarvest, harvest_batch};
pub use config::{HarvestConfig, HarvestConfigBuilder};
pub use error::{HarvestError, HarvestResult};
pub use harvest::{
    ContentRecord, DedupLedger, RecordSink, SourceStrategy, harvest_feed, run_on_surface,
};
pub use store::{HarvestStore, StoreSink, StoreTarget, doc_id, resolve_store_target};
pub use surface::{BrowserSession, ChromiumSurface, FeedSurface, ReadyState, launch_browser};
