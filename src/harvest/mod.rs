//! The adaptive feed-harvesting core.
//!
//! Drives a browser session against a dynamically-rendered, virtualized feed,
//! discovers content items as they render, dedupes them by normalized
//! identity, and extracts structured records through a cascade of strategies
//! that degrade gracefully as page structure varies.

pub mod engine;
pub mod extract;
pub mod ledger;
pub mod normalize;
pub mod record;
pub mod selectors;

pub use engine::{harvest_feed, run_on_surface};
pub use ledger::DedupLedger;
pub use normalize::{normalize_feed_url, synthetic_content_url};
pub use record::{ContentRecord, RecordSink, SourceStrategy};
