pub mod buddy;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod flips;
pub mod loader;
pub mod model;
pub mod persist;
pub mod rank;
pub mod stats;
pub mod store;
pub mod watchlist;

pub use buffer::{SnapshotBuffer, MAX_SNAPSHOTS};
pub use config::ScannerConfig;
pub use engine::{IngestEvent, RefreshGate, ScannerEngine};
pub use model::{EnrichedItem, ItemId, ItemMapping, Metrics, Quote, Snapshot, Volume24h};
pub use persist::HydrateOutcome;
pub use stats::{AggregateIndex, NumericAggregate};
