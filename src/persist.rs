use crate::buffer::SnapshotBuffer;
use crate::error::PersistError;
use crate::model::{ItemId, Snapshot};
use crate::stats::{AggregateIndex, NumericAggregate};
use crate::store::BlobStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

pub const SCHEMA_VERSION: u64 = 1;
pub const STATE_KEY: &str = "ge_scanner/state";

const CONSISTENCY_TOLERANCE: f64 = 1e-6;

#[derive(Serialize)]
struct StateRef<'a> {
    version: u64,
    // oldest first, hydrate replays in the same order
    history: Vec<&'a Snapshot>,
    aggregates: BTreeMap<ItemId, &'a NumericAggregate>,
}

pub fn serialize(buffer: &SnapshotBuffer, index: &AggregateIndex) -> Result<String, PersistError> {
    let state = StateRef {
        version: SCHEMA_VERSION,
        history: buffer.iter_oldest_first().collect(),
        aggregates: index.entries().iter().map(|(id, agg)| (*id, agg)).collect(),
    };
    Ok(serde_json::to_string(&state)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    AggregatesMissing,
    VersionMismatch { found: Option<u64> },
    HistoryTruncated { dropped: usize },
    AggregatesInconsistent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColdReason {
    NoBlob,
    Unparsable,
    EmptyHistory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrateOutcome {
    Restored { snapshots: usize },
    Rebuilt { snapshots: usize, reason: RebuildReason },
    Cold { reason: ColdReason },
}

pub struct Hydrated {
    pub buffer: SnapshotBuffer,
    pub index: AggregateIndex,
    pub outcome: HydrateOutcome,
}

impl Hydrated {
    fn cold(capacity: usize, reason: ColdReason) -> Self {
        Hydrated {
            buffer: SnapshotBuffer::new(capacity),
            index: AggregateIndex::new(),
            outcome: HydrateOutcome::Cold { reason },
        }
    }
}

/// Restores a window from a blob. Never fails: anything short of a fully
/// consistent blob degrades to a rebuild from history, or to a cold start.
pub fn hydrate(blob: Option<&str>, capacity: usize) -> Hydrated {
    let Some(blob) = blob else {
        return Hydrated::cold(capacity, ColdReason::NoBlob);
    };

    let value: Value = match serde_json::from_str(blob) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "persisted state is not valid json, starting cold");
            return Hydrated::cold(capacity, ColdReason::Unparsable);
        }
    };

    let history: Vec<Snapshot> = match value.get("history").cloned().map(serde_json::from_value) {
        Some(Ok(h)) => h,
        Some(Err(e)) => {
            warn!(error = %e, "persisted history is malformed, starting cold");
            return Hydrated::cold(capacity, ColdReason::Unparsable);
        }
        None => {
            warn!("persisted state has no history, starting cold");
            return Hydrated::cold(capacity, ColdReason::Unparsable);
        }
    };
    if history.is_empty() {
        return Hydrated::cold(capacity, ColdReason::EmptyHistory);
    }

    let (buffer, dropped) = SnapshotBuffer::from_oldest_first(history, capacity);
    let rebuilt = AggregateIndex::rebuild(&buffer);
    let snapshots = buffer.len();

    let rebuild = |reason: RebuildReason, index: AggregateIndex, buffer: SnapshotBuffer| {
        warn!(?reason, snapshots, "rebuilding aggregates from history");
        Hydrated {
            buffer,
            index,
            outcome: HydrateOutcome::Rebuilt { snapshots, reason },
        }
    };

    let version = value.get("version").and_then(Value::as_u64);
    if version != Some(SCHEMA_VERSION) {
        return rebuild(RebuildReason::VersionMismatch { found: version }, rebuilt, buffer);
    }
    if dropped > 0 {
        return rebuild(RebuildReason::HistoryTruncated { dropped }, rebuilt, buffer);
    }

    let stored: HashMap<ItemId, NumericAggregate> = match value
        .get("aggregates")
        .cloned()
        .map(serde_json::from_value::<HashMap<ItemId, NumericAggregate>>)
    {
        Some(Ok(map)) if !map.is_empty() => map,
        Some(Err(e)) => {
            warn!(error = %e, "persisted aggregates are malformed");
            return rebuild(RebuildReason::AggregatesMissing, rebuilt, buffer);
        }
        _ => return rebuild(RebuildReason::AggregatesMissing, rebuilt, buffer),
    };

    let stored = AggregateIndex::from_entries(stored);
    if !stored.approx_eq(&rebuilt, CONSISTENCY_TOLERANCE) {
        return rebuild(RebuildReason::AggregatesInconsistent, rebuilt, buffer);
    }

    debug!(snapshots, items = stored.len(), "restored persisted state");
    Hydrated {
        buffer,
        index: stored,
        outcome: HydrateOutcome::Restored { snapshots },
    }
}

pub fn write_blob(store: &mut dyn BlobStore, key: &str, blob: &str) -> bool {
    match store.set(key, blob) {
        Ok(()) => {
            debug!(key, bytes = blob.len(), "persisted blob");
            true
        }
        Err(e) => {
            warn!(key, error = %e, "persist failed, continuing in memory");
            false
        }
    }
}

/// Pending-write flag plus a deadline. A burst of dirty marks coalesces into
/// one write, due `debounce_ms` after the last mark but never later than
/// `max_wait_ms` after the first.
#[derive(Debug, Clone)]
pub struct PersistScheduler {
    debounce_ms: u64,
    max_wait_ms: u64,
    first_dirty: Option<u64>,
    last_dirty: u64,
}

impl PersistScheduler {
    pub fn new(debounce_ms: u64, max_wait_ms: u64) -> Self {
        PersistScheduler {
            debounce_ms,
            max_wait_ms: max_wait_ms.max(debounce_ms),
            first_dirty: None,
            last_dirty: 0,
        }
    }

    pub fn set_timing(&mut self, debounce_ms: u64, max_wait_ms: u64) {
        self.debounce_ms = debounce_ms;
        self.max_wait_ms = max_wait_ms.max(debounce_ms);
    }

    pub fn mark_dirty(&mut self, now_ms: u64) {
        if self.first_dirty.is_none() {
            self.first_dirty = Some(now_ms);
        }
        self.last_dirty = now_ms;
    }

    pub fn is_pending(&self) -> bool {
        self.first_dirty.is_some()
    }

    pub fn due_at(&self) -> Option<u64> {
        self.first_dirty.map(|first| {
            let trailing = self.last_dirty.saturating_add(self.debounce_ms);
            let ceiling = first.saturating_add(self.max_wait_ms);
            trailing.min(ceiling)
        })
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.due_at().is_some_and(|due| now_ms >= due)
    }

    pub fn clear(&mut self) {
        self.first_dirty = None;
    }
}
