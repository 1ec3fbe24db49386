use crate::buffer::{SnapshotBuffer, MAX_SNAPSHOTS};
use crate::clock::{Clock, SystemClock};
use crate::config::ScannerConfig;
use crate::error::{ConfigError, PersistError};
use crate::model::{AggregateSummary, EnrichedItem, ItemId, ItemMapping, Quote, Snapshot, Volume24h};
use crate::persist::{self, HydrateOutcome, PersistScheduler, STATE_KEY};
use crate::rank;
use crate::stats::{item_history, AggregateIndex, ItemHistory};
use crate::store::BlobStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestEvent {
    pub sequence: u64,
    pub taken_at: i64,
    pub retained: usize,
    pub evicted_taken_at: Option<i64>,
    pub items_updated: usize,
}

/// Owns the snapshot window, its aggregates and the active config.
///
/// Every mutation goes through `&mut self`, so a reader holding `&self`
/// always sees the index as of a whole ingest, never half of one.
pub struct ScannerEngine {
    buffer: SnapshotBuffer,
    index: AggregateIndex,
    config: ScannerConfig,
    scheduler: PersistScheduler,
    clock: Box<dyn Clock>,
    subscribers: Vec<Sender<IngestEvent>>,
    sequence: u64,
}

impl ScannerEngine {
    pub fn new(config: ScannerConfig) -> Self {
        Self::with_clock(config, MAX_SNAPSHOTS, Box::new(SystemClock))
    }

    pub fn with_clock(config: ScannerConfig, capacity: usize, clock: Box<dyn Clock>) -> Self {
        let scheduler = PersistScheduler::new(config.persist_debounce_ms, config.persist_max_wait_ms);
        ScannerEngine {
            buffer: SnapshotBuffer::new(capacity),
            index: AggregateIndex::new(),
            config,
            scheduler,
            clock,
            subscribers: Vec::new(),
            sequence: 0,
        }
    }

    pub fn ingest(&mut self, snapshot: Snapshot) -> IngestEvent {
        let taken_at = snapshot.taken_at;
        let items_updated = self.index.apply_insert(&snapshot);
        let evicted = self.buffer.insert(snapshot);
        if let Some(old) = &evicted {
            self.index.apply_evict(old);
        }

        self.sequence += 1;
        self.scheduler.mark_dirty(self.clock.now_ms());

        let event = IngestEvent {
            sequence: self.sequence,
            taken_at,
            retained: self.buffer.len(),
            evicted_taken_at: evicted.map(|s| s.taken_at),
            items_updated,
        };
        debug!(
            sequence = event.sequence,
            taken_at,
            retained = event.retained,
            items_updated,
            evicted = ?event.evicted_taken_at,
            "ingested snapshot"
        );
        self.publish(&event);
        event
    }

    pub fn ingest_quotes(&mut self, taken_at: i64, quotes: &HashMap<ItemId, Quote>) -> IngestEvent {
        let quotes = quotes.iter().map(|(id, q)| (*id, *q)).collect();
        self.ingest(Snapshot::new(taken_at, quotes))
    }

    fn publish(&mut self, event: &IngestEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscribe(&mut self) -> Receiver<IngestEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Validates and swaps the config. History and aggregates are untouched.
    pub fn load_config(&mut self, config: ScannerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.scheduler
            .set_timing(config.persist_debounce_ms, config.persist_max_wait_ms);
        self.config = config;
        info!("scanner config replaced");
        Ok(())
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn hydrate(&mut self, blob: Option<&str>) -> HydrateOutcome {
        let hydrated = persist::hydrate(blob, self.buffer.capacity());
        self.buffer = hydrated.buffer;
        self.index = hydrated.index;
        info!(outcome = ?hydrated.outcome, retained = self.buffer.len(), "hydrated");
        hydrated.outcome
    }

    pub fn hydrate_from(&mut self, store: &dyn BlobStore) -> HydrateOutcome {
        let blob = store.get(STATE_KEY).unwrap_or_else(|e| {
            warn!(error = %e, "could not read persisted state");
            None
        });
        self.hydrate(blob.as_deref())
    }

    pub fn serialize(&self) -> Result<String, PersistError> {
        persist::serialize(&self.buffer, &self.index)
    }

    pub fn persist_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Writes the state if the debounce window has elapsed. Returns whether a
    /// write was attempted.
    pub fn flush_if_due(&mut self, store: &mut dyn BlobStore) -> bool {
        if !self.scheduler.is_due(self.clock.now_ms()) {
            return false;
        }
        self.flush(store);
        true
    }

    /// Forces a write. Failures are logged; in-memory state stays authoritative.
    pub fn flush(&mut self, store: &mut dyn BlobStore) -> bool {
        self.scheduler.clear();
        match self.serialize() {
            Ok(blob) => persist::write_blob(store, STATE_KEY, &blob),
            Err(e) => {
                warn!(error = %e, "could not encode state");
                false
            }
        }
    }

    pub fn compute_ranked(
        &self,
        catalog: &[ItemMapping],
        quotes: &HashMap<ItemId, Quote>,
        volumes: Option<&HashMap<ItemId, Volume24h>>,
    ) -> Vec<EnrichedItem> {
        rank::compute_ranked(catalog, quotes, volumes, &self.index, &self.config)
    }

    pub fn enrich(
        &self,
        item: &ItemMapping,
        quote: &Quote,
        volume: Option<&Volume24h>,
    ) -> EnrichedItem {
        rank::enrich(item, quote, volume, &self.index, &self.config)
    }

    pub fn aggregate(&self, id: ItemId) -> Option<AggregateSummary> {
        self.index.summary(id)
    }

    pub fn history(&self, id: ItemId) -> ItemHistory {
        item_history(&self.buffer, id)
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }

    pub fn index(&self) -> &AggregateIndex {
        &self.index
    }
}

#[derive(Debug, Default)]
pub struct RefreshGate {
    busy: AtomicBool,
}

pub struct RefreshPermit<'a> {
    gate: &'a RefreshGate,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_enter(&self) -> Option<RefreshPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshPermit { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for RefreshPermit<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn snap(t: i64, id: ItemId, high: f64, low: f64) -> Snapshot {
        let mut quotes = BTreeMap::new();
        quotes.insert(id, Quote::new(high, low));
        Snapshot::new(t, quotes)
    }

    #[test]
    fn subscribers_see_each_ingest() {
        let mut engine = ScannerEngine::new(ScannerConfig::default());
        let rx = engine.subscribe();
        engine.ingest(snap(1, 1, 120.0, 100.0));
        engine.ingest(snap(2, 1, 0.0, 100.0));
        let events: Vec<IngestEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].items_updated, 1);
        assert_eq!(events[1].items_updated, 0);
        assert_eq!(events[1].sequence, 2);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut engine = ScannerEngine::new(ScannerConfig::default());
        drop(engine.subscribe());
        let live = engine.subscribe();
        engine.ingest(snap(1, 1, 120.0, 100.0));
        assert_eq!(engine.subscribers.len(), 1);
        assert_eq!(live.try_iter().count(), 1);
    }

    #[test]
    fn config_swap_keeps_history() {
        let mut engine = ScannerEngine::new(ScannerConfig::default());
        engine.ingest(snap(1, 1, 120.0, 100.0));
        engine.ingest(snap(2, 1, 130.0, 110.0));
        let before = engine.aggregate(1);

        let swapped = ScannerConfig {
            weight_risk: 10.0,
            ..Default::default()
        };
        engine.load_config(swapped).unwrap();
        assert_eq!(engine.aggregate(1), before);
        assert_eq!(engine.config().weight_risk, 10.0);

        let bad = ScannerConfig {
            top_n: 0,
            ..Default::default()
        };
        assert!(engine.load_config(bad).is_err());
        assert_eq!(engine.config().weight_risk, 10.0);
    }

    #[test]
    fn eviction_is_reported() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine =
            ScannerEngine::with_clock(ScannerConfig::default(), 2, Box::new(Arc::clone(&clock)));
        engine.ingest(snap(1, 1, 120.0, 100.0));
        engine.ingest(snap(2, 1, 120.0, 100.0));
        let event = engine.ingest(snap(3, 1, 120.0, 100.0));
        assert_eq!(event.evicted_taken_at, Some(1));
        assert_eq!(event.retained, 2);
        assert_eq!(engine.aggregate(1).map(|a| a.count), Some(2));
    }

    #[test]
    fn history_and_enrich_read_the_live_window() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine =
            ScannerEngine::with_clock(ScannerConfig::default(), 3, Box::new(Arc::clone(&clock)));
        for (t, mid) in [(10, 100.0), (20, 200.0), (30, 300.0), (40, 400.0)] {
            engine.ingest(snap(t, 7, mid, mid));
        }

        let h = engine.history(7);
        let times: Vec<i64> = h.points.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![20, 30, 40]);
        assert!((h.trend - 10.0).abs() < 1e-9);
        assert!(engine.history(8).points.is_empty());

        let item = ItemMapping {
            id: 7,
            limit: Some(100),
            ..Default::default()
        };
        let e = engine.enrich(&item, &Quote::new(420.0, 400.0), None);
        let expected = engine.aggregate(7).map(|a| a.volatility).unwrap_or_default();
        assert!(expected > 0.0);
        assert_eq!(e.historical_volatility, expected);
        assert_eq!(e.metrics.net_margin, 16.0);
    }

    #[test]
    fn gate_rejects_overlapping_refresh() {
        let gate = RefreshGate::new();
        let permit = gate.try_enter();
        assert!(permit.is_some());
        assert!(gate.try_enter().is_none());
        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_some());
    }
}
