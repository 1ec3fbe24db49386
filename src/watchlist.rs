use crate::model::{EnrichedItem, ItemId};
use crate::persist::write_blob;
use crate::store::BlobStore;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::warn;

pub const WATCHLIST_KEY: &str = "ge_scanner/favorites";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watchlist {
    ids: BTreeSet<ItemId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WatchSummary {
    pub tracked: usize,
    pub total_net_margin: f64,
    pub avg_roi: f64,
}

impl Watchlist {
    pub fn load(store: &dyn BlobStore) -> Self {
        let raw = match store.get(WATCHLIST_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Watchlist::default(),
            Err(e) => {
                warn!(error = %e, "could not read watchlist");
                return Watchlist::default();
            }
        };
        match serde_json::from_str::<Vec<ItemId>>(&raw) {
            Ok(ids) => Watchlist {
                ids: ids.into_iter().collect(),
            },
            Err(e) => {
                warn!(error = %e, "discarding malformed watchlist");
                Watchlist::default()
            }
        }
    }

    pub fn save(&self, store: &mut dyn BlobStore) -> bool {
        let ids: Vec<ItemId> = self.ids.iter().copied().collect();
        match serde_json::to_string(&ids) {
            Ok(json) => write_blob(store, WATCHLIST_KEY, &json),
            Err(e) => {
                warn!(error = %e, "could not encode watchlist");
                false
            }
        }
    }

    /// Returns whether the id is tracked after the toggle.
    pub fn toggle(&mut self, id: ItemId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.ids.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn summary(&self, items: &[EnrichedItem]) -> WatchSummary {
        let tracked: Vec<&EnrichedItem> = items.iter().filter(|e| self.contains(e.item.id)).collect();
        if tracked.is_empty() {
            return WatchSummary::default();
        }
        let total_net_margin = tracked.iter().map(|e| e.metrics.net_margin).sum();
        let avg_roi = tracked.iter().map(|e| e.metrics.roi).sum::<f64>() / tracked.len() as f64;
        WatchSummary {
            tracked: tracked.len(),
            total_net_margin,
            avg_roi,
        }
    }
}
