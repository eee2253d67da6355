//! A registry of per-bin resources, typically one [`TelemetryPoller`] per monitored bin.
//!
//! [`TelemetryPoller`]: crate::poller::TelemetryPoller

use std::sync::Arc;

use dashmap::{DashMap, Entry};

use self::bin_ref::BinRef;
use self::error::{BinAlreadyPresent, BinNotFound};
use crate::ids::BinId;

pub mod bin_ref;
pub mod error;

/// Owns one `T` per [`BinId`].
///
/// The map holds the only strong reference. Consumers borrow entries through [`BinRef`], so
/// removing a bin drops its entry right away; a poller stored here is cancelled by that drop.
#[derive(Debug)]
pub struct BinMap<T> {
    bins: DashMap<BinId, Arc<T>, ahash::RandomState>,
}

impl<T> BinMap<T> {
    pub fn new() -> BinMap<T> {
        Self::default()
    }

    /// Track `entry` under `bin_id`. An existing entry is never replaced.
    pub fn insert_bin(&self, bin_id: BinId, entry: T) -> Result<BinRef<T>, BinAlreadyPresent> {
        match self.bins.entry(bin_id) {
            Entry::Occupied(occupied) => Err(BinAlreadyPresent {
                bin_id: occupied.key().clone(),
            }),
            Entry::Vacant(slot) => {
                let bin_id = slot.key().clone();
                let entry = slot.insert(Arc::new(entry));
                Ok(BinRef::new(bin_id, Arc::downgrade(entry.value())))
            }
        }
    }

    /// Stop tracking `bin_id`, dropping its entry.
    pub fn remove_bin(&self, bin_id: &BinId) -> Result<(), BinNotFound> {
        match self.bins.remove(bin_id) {
            Some(_) => Ok(()),
            None => Err(BinNotFound {
                bin_id: bin_id.clone(),
            }),
        }
    }

    /// Lend the entry for `bin_id`.
    pub fn get_bin(&self, bin_id: &BinId) -> Result<BinRef<T>, BinNotFound> {
        match self.bins.get(bin_id) {
            Some(entry) => Ok(BinRef::new(bin_id.clone(), Arc::downgrade(entry.value()))),
            None => Err(BinNotFound {
                bin_id: bin_id.clone(),
            }),
        }
    }

    /// Tracked bins, sorted.
    pub fn bin_ids(&self) -> Vec<BinId> {
        let mut ids: Vec<BinId> = self.bins.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

impl<T> Default for BinMap<T> {
    fn default() -> Self {
        Self {
            bins: DashMap::default(),
        }
    }
}
