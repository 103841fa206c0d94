// Session-scoped cache of revealed cards
// Holds sensitive data in memory only; cleared on sign-out or when the checkout is left

use crate::models::RevealedCard;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Default)]
pub struct RevealCacheStats {
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub network_reveals: AtomicUsize,
    pub failed_reveals: AtomicUsize,
    pub eviction_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RevealCacheStatsReport {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub network_reveals: usize,
    pub failed_reveals: usize,
    pub eviction_count: usize,
}

// One cell per card id; concurrent reveals of the same card share the in-flight call
#[derive(Debug, Default)]
pub struct RevealCache {
    entries: DashMap<String, Arc<OnceCell<RevealedCard>>>,
    stats: RevealCacheStats,
}

impl RevealCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Read-only lookup for consumers outside the vault
    pub fn get(&self, card_id: &str) -> Option<RevealedCard> {
        let cached = self
            .entries
            .get(card_id)
            .and_then(|cell| cell.get().cloned());

        if cached.is_some() {
            self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
        } else {
            self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
        }
        cached
    }

    pub fn contains(&self, card_id: &str) -> bool {
        self.entries
            .get(card_id)
            .map_or(false, |cell| cell.initialized())
    }

    // Returns the cached card or runs `reveal` exactly once for all concurrent callers.
    // A failed reveal leaves the cell empty so the next call tries again.
    pub async fn get_or_reveal<F, Fut, E>(&self, card_id: &str, reveal: F) -> Result<RevealedCard, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RevealedCard, E>>,
    {
        // Clone the cell out so no map guard is held across the await
        let cell = self.entries.entry(card_id.to_string()).or_default().clone();

        if let Some(card) = cell.get() {
            self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
            return Ok(card.clone());
        }
        self.stats.miss_count.fetch_add(1, Ordering::SeqCst);

        let result = cell
            .get_or_try_init(move || async move {
                self.stats.network_reveals.fetch_add(1, Ordering::SeqCst);
                reveal().await
            })
            .await;

        match result {
            Ok(card) => Ok(card.clone()),
            Err(e) => {
                self.stats.failed_reveals.fetch_add(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn evict(&self, card_id: &str) -> bool {
        let removed = self.entries.remove(card_id).is_some();
        if removed {
            self.stats.eviction_count.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    // Drops every revealed card; in-flight reveals land in orphaned cells and are discarded
    pub fn clear(&self) -> usize {
        let count = self.len();
        self.entries.clear();
        self.stats.eviction_count.fetch_add(count, Ordering::SeqCst);
        count
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RevealCacheStatsReport {
        RevealCacheStatsReport {
            items_count: self.len(),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            network_reveals: self.stats.network_reveals.load(Ordering::SeqCst),
            failed_reveals: self.stats.failed_reveals.load(Ordering::SeqCst),
            eviction_count: self.stats.eviction_count.load(Ordering::SeqCst),
        }
    }
}
