//! TTL cache of observed marketboard listings.
//!
//! A purchase confirmation carries only ids and quantities; the cached
//! listing supplies price, HQ flag and seller identity. Entries are never
//! mutated: a changed listing is evicted and re-inserted as a new snapshot,
//! and a periodic sweep drops anything older than the TTL.

use serde::{Deserialize, Serialize};

/// One market offer as decoded from an offerings packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub listing_id: u64,
    pub catalog_id: u32,
    pub quantity: u32,
    pub price_per_unit: u32,
    #[serde(default)]
    pub total_tax: i64,
    #[serde(default)]
    pub is_hq: bool,
    pub retainer_name: String,
    #[serde(default)]
    pub retainer_id: i64,
}

#[derive(Debug, Clone)]
struct CachedListing {
    cached_at: i64,
    listing: Listing,
}

pub struct ListingCache {
    entries: Vec<CachedListing>,
    ttl_secs: i64,
}

impl ListingCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self { entries: Vec::new(), ttl_secs }
    }

    /// Insert a fresh snapshot. A cached entry with the same listing id and a
    /// materially different quantity/price/catalog is stale (sold or
    /// relisted) and gets evicted first.
    pub fn upsert(&mut self, listing: Listing, now: i64) {
        self.entries.retain(|e| {
            e.listing.listing_id != listing.listing_id
                || (e.listing.quantity == listing.quantity
                    && e.listing.price_per_unit == listing.price_per_unit
                    && e.listing.catalog_id == listing.catalog_id)
        });
        self.entries.push(CachedListing { cached_at: now, listing });
    }

    /// Freshest snapshot for a listing id, if it has been observed and has
    /// not expired out.
    pub fn find(&self, listing_id: u64) -> Option<&Listing> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.listing.listing_id == listing_id)
            .map(|e| &e.listing)
    }

    /// Drop everything older than the TTL. Run on a fixed interval, not on
    /// every access.
    pub fn sweep_expired(&mut self, now: i64) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl_secs;
        self.entries.retain(|e| now - e.cached_at < ttl);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(listing_id: u64, price: u32) -> Listing {
        Listing {
            listing_id,
            catalog_id: 4551,
            quantity: 3,
            price_per_unit: price,
            total_tax: 15,
            is_hq: false,
            retainer_name: "Pippa".to_string(),
            retainer_id: 900,
        }
    }

    #[test]
    fn reprice_evicts_stale_entry() {
        let mut cache = ListingCache::new(300);
        cache.upsert(listing(5, 100), 0);
        cache.upsert(listing(5, 120), 10);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.find(5).unwrap().price_per_unit, 120);
    }

    #[test]
    fn identical_reobservation_returns_freshest() {
        let mut cache = ListingCache::new(300);
        cache.upsert(listing(5, 100), 0);
        cache.upsert(listing(5, 100), 200);

        // Both snapshots age out independently; find always sees the newest.
        assert_eq!(cache.find(5).unwrap().price_per_unit, 100);
        cache.sweep_expired(350);
        assert!(cache.find(5).is_some());
        cache.sweep_expired(501);
        assert!(cache.find(5).is_none());
    }

    #[test]
    fn ttl_boundary() {
        let mut cache = ListingCache::new(300);
        cache.upsert(listing(9, 50), 1000);

        cache.sweep_expired(1000 + 299);
        assert!(cache.find(9).is_some());

        cache.sweep_expired(1000 + 301);
        assert!(cache.find(9).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn distinct_listings_coexist() {
        let mut cache = ListingCache::new(300);
        cache.upsert(listing(1, 10), 0);
        cache.upsert(listing(2, 20), 0);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.find(1).unwrap().price_per_unit, 10);
        assert_eq!(cache.find(2).unwrap().price_per_unit, 20);
    }
}
