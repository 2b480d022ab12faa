//! Pairs an outbound purchase request with its later confirmation.
//!
//! One slot: a new request overwrites whatever was pending, and an unmatched
//! request expires instead of lingering. The confirmation carries no display
//! metadata, so an accepted match is resolved against the listing cache; a
//! cache miss drops the transaction silently.

use crate::game::PurchaseRequest;
use crate::logging::{json_log, obj, v_i64, v_str};

use super::listing_cache::{Listing, ListingCache};

/// Catalog-id offset marking the high-quality variant of a base item.
pub const HQ_CATALOG_OFFSET: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Idle,
    Awaiting { request: PurchaseRequest, since: i64 },
}

pub struct PurchaseCorrelator {
    slot: Slot,
    expiry_secs: i64,
}

impl PurchaseCorrelator {
    pub fn new(expiry_secs: i64) -> Self {
        Self { slot: Slot::Idle, expiry_secs }
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.slot, Slot::Awaiting { .. })
    }

    /// Track an outbound request. Unconditionally replaces a pending one.
    pub fn on_request(&mut self, request: PurchaseRequest, now: i64) {
        if let Slot::Awaiting { request: prev, .. } = self.slot {
            json_log(
                "correlator",
                obj(&[
                    ("op", v_str("pending_replaced")),
                    ("old_listing_id", v_i64(prev.listing_id as i64)),
                    ("new_listing_id", v_i64(request.listing_id as i64)),
                ]),
            );
        }
        self.slot = Slot::Awaiting { request, since: now };
    }

    /// Feed a purchase confirmation. On a quantity + catalog match the cached
    /// listing is returned for transaction assembly; either way the slot goes
    /// back to idle.
    pub fn on_result(
        &mut self,
        catalog_id: u32,
        quantity: u32,
        now: i64,
        cache: &ListingCache,
    ) -> Option<Listing> {
        let Slot::Awaiting { request, since } = std::mem::replace(&mut self.slot, Slot::Idle) else {
            return None;
        };

        if now - since >= self.expiry_secs {
            json_log(
                "correlator",
                obj(&[("op", v_str("pending_expired")), ("listing_id", v_i64(request.listing_id as i64))]),
            );
            return None;
        }

        let same_qty = quantity == request.quantity;
        let item_match = catalog_id == request.catalog_id || catalog_id == request.catalog_id + HQ_CATALOG_OFFSET;
        if !(same_qty && item_match) {
            return None;
        }

        match cache.find(request.listing_id) {
            Some(listing) => Some(listing.clone()),
            None => {
                // Listing aged out of the cache; the purchase goes unrecorded.
                json_log(
                    "correlator",
                    obj(&[("op", v_str("listing_cache_miss")), ("listing_id", v_i64(request.listing_id as i64))]),
                );
                None
            }
        }
    }

    /// Evict an expired pending request so it cannot match a late
    /// confirmation.
    pub fn expire(&mut self, now: i64) {
        if let Slot::Awaiting { request, since } = self.slot {
            if now - since >= self.expiry_secs {
                json_log(
                    "correlator",
                    obj(&[("op", v_str("pending_expired")), ("listing_id", v_i64(request.listing_id as i64))]),
                );
                self.slot = Slot::Idle;
            }
        }
    }

    pub fn reset(&mut self) {
        self.slot = Slot::Idle;
    }
}
