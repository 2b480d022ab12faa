//! Single-threaded core: every game event and every periodic sweep runs on
//! one logical tick, so the caches, the pending-purchase slot and the
//! retainer index need no locking.
//!
//! Sweeps are rate-limited by a "next eligible run" timestamp compared
//! against the clock each tick; there are no timer threads.

use crate::catalog::StaticCatalog;
use crate::game::{GameClient, GameEvent, Packet};
use crate::ledger::store::LedgerStore;
use crate::ledger::{Ledger, MarketTransaction};
use crate::logging::{json_log, json_warn, obj, v_i64, v_num, v_str};
use crate::market::correlator::PurchaseCorrelator;
use crate::market::listing_cache::{Listing, ListingCache};
use crate::market::tax::{TaxRates, MARKETBOARD_BUY_TAX_PERCENT};
use crate::state::Config;
use crate::wealth::classifier::{classify, LineClass};
use crate::wealth::player::PlayerWealthTracker;
use crate::wealth::retainers::RetainerTracker;

pub struct Engine {
    cfg: Config,
    ledger: Ledger,
    catalog: StaticCatalog,
    listings: ListingCache,
    correlator: PurchaseCorrelator,
    taxes: TaxRates,
    player: PlayerWealthTracker,
    retainers: RetainerTracker,
    pending_tax_world: Option<String>,
    next_delayed_check: i64,
    next_retainer_sweep: i64,
    next_cache_sweep: i64,
    next_retry_flush: i64,
}

impl Engine {
    pub fn new(cfg: Config, catalog: StaticCatalog, store: LedgerStore) -> Self {
        let ledger = Ledger::new(store, cfg.retry_ceiling);
        Self {
            listings: ListingCache::new(cfg.listing_ttl_secs),
            correlator: PurchaseCorrelator::new(cfg.pending_purchase_expiry_secs),
            taxes: TaxRates::new(&cfg.tax_api_base),
            player: PlayerWealthTracker::new(),
            retainers: RetainerTracker::new(),
            pending_tax_world: None,
            next_delayed_check: 0,
            next_retainer_sweep: 0,
            next_cache_sweep: 0,
            next_retry_flush: 0,
            cfg,
            ledger,
            catalog,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn taxes_mut(&mut self) -> &mut TaxRates {
        &mut self.taxes
    }

    /// A world whose tax rates need refreshing, raised by login or a travel
    /// line. The driver performs the actual fetch off the event path.
    pub fn take_pending_tax_world(&mut self) -> Option<String> {
        self.pending_tax_world.take()
    }

    pub fn handle_event(&mut self, event: GameEvent, game: &dyn GameClient, now: i64) {
        match event {
            GameEvent::Login => {
                json_log("engine", obj(&[("op", v_str("login"))]));
                self.player.on_login(game, &mut self.ledger);
                self.retainers.refresh(game, &self.ledger);
                self.pending_tax_world = game.current_world();
            }
            GameEvent::Logout => {
                json_log("engine", obj(&[("op", v_str("logout"))]));
                self.player.on_logout();
                self.retainers.clear();
                self.listings.clear();
                self.correlator.reset();
                self.taxes.clear();
                self.pending_tax_world = None;
            }
            GameEvent::Chat(line) => {
                if !game.is_logged_in() {
                    return;
                }
                let class = classify(&line);
                match &class {
                    Some(LineClass::Travel(world)) => {
                        self.pending_tax_world = Some(world.clone());
                    }
                    Some(LineClass::Sale(sale)) => {
                        self.retainers
                            .on_sale(sale, &line, game, &self.taxes, &self.catalog, &mut self.ledger);
                    }
                    _ => self.player.on_line(class.as_ref(), game, &mut self.ledger),
                }
            }
            GameEvent::Packet(packet) => match packet {
                Packet::PurchaseRequest(request) => {
                    self.correlator.on_request(request, now);
                }
                Packet::PurchaseResult { catalog_id, quantity } => {
                    if let Some(listing) = self.correlator.on_result(catalog_id, quantity, now, &self.listings) {
                        self.record_purchase(&listing, game);
                    }
                }
                Packet::MarketOfferings { listings } => {
                    for listing in listings {
                        self.listings.upsert(listing, now);
                    }
                }
            },
        }
    }

    /// Run whichever sweeps have come due.
    pub fn tick(&mut self, game: &dyn GameClient, now: i64) {
        if now >= self.next_delayed_check {
            self.player.check_delayed(game, &mut self.ledger);
            self.next_delayed_check = now + self.cfg.delayed_check_secs;
        }
        if now >= self.next_retainer_sweep {
            if game.is_logged_in() {
                self.retainers.sweep(game, &mut self.ledger);
            }
            self.next_retainer_sweep = now + self.cfg.retainer_sweep_secs;
        }
        if now >= self.next_cache_sweep {
            let evicted = self.listings.sweep_expired(now);
            if evicted > 0 {
                json_log(
                    "engine",
                    obj(&[("op", v_str("listing_cache_swept")), ("evicted", v_num(evicted as f64))]),
                );
            }
            self.next_cache_sweep = now + self.cfg.cache_sweep_secs;
        }
        if now >= self.next_retry_flush {
            self.ledger.flush_retries();
            self.next_retry_flush = now + self.cfg.retry_flush_secs;
        }
        self.correlator.expire(now);
    }

    fn record_purchase(&mut self, listing: &Listing, game: &dyn GameClient) {
        let Some(player) = game.player() else { return };
        let Some(item) = self.catalog.item(listing.catalog_id) else {
            json_warn(
                "engine",
                obj(&[
                    ("op", v_str("purchase")),
                    ("warning", v_str("item not in catalog")),
                    ("catalog_id", v_i64(listing.catalog_id as i64)),
                ]),
            );
            return;
        };
        let zone_id = game.current_zone();
        let Some(zone) = self.catalog.zone(zone_id) else {
            json_warn(
                "engine",
                obj(&[
                    ("op", v_str("purchase")),
                    ("warning", v_str("zone not in catalog")),
                    ("zone_id", v_i64(zone_id as i64)),
                ]),
            );
            return;
        };

        let tx = MarketTransaction::purchase(
            &player.name,
            player.content_id,
            &listing.retainer_name,
            listing.retainer_id,
            listing.catalog_id,
            &item.name,
            &item.category,
            listing.is_hq,
            listing.quantity as i64,
            listing.price_per_unit as i64,
            listing.total_tax,
            zone,
            MARKETBOARD_BUY_TAX_PERCENT,
        );
        self.ledger.add_market_transaction(tx);
    }
}
