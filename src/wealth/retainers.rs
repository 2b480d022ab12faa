//! Retainer wealth: the periodic diff sweep over live retainer balances,
//! and sale confirmations arriving by chat.
//!
//! The in-memory balance index is rebuilt from the store on login and
//! cleared on logout; the sweep only writes when a balance actually moved.

use std::collections::HashMap;

use crate::catalog::StaticCatalog;
use crate::game::{ChatLine, GameClient};
use crate::ledger::{Ledger, MarketTransaction, WealthChangeType};
use crate::logging::{json_log, json_warn, obj, v_i64, v_num, v_str};
use crate::market::tax::TaxRates;

use super::classifier::SaleLine;

#[derive(Default)]
pub struct RetainerTracker {
    /// retainer id -> last seen balance
    index: HashMap<i64, i64>,
}

impl RetainerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked(&self) -> usize {
        self.index.len()
    }

    /// Rebuild the balance index from the store.
    pub fn refresh(&mut self, game: &dyn GameClient, ledger: &Ledger) {
        self.index.clear();
        let Some(player) = game.player() else { return };

        match ledger.store().retainer_known_wealth(player.content_id) {
            Ok(rows) => {
                for row in rows {
                    self.index.insert(row.character_id, row.current_wealth);
                }
            }
            Err(e) => {
                json_warn(
                    "retainer_wealth",
                    obj(&[("op", v_str("refresh")), ("error", v_str(&e.to_string()))]),
                );
                return;
            }
        }
        json_log(
            "retainer_wealth",
            obj(&[
                ("op", v_str("index_refreshed")),
                ("owner", v_str(&player.name)),
                ("retainers", v_num(self.index.len() as f64)),
            ]),
        );
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }

    /// Diff the live retainer list against the index. New retainers get a
    /// snapshot plus a zero-difference Unknown row; changed balances get the
    /// true difference. Identical sweeps write nothing.
    pub fn sweep(&mut self, game: &dyn GameClient, ledger: &mut Ledger) {
        let Some(player) = game.player() else { return };

        for retainer in game.retainers() {
            match self.index.get(&retainer.retainer_id).copied() {
                None => {
                    ledger.add_or_update_known_wealth(
                        &retainer.name,
                        retainer.retainer_id,
                        retainer.gil,
                        player.content_id,
                        Some(&player.name),
                    );
                    self.index.insert(retainer.retainer_id, retainer.gil);
                    ledger.add_retainer_wealth_change(
                        &retainer.name,
                        retainer.retainer_id,
                        &player.name,
                        player.content_id,
                        retainer.gil,
                        0,
                        WealthChangeType::Unknown,
                    );
                    json_log(
                        "retainer_wealth",
                        obj(&[
                            ("op", v_str("retainer_discovered")),
                            ("retainer", v_str(&retainer.name)),
                            ("owner", v_str(&player.name)),
                            ("gil", v_i64(retainer.gil)),
                        ]),
                    );
                }
                Some(last_seen) if last_seen != retainer.gil => {
                    ledger.add_or_update_known_wealth(
                        &retainer.name,
                        retainer.retainer_id,
                        retainer.gil,
                        player.content_id,
                        Some(&player.name),
                    );
                    self.index.insert(retainer.retainer_id, retainer.gil);
                    ledger.add_retainer_wealth_change(
                        &retainer.name,
                        retainer.retainer_id,
                        &player.name,
                        player.content_id,
                        retainer.gil,
                        retainer.gil - last_seen,
                        WealthChangeType::Unknown,
                    );
                }
                Some(_) => {}
            }
        }
    }

    /// Record a marketboard sale confirmed by chat. The line's item payload
    /// and the static catalog supply identity; the city's tax rate backs out
    /// the pre-tax value.
    pub fn on_sale(
        &mut self,
        sale: &SaleLine,
        line: &ChatLine,
        game: &dyn GameClient,
        taxes: &TaxRates,
        catalog: &StaticCatalog,
        ledger: &mut Ledger,
    ) {
        let Some(player) = game.player() else { return };
        let Some(item_ref) = line.item else {
            json_warn(
                "retainer_wealth",
                obj(&[("op", v_str("sale")), ("warning", v_str("no item payload on sale line"))]),
            );
            return;
        };
        let Some(item) = catalog.item(item_ref.item_id) else {
            json_warn(
                "retainer_wealth",
                obj(&[("op", v_str("sale")), ("warning", v_str("item not in catalog")), ("item_id", v_i64(item_ref.item_id as i64))]),
            );
            return;
        };
        if sale.quantity <= 0 {
            json_warn(
                "retainer_wealth",
                obj(&[("op", v_str("sale")), ("warning", v_str("non-positive quantity on sale line"))]),
            );
            return;
        }

        let tax_percent = taxes.rate(&sale.city);
        let tx = MarketTransaction::sale(
            &player.name,
            player.content_id,
            item_ref.item_id,
            &item.name,
            &item.category,
            item_ref.is_hq,
            sale.quantity,
            sale.profit,
            tax_percent,
            &sale.city,
        );
        ledger.add_market_transaction(tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{ItemRef, PlayerInfo, RetainerSnapshot, CHANNEL_RETAINER_SALE};
    use crate::ledger::store::LedgerStore;
    use std::cell::RefCell;

    struct StubGame {
        retainers: RefCell<Vec<RetainerSnapshot>>,
    }

    impl GameClient for StubGame {
        fn is_logged_in(&self) -> bool {
            true
        }
        fn player(&self) -> Option<PlayerInfo> {
            Some(PlayerInfo { name: "Aeryn Vale".to_string(), content_id: 7 })
        }
        fn current_gil(&self) -> i64 {
            1000
        }
        fn retainers(&self) -> Vec<RetainerSnapshot> {
            self.retainers.borrow().clone()
        }
        fn current_zone(&self) -> u32 {
            129
        }
        fn current_world(&self) -> Option<String> {
            Some("Phoenix".to_string())
        }
    }

    fn retainer(id: i64, gil: i64) -> RetainerSnapshot {
        RetainerSnapshot { retainer_id: id, name: format!("Retainer{id}"), gil }
    }

    #[test]
    fn discovery_writes_snapshot_and_zero_difference_row() {
        let game = StubGame { retainers: RefCell::new(vec![retainer(900, 5000)]) };
        let mut ledger = Ledger::new(LedgerStore::open_in_memory().unwrap(), 3);
        let mut tracker = RetainerTracker::new();

        tracker.sweep(&game, &mut ledger);

        let known = ledger.store().get_known_wealth(7, 900).unwrap().unwrap();
        assert_eq!(known.current_wealth, 5000);
        assert_eq!(known.owner.as_deref(), Some("Aeryn Vale"));

        let changes = ledger.store().recent_wealth_changes(900, 10).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].wealth_difference, 0);
        assert_eq!(changes[0].change_type, WealthChangeType::Unknown);
        assert_eq!(changes[0].owner_id, 7);
    }

    #[test]
    fn identical_sweeps_are_idempotent() {
        let game = StubGame { retainers: RefCell::new(vec![retainer(900, 5000)]) };
        let mut ledger = Ledger::new(LedgerStore::open_in_memory().unwrap(), 3);
        let mut tracker = RetainerTracker::new();

        tracker.sweep(&game, &mut ledger);
        tracker.sweep(&game, &mut ledger);
        tracker.sweep(&game, &mut ledger);

        assert_eq!(ledger.store().recent_wealth_changes(900, 10).unwrap().len(), 1);
    }

    #[test]
    fn balance_move_writes_true_difference() {
        let game = StubGame { retainers: RefCell::new(vec![retainer(900, 5000)]) };
        let mut ledger = Ledger::new(LedgerStore::open_in_memory().unwrap(), 3);
        let mut tracker = RetainerTracker::new();

        tracker.sweep(&game, &mut ledger);
        game.retainers.borrow_mut()[0].gil = 7500;
        tracker.sweep(&game, &mut ledger);

        let changes = ledger.store().recent_wealth_changes(900, 10).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].wealth_difference, 2500);
        assert_eq!(ledger.store().get_known_wealth(7, 900).unwrap().unwrap().current_wealth, 7500);
    }

    #[test]
    fn index_rebuilds_from_store_and_survives_relog() {
        let game = StubGame { retainers: RefCell::new(vec![retainer(900, 5000)]) };
        let mut ledger = Ledger::new(LedgerStore::open_in_memory().unwrap(), 3);
        let mut tracker = RetainerTracker::new();

        tracker.sweep(&game, &mut ledger);
        tracker.clear();
        assert_eq!(tracker.tracked(), 0);

        tracker.refresh(&game, &ledger);
        assert_eq!(tracker.tracked(), 1);

        // Known balance carried over: an unchanged retainer writes nothing.
        tracker.sweep(&game, &mut ledger);
        assert_eq!(ledger.store().recent_wealth_changes(900, 10).unwrap().len(), 1);
    }

    #[test]
    fn sale_line_records_transaction_with_tax_backed_out() {
        let game = StubGame { retainers: RefCell::new(Vec::new()) };
        let mut ledger = Ledger::new(LedgerStore::open_in_memory().unwrap(), 3);
        let mut tracker = RetainerTracker::new();
        let taxes = TaxRates::new("http://localhost:0");
        let mut catalog = StaticCatalog::empty();
        catalog.add_item(36109, "Grade 4 Tincture", "Medicine");

        let sale = SaleLine { quantity: 1, city: "limsa lominsa".to_string(), profit: 950 };
        let line = ChatLine {
            channel: CHANNEL_RETAINER_SALE,
            sender: String::new(),
            text: String::new(),
            item: Some(ItemRef { item_id: 36109, is_hq: true }),
            player: None,
        };
        tracker.on_sale(&sale, &line, &game, &taxes, &catalog, &mut ledger);

        let sales = ledger.store().transactions(Some(true)).unwrap();
        assert_eq!(sales.len(), 1);
        let tx = &sales[0];
        assert_eq!(tx.item_name, "Grade 4 Tincture");
        assert_eq!(tx.total_value_after_tax, 950);
        assert!(tx.is_hq);
        // Rate unknown for this city: pre-tax equals the profit.
        assert_eq!(tx.total_value, 950);
        assert_eq!(tx.tax_paid, 0);
    }

    #[test]
    fn sale_without_item_payload_is_skipped() {
        let game = StubGame { retainers: RefCell::new(Vec::new()) };
        let mut ledger = Ledger::new(LedgerStore::open_in_memory().unwrap(), 3);
        let mut tracker = RetainerTracker::new();
        let taxes = TaxRates::new("http://localhost:0");
        let catalog = StaticCatalog::empty();

        let sale = SaleLine { quantity: 2, city: "gridania".to_string(), profit: 100 };
        let line = ChatLine {
            channel: CHANNEL_RETAINER_SALE,
            sender: String::new(),
            text: String::new(),
            item: None,
            player: None,
        };
        tracker.on_sale(&sale, &line, &game, &taxes, &catalog, &mut ledger);
        assert!(ledger.store().transactions(None).unwrap().is_empty());
    }
}
