//! Ledger row types and the write-through facade over the durable store.
//!
//! Writes that fail with a [`store::StorageError`] spill into the bounded
//! retry queue instead of propagating; a zero row count is logged and
//! otherwise ignored. Reads go straight to the store.

pub mod retry;
pub mod store;

use crate::logging::{json_error, json_log, json_warn, obj, v_i64, v_str};
use crate::state::now_ts;

use retry::RetryQueue;
use store::{LedgerStore, LedgerWriter, StorageError};

/// Closed set of wealth-change causes. Discriminants are part of the on-disk
/// schema and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WealthChangeType {
    Init = -1,
    Unknown = 0,
    Trade = 1,
    Marketboard = 2,
    NPCShop = 4,
    Teleport = 5,
    MailSend = 6,
    MailReceived = 7,
    RetainerWithdraw = 8,
    RetainerDeposit = 9,
    FCWithdraw = 10,
    FCDeposit = 11,
}

impl WealthChangeType {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        Some(match v {
            -1 => Self::Init,
            0 => Self::Unknown,
            1 => Self::Trade,
            2 => Self::Marketboard,
            4 => Self::NPCShop,
            5 => Self::Teleport,
            6 => Self::MailSend,
            7 => Self::MailReceived,
            8 => Self::RetainerWithdraw,
            9 => Self::RetainerDeposit,
            10 => Self::FCWithdraw,
            11 => Self::FCDeposit,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Unknown => "unknown",
            Self::Trade => "trade",
            Self::Marketboard => "marketboard",
            Self::NPCShop => "npc_shop",
            Self::Teleport => "teleport",
            Self::MailSend => "mail_send",
            Self::MailReceived => "mail_received",
            Self::RetainerWithdraw => "retainer_withdraw",
            Self::RetainerDeposit => "retainer_deposit",
            Self::FCWithdraw => "fc_withdraw",
            Self::FCDeposit => "fc_deposit",
        }
    }
}

/// Latest-known balance snapshot for one entity. One row per
/// (owner_id, character_id); owner_id is 0 for the player itself.
#[derive(Debug, Clone)]
pub struct KnownWealth {
    pub character_id: i64,
    pub character_name: String,
    pub owner_id: i64,
    pub owner: Option<String>,
    pub current_wealth: i64,
    pub timestamp: i64,
}

/// Append-only ledger row: one balance delta and its cause.
#[derive(Debug, Clone)]
pub struct WealthChange {
    pub character_id: i64,
    pub character_name: String,
    pub owner_id: i64,
    pub owner: Option<String>,
    pub wealth: i64,
    pub wealth_difference: i64,
    pub change_type: WealthChangeType,
    pub timestamp: i64,
}

/// One marketboard buy or sell, immutable once written.
#[derive(Debug, Clone)]
pub struct MarketTransaction {
    pub character_id: i64,
    pub character_name: String,
    pub retainer: Option<String>,
    pub retainer_id: i64,
    pub location: String,
    pub is_sale: bool,
    pub item_id: u32,
    pub item_name: String,
    pub quantity: i64,
    pub value_per_item: f64,
    pub total_value: i64,
    pub total_value_after_tax: i64,
    pub value_per_item_after_tax: f64,
    pub tax_percent: f32,
    pub tax_paid: i64,
    pub is_hq: bool,
    pub category: String,
    pub timestamp: i64,
}

impl MarketTransaction {
    /// Build a purchase record from a matched listing. The listing carries
    /// the tax total directly; the after-tax value is price plus tax.
    #[allow(clippy::too_many_arguments)]
    pub fn purchase(
        character_name: &str,
        character_id: i64,
        retainer_name: &str,
        retainer_id: i64,
        item_id: u32,
        item_name: &str,
        category: &str,
        is_hq: bool,
        quantity: i64,
        price_per_unit: i64,
        total_tax: i64,
        location: &str,
        tax_percent: f32,
    ) -> Self {
        let total_value = price_per_unit * quantity;
        let total_value_after_tax = total_value + total_tax;
        Self {
            character_id,
            character_name: character_name.to_string(),
            retainer: Some(retainer_name.to_string()),
            retainer_id,
            location: location.to_string(),
            is_sale: false,
            item_id,
            item_name: item_name.to_string(),
            quantity,
            value_per_item: price_per_unit as f64,
            total_value,
            total_value_after_tax,
            value_per_item_after_tax: total_value_after_tax as f64 / quantity as f64,
            tax_percent,
            tax_paid: total_tax,
            is_hq,
            category: category.to_string(),
            timestamp: now_ts(),
        }
    }

    /// Build a sale record from an after-fees profit. The pre-tax value is
    /// backed out of the profit and the city's tax rate.
    #[allow(clippy::too_many_arguments)]
    pub fn sale(
        character_name: &str,
        character_id: i64,
        item_id: u32,
        item_name: &str,
        category: &str,
        is_hq: bool,
        quantity: i64,
        profit: i64,
        tax_percent: f32,
        location: &str,
    ) -> Self {
        let total_value = crate::market::tax::before_tax_value(profit, tax_percent, true);
        let tax_paid = total_value - profit;
        Self {
            character_id,
            character_name: character_name.to_string(),
            retainer: None,
            retainer_id: 0,
            location: location.to_string(),
            is_sale: true,
            item_id,
            item_name: item_name.to_string(),
            quantity,
            value_per_item: total_value as f64 / quantity as f64,
            total_value,
            total_value_after_tax: profit,
            value_per_item_after_tax: profit as f64 / quantity as f64,
            tax_percent,
            tax_paid,
            is_hq,
            category: category.to_string(),
            timestamp: now_ts(),
        }
    }
}

/// One peer-to-peer gil exchange. Net only; the individual give/take legs
/// are not observable.
#[derive(Debug, Clone)]
pub struct Trade {
    pub character_id: i64,
    pub character_name: String,
    pub trade_partner: String,
    pub net_received: i64,
    pub timestamp: i64,
}

/// Any persistable ledger row, as carried by the retry queue.
#[derive(Debug, Clone)]
pub enum LedgerRow {
    KnownWealth(KnownWealth),
    WealthChange(WealthChange),
    MarketTransaction(MarketTransaction),
    Trade(Trade),
}

impl LedgerRow {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KnownWealth(_) => "known_wealth",
            Self::WealthChange(_) => "wealth_change",
            Self::MarketTransaction(_) => "market_transaction",
            Self::Trade(_) => "trade",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Update,
}

pub struct Ledger {
    store: LedgerStore,
    retry: RetryQueue,
}

impl Ledger {
    pub fn new(store: LedgerStore, retry_ceiling: u32) -> Self {
        Self { store, retry: RetryQueue::new(retry_ceiling) }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn retry_len(&self) -> usize {
        self.retry.len()
    }

    /// Re-attempt queued writes once each. Called from the engine's
    /// rate-limited sweep.
    pub fn flush_retries(&mut self) {
        self.retry.flush(&mut self.store);
    }

    /// Upsert the balance snapshot for an entity and return the stored row.
    /// Returns the in-memory row even when the write failed, so trackers keep
    /// a consistent view of what they last observed.
    pub fn add_or_update_known_wealth(
        &mut self,
        character_name: &str,
        character_id: i64,
        wealth: i64,
        owner_id: i64,
        owner: Option<&str>,
    ) -> KnownWealth {
        let existing = match self.store.get_known_wealth(owner_id, character_id) {
            Ok(row) => row,
            Err(e) => {
                json_error("ledger", obj(&[("op", v_str("known_wealth_read")), ("error", v_str(&e.to_string()))]));
                None
            }
        };

        let row = KnownWealth {
            character_id,
            character_name: character_name.to_string(),
            owner_id,
            owner: owner.map(|s| s.to_string()),
            current_wealth: wealth,
            timestamp: now_ts(),
        };

        let result = if existing.is_some() {
            self.store.update_known_wealth(&row)
        } else {
            self.store.insert_known_wealth(&row)
        };

        match result {
            Ok(rows) if rows > 0 => {
                json_log(
                    "ledger",
                    obj(&[
                        ("op", v_str(if existing.is_some() { "known_wealth_updated" } else { "known_wealth_added" })),
                        ("character", v_str(character_name)),
                        ("wealth", v_i64(wealth)),
                        ("is_retainer", crate::logging::v_bool(owner_id != 0)),
                    ]),
                );
            }
            Ok(_) => {
                json_warn(
                    "ledger",
                    obj(&[("op", v_str("known_wealth_write")), ("character", v_str(character_name)), ("rows", v_i64(0))]),
                );
            }
            Err(e) => {
                // Known-wealth writes are not queued: a retried stale snapshot
                // could clobber a newer one. The next observation rewrites it.
                json_error(
                    "ledger",
                    obj(&[("op", v_str("known_wealth_write")), ("character", v_str(character_name)), ("error", v_str(&e.to_string()))]),
                );
            }
        }

        row
    }

    pub fn add_wealth_change(
        &mut self,
        character_name: &str,
        character_id: i64,
        wealth: i64,
        difference: i64,
        change_type: WealthChangeType,
    ) {
        let row = WealthChange {
            character_id,
            character_name: character_name.to_string(),
            owner_id: 0,
            owner: None,
            wealth,
            wealth_difference: difference,
            change_type,
            timestamp: now_ts(),
        };
        self.insert_with_retry(LedgerRow::WealthChange(row));
    }

    pub fn add_retainer_wealth_change(
        &mut self,
        retainer_name: &str,
        retainer_id: i64,
        owner: &str,
        owner_id: i64,
        wealth: i64,
        difference: i64,
        change_type: WealthChangeType,
    ) {
        let row = WealthChange {
            character_id: retainer_id,
            character_name: retainer_name.to_string(),
            owner_id,
            owner: Some(owner.to_string()),
            wealth,
            wealth_difference: difference,
            change_type,
            timestamp: now_ts(),
        };
        self.insert_with_retry(LedgerRow::WealthChange(row));
    }

    pub fn add_market_transaction(&mut self, tx: MarketTransaction) {
        self.insert_with_retry(LedgerRow::MarketTransaction(tx));
    }

    pub fn add_trade(&mut self, character_name: &str, character_id: i64, trade_partner: &str, net_received: i64) {
        let row = Trade {
            character_id,
            character_name: character_name.to_string(),
            trade_partner: trade_partner.to_string(),
            net_received,
            timestamp: now_ts(),
        };
        self.insert_with_retry(LedgerRow::Trade(row));
    }

    fn insert_with_retry(&mut self, row: LedgerRow) {
        match self.store.apply(&row, OpKind::Insert) {
            Ok(rows) if rows > 0 => {
                json_log("ledger", obj(&[("op", v_str("row_added")), ("row", v_str(row.kind()))]));
            }
            Ok(_) => {
                json_warn("ledger", obj(&[("op", v_str("row_insert")), ("row", v_str(row.kind())), ("rows", v_i64(0))]));
            }
            Err(e @ StorageError::Unavailable(_)) => {
                json_error(
                    "ledger",
                    obj(&[
                        ("op", v_str("row_insert")),
                        ("row", v_str(row.kind())),
                        ("error", v_str(&e.to_string())),
                        ("queued_for_retry", crate::logging::v_bool(true)),
                    ]),
                );
                self.retry.enqueue(row, OpKind::Insert);
            }
            Err(e) => {
                json_error(
                    "ledger",
                    obj(&[("op", v_str("row_insert")), ("row", v_str(row.kind())), ("error", v_str(&e.to_string()))]),
                );
            }
        }
    }
}
