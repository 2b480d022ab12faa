//! Durable store over sqlite. Typed create/read/update for the four ledger
//! tables plus the reporting reads used by downstream consumers.
//!
//! Insert/update return a row count; zero rows is a soft failure the caller
//! decides about. Reads never fail on "not found".

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use super::{KnownWealth, LedgerRow, MarketTransaction, OpKind, Trade, WealthChange, WealthChangeType};

#[derive(Debug, Error)]
pub enum StorageError {
    /// Transient: the write may succeed later. Routed to the retry queue.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// The row or query itself is wrong. Never retried.
    #[error("malformed storage operation: {0}")]
    Malformed(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &e {
            rusqlite::Error::SqliteFailure(err, _) => match err.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::CannotOpen => StorageError::Unavailable(e.to_string()),
                _ => StorageError::Malformed(e.to_string()),
            },
            _ => StorageError::Malformed(e.to_string()),
        }
    }
}

/// Seam between the retry queue and whatever persists rows. The store is the
/// production implementation; tests script failures through a stub.
pub trait LedgerWriter {
    fn apply(&mut self, row: &LedgerRow, op: OpKind) -> Result<usize, StorageError>;
}

pub struct LedgerStore {
    conn: Connection,
}

impl LedgerStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.init()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS known_wealth (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                character_id INTEGER NOT NULL,
                character_name TEXT NOT NULL,
                owner_id INTEGER NOT NULL DEFAULT 0,
                owner TEXT,
                current_wealth INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_known_wealth_key ON known_wealth (owner_id, character_id);
            CREATE TABLE IF NOT EXISTS wealth_change (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                character_id INTEGER NOT NULL,
                character_name TEXT NOT NULL,
                owner_id INTEGER NOT NULL DEFAULT 0,
                owner TEXT,
                wealth INTEGER NOT NULL,
                wealth_difference INTEGER NOT NULL,
                change_type INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_wealth_change_char ON wealth_change (character_id);
            CREATE TABLE IF NOT EXISTS market_transaction (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                character_id INTEGER NOT NULL,
                character_name TEXT NOT NULL,
                retainer TEXT,
                retainer_id INTEGER NOT NULL DEFAULT 0,
                location TEXT NOT NULL,
                is_sale INTEGER NOT NULL,
                item_id INTEGER NOT NULL,
                item_name TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                value_per_item REAL NOT NULL,
                total_value INTEGER NOT NULL,
                total_value_after_tax INTEGER NOT NULL,
                value_per_item_after_tax REAL NOT NULL,
                tax_percent REAL NOT NULL,
                tax_paid INTEGER NOT NULL,
                is_hq INTEGER NOT NULL,
                category TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_market_transaction_item ON market_transaction (item_id);
            CREATE TABLE IF NOT EXISTS trade (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                character_id INTEGER NOT NULL,
                character_name TEXT NOT NULL,
                trade_partner TEXT NOT NULL,
                net_received INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn insert_known_wealth(&mut self, row: &KnownWealth) -> Result<usize, StorageError> {
        let rows = self.conn.execute(
            "INSERT INTO known_wealth (character_id, character_name, owner_id, owner, current_wealth, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![row.character_id, row.character_name, row.owner_id, row.owner, row.current_wealth, row.timestamp],
        )?;
        Ok(rows)
    }

    /// Keyed by (owner_id, character_id); mutates the snapshot in place.
    pub fn update_known_wealth(&mut self, row: &KnownWealth) -> Result<usize, StorageError> {
        let rows = self.conn.execute(
            "UPDATE known_wealth SET character_name = ?1, owner = ?2, current_wealth = ?3, timestamp = ?4
             WHERE owner_id = ?5 AND character_id = ?6",
            params![row.character_name, row.owner, row.current_wealth, row.timestamp, row.owner_id, row.character_id],
        )?;
        Ok(rows)
    }

    pub fn get_known_wealth(&self, owner_id: i64, character_id: i64) -> Result<Option<KnownWealth>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT character_id, character_name, owner_id, owner, current_wealth, timestamp
                 FROM known_wealth WHERE owner_id = ?1 AND character_id = ?2",
                params![owner_id, character_id],
                Self::map_known_wealth,
            )
            .optional()?;
        Ok(row)
    }

    pub fn retainer_known_wealth(&self, owner_id: i64) -> Result<Vec<KnownWealth>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT character_id, character_name, owner_id, owner, current_wealth, timestamp
             FROM known_wealth WHERE owner_id = ?1 ORDER BY character_name",
        )?;
        let rows = stmt
            .query_map(params![owner_id], Self::map_known_wealth)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_wealth_change(&mut self, row: &WealthChange) -> Result<usize, StorageError> {
        let rows = self.conn.execute(
            "INSERT INTO wealth_change
             (character_id, character_name, owner_id, owner, wealth, wealth_difference, change_type, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.character_id,
                row.character_name,
                row.owner_id,
                row.owner,
                row.wealth,
                row.wealth_difference,
                row.change_type.as_i64(),
                row.timestamp
            ],
        )?;
        Ok(rows)
    }

    pub fn insert_transaction(&mut self, tx: &MarketTransaction) -> Result<usize, StorageError> {
        let rows = self.conn.execute(
            "INSERT INTO market_transaction
             (character_id, character_name, retainer, retainer_id, location, is_sale, item_id, item_name,
              quantity, value_per_item, total_value, total_value_after_tax, value_per_item_after_tax,
              tax_percent, tax_paid, is_hq, category, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                tx.character_id,
                tx.character_name,
                tx.retainer,
                tx.retainer_id,
                tx.location,
                tx.is_sale,
                tx.item_id,
                tx.item_name,
                tx.quantity,
                tx.value_per_item,
                tx.total_value,
                tx.total_value_after_tax,
                tx.value_per_item_after_tax,
                tx.tax_percent as f64,
                tx.tax_paid,
                tx.is_hq,
                tx.category,
                tx.timestamp
            ],
        )?;
        Ok(rows)
    }

    pub fn insert_trade(&mut self, trade: &Trade) -> Result<usize, StorageError> {
        let rows = self.conn.execute(
            "INSERT INTO trade (character_id, character_name, trade_partner, net_received, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![trade.character_id, trade.character_name, trade.trade_partner, trade.net_received, trade.timestamp],
        )?;
        Ok(rows)
    }

    /// Most recent first.
    pub fn recent_wealth_changes(&self, character_id: i64, limit: u32) -> Result<Vec<WealthChange>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT character_id, character_name, owner_id, owner, wealth, wealth_difference, change_type, timestamp
             FROM wealth_change WHERE character_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![character_id, limit], Self::map_wealth_change)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn transactions(&self, is_sale: Option<bool>) -> Result<Vec<MarketTransaction>, StorageError> {
        let sql = "SELECT character_id, character_name, retainer, retainer_id, location, is_sale, item_id,
                          item_name, quantity, value_per_item, total_value, total_value_after_tax,
                          value_per_item_after_tax, tax_percent, tax_paid, is_hq, category, timestamp
                   FROM market_transaction WHERE (?1 IS NULL OR is_sale = ?1) ORDER BY id DESC";
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![is_sale], Self::map_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn trades_for(&self, character_id: i64) -> Result<Vec<Trade>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT character_id, character_name, trade_partner, net_received, timestamp
             FROM trade WHERE character_id = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map(params![character_id], |r| {
                Ok(Trade {
                    character_id: r.get(0)?,
                    character_name: r.get(1)?,
                    trade_partner: r.get(2)?,
                    net_received: r.get(3)?,
                    timestamp: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Sum of all recorded deltas for one entity, for consistency checks and
    /// reporting aggregates.
    pub fn wealth_difference_sum(&self, character_id: i64) -> Result<i64, StorageError> {
        let sum: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(wealth_difference), 0) FROM wealth_change WHERE character_id = ?1",
            params![character_id],
            |r| r.get(0),
        )?;
        Ok(sum)
    }

    pub fn total_tax_paid(&self, character_id: i64) -> Result<i64, StorageError> {
        let sum: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(tax_paid), 0) FROM market_transaction WHERE character_id = ?1",
            params![character_id],
            |r| r.get(0),
        )?;
        Ok(sum)
    }

    fn map_known_wealth(r: &rusqlite::Row<'_>) -> rusqlite::Result<KnownWealth> {
        Ok(KnownWealth {
            character_id: r.get(0)?,
            character_name: r.get(1)?,
            owner_id: r.get(2)?,
            owner: r.get(3)?,
            current_wealth: r.get(4)?,
            timestamp: r.get(5)?,
        })
    }

    fn map_wealth_change(r: &rusqlite::Row<'_>) -> rusqlite::Result<WealthChange> {
        let raw: i64 = r.get(6)?;
        Ok(WealthChange {
            character_id: r.get(0)?,
            character_name: r.get(1)?,
            owner_id: r.get(2)?,
            owner: r.get(3)?,
            wealth: r.get(4)?,
            wealth_difference: r.get(5)?,
            change_type: WealthChangeType::from_i64(raw).unwrap_or(WealthChangeType::Unknown),
            timestamp: r.get(7)?,
        })
    }

    fn map_transaction(r: &rusqlite::Row<'_>) -> rusqlite::Result<MarketTransaction> {
        Ok(MarketTransaction {
            character_id: r.get(0)?,
            character_name: r.get(1)?,
            retainer: r.get(2)?,
            retainer_id: r.get(3)?,
            location: r.get(4)?,
            is_sale: r.get(5)?,
            item_id: r.get(6)?,
            item_name: r.get(7)?,
            quantity: r.get(8)?,
            value_per_item: r.get(9)?,
            total_value: r.get(10)?,
            total_value_after_tax: r.get(11)?,
            value_per_item_after_tax: r.get(12)?,
            tax_percent: r.get::<_, f64>(13)? as f32,
            tax_paid: r.get(14)?,
            is_hq: r.get(15)?,
            category: r.get(16)?,
            timestamp: r.get(17)?,
        })
    }
}

impl LedgerWriter for LedgerStore {
    fn apply(&mut self, row: &LedgerRow, op: OpKind) -> Result<usize, StorageError> {
        match (row, op) {
            (LedgerRow::KnownWealth(kw), OpKind::Insert) => self.insert_known_wealth(kw),
            (LedgerRow::KnownWealth(kw), OpKind::Update) => self.update_known_wealth(kw),
            (LedgerRow::WealthChange(wc), OpKind::Insert) => self.insert_wealth_change(wc),
            (LedgerRow::MarketTransaction(tx), OpKind::Insert) => self.insert_transaction(tx),
            (LedgerRow::Trade(t), OpKind::Insert) => self.insert_trade(t),
            // The history tables are append-only.
            (_, OpKind::Update) => Err(StorageError::Malformed(format!("{} rows are append-only", row.kind()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::now_ts;

    fn kw(character_id: i64, wealth: i64) -> KnownWealth {
        KnownWealth {
            character_id,
            character_name: "Aeryn Vale".to_string(),
            owner_id: 0,
            owner: None,
            current_wealth: wealth,
            timestamp: now_ts(),
        }
    }

    #[test]
    fn known_wealth_upsert_round_trip() {
        let mut store = LedgerStore::open_in_memory().unwrap();
        assert_eq!(store.insert_known_wealth(&kw(7, 1000)).unwrap(), 1);

        let loaded = store.get_known_wealth(0, 7).unwrap().unwrap();
        assert_eq!(loaded.current_wealth, 1000);

        assert_eq!(store.update_known_wealth(&kw(7, 500)).unwrap(), 1);
        let loaded = store.get_known_wealth(0, 7).unwrap().unwrap();
        assert_eq!(loaded.current_wealth, 500);

        // Not found reads are None, never an error.
        assert!(store.get_known_wealth(0, 99).unwrap().is_none());
    }

    #[test]
    fn reopened_store_sees_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.sqlite");
        let path = path.to_str().unwrap();
        {
            let mut store = LedgerStore::open(path).unwrap();
            store.insert_known_wealth(&kw(7, 1000)).unwrap();
        }
        let store = LedgerStore::open(path).unwrap();
        assert_eq!(store.get_known_wealth(0, 7).unwrap().unwrap().current_wealth, 1000);
    }

    #[test]
    fn update_of_missing_row_reports_zero_rows() {
        let mut store = LedgerStore::open_in_memory().unwrap();
        assert_eq!(store.update_known_wealth(&kw(42, 10)).unwrap(), 0);
    }

    #[test]
    fn wealth_changes_sum_to_current_balance() {
        let mut store = LedgerStore::open_in_memory().unwrap();
        let initial = 1000i64;
        let deltas = [0i64, -500, 2000, -250];
        let mut balance = initial;
        for (i, d) in deltas.iter().enumerate() {
            balance += d;
            let row = WealthChange {
                character_id: 7,
                character_name: "Aeryn Vale".to_string(),
                owner_id: 0,
                owner: None,
                wealth: balance,
                wealth_difference: *d,
                change_type: if i == 0 { WealthChangeType::Init } else { WealthChangeType::Unknown },
                timestamp: now_ts(),
            };
            assert_eq!(store.insert_wealth_change(&row).unwrap(), 1);
        }

        assert_eq!(initial + store.wealth_difference_sum(7).unwrap(), balance);
        let recent = store.recent_wealth_changes(7, 10).unwrap();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].wealth, balance);
    }

    #[test]
    fn append_only_tables_reject_updates() {
        let mut store = LedgerStore::open_in_memory().unwrap();
        let trade = Trade {
            character_id: 7,
            character_name: "Aeryn Vale".to_string(),
            trade_partner: "Mira Sunstone".to_string(),
            net_received: 12_000,
            timestamp: now_ts(),
        };
        assert_eq!(store.insert_trade(&trade).unwrap(), 1);
        let err = store.apply(&LedgerRow::Trade(trade), OpKind::Update).unwrap_err();
        assert!(matches!(err, StorageError::Malformed(_)));
    }

    #[test]
    fn transaction_filter_by_sale_flag() {
        let mut store = LedgerStore::open_in_memory().unwrap();
        for is_sale in [false, true, true] {
            let tx = MarketTransaction {
                character_id: 7,
                character_name: "Aeryn Vale".to_string(),
                retainer: None,
                retainer_id: 0,
                location: "Limsa Lominsa".to_string(),
                is_sale,
                item_id: 4551,
                item_name: "Potion".to_string(),
                quantity: 1,
                value_per_item: 100.0,
                total_value: 100,
                total_value_after_tax: 105,
                value_per_item_after_tax: 105.0,
                tax_percent: 5.0,
                tax_paid: 5,
                is_hq: false,
                category: "Medicine".to_string(),
                timestamp: now_ts(),
            };
            store.insert_transaction(&tx).unwrap();
        }
        assert_eq!(store.transactions(None).unwrap().len(), 3);
        assert_eq!(store.transactions(Some(true)).unwrap().len(), 2);
        assert_eq!(store.transactions(Some(false)).unwrap().len(), 1);
        assert_eq!(store.total_tax_paid(7).unwrap(), 15);
    }
}
