mod catalog;
mod engine;
mod game;
mod ledger;
mod logging;
mod market;
mod state;
mod wealth;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use catalog::StaticCatalog;
use engine::Engine;
use game::{GameClient, GameEvent, PlayerInfo, RetainerSnapshot};
use ledger::store::LedgerStore;
use logging::{json_log, json_warn, obj, v_i64, v_num, v_str};
use state::{now_ts, Config};

/// Replayable mutation of the client-state snapshot. Absent fields leave the
/// current value untouched.
#[derive(Debug, Default, Deserialize)]
struct StateUpdate {
    logged_in: Option<bool>,
    player_name: Option<String>,
    content_id: Option<i64>,
    gil: Option<i64>,
    retainers: Option<Vec<RetainerSnapshot>>,
    zone: Option<u32>,
    world: Option<String>,
}

/// One line of a capture: an optional state update, an optional event, and
/// an optional unix timestamp (wall clock otherwise).
#[derive(Debug, Deserialize)]
struct ReplayRecord {
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    state: Option<StateUpdate>,
    #[serde(default)]
    event: Option<GameEvent>,
}

/// Client-state snapshot reconstructed from a capture, standing in for the
/// live game client.
#[derive(Default)]
struct ReplayClient {
    logged_in: bool,
    player_name: String,
    content_id: i64,
    gil: i64,
    retainers: Vec<RetainerSnapshot>,
    zone: u32,
    world: Option<String>,
}

impl ReplayClient {
    fn apply(&mut self, update: StateUpdate) {
        if let Some(v) = update.logged_in {
            self.logged_in = v;
        }
        if let Some(v) = update.player_name {
            self.player_name = v;
        }
        if let Some(v) = update.content_id {
            self.content_id = v;
        }
        if let Some(v) = update.gil {
            self.gil = v;
        }
        if let Some(v) = update.retainers {
            self.retainers = v;
        }
        if let Some(v) = update.zone {
            self.zone = v;
        }
        if let Some(v) = update.world {
            self.world = Some(v);
        }
    }
}

impl GameClient for ReplayClient {
    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn player(&self) -> Option<PlayerInfo> {
        if !self.logged_in || self.player_name.is_empty() {
            return None;
        }
        Some(PlayerInfo { name: self.player_name.clone(), content_id: self.content_id })
    }

    fn current_gil(&self) -> i64 {
        self.gil
    }

    fn retainers(&self) -> Vec<RetainerSnapshot> {
        self.retainers.clone()
    }

    fn current_zone(&self) -> u32 {
        self.zone
    }

    fn current_world(&self) -> Option<String> {
        self.world.clone()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    let catalog = match &cfg.catalog_path {
        Some(path) => StaticCatalog::from_path(Path::new(path))?,
        None => {
            json_warn("main", obj(&[("warning", v_str("no catalog configured, item lookups will miss"))]));
            StaticCatalog::empty()
        }
    };

    let store = LedgerStore::open(&cfg.sqlite_path)
        .with_context(|| format!("opening ledger at {}", cfg.sqlite_path))?;
    let mut engine = Engine::new(cfg, catalog, store);

    let reader: Box<dyn BufRead> = match std::env::args().nth(1) {
        Some(path) => {
            let file = File::open(&path).with_context(|| format!("opening capture {path}"))?;
            json_log("main", obj(&[("op", v_str("replay_start")), ("capture", v_str(&path))]));
            Box::new(BufReader::new(file))
        }
        None => {
            json_log("main", obj(&[("op", v_str("replay_start")), ("capture", v_str("stdin"))]));
            Box::new(BufReader::new(io::stdin()))
        }
    };

    let mut client = ReplayClient::default();
    let mut lines_seen: u64 = 0;
    let mut lines_bad: u64 = 0;

    for line in reader.lines() {
        let line = line.context("reading capture line")?;
        if line.trim().is_empty() {
            continue;
        }
        lines_seen += 1;

        let record: ReplayRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                lines_bad += 1;
                json_warn(
                    "main",
                    obj(&[
                        ("warning", v_str("unparseable capture line")),
                        ("line", v_num(lines_seen as f64)),
                        ("error", v_str(&e.to_string())),
                    ]),
                );
                continue;
            }
        };

        let now = record.ts.unwrap_or_else(now_ts);
        if let Some(update) = record.state {
            client.apply(update);
        }
        if let Some(event) = record.event {
            engine.handle_event(event, &client, now);
        }
        if let Some(world) = engine.take_pending_tax_world() {
            engine.taxes_mut().refresh(&world).await;
        }
        engine.tick(&client, now);
    }

    json_log(
        "main",
        obj(&[
            ("op", v_str("replay_done")),
            ("lines", v_num(lines_seen as f64)),
            ("unparseable", v_num(lines_bad as f64)),
            ("retry_backlog", v_i64(engine.ledger().retry_len() as i64)),
        ]),
    );
    Ok(())
}
