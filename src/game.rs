//! The boundary to the live game client: event payloads delivered by the
//! host, plus a trait over the synchronously readable client state.

use serde::{Deserialize, Serialize};

use crate::market::listing_cache::Listing;

// Chat channels the trackers listen on. Everything else is ignored.
pub const CHANNEL_ECHO: u16 = 56;
pub const CHANNEL_SYSTEM: u16 = 57;
pub const CHANNEL_RETAINER_SALE: u16 = 71;
pub const CHANNEL_NOTICE: u16 = 2105;
pub const CHANNEL_TRADE_REQUEST: u16 = 569;

/// Inline item reference attached to a chat line (sale confirmations).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ItemRef {
    pub item_id: u32,
    pub is_hq: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLine {
    pub channel: u16,
    #[serde(default)]
    pub sender: String,
    pub text: String,
    /// Item payload, present on sale confirmation lines.
    #[serde(default)]
    pub item: Option<ItemRef>,
    /// Player payload, present on trade request lines.
    #[serde(default)]
    pub player: Option<String>,
}

impl ChatLine {
    /// Senderless system-originated lines on a tracked channel are the only
    /// ones the classifier looks at.
    pub fn is_system(&self) -> bool {
        matches!(
            self.channel,
            CHANNEL_ECHO | CHANNEL_SYSTEM | CHANNEL_RETAINER_SALE | CHANNEL_NOTICE | CHANNEL_TRADE_REQUEST
        ) && self.sender.is_empty()
            && !self.text.is_empty()
    }
}

/// Outbound marketboard purchase request, decoded to correlation fields only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub listing_id: u64,
    pub catalog_id: u32,
    pub quantity: u32,
}

/// Decoded network packets, already resolved against the opcode table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "opcode", rename_all = "snake_case")]
pub enum Packet {
    PurchaseRequest(PurchaseRequest),
    PurchaseResult { catalog_id: u32, quantity: u32 },
    MarketOfferings { listings: Vec<Listing> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEvent {
    Login,
    Logout,
    Chat(ChatLine),
    Packet(Packet),
}

#[derive(Debug, Clone)]
pub struct PlayerInfo {
    pub name: String,
    pub content_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetainerSnapshot {
    pub retainer_id: i64,
    pub name: String,
    pub gil: i64,
}

/// Synchronously readable live client state. The engine polls this on every
/// event and sweep; it never blocks.
pub trait GameClient {
    fn is_logged_in(&self) -> bool;
    fn player(&self) -> Option<PlayerInfo>;
    fn current_gil(&self) -> i64;
    fn retainers(&self) -> Vec<RetainerSnapshot>;
    fn current_zone(&self) -> u32;
    fn current_world(&self) -> Option<String>;
}
