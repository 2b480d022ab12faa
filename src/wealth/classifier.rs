//! Maps system chat lines to typed wealth-change causes.
//!
//! Stateless, first match wins. Matching says nothing about whether the
//! balance actually moved; the trackers compare against known wealth before
//! writing anything. The two retainer confirmations only raise pending flags
//! because the balance lags the text by a tick or two.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::game::ChatLine;
use crate::ledger::WealthChangeType;

// Gil amounts in chat never render a bare 0, and group thousands with commas.
const GIL: &str = r"(?:[1-9]\d{0,2}(?:,\d{3})+|[1-9]\d*)";

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new(&$re.replace("<GIL>", GIL)).unwrap());
    };
}

pattern!(TRADE_RECEIVED, r"(.+?) wishes to trade with you\.");
pattern!(TRADE_SENT, r"trade request sent to (.+?)\.");
pattern!(TRADE_COMPLETE, r"trade complete\.");
pattern!(TELEPORT, r"you spent <GIL> gil\.");
pattern!(MARKET_BUY_COUNTED, r"you purchase (\d+) .+\.");
pattern!(NPC_BUY, r"you purchase .+? for <GIL> gil\.");
pattern!(NPC_SELL, r"you sell .+? for <GIL> gil\.");
pattern!(NPC_BUYBACK, r"you buy back .+? for <GIL> gil\.");
pattern!(MAIL_SEND, r"you attach <GIL> gil to the letter\.");
pattern!(MAIL_RECEIVED, r"<GIL> gil taken from message\.");
pattern!(MARKET_BUY_SINGLE, r"you purchase a .+\.");
pattern!(FC_DEPOSIT, r"<GIL> gil is placed into the company chest\.");
pattern!(FC_WITHDRAW, r"<GIL> gil is removed from the company chest\.");
pattern!(RETAINER_DEPOSITED, r"your gil has been safely deposited\.");
pattern!(RETAINER_WITHDRAWN, r"your gil has been safely withdrawn\.");
pattern!(TRAVEL, r"you successfully travel to (.+?)\.");
pattern!(
    SALE_PLURAL,
    r"the (\d+) (.+?) you put up for sale in the (.+?) markets have sold for (<GIL>) gil \(after fees\)\."
);
pattern!(
    SALE_SINGULAR,
    r"the (.+?) you put up for sale in the (.+?) markets has sold for (<GIL>) gil \(after fees\)\."
);

/// A parsed retainer sale confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleLine {
    pub quantity: i64,
    pub city: String,
    pub profit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// A trade request in either direction names the counterparty.
    TradePartner(String),
    /// A cause that reconciles immediately against the polled balance.
    Balance(WealthChangeType),
    /// Retainer deposit confirmed; balance change lands on a later poll.
    RetainerDepositPending,
    /// Retainer withdrawal confirmed; balance change lands on a later poll.
    RetainerWithdrawPending,
    /// Arrived in a new world; tax rates need a refresh.
    Travel(String),
    Sale(SaleLine),
}

fn parse_gil(raw: &str) -> i64 {
    raw.replace(',', "").parse().unwrap_or(0)
}

/// Classify one chat line. `None` means no pattern applied (the caller may
/// still detect an unclassified balance change).
pub fn classify(line: &ChatLine) -> Option<LineClass> {
    if !line.is_system() {
        return None;
    }
    let input = line.text.to_lowercase();

    if let Some(caps) = TRADE_RECEIVED.captures(&input) {
        let name = line.player.clone().unwrap_or_else(|| caps[1].to_string());
        return Some(LineClass::TradePartner(name));
    }
    if let Some(caps) = TRADE_SENT.captures(&input) {
        let name = line.player.clone().unwrap_or_else(|| caps[1].to_string());
        return Some(LineClass::TradePartner(name));
    }
    if TRADE_COMPLETE.is_match(&input) {
        return Some(LineClass::Balance(WealthChangeType::Trade));
    }
    if TELEPORT.is_match(&input) {
        return Some(LineClass::Balance(WealthChangeType::Teleport));
    }
    if MARKET_BUY_COUNTED.is_match(&input) {
        return Some(LineClass::Balance(WealthChangeType::Marketboard));
    }
    if NPC_BUY.is_match(&input) {
        return Some(LineClass::Balance(WealthChangeType::NPCShop));
    }
    if NPC_SELL.is_match(&input) {
        return Some(LineClass::Balance(WealthChangeType::NPCShop));
    }
    if NPC_BUYBACK.is_match(&input) {
        return Some(LineClass::Balance(WealthChangeType::NPCShop));
    }
    if MAIL_SEND.is_match(&input) {
        return Some(LineClass::Balance(WealthChangeType::MailSend));
    }
    if MAIL_RECEIVED.is_match(&input) {
        return Some(LineClass::Balance(WealthChangeType::MailReceived));
    }
    if MARKET_BUY_SINGLE.is_match(&input) {
        return Some(LineClass::Balance(WealthChangeType::Marketboard));
    }
    if FC_DEPOSIT.is_match(&input) {
        return Some(LineClass::Balance(WealthChangeType::FCDeposit));
    }
    if FC_WITHDRAW.is_match(&input) {
        return Some(LineClass::Balance(WealthChangeType::FCWithdraw));
    }
    if RETAINER_DEPOSITED.is_match(&input) {
        return Some(LineClass::RetainerDepositPending);
    }
    if RETAINER_WITHDRAWN.is_match(&input) {
        return Some(LineClass::RetainerWithdrawPending);
    }
    if let Some(caps) = TRAVEL.captures(&input) {
        return Some(LineClass::Travel(caps[1].to_string()));
    }
    if let Some(caps) = SALE_PLURAL.captures(&input) {
        return Some(LineClass::Sale(SaleLine {
            quantity: caps[1].parse().unwrap_or(0),
            city: caps[3].to_string(),
            profit: parse_gil(&caps[4]),
        }));
    }
    if let Some(caps) = SALE_SINGULAR.captures(&input) {
        return Some(LineClass::Sale(SaleLine {
            quantity: 1,
            city: caps[2].to_string(),
            profit: parse_gil(&caps[3]),
        }));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{CHANNEL_SYSTEM, CHANNEL_TRADE_REQUEST};

    fn system_line(text: &str) -> ChatLine {
        ChatLine {
            channel: CHANNEL_SYSTEM,
            sender: String::new(),
            text: text.to_string(),
            item: None,
            player: None,
        }
    }

    #[test]
    fn balance_causes() {
        let cases = [
            ("Trade complete.", WealthChangeType::Trade),
            ("You spent 1,200 gil.", WealthChangeType::Teleport),
            ("You purchase 5 Potion for 500 gil.", WealthChangeType::Marketboard),
            ("You purchase a weathered shortbow for 200 gil.", WealthChangeType::NPCShop),
            ("You sell 2 wind shards for 14 gil.", WealthChangeType::NPCShop),
            ("You buy back a bronze ingot for 12 gil.", WealthChangeType::NPCShop),
            ("You attach 10,000 gil to the letter.", WealthChangeType::MailSend),
            ("3,000 gil taken from message.", WealthChangeType::MailReceived),
            ("You purchase a Mega-Potion.", WealthChangeType::Marketboard),
            ("50,000 gil is placed into the company chest.", WealthChangeType::FCDeposit),
            ("25,000 gil is removed from the company chest.", WealthChangeType::FCWithdraw),
        ];
        for (text, expected) in cases {
            assert_eq!(
                classify(&system_line(text)),
                Some(LineClass::Balance(expected)),
                "line: {text}"
            );
        }
    }

    #[test]
    fn zero_gil_amounts_do_not_match() {
        assert_eq!(classify(&system_line("You spent 0 gil.")), None);
    }

    #[test]
    fn retainer_confirmations_raise_pending_flags() {
        assert_eq!(
            classify(&system_line("Your gil has been safely deposited.")),
            Some(LineClass::RetainerDepositPending)
        );
        assert_eq!(
            classify(&system_line("Your gil has been safely withdrawn.")),
            Some(LineClass::RetainerWithdrawPending)
        );
    }

    #[test]
    fn trade_partner_from_payload_wins_over_capture() {
        let mut line = ChatLine {
            channel: CHANNEL_TRADE_REQUEST,
            sender: String::new(),
            text: "Mira Sunstone wishes to trade with you.".to_string(),
            item: None,
            player: Some("Mira Sunstone".to_string()),
        };
        assert_eq!(classify(&line), Some(LineClass::TradePartner("Mira Sunstone".to_string())));

        line.player = None;
        assert_eq!(classify(&line), Some(LineClass::TradePartner("mira sunstone".to_string())));

        let sent = system_line("Trade request sent to Mira Sunstone.");
        assert_eq!(classify(&sent), Some(LineClass::TradePartner("mira sunstone".to_string())));
    }

    #[test]
    fn travel_names_the_world() {
        assert_eq!(
            classify(&system_line("You successfully travel to Phoenix.")),
            Some(LineClass::Travel("phoenix".to_string()))
        );
    }

    #[test]
    fn sale_lines_parse_quantity_city_and_profit() {
        assert_eq!(
            classify(&system_line(
                "The 12 iron ingots you put up for sale in the Ul'dah markets have sold for 5,400 gil (after fees)."
            )),
            Some(LineClass::Sale(SaleLine { quantity: 12, city: "ul'dah".to_string(), profit: 5400 }))
        );
        assert_eq!(
            classify(&system_line(
                "The grade 4 tincture you put up for sale in the Limsa Lominsa markets has sold for 950 gil (after fees)."
            )),
            Some(LineClass::Sale(SaleLine { quantity: 1, city: "limsa lominsa".to_string(), profit: 950 }))
        );
    }

    #[test]
    fn non_system_lines_are_ignored() {
        let mut line = system_line("Trade complete.");
        line.sender = "Somebody".to_string();
        assert_eq!(classify(&line), None);

        let mut line = system_line("Trade complete.");
        line.channel = 10;
        assert_eq!(classify(&line), None);
    }

    #[test]
    fn unrecognized_line_is_none() {
        assert_eq!(classify(&system_line("You gain 215 experience points.")), None);
    }
}
