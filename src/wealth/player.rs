//! Player-side wealth reconciliation.
//!
//! Holds the player's known-wealth snapshot, the current trade partner, and
//! the delayed retainer deposit/withdraw flags. Every classified line is
//! checked against the freshly polled balance; a matched pattern with no
//! actual balance change writes nothing.

use crate::game::GameClient;
use crate::ledger::{KnownWealth, Ledger, WealthChangeType};
use crate::logging::{json_error, json_log, json_warn, obj, v_i64, v_str};

use super::classifier::LineClass;

#[derive(Default)]
pub struct PlayerWealthTracker {
    current: Option<KnownWealth>,
    trade_partner: Option<String>,
    pending_deposit: bool,
    pending_withdraw: bool,
}

impl PlayerWealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn known_wealth(&self) -> Option<&KnownWealth> {
        self.current.as_ref()
    }

    pub fn trade_partner(&self) -> Option<&str> {
        self.trade_partner.as_deref()
    }

    /// Load the stored snapshot, or record the first-ever observation as an
    /// Init change with difference 0.
    pub fn on_login(&mut self, game: &dyn GameClient, ledger: &mut Ledger) {
        let Some(player) = game.player() else { return };

        match ledger.store().get_known_wealth(0, player.content_id) {
            Ok(Some(known)) => {
                json_log(
                    "player_wealth",
                    obj(&[("op", v_str("known_wealth_loaded")), ("character", v_str(&player.name))]),
                );
                self.current = Some(known);
            }
            Ok(None) => {
                let gil = game.current_gil();
                let row = ledger.add_or_update_known_wealth(&player.name, player.content_id, gil, 0, None);
                ledger.add_wealth_change(&player.name, player.content_id, gil, 0, WealthChangeType::Init);
                self.current = Some(row);
            }
            Err(e) => {
                json_error(
                    "player_wealth",
                    obj(&[("op", v_str("known_wealth_load")), ("error", v_str(&e.to_string()))]),
                );
            }
        }
    }

    pub fn on_logout(&mut self) {
        self.current = None;
        self.trade_partner = None;
        self.pending_deposit = false;
        self.pending_withdraw = false;
    }

    /// Route one classified chat line. `None` still triggers the trailing
    /// catch-all: an unexplained balance move is recorded as Unknown.
    pub fn on_line(&mut self, class: Option<&LineClass>, game: &dyn GameClient, ledger: &mut Ledger) {
        match class {
            Some(LineClass::TradePartner(name)) => {
                self.trade_partner = Some(name.clone());
            }
            Some(LineClass::Balance(change_type)) => {
                self.update_gil(*change_type, game, ledger);
            }
            Some(LineClass::RetainerDepositPending) => {
                self.pending_deposit = true;
            }
            Some(LineClass::RetainerWithdrawPending) => {
                self.pending_withdraw = true;
            }
            // Travel and sale lines belong to other trackers.
            Some(LineClass::Travel(_)) | Some(LineClass::Sale(_)) => {}
            None => {
                if let Some(known) = &self.current {
                    if game.current_gil() != known.current_wealth {
                        self.update_gil(WealthChangeType::Unknown, game, ledger);
                    }
                }
            }
        }
    }

    /// Sweep for the delayed retainer operations: the balance only becomes
    /// observable a poll or two after the confirmation text.
    pub fn check_delayed(&mut self, game: &dyn GameClient, ledger: &mut Ledger) {
        let Some(known) = &self.current else { return };
        if !(self.pending_deposit || self.pending_withdraw) {
            return;
        }
        if game.current_gil() == known.current_wealth {
            return;
        }

        let change_type = if self.pending_deposit {
            WealthChangeType::RetainerDeposit
        } else {
            WealthChangeType::RetainerWithdraw
        };
        self.update_gil(change_type, game, ledger);
        self.pending_deposit = false;
        self.pending_withdraw = false;
    }

    /// Reconcile the polled balance against known wealth under a cause.
    /// No difference, no write.
    pub fn update_gil(&mut self, change_type: WealthChangeType, game: &dyn GameClient, ledger: &mut Ledger) {
        let Some(known) = self.current.clone() else {
            json_error(
                "player_wealth",
                obj(&[("op", v_str("update")), ("error", v_str("no known wealth loaded"))]),
            );
            return;
        };

        let new_gil = game.current_gil();
        let difference = new_gil - known.current_wealth;
        if difference != 0 {
            let row = ledger.add_or_update_known_wealth(&known.character_name, known.character_id, new_gil, 0, None);
            ledger.add_wealth_change(&known.character_name, known.character_id, new_gil, difference, change_type);
            self.current = Some(row);
        }

        if change_type == WealthChangeType::Trade && difference != 0 {
            match self.trade_partner.as_deref() {
                Some(partner) => {
                    ledger.add_trade(&known.character_name, known.character_id, partner, difference);
                }
                None => {
                    json_warn(
                        "player_wealth",
                        obj(&[
                            ("op", v_str("trade")),
                            ("warning", v_str("no trade partner tracked")),
                            ("difference", v_i64(difference)),
                        ]),
                    );
                    ledger.add_trade(&known.character_name, known.character_id, "", difference);
                }
            }
        }
    }
}
