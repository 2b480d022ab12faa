//! City tax rates, refreshed from the external rate service per world.
//!
//! A failed or empty refresh leaves the previous rates in place; an unknown
//! city reads as 0. Nothing here may block or fail a ledger write.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use reqwest::Client;

use crate::logging::{json_error, json_log, obj, v_num, v_str};

/// Flat marketboard purchase tax applied by the game.
pub const MARKETBOARD_BUY_TAX_PERCENT: f32 = 5.0;

pub struct TaxRates {
    client: Client,
    base: String,
    rates: HashMap<String, f32>,
    current_world: Option<String>,
}

impl TaxRates {
    pub fn new(base: &str) -> Self {
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
            rates: HashMap::new(),
            current_world: None,
        }
    }

    pub fn current_world(&self) -> Option<&str> {
        self.current_world.as_deref()
    }

    /// Percent for a city, 0 when unknown.
    pub fn rate(&self, city: &str) -> f32 {
        self.rates.get(&city.to_lowercase()).copied().unwrap_or(0.0)
    }

    pub fn clear(&mut self) {
        self.rates.clear();
        self.current_world = None;
    }

    /// Refresh all city rates for a world. On any failure the last-known
    /// rates stay in place.
    pub async fn refresh(&mut self, world: &str) {
        if world.is_empty() {
            json_error("tax", obj(&[("op", v_str("refresh")), ("error", v_str("empty world name"))]));
            return;
        }
        match self.fetch(world).await {
            Ok(rates) => {
                json_log(
                    "tax",
                    obj(&[
                        ("op", v_str("rates_refreshed")),
                        ("world", v_str(world)),
                        ("cities", v_num(rates.len() as f64)),
                    ]),
                );
                self.rates = rates;
                self.current_world = Some(world.to_string());
            }
            Err(e) => {
                json_error(
                    "tax",
                    obj(&[("op", v_str("refresh")), ("world", v_str(world)), ("error", v_str(&e.to_string()))]),
                );
            }
        }
    }

    async fn fetch(&self, world: &str) -> Result<HashMap<String, f32>> {
        let url = format!("{}/api/v2/tax-rates?world={}", self.base, world);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("tax-rates failed: {} {}", status, body));
        }

        let json: serde_json::Value = resp.json().await?;
        let obj = json.as_object().ok_or_else(|| anyhow!("tax-rates body is not an object"))?;
        if obj.get("status").and_then(|v| v.as_i64()) == Some(404) {
            return Err(anyhow!("world not found: {}", world));
        }

        let mut rates = HashMap::new();
        for (city, value) in obj {
            if let Some(pct) = value.as_f64() {
                rates.insert(city.to_lowercase(), pct as f32);
            }
        }
        if rates.is_empty() {
            return Err(anyhow!("tax-rates body carried no rates"));
        }
        Ok(rates)
    }
}

/// Back out the pre-tax value of a transaction from its post-tax value.
/// Sales have the tax deducted from the proceeds, purchases have it added to
/// the price. Integer truncation matches the recorded game values.
pub fn before_tax_value(total_value: i64, tax_percent: f32, is_sale: bool) -> i64 {
    let tax_decimal = tax_percent as f64 / 100.0;
    let effective_rate = if is_sale { 1.0 - tax_decimal } else { 1.0 + tax_decimal };
    (total_value as f64 / effective_rate) as i64
}
