#[derive(Clone)]
pub struct Config {
    pub sqlite_path: String,
    pub catalog_path: Option<String>,
    pub tax_api_base: String,
    /// Seconds a cached market listing stays resolvable.
    pub listing_ttl_secs: i64,
    pub cache_sweep_secs: i64,
    pub retry_flush_secs: i64,
    pub retainer_sweep_secs: i64,
    pub delayed_check_secs: i64,
    /// Seconds before an unmatched purchase request is evicted.
    pub pending_purchase_expiry_secs: i64,
    pub retry_ceiling: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./gilspy.sqlite".to_string()),
            catalog_path: std::env::var("CATALOG_PATH").ok(),
            tax_api_base: std::env::var("TAX_API_BASE").unwrap_or_else(|_| "https://universalis.app".to_string()),
            listing_ttl_secs: std::env::var("LISTING_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300),
            cache_sweep_secs: std::env::var("CACHE_SWEEP_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300),
            retry_flush_secs: std::env::var("RETRY_FLUSH_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300),
            retainer_sweep_secs: std::env::var("RETAINER_SWEEP_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(5),
            delayed_check_secs: std::env::var("DELAYED_CHECK_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(1),
            pending_purchase_expiry_secs: std::env::var("PENDING_PURCHASE_EXPIRY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            retry_ceiling: std::env::var("RETRY_CEILING").ok().and_then(|v| v.parse().ok()).unwrap_or(3),
        }
    }
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
