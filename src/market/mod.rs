pub mod correlator;
pub mod listing_cache;
pub mod tax;
