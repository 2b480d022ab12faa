pub mod classifier;
pub mod player;
pub mod retainers;
