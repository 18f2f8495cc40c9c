pub mod contract;
pub mod record;
pub mod sector;
pub mod strength;
