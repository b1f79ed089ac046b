pub mod delivery;
pub mod types;
