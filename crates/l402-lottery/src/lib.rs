pub mod engine;
pub mod payout;
pub mod round;
pub mod store;
pub mod types;
