pub mod challenge;
pub mod header;
pub mod pricing;
pub mod rail;
pub mod token;

#[cfg(feature = "lnd-client")]
pub mod lnd;

#[cfg(feature = "poller")]
pub mod poller;

#[cfg(feature = "probe")]
pub mod probe;
