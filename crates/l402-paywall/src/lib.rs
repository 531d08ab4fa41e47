//! L402 access gate: answer unauthenticated requests with a Lightning payment
//! challenge, and admit requests carrying a settled credential.
//!
//! [`paywall::PayWall`] can be driven directly from a handler or mounted as a
//! tower layer on axum routes via the `axum` feature.

pub mod errors;
pub mod paywall;

#[cfg(feature = "axum")]
pub mod axum;
