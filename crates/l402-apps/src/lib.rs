//! Lightning-gated app marketplace.
//!
//! Wires the L402 access gate, the boost and catalog stores, the lottery
//! engine and the low-balance watchdog into one axum service. Every feature
//! degrades gracefully: without an LND node the directories are served
//! ungated, and without Supabase everything falls back to in-memory storage.

pub mod balance;
pub mod boosts;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod postgrest;
pub mod routes;
pub mod state;
