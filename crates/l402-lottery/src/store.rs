//! Durable round storage.
//!
//! Stateless service instances converge through this seam: rounds are upserted
//! by their deterministic id and entries are append-only, keyed by payment
//! hash, which is what makes double-draw attempts and duplicate submissions
//! tolerable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{Entry, Round, RoundStatus};

#[derive(Debug, thiserror::Error)]
#[error("lottery store error: {0}")]
pub struct StoreError(pub String);

#[async_trait]
pub trait LotteryStore: Send + Sync {
    /// Insert or replace the round keyed by its deterministic id.
    ///
    /// Must tolerate concurrent upserts of the same id from independent
    /// instances; last write wins and both writers carry the same outcome
    /// shape, so the stored state converges.
    async fn upsert_round(&self, round: &Round) -> Result<(), StoreError>;

    /// Append an entry to a round. Implementations may silently drop an entry
    /// whose payment hash already exists for the round.
    async fn insert_entry(&self, round_id: &str, entry: &Entry) -> Result<(), StoreError>;

    async fn load_round(&self, round_id: &str) -> Result<Option<Round>, StoreError>;

    /// Most recent completed rounds, newest first.
    async fn recent_completed(&self, limit: usize) -> Result<Vec<Round>, StoreError>;
}

#[async_trait]
impl<T: LotteryStore + ?Sized> LotteryStore for Arc<T> {
    async fn upsert_round(&self, round: &Round) -> Result<(), StoreError> {
        (**self).upsert_round(round).await
    }

    async fn insert_entry(&self, round_id: &str, entry: &Entry) -> Result<(), StoreError> {
        (**self).insert_entry(round_id, entry).await
    }

    async fn load_round(&self, round_id: &str) -> Result<Option<Round>, StoreError> {
        (**self).load_round(round_id).await
    }

    async fn recent_completed(&self, limit: usize) -> Result<Vec<Round>, StoreError> {
        (**self).recent_completed(limit).await
    }
}

/// Instance-local store. The fallback when no durable backend is configured,
/// and the workhorse of the engine tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rounds: RwLock<HashMap<String, Round>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl LotteryStore for MemoryStore {
    async fn upsert_round(&self, round: &Round) -> Result<(), StoreError> {
        let mut rounds = self.rounds.write().await;
        let stored = rounds
            .entry(round.id.clone())
            .or_insert_with(|| round.clone());
        // Entries already persisted via insert_entry survive the upsert.
        let mut merged = round.clone();
        for entry in &stored.entries {
            if merged.find_entry(&entry.payment_hash).is_none() {
                merged.entries.push(entry.clone());
            }
        }
        *stored = merged;
        Ok(())
    }

    async fn insert_entry(&self, round_id: &str, entry: &Entry) -> Result<(), StoreError> {
        let mut rounds = self.rounds.write().await;
        let round = rounds
            .get_mut(round_id)
            .ok_or_else(|| StoreError(format!("unknown round {round_id}")))?;
        if round.find_entry(&entry.payment_hash).is_none() {
            round.entries.push(entry.clone());
        }
        Ok(())
    }

    async fn load_round(&self, round_id: &str) -> Result<Option<Round>, StoreError> {
        Ok(self.rounds.read().await.get(round_id).cloned())
    }

    async fn recent_completed(&self, limit: usize) -> Result<Vec<Round>, StoreError> {
        let rounds = self.rounds.read().await;
        let mut completed: Vec<Round> = rounds
            .values()
            .filter(|r| r.status == RoundStatus::Completed)
            .cloned()
            .collect();
        completed.sort_by(|a, b| b.ends_at.cmp(&a.ends_at));
        completed.truncate(limit);
        Ok(completed)
    }
}
