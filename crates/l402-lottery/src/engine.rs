//! Round lifecycle: lazy advancement, entry recording, weighted draw, payout.

use std::sync::Arc;

use bon::Builder;
use chrono::{DateTime, Utc};
use l402_kit::{
    rail::{LightningRail, RailError},
    token::PaymentHash,
};
use tokio::sync::Mutex;

use crate::{
    payout,
    round::RoundClock,
    store::{LotteryStore, StoreError},
    types::{Entry, PayoutDestination, PayoutStatus, Round, RoundStatus, Winner},
};

#[derive(Builder, Debug, Clone)]
pub struct LotteryConfig {
    /// Smallest accepted entry.
    #[builder(default = 100)]
    pub min_sats: u64,
    /// Largest accepted entry.
    #[builder(default = 1_000_000)]
    pub max_sats: u64,
    /// Fraction of the pot withheld from the payout.
    #[builder(default = 0.0)]
    pub house_cut: f64,
    /// Completed rounds to reload on cold start.
    #[builder(default = 20)]
    pub history_limit: usize,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        LotteryConfig::builder().build()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LotteryError {
    #[error("lottery round is not accepting entries")]
    RoundNotActive,
    #[error("entry amount must be between {min} and {max} sats")]
    AmountOutOfRange { min: u64, max: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rail(#[from] RailError),
}

/// Result of an entry attempt. A duplicate submission of an already-recorded
/// payment hash is a success carrying the existing entry.
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    pub entry: Entry,
    pub round: Round,
    pub duplicate: bool,
}

/// Owns the round lifecycle.
///
/// There is no background timer: [`LotteryEngine::ensure_active`] is the sole
/// advancement mechanism, so round completion is a side effect of being asked
/// for the current state. Correctness relies on some request eventually
/// arriving after expiry.
pub struct LotteryEngine {
    store: Arc<dyn LotteryStore>,
    rail: Arc<dyn LightningRail>,
    http: reqwest::Client,
    clock: RoundClock,
    config: LotteryConfig,
    /// Instance-local cache of the current round; never authoritative.
    current: Mutex<Option<Round>>,
    now_fn: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl LotteryEngine {
    pub fn new(
        store: Arc<dyn LotteryStore>,
        rail: Arc<dyn LightningRail>,
        clock: RoundClock,
        config: LotteryConfig,
    ) -> Self {
        LotteryEngine {
            store,
            rail,
            http: reqwest::Client::new(),
            clock,
            config,
            current: Mutex::new(None),
            now_fn: Arc::new(Utc::now),
        }
    }

    /// Substitute the wall-clock source. Test seam.
    pub fn with_now_fn(mut self, now_fn: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.now_fn = now_fn;
        self
    }

    pub fn config(&self) -> &LotteryConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_fn)()
    }

    /// Load or lazily create the round for the current deterministic id,
    /// drawing the cached round first if its end has passed.
    pub async fn ensure_active(&self) -> Result<Round, LotteryError> {
        let mut guard = self.current.lock().await;
        self.advance(&mut guard).await?;
        guard.clone().ok_or(LotteryError::RoundNotActive)
    }

    /// Record a settled entry. The caller must already hold a verified
    /// settlement credential for `payment_hash`; the amount is re-read from
    /// the rail rather than trusted.
    pub async fn enter(
        &self,
        destination: PayoutDestination,
        requested_sats: u64,
        payment_hash: PaymentHash,
    ) -> Result<EntryOutcome, LotteryError> {
        let (min, max) = (self.config.min_sats, self.config.max_sats);
        if requested_sats < min || requested_sats > max {
            return Err(LotteryError::AmountOutOfRange { min, max });
        }

        let mut guard = self.current.lock().await;
        self.advance(&mut guard).await?;
        let round = guard.as_mut().ok_or(LotteryError::RoundNotActive)?;
        if round.status != RoundStatus::Active {
            return Err(LotteryError::RoundNotActive);
        }

        // Same settlement presented twice: idempotent success.
        if let Some(existing) = round.find_entry(&payment_hash) {
            return Ok(EntryOutcome {
                entry: existing.clone(),
                round: round.clone(),
                duplicate: true,
            });
        }

        // Defense against a client claiming a larger entry than it paid for.
        let amount_sats = match self.rail.lookup_invoice(&payment_hash).await {
            Ok(state) if state.settled_amount() > 0 => state.settled_amount(),
            Ok(_) => requested_sats,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%payment_hash, "settled-amount lookup failed, using requested: {err}");
                #[cfg(not(feature = "tracing"))]
                let _ = err;
                requested_sats
            }
        };

        let entry = Entry {
            destination,
            amount_sats,
            paid_at: self.now(),
            payment_hash,
        };
        round.entries.push(entry.clone());
        round.total_pot += amount_sats;

        self.store.insert_entry(&round.id, &entry).await?;
        self.store.upsert_round(round).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            amount_sats,
            pot = round.total_pot,
            from = %entry.destination.masked(),
            "lottery entry recorded"
        );

        Ok(EntryOutcome {
            entry,
            round: round.clone(),
            duplicate: false,
        })
    }

    /// Most recent completed rounds, newest first.
    pub async fn history(&self) -> Result<Vec<Round>, LotteryError> {
        Ok(self.store.recent_completed(self.config.history_limit).await?)
    }

    /// Idempotent state transition run on every read.
    async fn advance(&self, guard: &mut Option<Round>) -> Result<(), LotteryError> {
        let now = self.now();

        // Draw the cached round first if it expired; only then move on to the
        // round covering the current instant.
        if let Some(round) = guard.as_mut()
            && round.status == RoundStatus::Active
            && round.is_expired(now)
        {
            // The cache is instance-local; pick up entries (or a finished
            // draw) that other instances recorded before drawing ourselves.
            match self.store.load_round(&round.id).await? {
                Some(stored) if stored.status == RoundStatus::Completed => {
                    *round = stored;
                }
                Some(stored) => {
                    round.entries = stored.entries;
                    round.total_pot = round.entries.iter().map(|e| e.amount_sats).sum();
                    self.draw(round).await?;
                }
                None => self.draw(round).await?,
            }
        }

        let bounds = self.clock.bounds(now);
        let stale = guard.as_ref().map(|r| r.id != bounds.id).unwrap_or(true);
        if stale {
            let round = match self.store.load_round(&bounds.id).await? {
                Some(round) => round,
                None => {
                    let round = Round::new(&bounds);
                    self.store.upsert_round(&round).await?;
                    #[cfg(feature = "tracing")]
                    tracing::info!(round_id = %round.id, ends_at = %round.ends_at, "new lottery round");
                    round
                }
            };
            *guard = Some(round);
        }
        Ok(())
    }

    /// Execute the draw and payout for an expired round, then persist it.
    ///
    /// Payout failures are terminal for the round: it stays completed with
    /// `payout_status = failed` and the error on record. At-risk funds are
    /// reconciled out of band; no automatic retry against an already-ambiguous
    /// outgoing-payment state.
    async fn draw(&self, round: &mut Round) -> Result<(), LotteryError> {
        if round.entries.is_empty() {
            round.status = RoundStatus::Completed;
            round.winner = None;
            self.store.upsert_round(round).await?;
            #[cfg(feature = "tracing")]
            tracing::info!(round_id = %round.id, "round completed with no entries");
            return Ok(());
        }

        round.status = RoundStatus::Drawing;
        round.total_pot = round.entries.iter().map(|e| e.amount_sats).sum();

        let r = if round.total_pot > 0 {
            rand::Rng::random_range(&mut rand::rng(), 0..round.total_pot)
        } else {
            0
        };
        let Some(winner_entry) = select_winner(&round.entries, r) else {
            // Unreachable with a non-empty entry list; treated as no-entry.
            round.status = RoundStatus::Completed;
            self.store.upsert_round(round).await?;
            return Ok(());
        };
        let winner_entry = winner_entry.clone();

        let house_cut = (round.total_pot as f64 * self.config.house_cut).floor() as u64;
        let payout_sats = round.total_pot - house_cut;

        let mut winner = Winner {
            destination: winner_entry.destination.clone(),
            amount_contributed: winner_entry.amount_sats,
            payout: payout_sats,
            house_cut,
            payout_status: PayoutStatus::Pending,
            payout_error: None,
        };

        if payout_sats > 0 {
            match payout::dispatch(
                self.rail.as_ref(),
                &self.http,
                &winner.destination,
                payout_sats,
            )
            .await
            {
                Ok(()) => {
                    winner.payout_status = PayoutStatus::Paid;
                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        round_id = %round.id,
                        payout_sats,
                        to = %winner.destination.masked(),
                        "lottery payout sent"
                    );
                }
                Err(err) => {
                    winner.payout_status = PayoutStatus::Failed;
                    winner.payout_error = Some(err.to_string());
                    #[cfg(feature = "tracing")]
                    tracing::error!(round_id = %round.id, "lottery payout failed: {err}");
                }
            }
        }

        round.winner = Some(winner);
        round.status = RoundStatus::Completed;
        self.store.upsert_round(round).await?;
        Ok(())
    }
}

/// Weighted selection: walk the entries subtracting each amount from `r`; the
/// entry where the running value first goes negative wins, so win probability
/// is proportional to the contributed amount. Falls back to the last entry if
/// the walk runs off the end.
pub fn select_winner(entries: &[Entry], mut r: u64) -> Option<&Entry> {
    for entry in entries {
        if r < entry.amount_sats {
            return Some(entry);
        }
        r -= entry.amount_sats;
    }
    entries.last()
}
