//! Engine lifecycle tests against the in-memory store and a scripted rail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use l402_kit::rail::{
    DecodedPaymentRequest, Invoice, InvoiceState, LightningRail, NodePubkey, RailError,
};
use l402_kit::token::PaymentHash;
use l402_lottery::engine::{LotteryConfig, LotteryEngine, LotteryError};
use l402_lottery::round::RoundClock;
use l402_lottery::store::{LotteryStore, MemoryStore};
use l402_lottery::types::{PayoutDestination, PayoutStatus, RoundStatus};

#[derive(Default)]
struct MockRail {
    invoices: Mutex<HashMap<PaymentHash, InvoiceState>>,
    keysends: AtomicUsize,
    fail_payouts: AtomicBool,
}

impl MockRail {
    fn settle(&self, hash: PaymentHash, amount_paid_sats: u64) {
        self.invoices.lock().unwrap().insert(
            hash,
            InvoiceState {
                settled: true,
                preimage: Some(hex::encode([7u8; 32])),
                amount_sats: amount_paid_sats,
                amount_paid_sats,
            },
        );
    }
}

#[async_trait]
impl LightningRail for MockRail {
    async fn create_invoice(&self, _amount_sats: u64, _memo: &str) -> Result<Invoice, RailError> {
        Err(RailError::Rejected("not used in these tests".into()))
    }

    async fn lookup_invoice(&self, payment_hash: &PaymentHash) -> Result<InvoiceState, RailError> {
        self.invoices
            .lock()
            .unwrap()
            .get(payment_hash)
            .cloned()
            .ok_or_else(|| RailError::Unreachable("unknown invoice".into()))
    }

    async fn decode_payment_request(
        &self,
        _payment_request: &str,
    ) -> Result<DecodedPaymentRequest, RailError> {
        Ok(DecodedPaymentRequest::default())
    }

    async fn pay_invoice(&self, _payment_request: &str) -> Result<(), RailError> {
        Ok(())
    }

    async fn keysend(&self, _dest: &NodePubkey, _amount_sats: u64) -> Result<(), RailError> {
        if self.fail_payouts.load(Ordering::SeqCst) {
            return Err(RailError::Rejected("no route".into()));
        }
        self.keysends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn channel_balance(&self) -> Result<u64, RailError> {
        Ok(1_000_000)
    }
}

/// Shared, steerable wall clock.
#[derive(Clone)]
struct TestClock {
    base: DateTime<Utc>,
    offset_ms: Arc<AtomicI64>,
}

impl TestClock {
    fn new(base: DateTime<Utc>) -> Self {
        TestClock {
            base,
            offset_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    fn now_fn(&self) -> Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> {
        let clock = self.clone();
        Arc::new(move || {
            clock.base + Duration::milliseconds(clock.offset_ms.load(Ordering::SeqCst))
        })
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 21, 0, 0, 0).single().unwrap()
}

fn engine(
    store: Arc<dyn LotteryStore>,
    rail: Arc<MockRail>,
    clock: &TestClock,
) -> LotteryEngine {
    LotteryEngine::new(
        store,
        rail,
        RoundClock::new(epoch(), Duration::hours(24)),
        LotteryConfig::default(),
    )
    .with_now_fn(clock.now_fn())
}

fn keysend_destination(tag: u8) -> PayoutDestination {
    let hex_byte = format!("{tag:02x}");
    let pubkey = format!("02{}", hex_byte.repeat(32));
    PayoutDestination::NodePubkey(NodePubkey::parse(&pubkey).unwrap())
}

#[tokio::test]
async fn duplicate_payment_hash_is_one_entry_and_two_successes() {
    let clock = TestClock::new(epoch() + Duration::hours(1));
    let rail = Arc::new(MockRail::default());
    let store: Arc<dyn LotteryStore> = Arc::new(MemoryStore::new());
    let engine = engine(store, rail.clone(), &clock);

    let hash = PaymentHash([1u8; 32]);
    rail.settle(hash, 150);

    let first = engine
        .enter(keysend_destination(0xab), 150, hash)
        .await
        .unwrap();
    assert!(!first.duplicate);

    let second = engine
        .enter(keysend_destination(0xab), 150, hash)
        .await
        .unwrap();
    assert!(second.duplicate);
    assert_eq!(second.round.entries.len(), 1);
    assert_eq!(second.round.total_pot, 150);
    assert_eq!(second.entry.payment_hash, hash);
}

#[tokio::test]
async fn entry_amount_comes_from_the_rail_not_the_client() {
    let clock = TestClock::new(epoch() + Duration::hours(1));
    let rail = Arc::new(MockRail::default());
    let store: Arc<dyn LotteryStore> = Arc::new(MemoryStore::new());
    let engine = engine(store, rail.clone(), &clock);

    // Claims 100, actually settled 250.
    let hash = PaymentHash([2u8; 32]);
    rail.settle(hash, 250);
    let outcome = engine
        .enter(keysend_destination(0x02), 100, hash)
        .await
        .unwrap();
    assert_eq!(outcome.entry.amount_sats, 250);

    // Lookup failure falls back to the requested amount.
    let unknown = PaymentHash([3u8; 32]);
    let outcome = engine
        .enter(keysend_destination(0x03), 120, unknown)
        .await
        .unwrap();
    assert_eq!(outcome.entry.amount_sats, 120);
    assert_eq!(outcome.round.total_pot, 370);
}

#[tokio::test]
async fn entry_amount_bounds_are_enforced() {
    let clock = TestClock::new(epoch() + Duration::hours(1));
    let rail = Arc::new(MockRail::default());
    let store: Arc<dyn LotteryStore> = Arc::new(MemoryStore::new());
    let engine = engine(store, rail, &clock);

    let err = engine
        .enter(keysend_destination(0x04), 99, PaymentHash([4u8; 32]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LotteryError::AmountOutOfRange {
            min: 100,
            max: 1_000_000
        }
    ));

    let err = engine
        .enter(keysend_destination(0x04), 1_000_001, PaymentHash([4u8; 32]))
        .await
        .unwrap_err();
    assert!(matches!(err, LotteryError::AmountOutOfRange { .. }));
}

#[tokio::test]
async fn zero_entry_round_completes_without_winner_or_payout() {
    let clock = TestClock::new(epoch() + Duration::hours(1));
    let rail = Arc::new(MockRail::default());
    let store: Arc<dyn LotteryStore> = Arc::new(MemoryStore::new());
    let engine = engine(store.clone(), rail.clone(), &clock);

    let stale = engine.ensure_active().await.unwrap();
    clock.advance(Duration::hours(25));
    let fresh = engine.ensure_active().await.unwrap();

    assert_ne!(stale.id, fresh.id);
    assert_eq!(fresh.status, RoundStatus::Active);

    let drawn = store.load_round(&stale.id).await.unwrap().unwrap();
    assert_eq!(drawn.status, RoundStatus::Completed);
    assert!(drawn.winner.is_none());
    assert_eq!(rail.keysends.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_round_pays_the_full_pot_to_the_winner() {
    let clock = TestClock::new(epoch() + Duration::hours(1));
    let rail = Arc::new(MockRail::default());
    let store: Arc<dyn LotteryStore> = Arc::new(MemoryStore::new());
    let engine = engine(store.clone(), rail.clone(), &clock);

    let hash = PaymentHash([5u8; 32]);
    rail.settle(hash, 500);
    let round_id = engine
        .enter(keysend_destination(0x05), 500, hash)
        .await
        .unwrap()
        .round
        .id;

    clock.advance(Duration::hours(25));
    engine.ensure_active().await.unwrap();

    let drawn = store.load_round(&round_id).await.unwrap().unwrap();
    assert_eq!(drawn.status, RoundStatus::Completed);
    let winner = drawn.winner.unwrap();
    assert_eq!(winner.payout, 500);
    assert_eq!(winner.house_cut, 0);
    assert_eq!(winner.payout_status, PayoutStatus::Paid);
    assert_eq!(rail.keysends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_payout_is_terminal_for_the_round() {
    let clock = TestClock::new(epoch() + Duration::hours(1));
    let rail = Arc::new(MockRail::default());
    rail.fail_payouts.store(true, Ordering::SeqCst);
    let store: Arc<dyn LotteryStore> = Arc::new(MemoryStore::new());
    let engine = engine(store.clone(), rail.clone(), &clock);

    let hash = PaymentHash([6u8; 32]);
    rail.settle(hash, 300);
    let round_id = engine
        .enter(keysend_destination(0x06), 300, hash)
        .await
        .unwrap()
        .round
        .id;

    clock.advance(Duration::hours(25));
    engine.ensure_active().await.unwrap();

    let drawn = store.load_round(&round_id).await.unwrap().unwrap();
    assert_eq!(drawn.status, RoundStatus::Completed);
    let winner = drawn.winner.unwrap();
    assert_eq!(winner.payout_status, PayoutStatus::Failed);
    assert!(winner.payout_error.is_some());

    // A later read never re-draws or retries the payout.
    engine.ensure_active().await.unwrap();
    assert_eq!(rail.keysends.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn two_instances_converge_on_one_completed_round() {
    let clock = TestClock::new(epoch() + Duration::hours(1));
    let rail = Arc::new(MockRail::default());
    let store: Arc<dyn LotteryStore> = Arc::new(MemoryStore::new());
    let a = engine(store.clone(), rail.clone(), &clock);
    let b = engine(store.clone(), rail.clone(), &clock);

    // Both instances cache the same active round, then one records an entry.
    let round_id = a.ensure_active().await.unwrap().id;
    assert_eq!(b.ensure_active().await.unwrap().id, round_id);

    let hash = PaymentHash([7u8; 32]);
    rail.settle(hash, 400);
    a.enter(keysend_destination(0x07), 400, hash).await.unwrap();

    clock.advance(Duration::hours(25));
    a.ensure_active().await.unwrap();
    b.ensure_active().await.unwrap();

    // One completed round, one payout: the second instance adopts the stored
    // draw instead of re-running it.
    let drawn = store.load_round(&round_id).await.unwrap().unwrap();
    assert_eq!(drawn.status, RoundStatus::Completed);
    assert_eq!(drawn.winner.unwrap().payout, 400);
    assert_eq!(rail.keysends.load(Ordering::SeqCst), 1);

    let completed = store.recent_completed(10).await.unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, round_id);
}

#[tokio::test]
async fn history_is_newest_first_and_bounded() {
    let clock = TestClock::new(epoch() + Duration::hours(1));
    let rail = Arc::new(MockRail::default());
    let store: Arc<dyn LotteryStore> = Arc::new(MemoryStore::new());
    let engine = engine(store, rail, &clock);

    // Roll through three empty rounds.
    for _ in 0..3 {
        engine.ensure_active().await.unwrap();
        clock.advance(Duration::hours(24));
    }
    engine.ensure_active().await.unwrap();

    let history = engine.history().await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.windows(2).all(|w| w[0].ends_at > w[1].ends_at));
}
