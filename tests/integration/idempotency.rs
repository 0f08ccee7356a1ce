//! Single-declaration-per-slot under replays, races and flaky storage.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drawsettle::engine::Settler;
use drawsettle::storage::{MemoryStore, SettlementStore, SqliteStore};
use drawsettle::types::{SettleError, SettlementRecord, SlotKey};

use crate::fixtures::*;

#[tokio::test]
async fn second_call_with_different_rates_returns_first_record() {
    let store = memory_backend(dec!(10), dec!(50), vec![ticket(1, "10-00 : 5, 30-05 : 3")]).await;
    let settler = settler(store.clone());

    let first = settler.settle_with_rates(&slot(), dec!(10), dec!(50)).await.unwrap();
    let second = settler.settle_with_rates(&slot(), dec!(0), dec!(100)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.net_budget, dec!(4));
    assert_eq!(store.settlement_count().await, 1);
}

#[tokio::test]
async fn late_tickets_do_not_change_a_declared_slot() {
    let store = memory_backend(dec!(10), dec!(50), vec![ticket(1, "10-00 : 5")]).await;
    let first = settler(store.clone()).settle(&slot()).await.unwrap();

    store.add_ticket(ticket(2, "10-00 : 500")).await;
    store.set_payout_ratio(dec!(90)).await;
    let replay = settler(store).settle(&slot()).await.unwrap();

    assert_eq!(first, replay);
    assert_eq!(replay.gross_stake, dec!(5));
}

#[tokio::test]
async fn equivalent_draw_time_spellings_share_a_slot() {
    let store = memory_backend(dec!(10), dec!(50), Vec::new()).await;
    let settler = settler(store.clone());

    let padded = SlotKey::new(OPERATOR, DRAW_DATE, "08:45 PM").unwrap();
    let first = settler.settle(&padded).await.unwrap();
    let second = settler.settle(&slot()).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(store.settlement_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_settles_declare_once_in_memory() {
    let store = memory_backend(dec!(10), dec!(60), vec![ticket(1, "10-00 : 5, 30-05 : 3, 50-50 : 2")]).await;
    // Unseeded: racing drafts would disagree on fillers if both were stored.
    let settler = Arc::new(Settler::from_backend(store.clone()));

    let handles = (0..16).map(|_| {
        let settler = Arc::clone(&settler);
        tokio::spawn(async move { settler.settle(&slot()).await })
    });
    let results: Vec<SettlementRecord> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(store.settlement_count().await, 1);
    for record in &results {
        assert_eq!(record, &results[0]);
    }
    assert_well_formed(&results[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_settles_declare_once_in_sqlite() {
    let path = std::env::temp_dir().join(format!("drawsettle_race_{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}", path.display());
    let db = Arc::new(SqliteStore::connect(&url, 5).await.unwrap());
    db.upsert_operator(OPERATOR, dec!(10)).await.unwrap();
    db.set_payout_ratio(dec!(50)).await.unwrap();
    db.insert_ticket(OPERATOR, "27-07-2025 10:00:00", "10-00 : 5, 30-05 : 3", r#"["08:45 PM"]"#)
        .await
        .unwrap();

    let settler = Arc::new(Settler::from_backend(db.clone()));
    let handles = (0..8).map(|_| {
        let settler = Arc::clone(&settler);
        tokio::spawn(async move { settler.settle(&slot()).await })
    });
    let results: Vec<SettlementRecord> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    for record in &results {
        assert_eq!(record, &results[0]);
    }
    assert_eq!(results[0].gross_stake, dec!(8));
    assert_eq!(results[0].allocated_total, dec!(3));
    assert_eq!(db.list_for_operator_date(OPERATOR, DRAW_DATE).await.unwrap().len(), 1);

    drop(settler);
    drop(db);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn sqlite_replay_returns_identical_record() {
    let db = Arc::new(SqliteStore::connect("sqlite::memory:", 1).await.unwrap());
    db.upsert_operator(OPERATOR, dec!(12.5)).await.unwrap();
    db.set_payout_ratio(dec!(50)).await.unwrap();
    db.insert_ticket(OPERATOR, "27-07-2025 10:00:00", "30-05 : 1234567.123456789012, 10-00 : 0.3333", r#"["8:45 PM"]"#)
        .await
        .unwrap();

    let settler = Settler::from_backend(db.clone()).with_rng_seed(Some(11));
    let first = settler.settle(&slot()).await.unwrap();
    let second = settler.settle(&slot()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.gross_stake, dec!(1234567.456756789012));
    assert_eq!(second.series_stakes[1].gross, dec!(1234567.123456789012));
    assert_eq!(second.series_stakes[1].net, first.series_stakes[1].net);
}

/// Fails the first `failures` writes, then delegates.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    failures: AtomicUsize,
}

#[async_trait]
impl SettlementStore for FlakyStore {
    async fn find(&self, slot: &SlotKey) -> Result<Option<SettlementRecord>> {
        self.inner.find(slot).await
    }

    async fn create_if_absent(&self, record: SettlementRecord) -> Result<SettlementRecord> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(anyhow!("database is locked"));
        }
        self.inner.create_if_absent(record).await
    }

    async fn list_for_operator_date(&self, operator_id: &str, draw_date: &str) -> Result<Vec<SettlementRecord>> {
        self.inner.list_for_operator_date(operator_id, draw_date).await
    }
}

#[tokio::test]
async fn storage_failure_is_retryable_and_leaves_no_record() {
    let backend = memory_backend(dec!(10), dec!(50), vec![ticket(1, "10-00 : 5, 30-05 : 3")]).await;
    let flaky = Arc::new(FlakyStore {
        inner: backend.clone(),
        failures: AtomicUsize::new(1),
    });
    let settler = Settler::new(backend.clone(), backend.clone(), backend.clone(), flaky)
        .with_rng_seed(Some(5));

    let err = settler.settle(&slot()).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, SettleError::StorageUnavailable(_)));
    assert_eq!(backend.settlement_count().await, 0);

    let record = settler.settle(&slot()).await.unwrap();
    assert_well_formed(&record);
    assert_eq!(record.allocated_total, dec!(3));

    let replay = settler.settle(&slot()).await.unwrap();
    assert_eq!(record, replay);
}

/// Completes writes only after a delay.
struct SlowStore {
    inner: Arc<MemoryStore>,
    delay: Duration,
}

#[async_trait]
impl SettlementStore for SlowStore {
    async fn find(&self, slot: &SlotKey) -> Result<Option<SettlementRecord>> {
        self.inner.find(slot).await
    }

    async fn create_if_absent(&self, record: SettlementRecord) -> Result<SettlementRecord> {
        tokio::time::sleep(self.delay).await;
        self.inner.create_if_absent(record).await
    }

    async fn list_for_operator_date(&self, operator_id: &str, draw_date: &str) -> Result<Vec<SettlementRecord>> {
        self.inner.list_for_operator_date(operator_id, draw_date).await
    }
}

#[tokio::test]
async fn persist_timeout_is_retryable_and_write_still_lands_once() {
    let backend = memory_backend(dec!(10), dec!(50), vec![ticket(1, "30-05 : 3")]).await;
    let slow = Arc::new(SlowStore {
        inner: backend.clone(),
        delay: Duration::from_millis(150),
    });
    let settler = Settler::new(backend.clone(), backend.clone(), backend.clone(), slow)
        .with_timeout(Duration::from_millis(20));

    let err = settler.settle(&slot()).await.unwrap_err();
    assert_eq!(err, SettleError::Timeout("settlement store"));
    assert!(err.is_retryable());

    // The detached write completes on its own.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(backend.settlement_count().await, 1);

    let stored = backend.find(&slot()).await.unwrap().unwrap();
    let retried = settler.settle(&slot()).await.unwrap();
    assert_eq!(stored, retried);
    assert_eq!(retried.payout_ratio, dec!(50));
    assert_eq!(retried.commission_rate, Decimal::from(10));
}
