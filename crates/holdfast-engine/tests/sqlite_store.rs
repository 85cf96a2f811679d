//! The engine over the SQLite store.

use std::sync::Arc;

use chrono::Duration;
use holdfast_core::{ErrorKind, Holder, ProductId, ProductInfo};
use holdfast_db::{DbConfig, SqliteStore};
use holdfast_engine::{Clock, ExpiryReaper, ManualClock, ReaperSettings, ReservationManager, RetryPolicy};

async fn sqlite_manager() -> (Arc<SqliteStore>, Arc<ManualClock>, ReservationManager) {
    let store = Arc::new(SqliteStore::open(DbConfig::in_memory()).await.unwrap());
    store.upsert_product(&ProductInfo::new("TEE-M", "Logo Tee (M)", 10)).await.unwrap();
    store
        .upsert_product(&ProductInfo::new("HOODIE-M", "Zip Hoodie (M)", 4).with_max_order_quantity(2))
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::starting_now());
    let manager = ReservationManager::new(store.clone(), store.clone())
        .with_clock(clock.clone())
        .with_retry_policy(RetryPolicy::immediate(5));
    (store, clock, manager)
}

#[tokio::test]
async fn lifecycle_round_trip() {
    let (_store, _clock, manager) = sqlite_manager().await;
    let tee = ProductId::new("TEE-M");
    let a = Holder::User("a".to_string());
    let b = Holder::Session("b".to_string());

    let id = manager.reserve(&tee, 6, &a).await.unwrap();
    let check = manager.check_availability(&tee, 6, &b).await;
    assert!(!check.can_reserve);
    assert_eq!(check.max_can_reserve, 4);

    manager.reserve(&tee, 4, &b).await.unwrap();
    let ledger = manager.stock_level(&tee).await.unwrap();
    assert_eq!((ledger.available_stock, ledger.reserved_stock), (0, 10));

    // Shrink A's hold, then confirm it.
    manager.reserve(&tee, 2, &a).await.unwrap();
    let report = manager.confirm_reservations(&[id]).await;
    assert_eq!(report.confirmed_ids, vec![id]);

    manager.cancel(&tee, &b).await.unwrap();
    let ledger = manager.stock_level(&tee).await.unwrap();
    assert_eq!((ledger.available_stock, ledger.reserved_stock), (8, 2));
    ledger.check_invariant().unwrap();
}

#[tokio::test]
async fn order_limit_and_missing_hold() {
    let (_store, _clock, manager) = sqlite_manager().await;
    let hoodie = ProductId::new("HOODIE-M");
    let a = Holder::User("a".to_string());

    let err = manager.reserve(&hoodie, 3, &a).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExceedsOrderLimit);

    let err = manager.cancel(&hoodie, &a).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReservationNotFound);
}

#[tokio::test]
async fn reaper_sweeps_sqlite() {
    let (store, clock, manager) = sqlite_manager().await;
    let tee = ProductId::new("TEE-M");
    manager.reserve(&tee, 3, &Holder::User("a".to_string())).await.unwrap();
    manager.reserve(&tee, 2, &Holder::User("b".to_string())).await.unwrap();
    clock.advance(Duration::minutes(16));

    let reaper = ExpiryReaper::new(store.clone(), ReaperSettings::default()).with_clock(clock.clone());
    let report = reaper.sweep_once(clock.now()).await;
    assert_eq!(report.expired, 2);
    assert_eq!(report.units_released, 5);
    assert_eq!(reaper.sweep_once(clock.now()).await.expired, 0);

    let ledger = manager.stock_level(&tee).await.unwrap();
    assert_eq!((ledger.available_stock, ledger.reserved_stock), (10, 0));
}

#[tokio::test]
async fn blank_holder_never_reaches_the_sweep() {
    let (store, clock, manager) = sqlite_manager().await;
    let tee = ProductId::new("TEE-M");

    let err = manager.reserve(&tee, 2, &Holder::User(String::new())).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);

    manager.reserve(&tee, 3, &Holder::User("good".to_string())).await.unwrap();
    clock.advance(Duration::minutes(20));

    let reaper = ExpiryReaper::new(store.clone(), ReaperSettings::default()).with_clock(clock.clone());
    let report = reaper.sweep_once(clock.now()).await;
    assert_eq!((report.scanned, report.expired, report.failures), (1, 1, 0));

    let ledger = manager.stock_level(&tee).await.unwrap();
    assert_eq!((ledger.available_stock, ledger.reserved_stock), (10, 0));
}
