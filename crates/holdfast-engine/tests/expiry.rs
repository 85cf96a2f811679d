//! TTL expiry, confirmation and the reaper.

mod common;

use chrono::Duration;
use common::{pid, shop, user};
use holdfast_core::{ErrorKind, ProductInfo, ReservationStatus};
use holdfast_engine::{Clock, ExpiryReaper, ReaperSettings, RetryPolicy, SweepReport};

#[tokio::test]
async fn expired_hold_cannot_be_confirmed() {
    let shop = shop(vec![ProductInfo::new("CAP", "Dad Cap", 5)]).await;
    let id = shop.manager.reserve(&pid("CAP"), 1, &user("a")).await.unwrap();

    // Exactly at the deadline counts as expired.
    shop.clock.advance(Duration::minutes(15));

    let report = shop.manager.confirm_reservations(&[id]).await;
    assert!(report.confirmed_ids.is_empty());
    assert_eq!(report.error_for(&id).unwrap().kind, ErrorKind::ReservationExpired);
}

#[tokio::test]
async fn mixed_batch_confirms_valid_and_reports_expired() {
    let shop = shop(vec![
        ProductInfo::new("CAP", "Dad Cap", 5),
        ProductInfo::new("MUG", "Enamel Mug", 5),
    ])
    .await;

    let stale = shop.manager.reserve(&pid("CAP"), 1, &user("a")).await.unwrap();
    shop.clock.advance(Duration::minutes(14));
    let fresh = shop.manager.reserve(&pid("MUG"), 2, &user("a")).await.unwrap();
    shop.clock.advance(Duration::minutes(2));

    let report = shop.manager.confirm_reservations(&[stale, fresh]).await;
    assert_eq!(report.confirmed_ids, vec![fresh]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.error_for(&stale).unwrap().kind, ErrorKind::ReservationExpired);

    // Confirmation leaves the ledger alone.
    assert_eq!(shop.ledger("MUG").await.reserved_stock, 2);
}

#[tokio::test]
async fn renewing_before_deadline_keeps_hold_alive() {
    let shop = shop(vec![ProductInfo::new("CAP", "Dad Cap", 5)]).await;
    let id = shop.manager.reserve(&pid("CAP"), 1, &user("a")).await.unwrap();

    shop.clock.advance(Duration::minutes(14));
    shop.manager.reserve(&pid("CAP"), 1, &user("a")).await.unwrap();
    shop.clock.advance(Duration::minutes(14));

    let report = shop.manager.confirm_reservations(&[id]).await;
    assert_eq!(report.confirmed_ids, vec![id]);
}

#[tokio::test]
async fn reaper_releases_once_and_is_idempotent() {
    let shop = shop(vec![ProductInfo::new("TOTE", "Canvas Tote", 10)]).await;
    let id = shop.manager.reserve(&pid("TOTE"), 3, &user("a")).await.unwrap();
    shop.manager.reserve(&pid("TOTE"), 2, &user("b")).await.unwrap();
    shop.clock.advance(Duration::minutes(16));

    let reaper = ExpiryReaper::new(shop.store.clone(), ReaperSettings::default())
        .with_clock(shop.clock.clone())
        .with_retry_policy(RetryPolicy::immediate(5));

    let now = shop.clock.now();
    let first = reaper.sweep_once(now).await;
    assert_eq!(first.expired, 2);
    assert_eq!(first.products_released, 1);
    assert_eq!(first.units_released, 5);

    let second = reaper.sweep_once(now).await;
    assert_eq!(second, SweepReport::default());

    let ledger = shop.ledger("TOTE").await;
    assert_eq!((ledger.available_stock, ledger.reserved_stock), (10, 0));
    shop.assert_invariants().await;

    let report = shop.manager.confirm_reservations(&[id]).await;
    assert_eq!(report.error_for(&id).unwrap().kind, ErrorKind::ReservationExpired);

    let expired = shop.store.all_reservations().await;
    assert!(expired.iter().all(|r| r.status == ReservationStatus::Expired));
}

#[tokio::test]
async fn reaper_respects_batch_size() {
    let shop = shop(vec![ProductInfo::new("STICKER", "Sticker Pack", 50)]).await;
    for i in 0..5 {
        shop.manager.reserve(&pid("STICKER"), 1, &user(&format!("u{}", i))).await.unwrap();
    }
    shop.clock.advance(Duration::hours(1));

    let reaper = ExpiryReaper::new(
        shop.store.clone(),
        ReaperSettings {
            batch_size: 2,
            ..ReaperSettings::default()
        },
    )
    .with_retry_policy(RetryPolicy::immediate(5));

    let now = shop.clock.now();
    assert_eq!(reaper.sweep_once(now).await.expired, 2);
    assert_eq!(reaper.sweep_once(now).await.expired, 2);
    assert_eq!(reaper.sweep_once(now).await.expired, 1);
    assert_eq!(shop.ledger("STICKER").await.available_stock, 50);
}

#[tokio::test]
async fn cancelled_and_confirmed_holds_are_not_reaped() {
    let shop = shop(vec![ProductInfo::new("CAP", "Dad Cap", 5)]).await;
    let kept = shop.manager.reserve(&pid("CAP"), 2, &user("a")).await.unwrap();
    shop.manager.reserve(&pid("CAP"), 1, &user("b")).await.unwrap();

    shop.manager.confirm_reservations(&[kept]).await;
    shop.manager.cancel(&pid("CAP"), &user("b")).await.unwrap();
    shop.clock.advance(Duration::hours(1));

    let reaper = ExpiryReaper::new(shop.store.clone(), ReaperSettings::default());
    let report = reaper.sweep_once(shop.clock.now()).await;
    assert_eq!(report.scanned, 0);

    // Confirmed units stay reserved for checkout.
    let ledger = shop.ledger("CAP").await;
    assert_eq!((ledger.available_stock, ledger.reserved_stock), (3, 2));
}
