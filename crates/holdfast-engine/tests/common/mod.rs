//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use holdfast_core::{Holder, ProductId, ProductInfo, StockAggregate};
use holdfast_db::InMemoryStore;
use holdfast_engine::{ManualClock, ReservationManager, RetryPolicy};

pub struct Shop {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub manager: ReservationManager,
}

/// A store with the given catalog and a manager on a manual clock.
pub async fn shop(products: Vec<ProductInfo>) -> Shop {
    init_tracing();

    let store = Arc::new(InMemoryStore::new());
    for product in products {
        store.upsert_product(product).await.expect("seed product");
    }

    let clock = Arc::new(ManualClock::starting_now());
    let manager = ReservationManager::new(store.clone(), store.clone())
        .with_clock(clock.clone())
        .with_retry_policy(RetryPolicy::immediate(5));

    Shop { store, clock, manager }
}

pub fn user(id: &str) -> Holder {
    Holder::User(id.to_string())
}

pub fn session(id: &str) -> Holder {
    Holder::Session(id.to_string())
}

pub fn pid(id: &str) -> ProductId {
    ProductId::new(id)
}

impl Shop {
    pub async fn ledger(&self, product_id: &str) -> StockAggregate {
        self.manager.stock_level(&pid(product_id)).await.expect("ledger")
    }

    /// Asserts both storage invariants over every document.
    pub async fn assert_invariants(&self) {
        for stock in self.store.all_stock().await {
            stock.check_invariant().expect("ledger balanced");
        }

        let mut active = HashSet::new();
        for reservation in self.store.all_reservations().await {
            if reservation.is_active() {
                assert!(
                    active.insert((reservation.holder.key(), reservation.product_id.clone())),
                    "two active holds for {} on {}",
                    reservation.holder,
                    reservation.product_id
                );
            }
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
