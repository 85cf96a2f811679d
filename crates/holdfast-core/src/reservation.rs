//! # Reservation
//!
//! A time-bounded hold on stock and its terminal state machine.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Reservation Lifecycle                             │
//! │                                                                         │
//! │                 reserve (same holder/product)                          │
//! │                 resize + renew expires_at                              │
//! │                        ┌────┐                                          │
//! │                        ▼    │                                          │
//! │   reserve() ──►   ┌─────────┴┐                                         │
//! │                   │  ACTIVE  │                                         │
//! │                   └────┬─────┘                                         │
//! │          ┌─────────────┼──────────────┐                                │
//! │          ▼             ▼              ▼                                │
//! │    ┌───────────┐ ┌───────────┐ ┌───────────┐                           │
//! │    │ CONFIRMED │ │ CANCELLED │ │  EXPIRED  │   (all terminal)          │
//! │    └───────────┘ └───────────┘ └───────────┘                           │
//! │     checkout      cancel()      reaper sweep                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{ReservationError, ReservationResult};
use crate::types::{Holder, ProductId, ReservationId};

// =============================================================================
// Reservation Status
// =============================================================================

/// Status of a reservation. Only `Active` has outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ReservationStatus {
    Active,
    Confirmed,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    /// Returns true for confirmed, cancelled and expired.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReservationStatus::Active),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(ReservationError::InvariantViolation(format!(
                "unknown reservation status '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// A hold of `quantity` units of one product by one holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Reservation {
    #[ts(as = "String")]
    pub id: ReservationId,

    pub holder: Holder,

    #[ts(as = "String")]
    pub product_id: ProductId,

    /// Units held (>= 1).
    pub quantity: i64,

    pub status: ReservationStatus,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Last mutation (resize, renewal or status change).
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Eligible for expiry once `now >= expires_at`.
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Opens a new active hold expiring `ttl` after `now`.
    pub fn open(
        holder: Holder,
        product_id: ProductId,
        quantity: i64,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Reservation {
            id: ReservationId::generate(),
            holder,
            product_id,
            quantity,
            status: ReservationStatus::Active,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// True once the TTL has elapsed (`expires_at <= now`), regardless of status.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Changes the held quantity and renews the TTL from `now`.
    ///
    /// Returns the signed change in held units, which is what the ledger moves by.
    pub fn resize(&mut self, quantity: i64, now: DateTime<Utc>, ttl: Duration) -> ReservationResult<i64> {
        self.ensure_active()?;
        let delta = quantity - self.quantity;
        self.quantity = quantity;
        self.updated_at = now;
        self.expires_at = now + ttl;
        Ok(delta)
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> ReservationResult<()> {
        self.transition(ReservationStatus::Confirmed, now)
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> ReservationResult<()> {
        self.transition(ReservationStatus::Cancelled, now)
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> ReservationResult<()> {
        self.transition(ReservationStatus::Expired, now)
    }

    fn transition(&mut self, to: ReservationStatus, now: DateTime<Utc>) -> ReservationResult<()> {
        self.ensure_active()?;
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_active(&self) -> ReservationResult<()> {
        if self.status.is_terminal() {
            return Err(ReservationError::InvariantViolation(format!(
                "reservation {} is {} and cannot change",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(now: DateTime<Utc>) -> Reservation {
        Reservation::open(
            Holder::User("u-1".to_string()),
            ProductId::new("CAP-RED"),
            2,
            now,
            Duration::minutes(15),
        )
    }

    #[test]
    fn test_open_sets_ttl() {
        let now = Utc::now();
        let r = sample(now);
        assert!(r.is_active());
        assert_eq!(r.expires_at - r.created_at, Duration::minutes(15));
        assert!(!r.is_expired_at(now));
        assert!(r.is_expired_at(now + Duration::minutes(15)));
    }

    #[test]
    fn test_resize_reports_delta_and_renews() {
        let now = Utc::now();
        let mut r = sample(now);
        let later = now + Duration::minutes(5);

        let delta = r.resize(5, later, Duration::minutes(15)).unwrap();
        assert_eq!(delta, 3);
        assert_eq!(r.quantity, 5);
        assert_eq!(r.expires_at, later + Duration::minutes(15));
        assert_eq!(r.created_at, now);

        assert_eq!(r.resize(1, later, Duration::minutes(15)).unwrap(), -4);
    }

    #[test]
    fn test_terminal_states_never_change() {
        let now = Utc::now();
        for finish in [
            Reservation::confirm as fn(&mut Reservation, DateTime<Utc>) -> ReservationResult<()>,
            Reservation::cancel,
            Reservation::expire,
        ] {
            let mut r = sample(now);
            finish(&mut r, now).unwrap();
            assert!(r.status.is_terminal());
            assert!(r.confirm(now).is_err());
            assert!(r.cancel(now).is_err());
            assert!(r.expire(now).is_err());
            assert!(r.resize(9, now, Duration::minutes(15)).is_err());
        }
    }

    #[test]
    fn test_status_parse() {
        for status in [
            ReservationStatus::Active,
            ReservationStatus::Confirmed,
            ReservationStatus::Cancelled,
            ReservationStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>().unwrap(), status);
        }
        assert!("pending".parse::<ReservationStatus>().is_err());
    }
}
