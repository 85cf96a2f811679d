//! # Confirmation Report
//!
//! Per-id outcome of confirming a checkout's reservations. Each id succeeds
//! or fails on its own; one expired hold does not block the rest.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{ErrorKind, ReservationError};
use crate::types::ReservationId;

/// Why one reservation could not be confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConfirmationError {
    #[ts(as = "String")]
    pub reservation_id: ReservationId,
    pub kind: ErrorKind,
    pub message: String,
}

impl ConfirmationError {
    pub fn new(reservation_id: ReservationId, error: &ReservationError) -> Self {
        ConfirmationError {
            reservation_id,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of a confirmation batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConfirmationReport {
    #[ts(as = "Vec<String>")]
    pub confirmed_ids: Vec<ReservationId>,
    pub errors: Vec<ConfirmationError>,
}

impl ConfirmationReport {
    pub fn record_confirmed(&mut self, id: ReservationId) {
        self.confirmed_ids.push(id);
    }

    pub fn record_failed(&mut self, id: ReservationId, error: &ReservationError) {
        self.errors.push(ConfirmationError::new(id, error));
    }

    /// True when every requested id was confirmed.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error recorded for `id`, if any.
    pub fn error_for(&self, id: &ReservationId) -> Option<&ConfirmationError> {
        self.errors.iter().find(|e| &e.reservation_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_kind_on_the_wire() {
        let mut report = ConfirmationReport::default();
        let ok = ReservationId::generate();
        let late = ReservationId::generate();
        report.record_confirmed(ok);
        report.record_failed(late, &ReservationError::ReservationExpired(late.to_string()));

        assert!(!report.is_complete());
        assert_eq!(report.error_for(&late).unwrap().kind, ErrorKind::ReservationExpired);
        assert!(report.error_for(&ok).is_none());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["errors"][0]["kind"], "reservation-expired");
        assert_eq!(json["confirmed_ids"][0], ok.to_string());
    }
}
