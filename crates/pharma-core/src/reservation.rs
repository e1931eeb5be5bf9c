//! # Reservation Planning
//!
//! Batch quantity arithmetic and first-expired-first-out (FEFO) selection.
//!
//! This module decides *which* batches an order line draws from and checks
//! that every quantity change keeps a batch valid. Applying the plan inside a
//! database transaction is `pharma-db`'s job.
//!
//! ## Reservation Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   checkout ──► plan_reservation() ──► reserve() on each batch           │
//! │                      │                     │                            │
//! │                      │ short?              ▼                            │
//! │                      ▼              OrderAllocation rows                │
//! │              InsufficientStock            │                             │
//! │              (nothing reserved)     ┌─────┴──────────┬───────────────┐  │
//! │                                     ▼                ▼               ▼  │
//! │                                  pack            cancel          expire │
//! │                                commit()         release()       release()│
//! │                             on_hand -= n      reserved -= n             │
//! │                             reserved -= n                               │
//! │                                  │                                      │
//! │                                  ▼ cancel after pack                    │
//! │                              restock()  on_hand += n                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## FEFO Ordering
//! ```text
//!   1. batches with an expiry date, earliest first
//!   2. batches without an expiry date
//!   ties: oldest received_at, then batch id
//!
//!   skipped: is_available = false, expiry_date < today, nothing free
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::validation::validate_quantity;

// =============================================================================
// Batch Stock
// =============================================================================

/// Checked view of a batch's on-hand and reserved quantities.
///
/// Every operation returns a new value or an error; a `BatchStock` can never
/// hold `reserved > on_hand` or a negative quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchStock {
    on_hand: i64,
    reserved: i64,
}

impl BatchStock {
    pub fn new(on_hand: i64, reserved: i64) -> CoreResult<Self> {
        if on_hand < 0 || reserved < 0 || reserved > on_hand {
            return Err(CoreError::StockInvariant(format!(
                "on_hand {on_hand}, reserved {reserved}"
            )));
        }
        Ok(BatchStock { on_hand, reserved })
    }

    #[inline]
    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    #[inline]
    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    #[inline]
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    /// Holds `qty` more units for an order.
    pub fn reserve(&self, qty: i64) -> CoreResult<Self> {
        positive(qty)?;
        if qty > self.available() {
            return Err(CoreError::StockInvariant(format!(
                "cannot reserve {qty}, only {} free",
                self.available()
            )));
        }
        BatchStock::new(self.on_hand, self.reserved + qty)
    }

    /// Gives back `qty` reserved units without touching on-hand.
    pub fn release(&self, qty: i64) -> CoreResult<Self> {
        positive(qty)?;
        if qty > self.reserved {
            return Err(CoreError::StockInvariant(format!(
                "cannot release {qty}, only {} reserved",
                self.reserved
            )));
        }
        BatchStock::new(self.on_hand, self.reserved - qty)
    }

    /// Turns `qty` reserved units into a sale: both quantities drop.
    pub fn commit(&self, qty: i64) -> CoreResult<Self> {
        positive(qty)?;
        if qty > self.reserved {
            return Err(CoreError::StockInvariant(format!(
                "cannot commit {qty}, only {} reserved",
                self.reserved
            )));
        }
        BatchStock::new(self.on_hand - qty, self.reserved - qty)
    }

    /// Puts `qty` units back on the shelf (returned goods).
    pub fn restock(&self, qty: i64) -> CoreResult<Self> {
        positive(qty)?;
        let on_hand = self.on_hand.checked_add(qty).ok_or_else(|| {
            CoreError::StockInvariant(format!("restocking {qty} overflows on hand"))
        })?;
        BatchStock::new(on_hand, self.reserved)
    }

    /// Manual correction. On-hand may not drop below what is reserved.
    pub fn adjust(&self, delta: i64) -> CoreResult<Self> {
        let on_hand = self.on_hand.checked_add(delta).ok_or_else(|| {
            CoreError::StockInvariant(format!("adjusting by {delta} overflows on hand"))
        })?;
        if on_hand < self.reserved {
            return Err(CoreError::StockInvariant(format!(
                "adjusting by {delta} leaves {on_hand} on hand with {} reserved",
                self.reserved
            )));
        }
        BatchStock::new(on_hand, self.reserved)
    }
}

fn positive(qty: i64) -> CoreResult<()> {
    if qty <= 0 {
        return Err(CoreError::StockInvariant(format!(
            "quantity must be positive, got {qty}"
        )));
    }
    Ok(())
}

// =============================================================================
// FEFO Planning
// =============================================================================

/// Snapshot of one batch as seen by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCandidate {
    pub batch_id: String,
    pub expiry_date: Option<NaiveDate>,
    pub received_at: DateTime<Utc>,
    pub qty_on_hand: i64,
    pub qty_reserved: i64,
    pub is_available: bool,
}

impl BatchCandidate {
    /// Available candidate with the receipt time left at the epoch.
    pub fn new(
        batch_id: &str,
        expiry_date: Option<NaiveDate>,
        qty_on_hand: i64,
        qty_reserved: i64,
    ) -> Self {
        BatchCandidate {
            batch_id: batch_id.to_string(),
            expiry_date,
            received_at: DateTime::<Utc>::default(),
            qty_on_hand,
            qty_reserved,
            is_available: true,
        }
    }

    #[inline]
    pub fn free(&self) -> i64 {
        (self.qty_on_hand - self.qty_reserved).max(0)
    }

    pub fn is_sellable(&self, today: NaiveDate) -> bool {
        self.is_available && self.expiry_date.map_or(true, |d| d >= today) && self.free() > 0
    }
}

/// One slice of a reservation: `quantity` units held on `batch_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Allocation {
    pub batch_id: String,
    pub quantity: i64,
}

/// FEFO comparison: dated before undated, earlier expiry, older receipt, id.
pub fn fefo_cmp(a: &BatchCandidate, b: &BatchCandidate) -> Ordering {
    let expiry_key = |c: &BatchCandidate| (c.expiry_date.is_none(), c.expiry_date);
    expiry_key(a)
        .cmp(&expiry_key(b))
        .then_with(|| a.received_at.cmp(&b.received_at))
        .then_with(|| a.batch_id.cmp(&b.batch_id))
}

/// Sellable candidates in the order reservations draw from them.
pub fn fefo_order(candidates: &[BatchCandidate], today: NaiveDate) -> Vec<&BatchCandidate> {
    let mut sellable: Vec<&BatchCandidate> =
        candidates.iter().filter(|c| c.is_sellable(today)).collect();
    sellable.sort_by(|a, b| fefo_cmp(a, b));
    sellable
}

/// Earliest-expiring batch among those an order line was allocated from.
///
/// Used at packing time to fill `order_items.batch_id` when a line was
/// split across batches. Availability and expiry are ignored here since the
/// units are already held.
pub fn primary_batch(allocated: &[BatchCandidate]) -> Option<&BatchCandidate> {
    allocated.iter().min_by(|a, b| fefo_cmp(a, b))
}

/// Plans a reservation of `quantity` units of one variant in one branch.
///
/// ## Rules
/// - Draws from the earliest-expiring sellable batch first
/// - Splits across as many batches as needed
/// - All-or-nothing: if the free total is short, returns
///   [`CoreError::InsufficientStock`] and no allocation
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use pharma_core::reservation::{plan_reservation, BatchCandidate};
/// use pharma_core::CoreError;
///
/// let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
/// let candidates = vec![BatchCandidate::new("a", None, 3, 1)];
///
/// let err = plan_reservation("v-1", &candidates, 5, today).unwrap_err();
/// assert!(matches!(err, CoreError::InsufficientStock { available: 2, requested: 5, .. }));
/// ```
pub fn plan_reservation(
    variant_id: &str,
    candidates: &[BatchCandidate],
    quantity: i64,
    today: NaiveDate,
) -> CoreResult<Vec<Allocation>> {
    validate_quantity(quantity)?;

    let ordered = fefo_order(candidates, today);
    let available: i64 = ordered.iter().map(|c| c.free()).sum();
    if available < quantity {
        return Err(CoreError::InsufficientStock {
            variant_id: variant_id.to_string(),
            available,
            requested: quantity,
        });
    }

    let mut remaining = quantity;
    let mut plan = Vec::new();
    for candidate in ordered {
        if remaining == 0 {
            break;
        }
        let take = candidate.free().min(remaining);
        plan.push(Allocation {
            batch_id: candidate.batch_id.clone(),
            quantity: take,
        });
        remaining -= take;
    }

    Ok(plan)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()
    }

    #[test]
    fn test_stock_invariant_on_construction() {
        assert!(BatchStock::new(5, 5).is_ok());
        assert!(BatchStock::new(5, 6).is_err());
        assert!(BatchStock::new(-1, 0).is_err());
        assert!(BatchStock::new(3, -1).is_err());
    }

    #[test]
    fn test_reserve_release_commit_restock() {
        let stock = BatchStock::new(10, 0).unwrap();

        let stock = stock.reserve(4).unwrap();
        assert_eq!((stock.on_hand(), stock.reserved(), stock.available()), (10, 4, 6));

        let stock = stock.release(1).unwrap();
        assert_eq!(stock.reserved(), 3);

        let stock = stock.commit(3).unwrap();
        assert_eq!((stock.on_hand(), stock.reserved()), (7, 0));

        let stock = stock.restock(3).unwrap();
        assert_eq!(stock.on_hand(), 10);
    }

    #[test]
    fn test_stock_rejects_overdraw() {
        let stock = BatchStock::new(5, 2).unwrap();
        assert!(stock.reserve(4).is_err());
        assert!(stock.release(3).is_err());
        assert!(stock.commit(3).is_err());
        assert!(stock.reserve(0).is_err());
        assert!(stock.adjust(-4).is_err());
        assert_eq!(stock.adjust(-3).unwrap().on_hand(), 2);
    }

    #[test]
    fn test_stock_arithmetic_overflow_is_rejected() {
        let stock = BatchStock::new(5, 0).unwrap();
        assert!(matches!(stock.adjust(i64::MAX), Err(CoreError::StockInvariant(_))));
        assert!(matches!(stock.restock(i64::MAX), Err(CoreError::StockInvariant(_))));
    }

    #[test]
    fn test_plan_prefers_earliest_expiry() {
        let candidates = vec![
            BatchCandidate::new("undated", None, 50, 0),
            BatchCandidate::new("late", date(2027, 1, 1), 10, 0),
            BatchCandidate::new("early", date(2026, 2, 1), 3, 1),
        ];

        let plan = plan_reservation("v", &candidates, 6, today()).unwrap();
        assert_eq!(
            plan,
            vec![
                Allocation { batch_id: "early".to_string(), quantity: 2 },
                Allocation { batch_id: "late".to_string(), quantity: 4 },
            ]
        );
    }

    #[test]
    fn test_plan_falls_back_to_undated() {
        let candidates = vec![
            BatchCandidate::new("undated", None, 50, 0),
            BatchCandidate::new("dated", date(2026, 5, 1), 1, 0),
        ];

        let plan = plan_reservation("v", &candidates, 3, today()).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].batch_id, "dated");
        assert_eq!(plan[1].batch_id, "undated");
        assert_eq!(plan[1].quantity, 2);
    }

    #[test]
    fn test_plan_skips_expired_and_unavailable() {
        let mut off = BatchCandidate::new("off", date(2026, 1, 20), 10, 0);
        off.is_available = false;
        let candidates = vec![
            BatchCandidate::new("expired", date(2026, 1, 9), 10, 0),
            BatchCandidate::new("expires-today", date(2026, 1, 10), 1, 0),
            off,
        ];

        let plan = plan_reservation("v", &candidates, 1, today()).unwrap();
        assert_eq!(plan, vec![Allocation { batch_id: "expires-today".to_string(), quantity: 1 }]);

        let err = plan_reservation("v", &candidates, 2, today()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 1, requested: 2, .. }
        ));
    }

    #[test]
    fn test_plan_tie_breaks_on_receipt_then_id() {
        let mut newer = BatchCandidate::new("a-newer", date(2026, 6, 1), 5, 0);
        newer.received_at = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        let mut older = BatchCandidate::new("z-older", date(2026, 6, 1), 5, 0);
        older.received_at = Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap();

        let plan = plan_reservation("v", &[newer, older], 1, today()).unwrap();
        assert_eq!(plan[0].batch_id, "z-older");

        let same = vec![
            BatchCandidate::new("b", date(2026, 6, 1), 5, 0),
            BatchCandidate::new("a", date(2026, 6, 1), 5, 0),
        ];
        let plan = plan_reservation("v", &same, 1, today()).unwrap();
        assert_eq!(plan[0].batch_id, "a");
    }

    #[test]
    fn test_plan_rejects_bad_quantity() {
        let candidates = vec![BatchCandidate::new("a", None, 5, 0)];
        assert!(matches!(
            plan_reservation("v", &candidates, 0, today()),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_primary_batch_is_earliest_expiry() {
        let allocated = vec![
            BatchCandidate::new("late", date(2027, 1, 1), 5, 5),
            BatchCandidate::new("early", date(2026, 3, 1), 2, 2),
        ];
        assert_eq!(primary_batch(&allocated).unwrap().batch_id, "early");
        assert!(primary_batch(&[]).is_none());
    }
}
