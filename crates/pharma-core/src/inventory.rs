//! # Inventory Types
//!
//! Companies and branches that hold stock, the batches they hold, the
//! append-only movement log and demand predictions.
//!
//! ## Batch Quantities
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  InventoryBatch  (one lot, one expiry, one price)                       │
//! │                                                                         │
//! │   qty_on_hand  ████████████████████████████░░░░░░░░  (physical units)  │
//! │   qty_reserved ██████████░░░░░░░░░░░░░░░░░░░░░░░░░░  (held by orders)  │
//! │                ◄─reserved─►◄──────── available ─────►                   │
//! │                                                                         │
//! │   Invariant: 0 <= qty_reserved <= qty_on_hand                           │
//! │                                                                         │
//! │   receive  → on_hand += n        movement: purchase   (+n)             │
//! │   reserve  → reserved += n       (no movement)                          │
//! │   release  → reserved -= n       (no movement)                          │
//! │   pack     → both -= n           movement: sale       (-n)             │
//! │   adjust   → on_hand += delta    movement: adjustment (delta)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::reservation::{BatchCandidate, BatchStock};
use crate::validation::{
    validate_horizon_days, validate_name, validate_predicted_demand, validate_price_cents,
    validate_adjustment_delta, validate_receipt_quantity, validate_text, validate_uuid, ValidationResult,
};

// =============================================================================
// Company & Branch
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CompanyKind {
    Pharmacy,
    Supplier,
}

impl CompanyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyKind::Pharmacy => "pharmacy",
            CompanyKind::Supplier => "supplier",
        }
    }
}

impl fmt::Display for CompanyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pharmacy chain that owns branches, or a supplier that delivers batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Company {
    pub id: String,
    pub kind: CompanyKind,
    pub name: String,
    pub owner_id: String,
    pub license_no: Option<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Company {
    /// Fails unless this company is of the expected kind.
    pub fn ensure_kind(&self, expected: CompanyKind) -> CoreResult<()> {
        if self.kind != expected {
            return Err(CoreError::WrongCompanyKind {
                company_id: self.id.clone(),
                expected: expected.as_str(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompanyInput {
    pub kind: CompanyKind,
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub license_no: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CompanyInput {
    pub fn validated(mut self) -> ValidationResult<Self> {
        self.name = validate_name("name", &self.name, 255)?;
        self.owner_id = validate_name("owner_id", &self.owner_id, 64)?;
        self.license_no = match self.license_no.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(l) => Some(validate_name("license_no", l, 100)?),
        };
        Ok(self)
    }
}

/// A physical pharmacy location. Stock is always held per branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Branch {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub address_id: Option<String>,
    pub shipping_available: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BranchInput {
    pub company_id: String,
    pub name: String,
    #[serde(default)]
    pub address_id: Option<String>,
    #[serde(default = "default_true")]
    pub shipping_available: bool,
}

impl BranchInput {
    pub fn validated(mut self) -> ValidationResult<Self> {
        validate_uuid("company_id", &self.company_id)?;
        self.name = validate_name("name", &self.name, 255)?;
        if let Some(address) = &self.address_id {
            validate_uuid("address_id", address)?;
        }
        Ok(self)
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Inventory Batch
// =============================================================================

/// A lot of one variant held by one branch.
///
/// Created on stock receipt, never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryBatch {
    pub id: String,
    pub branch_id: String,
    pub variant_id: String,
    pub supplier_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub qty_on_hand: i64,
    pub qty_reserved: i64,
    pub cost_price_cents: i64,
    pub sale_price_cents: i64,
    pub is_available: bool,
    #[ts(as = "String")]
    pub received_at: DateTime<Utc>,
}

impl InventoryBatch {
    /// Units not held by any reservation.
    #[inline]
    pub fn available(&self) -> i64 {
        self.qty_on_hand - self.qty_reserved
    }

    /// A batch is expired once its expiry date is strictly before today.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|d| d < today)
    }

    /// Whether new reservations may draw from this batch.
    pub fn is_sellable(&self, today: NaiveDate) -> bool {
        self.is_available && !self.is_expired(today) && self.available() > 0
    }

    #[inline]
    pub fn cost_price(&self) -> Money {
        Money::from_cents(self.cost_price_cents)
    }

    #[inline]
    pub fn sale_price(&self) -> Money {
        Money::from_cents(self.sale_price_cents)
    }

    /// Checked quantity view used for reserve/release/commit arithmetic.
    pub fn stock(&self) -> CoreResult<BatchStock> {
        BatchStock::new(self.qty_on_hand, self.qty_reserved)
    }

    /// Snapshot for the FEFO planner.
    pub fn candidate(&self) -> BatchCandidate {
        BatchCandidate {
            batch_id: self.id.clone(),
            expiry_date: self.expiry_date,
            received_at: self.received_at,
            qty_on_hand: self.qty_on_hand,
            qty_reserved: self.qty_reserved,
            is_available: self.is_available,
        }
    }
}

/// Stock receipt payload: creates one batch and one `purchase` movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiveStock {
    pub branch_id: String,
    pub variant_id: String,
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub qty: i64,
    pub cost_price_cents: i64,
    pub sale_price_cents: i64,
}

impl ReceiveStock {
    pub fn validated(self) -> ValidationResult<Self> {
        validate_uuid("branch_id", &self.branch_id)?;
        validate_uuid("variant_id", &self.variant_id)?;
        if let Some(supplier) = &self.supplier_id {
            validate_uuid("supplier_id", supplier)?;
        }
        validate_receipt_quantity(self.qty)?;
        validate_price_cents("cost_price_cents", self.cost_price_cents)?;
        validate_price_cents("sale_price_cents", self.sale_price_cents)?;
        Ok(self)
    }
}

/// Aggregate stock of one variant in one branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockLevel {
    /// Physical units across all batches.
    pub on_hand: i64,
    /// Units held by open reservations.
    pub reserved: i64,
    /// Unreserved units in sellable (available, unexpired) batches.
    pub available: i64,
}

// =============================================================================
// Inventory Movement
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum MovementKind {
    /// Stock received from a supplier.
    Purchase,
    /// Stock leaving with a packed order.
    Sale,
    /// Manual correction, or goods returned after packing.
    Adjustment,
}

impl MovementKind {
    /// Checks that a delta has the sign this kind of movement requires.
    ///
    /// ```text
    /// purchase   → delta > 0
    /// sale       → delta < 0
    /// adjustment → delta != 0
    /// ```
    pub fn check_delta(&self, delta: i64) -> ValidationResult<()> {
        let ok = match self {
            MovementKind::Purchase => delta > 0,
            MovementKind::Sale => delta < 0,
            MovementKind::Adjustment => delta != 0,
        };
        if ok {
            Ok(())
        } else {
            Err(ValidationError::InvalidFormat {
                field: "delta_qty".to_string(),
                reason: format!("{delta} is not valid for a {self} movement"),
            })
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MovementKind::Purchase => "purchase",
            MovementKind::Sale => "sale",
            MovementKind::Adjustment => "adjustment",
        })
    }
}

/// Immutable audit row; one per stock-affecting event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryMovement {
    pub id: String,
    pub batch_id: String,
    pub kind: MovementKind,
    pub delta_qty: i64,
    pub reference: Option<String>,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Manual stock adjustment payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustStock {
    pub delta: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AdjustStock {
    pub fn validated(mut self) -> ValidationResult<Self> {
        validate_adjustment_delta(self.delta)?;
        MovementKind::Adjustment.check_delta(self.delta)?;
        self.reason = match self.reason.as_deref() {
            Some(r) => Some(validate_text("reason", r, 255)?).filter(|r| !r.is_empty()),
            None => None,
        };
        Ok(self)
    }
}

// =============================================================================
// Prediction
// =============================================================================

/// Forecast demand for a variant in a branch over a horizon.
///
/// Unique per (branch, variant, horizon): a newer model run overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Prediction {
    pub id: String,
    pub branch_id: String,
    pub variant_id: String,
    pub horizon_days: i64,
    pub predicted_demand: f64,
    pub model_version: String,
    #[ts(as = "String")]
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PredictionInput {
    pub branch_id: String,
    pub variant_id: String,
    pub horizon_days: i64,
    pub predicted_demand: f64,
    pub model_version: String,
}

impl PredictionInput {
    pub fn validated(mut self) -> ValidationResult<Self> {
        validate_uuid("branch_id", &self.branch_id)?;
        validate_uuid("variant_id", &self.variant_id)?;
        validate_horizon_days(self.horizon_days)?;
        validate_predicted_demand(self.predicted_demand)?;
        self.model_version = validate_name("model_version", &self.model_version, 50)?;
        Ok(self)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
