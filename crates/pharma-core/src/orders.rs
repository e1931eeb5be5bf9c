//! # Order Types
//!
//! Carts, orders, allocations, shipments, reviews and the state machines
//! that govern them.
//!
//! ## Order Status Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   pending ──► confirmed ──► packed ──► shipped ──► delivered           │
//! │      │            │            │                                        │
//! │      └────────────┴────────────┴──────► cancelled                       │
//! │                                                                         │
//! │   pending / confirmed : stock is RESERVED (OrderAllocation rows)        │
//! │   packed and later    : stock is COMMITTED (sale movements written)     │
//! │                                                                         │
//! │   cancel before pack  → Compensation::Release  (reserved -= n)          │
//! │   cancel after pack   → Compensation::Restock  (on_hand += n)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Payment Status Machine
//! ```text
//!   unpaid ──► paid ──► refunded
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::validation::{
    validate_name, validate_price_cents, validate_quantity, validate_rating, validate_text,
    validate_uuid, ValidationResult,
};

// =============================================================================
// Order Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Packed,
    Shipped,
    Delivered,
    Cancelled,
}

/// What cancelling an order in a given status does to its stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// Units are still only held: drop the reservation.
    Release,
    /// Units already left the shelf: put them back with an adjustment.
    Restock,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Packed => "packed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Packed)
                | (Packed, Shipped)
                | (Shipped, Delivered)
                | (Pending | Confirmed | Packed, Cancelled)
        )
    }

    /// Returns `next` if the move is allowed.
    pub fn transition(&self, next: OrderStatus) -> CoreResult<OrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::transition("Order", self, next))
        }
    }

    /// Stock compensation required to cancel from this status.
    pub fn cancellation(&self) -> CoreResult<Compensation> {
        match self {
            OrderStatus::Pending | OrderStatus::Confirmed => Ok(Compensation::Release),
            OrderStatus::Packed => Ok(Compensation::Restock),
            other => Err(CoreError::transition("Order", other, OrderStatus::Cancelled)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

// =============================================================================
// Payment Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn transition(&self, next: PaymentStatus) -> CoreResult<PaymentStatus> {
        match (self, next) {
            (PaymentStatus::Unpaid, PaymentStatus::Paid)
            | (PaymentStatus::Paid, PaymentStatus::Refunded) => Ok(next),
            _ => Err(CoreError::transition("Payment", self, next)),
        }
    }

    /// Payment status after the order is cancelled.
    pub fn after_cancel(&self) -> PaymentStatus {
        match self {
            PaymentStatus::Paid => PaymentStatus::Refunded,
            other => *other,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Unpaid
    }
}

// =============================================================================
// Shipment Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ShipmentStatus {
    Ready,
    InTransit,
    Delivered,
    Failed,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Ready => "ready",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Failed => "failed",
        }
    }

    pub fn transition(&self, next: ShipmentStatus) -> CoreResult<ShipmentStatus> {
        use ShipmentStatus::*;
        match (self, next) {
            (Ready, InTransit) | (InTransit, Delivered) | (Ready | InTransit, Failed) => Ok(next),
            _ => Err(CoreError::transition("Shipment", self, next)),
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A customer's cart. One per customer, bound to the branch chosen at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Cart {
    pub id: String,
    pub customer_id: String,
    pub branch_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A line in a cart. The price is frozen when the variant is first added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CartItem {
    pub id: String,
    pub cart_id: String,
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price_snapshot_cents: i64,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_snapshot_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

/// Cart with its lines and running subtotal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartView {
    pub cart: Cart,
    pub items: Vec<CartItem>,
    pub subtotal: Money,
}

impl CartView {
    pub fn new(cart: Cart, items: Vec<CartItem>) -> Self {
        let subtotal = items.iter().map(CartItem::line_total).sum();
        CartView {
            cart,
            items,
            subtotal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateCart {
    pub branch_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AddCartItem {
    pub variant_id: String,
    pub quantity: i64,
}

impl AddCartItem {
    pub fn validated(self) -> ValidationResult<Self> {
        validate_uuid("variant_id", &self.variant_id)?;
        validate_quantity(self.quantity)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateCartItem {
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Checkout {
    #[serde(default)]
    pub shipping_address_id: Option<String>,
    #[serde(default)]
    pub shipping_fee_cents: i64,
}

impl Checkout {
    pub fn validated(self) -> ValidationResult<Self> {
        if let Some(address) = &self.shipping_address_id {
            validate_uuid("shipping_address_id", address)?;
        }
        validate_price_cents("shipping_fee_cents", self.shipping_fee_cents)?;
        Ok(self)
    }
}

// =============================================================================
// Order
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub branch_id: String,
    /// `None` for in-store pickup.
    pub shipping_address_id: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Item total plus shipping fee.
    pub total_cents: i64,
    pub shipping_fee_cents: i64,
    #[ts(as = "String")]
    pub placed_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn shipping_fee(&self) -> Money {
        Money::from_cents(self.shipping_fee_cents)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Set at packing time.
    pub batch_id: Option<String>,
}

impl OrderItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// Units of one order item held on one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderAllocation {
    pub id: String,
    pub order_item_id: String,
    pub batch_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shipment {
    pub id: String,
    pub order_id: String,
    pub tracking_number: Option<String>,
    pub status: ShipmentStatus,
    #[ts(as = "String")]
    pub shipped_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Order with everything the order page shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub allocations: Vec<OrderAllocation>,
    pub shipment: Option<Shipment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShipOrder {
    #[serde(default)]
    pub tracking_number: Option<String>,
}

impl ShipOrder {
    pub fn validated(mut self) -> ValidationResult<Self> {
        self.tracking_number = match self.tracking_number.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(t) => Some(validate_name("tracking_number", t, 100)?),
        };
        Ok(self)
    }
}

/// Sum of line totals plus the shipping fee, overflow-checked.
pub fn order_total(lines: &[(i64, i64)], shipping_fee: Money) -> CoreResult<Money> {
    let overflow = || {
        CoreError::Validation(ValidationError::OutOfRange {
            field: "total".to_string(),
            min: 0,
            max: i64::MAX,
        })
    };

    let mut total = shipping_fee;
    for (unit_price_cents, quantity) in lines {
        let line = unit_price_cents.checked_mul(*quantity).ok_or_else(overflow)?;
        total = total
            .checked_add(Money::from_cents(line))
            .ok_or_else(overflow)?;
    }
    Ok(total)
}

// =============================================================================
// Review
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Review {
    pub id: String,
    pub customer_id: String,
    pub variant_id: String,
    pub rating: i64,
    pub comment: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReviewInput {
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

impl ReviewInput {
    pub fn validated(mut self) -> ValidationResult<Self> {
        validate_rating(self.rating)?;
        self.comment = validate_text("comment", &self.comment, 2_000)?;
        Ok(self)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
