//! # pharma-core: Pure Business Logic for the Pharmacy Backend
//!
//! Everything that decides *what should happen* to stock and orders lives
//! here as plain functions over plain data. The database crate decides *how*
//! it is persisted.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Pharma Commerce Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/api (axum)                              │   │
//! │  │    /variants  /batches  /cart/checkout  /orders/{id}/pack      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ pharma-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌─────────────┐ ┌───────────┐  │   │
//! │  │   │  catalog  │  │ inventory │  │ reservation │ │  orders   │  │   │
//! │  │   │  Product  │  │   Batch   │  │  FEFO plan  │ │  Status   │  │   │
//! │  │   │  Variant  │  │  Movement │  │  BatchStock │ │  machine  │  │   │
//! │  │   └───────────┘  └───────────┘  └─────────────┘ └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO CLOCK READS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 pharma-db (Database Layer)                      │   │
//! │  │         SQLite queries, migrations, transactional workflows     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`catalog`] - Manufacturers, dosage forms, ingredients, products, variants
//! - [`inventory`] - Companies, branches, batches, movements, predictions
//! - [`reservation`] - Batch stock arithmetic and FEFO reservation planning
//! - [`orders`] - Carts, orders, shipments, reviews and their state machines
//! - [`users`] - User profiles and addresses
//! - [`money`] - Money type with integer arithmetic
//! - [`validation`] - Input validation rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use pharma_core::reservation::{plan_reservation, BatchCandidate};
//!
//! let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
//! let candidates = vec![
//!     BatchCandidate::new("late", NaiveDate::from_ymd_opt(2027, 6, 1), 10, 0),
//!     BatchCandidate::new("early", NaiveDate::from_ymd_opt(2026, 3, 1), 4, 0),
//! ];
//!
//! // Earliest expiry is drained first, the rest spills into the next batch.
//! let plan = plan_reservation("variant-1", &candidates, 6, today).unwrap();
//! assert_eq!(plan[0].batch_id, "early");
//! assert_eq!(plan[0].quantity, 4);
//! assert_eq!(plan[1].quantity, 2);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod error;
pub mod inventory;
pub mod money;
pub mod orders;
pub mod reservation;
pub mod users;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use catalog::*;
pub use error::{CoreError, CoreResult, ValidationError};
pub use inventory::*;
pub use money::Money;
pub use orders::*;
pub use reservation::{Allocation, BatchCandidate, BatchStock};
pub use users::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct variants in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single variant in a cart or order line.
///
/// ## Business Reason
/// Guards against typing 1000 instead of 10 on a dispensing order.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Default page size for list endpoints.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Hard cap on page size for list endpoints.
pub const MAX_LIST_LIMIT: i64 = 500;
