//! # pharma-db: Database Layer for the Pharmacy Backend
//!
//! SQLite persistence for the catalog, inventory batches, carts, orders and
//! user profiles, using sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Request Data Flow                                │
//! │                                                                         │
//! │  HTTP handler (POST /cart/checkout)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     pharma-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │   │   │
//! │  │   │               │    │ CatalogRepo   │    │ 001_users    │   │   │
//! │  │   │ SqlitePool    │◄───│ InventoryRepo │    │ 002_catalog  │   │   │
//! │  │   │ retry_busy    │    │ OrderRepo     │    │ ...          │   │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘   │   │
//! │  │                                │ plan_reservation (pharma-core) │   │
//! │  └────────────────────────────────┼────────────────────────────────┘   │
//! │                                   ▼                                     │
//! │                          SQLite (WAL, foreign keys on)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation, configuration and busy retries
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pharma_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("pharma.db")).await?;
//!
//! let stock = db.inventory().availability(&branch_id, &variant_id).await?;
//! let order = db.orders().checkout(&customer_id, checkout).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{retry_busy, Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cart::CartRepository;
pub use repository::catalog::CatalogRepository;
pub use repository::inventory::InventoryRepository;
pub use repository::order::OrderRepository;
pub use repository::review::ReviewRepository;
pub use repository::user::UserRepository;
pub use repository::variant::VariantRepository;
