//! # Cart Repository
//!
//! One cart per customer, bound to the branch chosen when it was created.
//!
//! ```text
//! add_item(variant, 2) ──► first sellable batch (FEFO) ──► price snapshot
//!         │
//!         ├── new variant      → INSERT line
//!         └── existing variant → quantity += 2 (snapshot kept)
//! ```
//! Prices are frozen on the line; stock is only reserved at checkout.

use chrono::Utc;
use pharma_core::reservation::fefo_order;
use pharma_core::validation::{validate_quantity, validate_uuid};
use pharma_core::{
    AddCartItem, Cart, CartItem, CartView, CoreError, CreateCart, InventoryBatch, UpdateCartItem,
    MAX_CART_ITEMS,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{generate_id, stock};
use crate::error::{DbError, DbResult};

/// Repository for customer carts.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// The customer's cart with its lines and subtotal.
    pub async fn get_view(&self, customer_id: &str) -> DbResult<CartView> {
        let mut conn = self.pool.acquire().await?;
        let cart = find_cart(&mut conn, customer_id)
            .await?
            .ok_or_else(|| DbError::not_found("Cart", customer_id))?;
        let items = load_items(&mut conn, &cart.id).await?;
        Ok(CartView::new(cart, items))
    }

    /// Opens a cart on a branch. A customer holds at most one cart.
    pub async fn create(&self, customer_id: &str, input: CreateCart) -> DbResult<CartView> {
        validate_uuid("branch_id", &input.branch_id)?;
        let now = Utc::now();
        let cart = Cart {
            id: generate_id(),
            customer_id: customer_id.to_string(),
            branch_id: input.branch_id,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO carts (id, customer_id, branch_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&cart.id)
        .bind(&cart.customer_id)
        .bind(&cart.branch_id)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;

        info!(cart_id = %cart.id, customer_id, branch_id = %cart.branch_id, "Cart created");
        Ok(CartView::new(cart, Vec::new()))
    }

    /// Adds a variant, or increases the quantity of an existing line.
    ///
    /// ## Errors
    /// - `NotStocked` when the cart's branch has no sellable batch of it
    /// - `CartTooLarge` when a new line would exceed the line limit
    /// - `Validation` when the merged quantity exceeds the per-line maximum
    pub async fn add_item(&self, customer_id: &str, input: AddCartItem) -> DbResult<CartView> {
        let input = input.validated()?;
        let today = Utc::now().date_naive();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let cart = touch_cart(&mut *tx, customer_id).await?;
        let items = load_items(&mut *tx, &cart.id).await?;

        if let Some(line) = items.iter().find(|i| i.variant_id == input.variant_id) {
            let quantity = line.quantity + input.quantity;
            validate_quantity(quantity)?;
            sqlx::query("UPDATE cart_items SET quantity = ? WHERE id = ?")
                .bind(quantity)
                .bind(&line.id)
                .execute(&mut *tx)
                .await?;
            debug!(cart_id = %cart.id, variant_id = %input.variant_id, quantity, "Cart line merged");
        } else {
            if items.len() >= MAX_CART_ITEMS {
                return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS }.into());
            }

            let batches = stock::load_batches(&mut *tx, &cart.branch_id, &input.variant_id).await?;
            let price = snapshot_price(&batches, today).ok_or_else(|| CoreError::NotStocked {
                variant_id: input.variant_id.clone(),
                branch_id: cart.branch_id.clone(),
            })?;

            sqlx::query(
                r#"
                INSERT INTO cart_items (id, cart_id, variant_id, quantity, unit_price_snapshot_cents, added_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(generate_id())
            .bind(&cart.id)
            .bind(&input.variant_id)
            .bind(input.quantity)
            .bind(price)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            debug!(cart_id = %cart.id, variant_id = %input.variant_id, price, "Cart line added");
        }

        let items = load_items(&mut *tx, &cart.id).await?;
        tx.commit().await?;
        Ok(CartView::new(cart, items))
    }

    /// Sets the quantity of an existing line.
    pub async fn update_item(
        &self,
        customer_id: &str,
        variant_id: &str,
        input: UpdateCartItem,
    ) -> DbResult<CartView> {
        validate_quantity(input.quantity)?;
        let mut tx = self.pool.begin().await?;
        let cart = touch_cart(&mut *tx, customer_id).await?;

        let rows = sqlx::query("UPDATE cart_items SET quantity = ? WHERE cart_id = ? AND variant_id = ?")
            .bind(input.quantity)
            .bind(&cart.id)
            .bind(variant_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(DbError::not_found("CartItem", variant_id));
        }

        let items = load_items(&mut *tx, &cart.id).await?;
        tx.commit().await?;
        Ok(CartView::new(cart, items))
    }

    pub async fn remove_item(&self, customer_id: &str, variant_id: &str) -> DbResult<CartView> {
        let mut tx = self.pool.begin().await?;
        let cart = touch_cart(&mut *tx, customer_id).await?;

        let rows = sqlx::query("DELETE FROM cart_items WHERE cart_id = ? AND variant_id = ?")
            .bind(&cart.id)
            .bind(variant_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(DbError::not_found("CartItem", variant_id));
        }

        let items = load_items(&mut *tx, &cart.id).await?;
        tx.commit().await?;
        Ok(CartView::new(cart, items))
    }

    /// Empties the cart but keeps it, and its branch, for the next order.
    pub async fn clear(&self, customer_id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let cart = touch_cart(&mut *tx, customer_id).await?;
        clear_items(&mut *tx, &cart.id).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Sale price of the batch a reservation would draw from first.
fn snapshot_price(batches: &[InventoryBatch], today: chrono::NaiveDate) -> Option<i64> {
    let candidates: Vec<_> = batches.iter().map(InventoryBatch::candidate).collect();
    let first = fefo_order(&candidates, today).into_iter().next()?;
    batches
        .iter()
        .find(|b| b.id == first.batch_id)
        .map(|b| b.sale_price_cents)
}

pub(crate) async fn find_cart(
    conn: &mut SqliteConnection,
    customer_id: &str,
) -> DbResult<Option<Cart>> {
    let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE customer_id = ?")
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(cart)
}

/// Bumps `updated_at` and returns the cart. Opening a transaction with this
/// write takes the write lock before anything is read.
pub(crate) async fn touch_cart(conn: &mut SqliteConnection, customer_id: &str) -> DbResult<Cart> {
    sqlx::query_as::<_, Cart>("UPDATE carts SET updated_at = ? WHERE customer_id = ? RETURNING *")
        .bind(Utc::now())
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Cart", customer_id))
}

pub(crate) async fn load_items(conn: &mut SqliteConnection, cart_id: &str) -> DbResult<Vec<CartItem>> {
    let items = sqlx::query_as::<_, CartItem>(
        "SELECT * FROM cart_items WHERE cart_id = ? ORDER BY added_at, id",
    )
    .bind(cart_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

pub(crate) async fn clear_items(conn: &mut SqliteConnection, cart_id: &str) -> DbResult<()> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
