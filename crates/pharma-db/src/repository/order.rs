//! # Order Repository
//!
//! Checkout and the order workflow. Every operation is one SQLite
//! transaction; stock changes go through the guarded helpers in `stock`.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  checkout ─► PENDING ─confirm─► CONFIRMED ─pack─► PACKED ─ship► SHIPPED │
//! │                 │                   │               │               │   │
//! │          cancel │ expire     cancel │        cancel │       deliver │   │
//! │                 ▼                   ▼               ▼               ▼   │
//! │             CANCELLED           CANCELLED       CANCELLED     DELIVERED │
//! │           (release held)     (release held)  (restock + adj)            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stock Effects
//! | Step     | qty_reserved | qty_on_hand | Movement            |
//! |----------|--------------|-------------|---------------------|
//! | checkout | +n           |             |                     |
//! | pack     | -n           | -n          | sale (-n)           |
//! | cancel ¹ | -n           |             |                     |
//! | cancel ² |              | +n          | adjustment (+n)     |
//!
//! ¹ pending or confirmed, ² packed

use chrono::{DateTime, Utc};
use pharma_core::reservation::{plan_reservation, primary_batch};
use pharma_core::{
    order_total, Checkout, Compensation, CoreError, Money, MovementKind, Order, OrderAllocation,
    OrderDetail, OrderItem, OrderStatus, PaymentStatus, ShipOrder, Shipment, ShipmentStatus,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::cart::{clear_items, load_items, touch_cart};
use super::{generate_id, stock};
use crate::error::{DbError, DbResult};

/// Repository for orders and their fulfilment.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Turns the customer's cart into a pending order and reserves stock
    /// for every line, FEFO, possibly across several batches.
    ///
    /// ## All-or-Nothing
    /// ```text
    /// BEGIN
    ///   touch cart, insert order
    ///   for each cart line:
    ///     insert order item
    ///     plan FEFO ──► InsufficientStock? ──► ROLLBACK (nothing reserved)
    ///     reserve each slice (guarded UPDATE) + insert allocation
    ///   clear cart
    /// COMMIT
    /// ```
    pub async fn checkout(&self, customer_id: &str, input: Checkout) -> DbResult<OrderDetail> {
        let input = input.validated()?;
        let now = Utc::now();
        let today = now.date_naive();

        let mut tx = self.pool.begin().await?;

        let cart = touch_cart(&mut *tx, customer_id).await?;
        let lines = load_items(&mut *tx, &cart.id).await?;
        if lines.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }
        if let Some(address_id) = &input.shipping_address_id {
            let owned: Option<String> =
                sqlx::query_scalar("SELECT id FROM addresses WHERE id = ? AND user_id = ?")
                    .bind(address_id)
                    .bind(customer_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if owned.is_none() {
                return Err(DbError::not_found("Address", address_id.as_str()));
            }
        }

        let priced: Vec<(i64, i64)> = lines
            .iter()
            .map(|l| (l.unit_price_snapshot_cents, l.quantity))
            .collect();
        let total = order_total(&priced, Money::from_cents(input.shipping_fee_cents))?;

        let order_id = generate_id();
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, branch_id, shipping_address_id, status, payment_status,
                total_cents, shipping_fee_cents, placed_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order_id)
        .bind(customer_id)
        .bind(&cart.branch_id)
        .bind(&input.shipping_address_id)
        .bind(OrderStatus::Pending)
        .bind(PaymentStatus::Unpaid)
        .bind(total.cents())
        .bind(input.shipping_fee_cents)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for line in &lines {
            let item_id = generate_id();
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, variant_id, quantity, unit_price_cents, batch_id)
                VALUES (?, ?, ?, ?, ?, NULL)
                "#,
            )
            .bind(&item_id)
            .bind(&order_id)
            .bind(&line.variant_id)
            .bind(line.quantity)
            .bind(line.unit_price_snapshot_cents)
            .execute(&mut *tx)
            .await?;

            let candidates = stock::load_candidates(&mut *tx, &cart.branch_id, &line.variant_id).await?;
            let plan = plan_reservation(&line.variant_id, &candidates, line.quantity, today)?;

            for slice in &plan {
                stock::reserve(&mut *tx, &slice.batch_id, slice.quantity).await?;
                sqlx::query(
                    "INSERT INTO order_allocations (id, order_item_id, batch_id, quantity) VALUES (?, ?, ?, ?)",
                )
                .bind(generate_id())
                .bind(&item_id)
                .bind(&slice.batch_id)
                .bind(slice.quantity)
                .execute(&mut *tx)
                .await?;
            }

            debug!(order_id = %order_id, variant_id = %line.variant_id, slices = plan.len(), "Line reserved");
        }

        clear_items(&mut *tx, &cart.id).await?;
        tx.commit().await?;

        info!(
            order_id = %order_id,
            customer_id,
            branch_id = %cart.branch_id,
            lines = lines.len(),
            total = %total,
            "Order placed"
        );
        self.detail(&order_id).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get(&self, id: &str) -> DbResult<Order> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))
    }

    /// Order with its items, allocations and shipment.
    pub async fn detail(&self, id: &str) -> DbResult<OrderDetail> {
        let order = self.get(id).await?;
        let mut conn = self.pool.acquire().await?;
        load_detail(&mut conn, order).await
    }

    /// Orders newest first, optionally for one customer.
    pub async fn list(
        &self,
        customer_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE (?1 IS NULL OR customer_id = ?1)
            ORDER BY placed_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(customer_id)
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // =========================================================================
    // Workflow
    // =========================================================================

    pub async fn confirm(&self, id: &str) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut *tx, id).await?;
        let next = order.status.transition(OrderStatus::Confirmed)?;
        let order = set_status(&mut *tx, id, next, order.payment_status).await?;
        tx.commit().await?;

        info!(order_id = id, "Order confirmed");
        Ok(order)
    }

    /// Converts every reservation of a confirmed order into a sale.
    ///
    /// Writes one `sale` movement per allocation and pins each item to its
    /// earliest-expiring allocated batch.
    pub async fn pack(&self, id: &str, actor: Option<&str>) -> DbResult<OrderDetail> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut *tx, id).await?;
        let next = order.status.transition(OrderStatus::Packed)?;

        let allocations = load_allocations(&mut *tx, id).await?;
        for allocation in &allocations {
            stock::commit(&mut *tx, &allocation.batch_id, allocation.quantity).await?;
            stock::record_movement(
                &mut *tx,
                &allocation.batch_id,
                MovementKind::Sale,
                -allocation.quantity,
                Some(id),
                actor,
                now,
            )
            .await?;
        }

        let items = load_items_of(&mut *tx, id).await?;
        for item in &items {
            let mut allocated = Vec::new();
            for allocation in allocations.iter().filter(|a| a.order_item_id == item.id) {
                if let Some(batch) = stock::get_batch(&mut *tx, &allocation.batch_id).await? {
                    allocated.push(batch.candidate());
                }
            }
            let Some(primary) = primary_batch(&allocated) else {
                return Err(DbError::Internal(format!("order item {} has no allocations", item.id)));
            };
            sqlx::query("UPDATE order_items SET batch_id = ? WHERE id = ?")
                .bind(&primary.batch_id)
                .bind(&item.id)
                .execute(&mut *tx)
                .await?;
        }

        let order = set_status(&mut *tx, id, next, order.payment_status).await?;
        let detail = load_detail(&mut *tx, order).await?;
        tx.commit().await?;

        info!(order_id = id, allocations = allocations.len(), actor = ?actor, "Order packed");
        Ok(detail)
    }

    /// Marks the order shipped and opens its shipment (`in_transit`).
    pub async fn ship(&self, id: &str, input: ShipOrder) -> DbResult<OrderDetail> {
        let input = input.validated()?;
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut *tx, id).await?;
        let next = order.status.transition(OrderStatus::Shipped)?;
        let shipment_status = ShipmentStatus::Ready.transition(ShipmentStatus::InTransit)?;

        sqlx::query(
            r#"
            INSERT INTO shipments (id, order_id, tracking_number, status, shipped_at, delivered_at)
            VALUES (?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(generate_id())
        .bind(id)
        .bind(&input.tracking_number)
        .bind(shipment_status)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let order = set_status(&mut *tx, id, next, order.payment_status).await?;
        let detail = load_detail(&mut *tx, order).await?;
        tx.commit().await?;

        info!(order_id = id, tracking = ?input.tracking_number, "Order shipped");
        Ok(detail)
    }

    pub async fn deliver(&self, id: &str) -> DbResult<OrderDetail> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut *tx, id).await?;
        let next = order.status.transition(OrderStatus::Delivered)?;

        let shipment = load_shipment(&mut *tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Shipment", id))?;
        let delivered = shipment.status.transition(ShipmentStatus::Delivered)?;

        sqlx::query("UPDATE shipments SET status = ?, delivered_at = ? WHERE id = ?")
            .bind(delivered)
            .bind(Utc::now())
            .bind(&shipment.id)
            .execute(&mut *tx)
            .await?;

        let order = set_status(&mut *tx, id, next, order.payment_status).await?;
        let detail = load_detail(&mut *tx, order).await?;
        tx.commit().await?;

        info!(order_id = id, "Order delivered");
        Ok(detail)
    }

    /// Cancels the order and compensates its stock.
    ///
    /// ## Compensation
    /// - pending / confirmed: reservations released, allocations removed
    /// - packed: units returned to their batches with `adjustment` movements
    /// - shipped / delivered: rejected with `InvalidTransition`
    ///
    /// A paid order becomes refunded.
    pub async fn cancel(&self, id: &str, actor: Option<&str>) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut *tx, id).await?;
        let order = cancel_locked(&mut *tx, order, actor).await?;
        tx.commit().await?;

        info!(order_id = id, payment = %order.payment_status, actor = ?actor, "Order cancelled");
        Ok(order)
    }

    /// Customer cancel: the owner only, and only while the order is pending.
    ///
    /// Ownership and status are checked under the order's write lock. Someone
    /// else's order is reported as missing.
    pub async fn cancel_pending(&self, id: &str, customer_id: &str) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut *tx, id).await?;
        if order.customer_id != customer_id {
            return Err(DbError::not_found("Order", id));
        }
        if order.status != OrderStatus::Pending {
            return Err(CoreError::transition("Order", order.status, OrderStatus::Cancelled).into());
        }
        let order = cancel_locked(&mut *tx, order, Some(customer_id)).await?;
        tx.commit().await?;

        info!(order_id = id, customer_id, "Order cancelled by customer");
        Ok(order)
    }

    pub async fn pay(&self, id: &str) -> DbResult<Order> {
        self.set_payment(id, PaymentStatus::Paid).await
    }

    pub async fn refund(&self, id: &str) -> DbResult<Order> {
        self.set_payment(id, PaymentStatus::Refunded).await
    }

    async fn set_payment(&self, id: &str, target: PaymentStatus) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut *tx, id).await?;
        if order.status == OrderStatus::Cancelled && target == PaymentStatus::Paid {
            return Err(CoreError::transition("Payment", order.payment_status, target).into());
        }
        let payment = order.payment_status.transition(target)?;
        let order = set_status(&mut *tx, id, order.status, payment).await?;
        tx.commit().await?;

        info!(order_id = id, payment = %payment, "Payment status changed");
        Ok(order)
    }

    // =========================================================================
    // Reservation Expiry
    // =========================================================================

    /// Cancels every pending order placed before `cutoff`, releasing its
    /// reservations. Orders confirmed in the meantime are left alone.
    ///
    /// Returns the number of orders cancelled.
    pub async fn expire_pending(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM orders WHERE status = ? AND placed_at < ? ORDER BY placed_at",
        )
        .bind(OrderStatus::Pending)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut expired = 0;
        for id in &ids {
            match self.expire_one(id).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(err) => warn!(order_id = %id, error = %err, "Could not expire order"),
            }
        }
        Ok(expired)
    }

    /// `Ok(false)` when the order left `pending` before the lock was taken.
    async fn expire_one(&self, id: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut *tx, id).await?;
        if order.status != OrderStatus::Pending {
            debug!(order_id = %id, status = %order.status, "Skipping order that moved on");
            return Ok(false);
        }
        cancel_locked(&mut *tx, order, None).await?;
        tx.commit().await?;
        Ok(true)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Bumps `updated_at` and returns the order. Taking the write lock first
/// keeps later reads in the same transaction consistent.
async fn lock_order(conn: &mut SqliteConnection, id: &str) -> DbResult<Order> {
    sqlx::query_as::<_, Order>("UPDATE orders SET updated_at = ? WHERE id = ? RETURNING *")
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Order", id))
}

async fn set_status(
    conn: &mut SqliteConnection,
    id: &str,
    status: OrderStatus,
    payment: PaymentStatus,
) -> DbResult<Order> {
    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = ?, payment_status = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(status)
    .bind(payment)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(order)
}

async fn cancel_locked(
    conn: &mut SqliteConnection,
    order: Order,
    actor: Option<&str>,
) -> DbResult<Order> {
    let next = order.status.transition(OrderStatus::Cancelled)?;
    let compensation = order.status.cancellation()?;
    let allocations = load_allocations(&mut *conn, &order.id).await?;

    match compensation {
        Compensation::Release => {
            for allocation in &allocations {
                stock::release(&mut *conn, &allocation.batch_id, allocation.quantity).await?;
            }
            sqlx::query(
                r#"
                DELETE FROM order_allocations
                WHERE order_item_id IN (SELECT id FROM order_items WHERE order_id = ?)
                "#,
            )
            .bind(&order.id)
            .execute(&mut *conn)
            .await?;
        }
        Compensation::Restock => {
            let now = Utc::now();
            for allocation in &allocations {
                stock::shift_on_hand(&mut *conn, &allocation.batch_id, allocation.quantity).await?;
                stock::record_movement(
                    &mut *conn,
                    &allocation.batch_id,
                    MovementKind::Adjustment,
                    allocation.quantity,
                    Some(&order.id),
                    actor,
                    now,
                )
                .await?;
            }
        }
    }

    debug!(order_id = %order.id, ?compensation, slices = allocations.len(), "Stock compensated");
    set_status(&mut *conn, &order.id, next, order.payment_status.after_cancel()).await
}

async fn load_allocations(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<Vec<OrderAllocation>> {
    let rows = sqlx::query_as::<_, OrderAllocation>(
        r#"
        SELECT a.* FROM order_allocations a
        JOIN order_items i ON i.id = a.order_item_id
        WHERE i.order_id = ?
        ORDER BY i.id, a.batch_id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

async fn load_items_of(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let rows = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ? ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

async fn load_shipment(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Option<Shipment>> {
    let shipment = sqlx::query_as::<_, Shipment>("SELECT * FROM shipments WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(shipment)
}

async fn load_detail(conn: &mut SqliteConnection, order: Order) -> DbResult<OrderDetail> {
    let items = load_items_of(&mut *conn, &order.id).await?;
    let allocations = load_allocations(&mut *conn, &order.id).await?;
    let shipment = load_shipment(&mut *conn, &order.id).await?;
    Ok(OrderDetail {
        order,
        items,
        allocations,
        shipment,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{fixture, fixture_with, in_days, Fixture};
    use crate::{retry_busy, DbConfig};
    use pharma_core::{AddCartItem, CreateCart, InventoryBatch};

    async fn fill_cart(fx: &Fixture, customer: &str, lines: &[(&str, i64)]) {
        if fx.db.carts().get_view(customer).await.is_err() {
            fx.db
                .carts()
                .create(customer, CreateCart { branch_id: fx.branch_id.clone() })
                .await
                .unwrap();
        }
        for (variant_id, quantity) in lines {
            fx.db
                .carts()
                .add_item(
                    customer,
                    AddCartItem {
                        variant_id: variant_id.to_string(),
                        quantity: *quantity,
                    },
                )
                .await
                .unwrap();
        }
    }

    async fn place(fx: &Fixture, customer: &str, qty: i64) -> OrderDetail {
        fill_cart(fx, customer, &[(fx.variant_id.as_str(), qty)]).await;
        fx.db
            .orders()
            .checkout(customer, Checkout::default())
            .await
            .unwrap()
    }

    async fn batch(fx: &Fixture, id: &str) -> InventoryBatch {
        fx.db.inventory().get_batch(id).await.unwrap()
    }

    #[tokio::test]
    async fn test_checkout_reserves_fefo_across_batches() {
        let fx = fixture().await;
        let late = fx.receive(10, Some(in_days(200))).await;
        let early = fx.receive(3, Some(in_days(20))).await;
        let undated = fx.receive(10, None).await;

        let detail = place(&fx, "cust-1", 5).await;

        assert_eq!(detail.order.status, OrderStatus::Pending);
        assert_eq!(detail.order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(detail.order.total_cents, 5_000);
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].batch_id, None);
        assert_eq!(detail.allocations.len(), 2);

        assert_eq!(batch(&fx, &early.id).await.qty_reserved, 3);
        assert_eq!(batch(&fx, &late.id).await.qty_reserved, 2);
        assert_eq!(batch(&fx, &undated.id).await.qty_reserved, 0);

        let cart = fx.db.carts().get_view("cust-1").await.unwrap();
        assert!(cart.items.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_checkouts_never_oversell() {
        let dir = tempfile::tempdir().unwrap();
        let fx = fixture_with(DbConfig::new(dir.path().join("race.db")).max_connections(4)).await;
        let scarce = fx.receive(5, Some(in_days(90))).await;
        fill_cart(&fx, "cust-1", &[(fx.variant_id.as_str(), 4)]).await;
        fill_cart(&fx, "cust-2", &[(fx.variant_id.as_str(), 4)]).await;

        let race = |customer: &'static str| {
            let orders = fx.db.orders();
            tokio::spawn(async move {
                retry_busy(10, || {
                    let orders = orders.clone();
                    async move { orders.checkout(customer, Checkout::default()).await }
                })
                .await
            })
        };
        let (first, second) = tokio::join!(race("cust-1"), race("cust-2"));
        let results = [first.unwrap(), second.unwrap()];

        let placed: Vec<&OrderDetail> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(placed.len(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(
                    err,
                    DbError::Core(CoreError::InsufficientStock { .. })
                        | DbError::Core(CoreError::StockInvariant(_))
                        | DbError::Busy
                        | DbError::Conflict(_)
                ),
                "unexpected loser error: {err:?}"
            );
        }

        let stored = batch(&fx, &scarce.id).await;
        assert_eq!(stored.qty_reserved, 4);
        assert!(stored.qty_reserved <= stored.qty_on_hand);
        assert_eq!(placed[0].allocations.len(), 1);

        fx.db.close().await;
    }

    #[tokio::test]
    async fn test_checkout_skips_expired_and_unavailable_batches() {
        let fx = fixture().await;
        let good = fx.receive(5, Some(in_days(60))).await;
        fill_cart(&fx, "cust-1", &[(fx.variant_id.as_str(), 2)]).await;

        let expired = fx.receive(5, Some(in_days(-1))).await;
        let withdrawn = fx.receive(5, Some(in_days(5))).await;
        fx.db.inventory().set_availability(&withdrawn.id, false).await.unwrap();

        fx.db.orders().checkout("cust-1", Checkout::default()).await.unwrap();

        assert_eq!(batch(&fx, &good.id).await.qty_reserved, 2);
        assert_eq!(batch(&fx, &expired.id).await.qty_reserved, 0);
        assert_eq!(batch(&fx, &withdrawn.id).await.qty_reserved, 0);
    }

    #[tokio::test]
    async fn test_checkout_is_all_or_nothing() {
        let fx = fixture().await;
        let other = fx.add_variant(30).await;
        let plenty = fx.receive(10, None).await;
        let scarce = fx.receive_variant(other.as_str(), 2, None).await;

        fill_cart(&fx, "cust-1", &[(fx.variant_id.as_str(), 4), (other.as_str(), 2)]).await;
        // Someone else takes the scarce stock first
        fill_cart(&fx, "cust-2", &[(other.as_str(), 1)]).await;
        fx.db.orders().checkout("cust-2", Checkout::default()).await.unwrap();

        let err = fx
            .db
            .orders()
            .checkout("cust-1", Checkout::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock { available: 1, requested: 2, .. })
        ));

        assert_eq!(batch(&fx, &plenty.id).await.qty_reserved, 0);
        assert_eq!(batch(&fx, &scarce.id).await.qty_reserved, 1);
        assert_eq!(fx.db.carts().get_view("cust-1").await.unwrap().items.len(), 2);
        assert_eq!(fx.db.orders().list(Some("cust-1"), 50, 0).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_checkout_empty_cart_rejected() {
        let fx = fixture().await;
        fill_cart(&fx, "cust-1", &[]).await;
        let err = fx
            .db
            .orders()
            .checkout("cust-1", Checkout::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::EmptyCart)));
    }

    #[tokio::test]
    async fn test_checkout_adds_shipping_fee() {
        let fx = fixture().await;
        fx.receive(5, None).await;
        fill_cart(&fx, "cust-1", &[(fx.variant_id.as_str(), 2)]).await;

        let detail = fx
            .db
            .orders()
            .checkout(
                "cust-1",
                Checkout {
                    shipping_address_id: None,
                    shipping_fee_cents: 1_500,
                },
            )
            .await
            .unwrap();
        assert_eq!(detail.order.total_cents, 3_500);
        assert_eq!(detail.order.shipping_fee_cents, 1_500);
    }

    #[tokio::test]
    async fn test_pack_commits_and_writes_sale_movements() {
        let fx = fixture().await;
        let early = fx.receive(2, Some(in_days(10))).await;
        let late = fx.receive(5, Some(in_days(100))).await;
        let order = place(&fx, "cust-1", 4).await.order;

        fx.db.orders().confirm(&order.id).await.unwrap();
        let detail = fx.db.orders().pack(&order.id, Some("staff-1")).await.unwrap();

        assert_eq!(detail.order.status, OrderStatus::Packed);
        assert_eq!(detail.items[0].batch_id.as_deref(), Some(early.id.as_str()));

        let e = batch(&fx, &early.id).await;
        let l = batch(&fx, &late.id).await;
        assert_eq!((e.qty_on_hand, e.qty_reserved), (0, 0));
        assert_eq!((l.qty_on_hand, l.qty_reserved), (3, 0));

        for (id, qty) in [(&early.id, -2), (&late.id, -2)] {
            let movements = fx.db.inventory().list_movements(id).await.unwrap();
            let sales: Vec<_> = movements
                .iter()
                .filter(|m| m.kind == MovementKind::Sale)
                .collect();
            assert_eq!(sales.len(), 1);
            assert_eq!(sales[0].delta_qty, qty);
            assert_eq!(sales[0].reference.as_deref(), Some(order.id.as_str()));
            assert_eq!(sales[0].created_by.as_deref(), Some("staff-1"));
        }
    }

    #[tokio::test]
    async fn test_pack_requires_confirmation() {
        let fx = fixture().await;
        fx.receive(5, None).await;
        let order = place(&fx, "cust-1", 1).await.order;

        let err = fx.db.orders().pack(&order.id, None).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InvalidTransition { .. })));
        assert_eq!(fx.db.orders().get(&order.id).await.unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_before_pack_releases_reservation() {
        let fx = fixture().await;
        let b = fx.receive(5, None).await;
        let order = place(&fx, "cust-1", 3).await.order;
        fx.db.orders().confirm(&order.id).await.unwrap();

        let cancelled = fx.db.orders().cancel(&order.id, Some("cust-1")).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let stored = batch(&fx, &b.id).await;
        assert_eq!((stored.qty_on_hand, stored.qty_reserved), (5, 0));
        assert!(fx.db.orders().detail(&order.id).await.unwrap().allocations.is_empty());
        // Only the purchase movement
        assert_eq!(fx.db.inventory().list_movements(&b.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_customer_cancel_only_while_pending() {
        let fx = fixture().await;
        let b = fx.receive(5, None).await;
        let order = place(&fx, "cust-1", 3).await.order;

        let err = fx.db.orders().cancel_pending(&order.id, "cust-2").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        fx.db.orders().confirm(&order.id).await.unwrap();
        fx.db.orders().pack(&order.id, None).await.unwrap();

        let err = fx.db.orders().cancel_pending(&order.id, "cust-1").await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InvalidTransition { .. })));

        // No restock, no extra movement
        let stored = batch(&fx, &b.id).await;
        assert_eq!((stored.qty_on_hand, stored.qty_reserved), (2, 0));
        assert_eq!(fx.db.inventory().list_movements(&b.id).await.unwrap().len(), 2);
        assert_eq!(fx.db.orders().get(&order.id).await.unwrap().status, OrderStatus::Packed);
    }

    #[tokio::test]
    async fn test_customer_cancel_pending_releases_reservation() {
        let fx = fixture().await;
        let b = fx.receive(5, None).await;
        let order = place(&fx, "cust-1", 3).await.order;

        let cancelled = fx.db.orders().cancel_pending(&order.id, "cust-1").await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(batch(&fx, &b.id).await.qty_reserved, 0);
    }

    #[tokio::test]
    async fn test_cancel_after_pack_restocks_and_refunds() {
        let fx = fixture().await;
        let b = fx.receive(5, None).await;
        let order = place(&fx, "cust-1", 3).await.order;
        fx.db.orders().pay(&order.id).await.unwrap();
        fx.db.orders().confirm(&order.id).await.unwrap();
        fx.db.orders().pack(&order.id, None).await.unwrap();

        let cancelled = fx.db.orders().cancel(&order.id, Some("staff-1")).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);

        let stored = batch(&fx, &b.id).await;
        assert_eq!((stored.qty_on_hand, stored.qty_reserved), (5, 0));

        let movements = fx.db.inventory().list_movements(&b.id).await.unwrap();
        assert_eq!(movements.len(), 3);
        assert_eq!(movements[0].kind, MovementKind::Adjustment);
        assert_eq!(movements[0].delta_qty, 3);
    }

    #[tokio::test]
    async fn test_ship_and_deliver_track_shipment() {
        let fx = fixture().await;
        fx.receive(5, None).await;
        let order = place(&fx, "cust-1", 1).await.order;
        fx.db.orders().confirm(&order.id).await.unwrap();
        fx.db.orders().pack(&order.id, None).await.unwrap();

        let shipped = fx
            .db
            .orders()
            .ship(
                &order.id,
                ShipOrder {
                    tracking_number: Some("EG123456".to_string()),
                },
            )
            .await
            .unwrap();
        let shipment = shipped.shipment.unwrap();
        assert_eq!(shipment.status, ShipmentStatus::InTransit);
        assert_eq!(shipment.tracking_number.as_deref(), Some("EG123456"));

        let err = fx.db.orders().cancel(&order.id, None).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InvalidTransition { .. })));

        let delivered = fx.db.orders().deliver(&order.id).await.unwrap();
        assert_eq!(delivered.order.status, OrderStatus::Delivered);
        let shipment = delivered.shipment.unwrap();
        assert_eq!(shipment.status, ShipmentStatus::Delivered);
        assert!(shipment.delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_payment_transitions() {
        let fx = fixture().await;
        fx.receive(5, None).await;
        let order = place(&fx, "cust-1", 1).await.order;

        let err = fx.db.orders().refund(&order.id).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InvalidTransition { .. })));

        assert_eq!(fx.db.orders().pay(&order.id).await.unwrap().payment_status, PaymentStatus::Paid);
        assert_eq!(
            fx.db.orders().refund(&order.id).await.unwrap().payment_status,
            PaymentStatus::Refunded
        );
    }

    #[tokio::test]
    async fn test_expire_pending_releases_only_pending() {
        let fx = fixture().await;
        let b = fx.receive(10, None).await;
        let stale = place(&fx, "cust-1", 2).await.order;
        let kept = place(&fx, "cust-2", 3).await.order;
        fx.db.orders().confirm(&kept.id).await.unwrap();

        let expired = fx
            .db
            .orders()
            .expire_pending(Utc::now() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(expired, 1);

        assert_eq!(fx.db.orders().get(&stale.id).await.unwrap().status, OrderStatus::Cancelled);
        assert_eq!(fx.db.orders().get(&kept.id).await.unwrap().status, OrderStatus::Confirmed);
        assert_eq!(batch(&fx, &b.id).await.qty_reserved, 3);

        let none = fx
            .db
            .orders()
            .expire_pending(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(none, 0);
    }

    #[tokio::test]
    async fn test_expire_pending_continues_past_failing_order() {
        let fx = fixture().await;
        let other_variant = fx.add_variant(10).await;
        let stuck_batch = fx.receive(5, None).await;
        let free_batch = fx.receive_variant(&other_variant, 5, None).await;

        let stuck = place(&fx, "cust-1", 2).await.order;
        fill_cart(&fx, "cust-2", &[(other_variant.as_str(), 2)]).await;
        let freed = fx
            .db
            .orders()
            .checkout("cust-2", Checkout::default())
            .await
            .unwrap()
            .order;

        // Releasing the older order's reservation can no longer succeed.
        sqlx::query("UPDATE inventory_batches SET qty_reserved = 0 WHERE id = ?")
            .bind(&stuck_batch.id)
            .execute(fx.db.pool())
            .await
            .unwrap();

        let expired = fx
            .db
            .orders()
            .expire_pending(Utc::now() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(expired, 1);

        assert_eq!(fx.db.orders().get(&stuck.id).await.unwrap().status, OrderStatus::Pending);
        assert_eq!(fx.db.orders().get(&freed.id).await.unwrap().status, OrderStatus::Cancelled);
        assert_eq!(batch(&fx, &free_batch.id).await.qty_reserved, 0);
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_per_customer() {
        let fx = fixture().await;
        fx.receive(10, None).await;
        let first = place(&fx, "cust-1", 1).await.order;
        let second = place(&fx, "cust-1", 1).await.order;
        place(&fx, "cust-2", 1).await;

        let mine = fx.db.orders().list(Some("cust-1"), 50, 0).await.unwrap();
        let ids: Vec<&str> = mine.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);

        assert_eq!(fx.db.orders().list(None, 50, 0).await.unwrap().len(), 3);
    }
}
