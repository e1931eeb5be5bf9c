//! # Inventory Repository
//!
//! Companies, branches, stock batches, the movement log and demand
//! predictions.
//!
//! ## Stock Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  receive_stock ──► new batch (on_hand = qty) + purchase movement (+qty) │
//! │  adjust_stock  ──► on_hand += delta          + adjustment movement      │
//! │  checkout      ──► reserved += n             (order repository)         │
//! │  pack          ──► on_hand -= n, reserved -= n + sale movement (-n)     │
//! │  cancel        ──► reserved -= n | on_hand += n + adjustment (+n)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Batches are never deleted; `set_availability(false)` takes one out of
//! new reservations.

use chrono::Utc;
use pharma_core::{
    AdjustStock, Branch, BranchInput, Company, CompanyInput, CompanyKind, InventoryBatch,
    InventoryMovement, MovementKind, Prediction, PredictionInput, ReceiveStock, StockLevel,
};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::{generate_id, stock};
use crate::error::{DbError, DbResult};

/// Repository for stock-holding entities.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    // =========================================================================
    // Companies
    // =========================================================================

    pub async fn list_companies(&self, kind: Option<CompanyKind>) -> DbResult<Vec<Company>> {
        let rows = sqlx::query_as::<_, Company>(
            "SELECT * FROM companies WHERE (? IS NULL OR kind = ?) ORDER BY name",
        )
        .bind(kind)
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_company(&self, id: &str) -> DbResult<Company> {
        sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Company", id))
    }

    pub async fn create_company(&self, input: CompanyInput) -> DbResult<Company> {
        let input = input.validated()?;
        let company = Company {
            id: generate_id(),
            kind: input.kind,
            name: input.name,
            owner_id: input.owner_id,
            license_no: input.license_no,
            is_active: input.is_active,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO companies (id, kind, name, owner_id, license_no, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&company.id)
        .bind(company.kind)
        .bind(&company.name)
        .bind(&company.owner_id)
        .bind(&company.license_no)
        .bind(company.is_active)
        .bind(company.created_at)
        .execute(&self.pool)
        .await?;

        info!(id = %company.id, kind = %company.kind, name = %company.name, "Company created");
        Ok(company)
    }

    /// The kind of a company is fixed at creation.
    pub async fn update_company(&self, id: &str, input: CompanyInput) -> DbResult<Company> {
        let input = input.validated()?;
        let existing = self.get_company(id).await?;
        existing.ensure_kind(input.kind)?;

        sqlx::query(
            "UPDATE companies SET name = ?, owner_id = ?, license_no = ?, is_active = ? WHERE id = ?",
        )
        .bind(&input.name)
        .bind(&input.owner_id)
        .bind(&input.license_no)
        .bind(input.is_active)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_company(id).await
    }

    /// Cascades to branches; `Protected` once any of them holds stock.
    pub async fn delete_company(&self, id: &str) -> DbResult<()> {
        let rows = sqlx::query("DELETE FROM companies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from(e).protect("Company", id))?
            .rows_affected();
        if rows == 0 {
            return Err(DbError::not_found("Company", id));
        }
        info!(%id, "Company deleted");
        Ok(())
    }

    // =========================================================================
    // Branches
    // =========================================================================

    pub async fn list_branches(&self, company_id: Option<&str>) -> DbResult<Vec<Branch>> {
        let rows = sqlx::query_as::<_, Branch>(
            "SELECT * FROM branches WHERE (? IS NULL OR company_id = ?) ORDER BY name",
        )
        .bind(company_id)
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_branch(&self, id: &str) -> DbResult<Branch> {
        sqlx::query_as::<_, Branch>("SELECT * FROM branches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Branch", id))
    }

    /// Only pharmacy companies own branches.
    pub async fn create_branch(&self, input: BranchInput) -> DbResult<Branch> {
        let input = input.validated()?;
        self.get_company(&input.company_id)
            .await?
            .ensure_kind(CompanyKind::Pharmacy)?;

        let branch = Branch {
            id: generate_id(),
            company_id: input.company_id,
            name: input.name,
            address_id: input.address_id,
            shipping_available: input.shipping_available,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO branches (id, company_id, name, address_id, shipping_available, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&branch.id)
        .bind(&branch.company_id)
        .bind(&branch.name)
        .bind(&branch.address_id)
        .bind(branch.shipping_available)
        .bind(branch.created_at)
        .execute(&self.pool)
        .await?;

        info!(id = %branch.id, company_id = %branch.company_id, "Branch created");
        Ok(branch)
    }

    pub async fn update_branch(&self, id: &str, input: BranchInput) -> DbResult<Branch> {
        let input = input.validated()?;
        self.get_company(&input.company_id)
            .await?
            .ensure_kind(CompanyKind::Pharmacy)?;

        let rows = sqlx::query(
            "UPDATE branches SET company_id = ?, name = ?, address_id = ?, shipping_available = ? WHERE id = ?",
        )
        .bind(&input.company_id)
        .bind(&input.name)
        .bind(&input.address_id)
        .bind(input.shipping_available)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if rows == 0 {
            return Err(DbError::not_found("Branch", id));
        }
        self.get_branch(id).await
    }

    pub async fn delete_branch(&self, id: &str) -> DbResult<()> {
        let rows = sqlx::query("DELETE FROM branches WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from(e).protect("Branch", id))?
            .rows_affected();
        if rows == 0 {
            return Err(DbError::not_found("Branch", id));
        }
        Ok(())
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Receives a new batch and logs a `purchase` movement for it.
    ///
    /// `supplier_id`, when given, must name a supplier company.
    pub async fn receive_stock(
        &self,
        input: ReceiveStock,
        actor: Option<&str>,
    ) -> DbResult<InventoryBatch> {
        let input = input.validated()?;
        if let Some(supplier_id) = &input.supplier_id {
            self.get_company(supplier_id)
                .await?
                .ensure_kind(CompanyKind::Supplier)?;
        }

        let now = Utc::now();
        let batch = InventoryBatch {
            id: generate_id(),
            branch_id: input.branch_id,
            variant_id: input.variant_id,
            supplier_id: input.supplier_id,
            expiry_date: input.expiry_date,
            qty_on_hand: input.qty,
            qty_reserved: 0,
            cost_price_cents: input.cost_price_cents,
            sale_price_cents: input.sale_price_cents,
            is_available: true,
            received_at: now,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO inventory_batches (
                id, branch_id, variant_id, supplier_id, expiry_date, qty_on_hand,
                qty_reserved, cost_price_cents, sale_price_cents, is_available, received_at
            ) VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, 1, ?)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.branch_id)
        .bind(&batch.variant_id)
        .bind(&batch.supplier_id)
        .bind(batch.expiry_date)
        .bind(batch.qty_on_hand)
        .bind(batch.cost_price_cents)
        .bind(batch.sale_price_cents)
        .bind(batch.received_at)
        .execute(&mut *tx)
        .await?;

        stock::record_movement(
            &mut *tx,
            &batch.id,
            MovementKind::Purchase,
            batch.qty_on_hand,
            None,
            actor,
            now,
        )
        .await?;

        tx.commit().await?;

        info!(
            batch_id = %batch.id,
            branch_id = %batch.branch_id,
            variant_id = %batch.variant_id,
            qty = batch.qty_on_hand,
            "Stock received"
        );
        Ok(batch)
    }

    /// Applies a manual on-hand correction and logs an `adjustment` movement.
    ///
    /// ## Errors
    /// - `StockInvariant` when on-hand would drop below zero or below the
    ///   units currently reserved
    pub async fn adjust_stock(
        &self,
        batch_id: &str,
        input: AdjustStock,
        actor: Option<&str>,
    ) -> DbResult<InventoryMovement> {
        let input = input.validated()?;
        let mut tx = self.pool.begin().await?;

        if let Err(err) = stock::shift_on_hand(&mut *tx, batch_id, input.delta).await {
            // Explain the rejection from the batch's current quantities.
            let Some(batch) = stock::get_batch(&mut *tx, batch_id).await? else {
                return Err(DbError::not_found("InventoryBatch", batch_id));
            };
            batch.stock()?.adjust(input.delta)?;
            return Err(err);
        }

        let movement = stock::record_movement(
            &mut *tx,
            batch_id,
            MovementKind::Adjustment,
            input.delta,
            input.reason.as_deref(),
            actor,
            Utc::now(),
        )
        .await?;

        tx.commit().await?;

        info!(batch_id, delta = input.delta, actor = ?actor, "Stock adjusted");
        Ok(movement)
    }

    /// Unavailable batches are skipped by every new reservation.
    pub async fn set_availability(&self, batch_id: &str, available: bool) -> DbResult<InventoryBatch> {
        let batch = sqlx::query_as::<_, InventoryBatch>(
            "UPDATE inventory_batches SET is_available = ? WHERE id = ? RETURNING *",
        )
        .bind(available)
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("InventoryBatch", batch_id))?;

        if !available && batch.qty_reserved > 0 {
            warn!(batch_id, reserved = batch.qty_reserved, "Batch withdrawn with open reservations");
        }
        Ok(batch)
    }

    pub async fn get_batch(&self, batch_id: &str) -> DbResult<InventoryBatch> {
        let mut conn = self.pool.acquire().await?;
        stock::get_batch(&mut conn, batch_id)
            .await?
            .ok_or_else(|| DbError::not_found("InventoryBatch", batch_id))
    }

    /// Batches filtered by branch and/or variant, in FEFO order.
    pub async fn list_batches(
        &self,
        branch_id: Option<&str>,
        variant_id: Option<&str>,
    ) -> DbResult<Vec<InventoryBatch>> {
        let rows = sqlx::query_as::<_, InventoryBatch>(
            r#"
            SELECT * FROM inventory_batches
            WHERE (?1 IS NULL OR branch_id = ?1) AND (?2 IS NULL OR variant_id = ?2)
            ORDER BY expiry_date IS NULL, expiry_date, received_at, id
            "#,
        )
        .bind(branch_id)
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Movement log of one batch, newest first.
    pub async fn list_movements(&self, batch_id: &str) -> DbResult<Vec<InventoryMovement>> {
        self.get_batch(batch_id).await?;
        let rows = sqlx::query_as::<_, InventoryMovement>(
            "SELECT * FROM inventory_movements WHERE batch_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Aggregate stock of a variant in a branch.
    ///
    /// `available` only counts batches that are available and unexpired
    /// today; `on_hand` and `reserved` cover every batch.
    pub async fn availability(&self, branch_id: &str, variant_id: &str) -> DbResult<StockLevel> {
        let today = Utc::now().date_naive();
        let level = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT
                COALESCE(SUM(qty_on_hand), 0) AS on_hand,
                COALESCE(SUM(qty_reserved), 0) AS reserved,
                COALESCE(SUM(CASE
                    WHEN is_available = 1 AND (expiry_date IS NULL OR expiry_date >= ?)
                    THEN qty_on_hand - qty_reserved ELSE 0 END), 0) AS available
            FROM inventory_batches
            WHERE branch_id = ? AND variant_id = ?
            "#,
        )
        .bind(today)
        .bind(branch_id)
        .bind(variant_id)
        .fetch_one(&self.pool)
        .await?;

        debug!(branch_id, variant_id, available = level.available, "Availability computed");
        Ok(level)
    }

    // =========================================================================
    // Predictions
    // =========================================================================

    /// Stores a forecast, replacing an earlier one for the same horizon.
    pub async fn upsert_prediction(&self, input: PredictionInput) -> DbResult<Prediction> {
        let input = input.validated()?;
        let prediction = sqlx::query_as::<_, Prediction>(
            r#"
            INSERT INTO predictions (id, branch_id, variant_id, horizon_days, predicted_demand, model_version, generated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (branch_id, variant_id, horizon_days) DO UPDATE SET
                predicted_demand = excluded.predicted_demand,
                model_version = excluded.model_version,
                generated_at = excluded.generated_at
            RETURNING *
            "#,
        )
        .bind(generate_id())
        .bind(&input.branch_id)
        .bind(&input.variant_id)
        .bind(input.horizon_days)
        .bind(input.predicted_demand)
        .bind(&input.model_version)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        debug!(id = %prediction.id, horizon_days = prediction.horizon_days, "Prediction stored");
        Ok(prediction)
    }

    pub async fn list_predictions(
        &self,
        branch_id: Option<&str>,
        variant_id: Option<&str>,
    ) -> DbResult<Vec<Prediction>> {
        let rows = sqlx::query_as::<_, Prediction>(
            r#"
            SELECT * FROM predictions
            WHERE (?1 IS NULL OR branch_id = ?1) AND (?2 IS NULL OR variant_id = ?2)
            ORDER BY generated_at DESC, horizon_days
            "#,
        )
        .bind(branch_id)
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{fixture, in_days};
    use pharma_core::CoreError;

    #[tokio::test]
    async fn test_receive_creates_batch_and_purchase_movement() {
        let fx = fixture().await;
        let batch = fx.receive(30, Some(in_days(90))).await;

        assert_eq!(batch.qty_on_hand, 30);
        assert_eq!(batch.qty_reserved, 0);

        let stored = fx.db.inventory().get_batch(&batch.id).await.unwrap();
        assert_eq!(stored.expiry_date, Some(in_days(90)));

        let movements = fx.db.inventory().list_movements(&batch.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].kind, MovementKind::Purchase);
        assert_eq!(movements[0].delta_qty, 30);
        assert_eq!(movements[0].created_by.as_deref(), Some("staff-1"));
    }

    #[tokio::test]
    async fn test_receive_requires_supplier_company() {
        let fx = fixture().await;
        let pharmacy = fx.db.inventory().get_branch(&fx.branch_id).await.unwrap().company_id;

        let err = fx
            .db
            .inventory()
            .receive_stock(
                ReceiveStock {
                    branch_id: fx.branch_id.clone(),
                    variant_id: fx.variant_id.clone(),
                    supplier_id: Some(pharmacy),
                    expiry_date: None,
                    qty: 5,
                    cost_price_cents: 100,
                    sale_price_cents: 150,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::WrongCompanyKind { expected: "supplier", .. })
        ));
    }

    #[tokio::test]
    async fn test_branch_requires_pharmacy_company() {
        let fx = fixture().await;
        let supplier = fx
            .db
            .inventory()
            .create_company(CompanyInput {
                kind: CompanyKind::Supplier,
                name: "Delta Distribution".to_string(),
                owner_id: "owner-2".to_string(),
                license_no: Some("SUP-1".to_string()),
                is_active: true,
            })
            .await
            .unwrap();

        let err = fx
            .db
            .inventory()
            .create_branch(BranchInput {
                company_id: supplier.id,
                name: "Warehouse".to_string(),
                address_id: None,
                shipping_available: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::WrongCompanyKind { .. })));
    }

    #[tokio::test]
    async fn test_adjust_stock_logs_movement() {
        let fx = fixture().await;
        let batch = fx.receive(10, None).await;

        let movement = fx
            .db
            .inventory()
            .adjust_stock(
                &batch.id,
                AdjustStock {
                    delta: -3,
                    reason: Some("damaged".to_string()),
                },
                Some("staff-2"),
            )
            .await
            .unwrap();
        assert_eq!(movement.kind, MovementKind::Adjustment);
        assert_eq!(movement.reference.as_deref(), Some("damaged"));

        let stored = fx.db.inventory().get_batch(&batch.id).await.unwrap();
        assert_eq!(stored.qty_on_hand, 7);

        let movements = fx.db.inventory().list_movements(&batch.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].id, movement.id);
    }

    #[tokio::test]
    async fn test_adjust_below_zero_rejected_without_movement() {
        let fx = fixture().await;
        let batch = fx.receive(4, None).await;

        let err = fx
            .db
            .inventory()
            .adjust_stock(&batch.id, AdjustStock { delta: -5, reason: None }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::StockInvariant(_))));

        let stored = fx.db.inventory().get_batch(&batch.id).await.unwrap();
        assert_eq!(stored.qty_on_hand, 4);
        assert_eq!(fx.db.inventory().list_movements(&batch.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_adjust_out_of_range_delta_leaves_batch_readable() {
        let fx = fixture().await;
        let batch = fx.receive(5, None).await;

        let err = fx
            .db
            .inventory()
            .adjust_stock(&batch.id, AdjustStock { delta: i64::MAX, reason: None }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));

        let stored = fx.db.inventory().get_batch(&batch.id).await.unwrap();
        assert_eq!(stored.qty_on_hand, 5);
        let level = fx
            .db
            .inventory()
            .availability(&fx.branch_id, &fx.variant_id)
            .await
            .unwrap();
        assert_eq!(level.available, 5);
    }

    #[tokio::test]
    async fn test_adjust_missing_batch_not_found() {
        let fx = fixture().await;
        let err = fx
            .db
            .inventory()
            .adjust_stock(&generate_id(), AdjustStock { delta: 1, reason: None }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_movements_are_append_only() {
        let fx = fixture().await;
        let batch = fx.receive(4, None).await;

        let update = sqlx::query("UPDATE inventory_movements SET delta_qty = 99")
            .execute(fx.db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM inventory_movements WHERE batch_id = ?")
            .bind(&batch.id)
            .execute(fx.db.pool())
            .await;
        assert!(delete.is_err());
    }

    #[tokio::test]
    async fn test_availability_skips_expired_and_unavailable() {
        let fx = fixture().await;
        fx.receive(10, Some(in_days(30))).await;
        fx.receive(5, Some(in_days(-1))).await;
        let withdrawn = fx.receive(7, None).await;
        fx.db
            .inventory()
            .set_availability(&withdrawn.id, false)
            .await
            .unwrap();

        let level = fx
            .db
            .inventory()
            .availability(&fx.branch_id, &fx.variant_id)
            .await
            .unwrap();
        assert_eq!(level.on_hand, 22);
        assert_eq!(level.reserved, 0);
        assert_eq!(level.available, 10);
    }

    #[tokio::test]
    async fn test_availability_of_unstocked_variant_is_zero() {
        let fx = fixture().await;
        let level = fx
            .db
            .inventory()
            .availability(&fx.branch_id, &fx.variant_id)
            .await
            .unwrap();
        assert_eq!(level, StockLevel::default());
    }

    #[tokio::test]
    async fn test_list_batches_in_fefo_order() {
        let fx = fixture().await;
        let undated = fx.receive(1, None).await;
        let late = fx.receive(1, Some(in_days(200))).await;
        let early = fx.receive(1, Some(in_days(20))).await;

        let ids: Vec<String> = fx
            .db
            .inventory()
            .list_batches(Some(&fx.branch_id), None)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![early.id, late.id, undated.id]);
    }

    #[tokio::test]
    async fn test_prediction_upsert_overwrites_same_horizon() {
        let fx = fixture().await;
        let input = |demand: f64, version: &str| PredictionInput {
            branch_id: fx.branch_id.clone(),
            variant_id: fx.variant_id.clone(),
            horizon_days: 30,
            predicted_demand: demand,
            model_version: version.to_string(),
        };

        let first = fx.db.inventory().upsert_prediction(input(12.5, "v1")).await.unwrap();
        let second = fx.db.inventory().upsert_prediction(input(20.0, "v2")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.model_version, "v2");

        let all = fx
            .db
            .inventory()
            .list_predictions(Some(&fx.branch_id), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!((all[0].predicted_demand - 20.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_delete_branch_with_stock_is_protected() {
        let fx = fixture().await;
        fx.receive(3, None).await;
        let err = fx.db.inventory().delete_branch(&fx.branch_id).await.unwrap_err();
        assert!(matches!(err, DbError::Protected { .. }));
    }
}
