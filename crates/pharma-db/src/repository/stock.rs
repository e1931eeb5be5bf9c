//! Guarded batch quantity updates shared by the inventory and order workflows.
//!
//! Every function here runs on a connection that is already inside a
//! transaction. Updates carry their own precondition in the `WHERE` clause
//! and report `Conflict` when no row matched, so a concurrent writer can
//! never push a batch outside `0 <= qty_reserved <= qty_on_hand`.

use chrono::{DateTime, Utc};
use pharma_core::{BatchCandidate, InventoryBatch, InventoryMovement, MovementKind};
use sqlx::SqliteConnection;
use tracing::debug;

use super::generate_id;
use crate::error::{DbError, DbResult};

pub(crate) async fn get_batch(
    conn: &mut SqliteConnection,
    batch_id: &str,
) -> DbResult<Option<InventoryBatch>> {
    let batch = sqlx::query_as::<_, InventoryBatch>("SELECT * FROM inventory_batches WHERE id = ?")
        .bind(batch_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(batch)
}

/// All batches of a variant in a branch.
pub(crate) async fn load_batches(
    conn: &mut SqliteConnection,
    branch_id: &str,
    variant_id: &str,
) -> DbResult<Vec<InventoryBatch>> {
    let batches = sqlx::query_as::<_, InventoryBatch>(
        "SELECT * FROM inventory_batches WHERE branch_id = ? AND variant_id = ?",
    )
    .bind(branch_id)
    .bind(variant_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(batches)
}

/// The same batches as planner snapshots.
pub(crate) async fn load_candidates(
    conn: &mut SqliteConnection,
    branch_id: &str,
    variant_id: &str,
) -> DbResult<Vec<BatchCandidate>> {
    let batches = load_batches(conn, branch_id, variant_id).await?;
    Ok(batches.iter().map(InventoryBatch::candidate).collect())
}

fn expect_one(rows: u64, what: &str, batch_id: &str, qty: i64) -> DbResult<()> {
    if rows == 0 {
        return Err(DbError::Conflict(format!(
            "cannot {what} {qty} on batch {batch_id}: quantities changed"
        )));
    }
    Ok(())
}

/// `qty_reserved += qty`, only if that many units are still free.
pub(crate) async fn reserve(conn: &mut SqliteConnection, batch_id: &str, qty: i64) -> DbResult<()> {
    let rows = sqlx::query(
        r#"
        UPDATE inventory_batches
        SET qty_reserved = qty_reserved + ?
        WHERE id = ? AND is_available = 1 AND qty_on_hand - qty_reserved >= ?
        "#,
    )
    .bind(qty)
    .bind(batch_id)
    .bind(qty)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    debug!(batch_id, qty, "Reserved stock");
    expect_one(rows, "reserve", batch_id, qty)
}

/// `qty_reserved -= qty`. On-hand is untouched, so no movement is written.
pub(crate) async fn release(conn: &mut SqliteConnection, batch_id: &str, qty: i64) -> DbResult<()> {
    let rows = sqlx::query(
        "UPDATE inventory_batches SET qty_reserved = qty_reserved - ? WHERE id = ? AND qty_reserved >= ?",
    )
    .bind(qty)
    .bind(batch_id)
    .bind(qty)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    debug!(batch_id, qty, "Released stock");
    expect_one(rows, "release", batch_id, qty)
}

/// Converts reserved units into a sale: both quantities drop by `qty`.
pub(crate) async fn commit(conn: &mut SqliteConnection, batch_id: &str, qty: i64) -> DbResult<()> {
    let rows = sqlx::query(
        r#"
        UPDATE inventory_batches
        SET qty_on_hand = qty_on_hand - ?, qty_reserved = qty_reserved - ?
        WHERE id = ? AND qty_reserved >= ?
        "#,
    )
    .bind(qty)
    .bind(qty)
    .bind(batch_id)
    .bind(qty)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    debug!(batch_id, qty, "Committed stock");
    expect_one(rows, "commit", batch_id, qty)
}

/// `qty_on_hand += delta` for returned goods and manual adjustments.
/// Negative deltas may not eat into reserved units.
pub(crate) async fn shift_on_hand(
    conn: &mut SqliteConnection,
    batch_id: &str,
    delta: i64,
) -> DbResult<()> {
    let rows = sqlx::query(
        r#"
        UPDATE inventory_batches
        SET qty_on_hand = qty_on_hand + ?
        WHERE id = ? AND qty_on_hand + ? >= qty_reserved
        "#,
    )
    .bind(delta)
    .bind(batch_id)
    .bind(delta)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    debug!(batch_id, delta, "Shifted on-hand stock");
    expect_one(rows, "adjust by", batch_id, delta)
}

/// Appends one row to the movement log.
pub(crate) async fn record_movement(
    conn: &mut SqliteConnection,
    batch_id: &str,
    kind: MovementKind,
    delta_qty: i64,
    reference: Option<&str>,
    actor: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<InventoryMovement> {
    kind.check_delta(delta_qty)?;

    let movement = InventoryMovement {
        id: generate_id(),
        batch_id: batch_id.to_string(),
        kind,
        delta_qty,
        reference: reference.map(str::to_string),
        created_by: actor.map(str::to_string),
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO inventory_movements (id, batch_id, kind, delta_qty, reference, created_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.batch_id)
    .bind(movement.kind)
    .bind(movement.delta_qty)
    .bind(&movement.reference)
    .bind(&movement.created_by)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(movement)
}
