//! Order listing and workflow.
//!
//! ## Who May Do What
//! ```text
//! GET  /orders                  own orders; admin/staff see all (?customer=)
//! GET  /orders/{id}             owner or admin/staff
//! POST /orders/{id}/confirm     admin/staff
//! POST /orders/{id}/pack        admin/staff
//! POST /orders/{id}/ship        admin/staff   {tracking_number?}
//! POST /orders/{id}/deliver     admin/staff
//! POST /orders/{id}/pay         admin/staff
//! POST /orders/{id}/refund      admin/staff
//! POST /orders/{id}/cancel      admin/staff, or the owner while pending
//! ```
//! Someone else's order is reported as missing, not forbidden.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use pharma_core::{Order, OrderDetail, ShipOrder};
use pharma_db::DbError;
use serde::Deserialize;

use super::Page;
use crate::auth::User;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/confirm", post(confirm_order))
        .route("/orders/{id}/pack", post(pack_order))
        .route("/orders/{id}/ship", post(ship_order))
        .route("/orders/{id}/deliver", post(deliver_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/orders/{id}/pay", post(pay_order))
        .route("/orders/{id}/refund", post(refund_order))
}

/// Loads an order the caller may see.
async fn visible_order(state: &AppState, user: &User, id: &str) -> ApiResult<Order> {
    let order = state.db.orders().get(id).await?;
    if order.customer_id != user.id && !user.role.is_admin() {
        return Err(DbError::not_found("Order", id).into());
    }
    Ok(order)
}

#[derive(Debug, Default, Deserialize)]
struct OrderParams {
    customer: Option<String>,
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiQuery(params): ApiQuery<OrderParams>,
    ApiQuery(page): ApiQuery<Page>,
) -> ApiResult<Json<Vec<Order>>> {
    let customer = if user.role.is_admin() {
        params.customer
    } else {
        Some(user.id.clone())
    };
    let orders = state
        .db
        .orders()
        .list(customer.as_deref(), page.limit(), page.offset())
        .await?;
    Ok(Json(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderDetail>> {
    visible_order(&state, &user, &id).await?;
    Ok(Json(state.db.orders().detail(&id).await?))
}

async fn confirm_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    user.require_admin()?;
    Ok(Json(state.db.orders().confirm(&id).await?))
}

async fn pack_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderDetail>> {
    user.require_admin()?;
    Ok(Json(state.db.orders().pack(&id, Some(&user.id)).await?))
}

async fn ship_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<ShipOrder>,
) -> ApiResult<Json<OrderDetail>> {
    user.require_admin()?;
    Ok(Json(state.db.orders().ship(&id, input).await?))
}

async fn deliver_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderDetail>> {
    user.require_admin()?;
    Ok(Json(state.db.orders().deliver(&id).await?))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    let order = if user.role.is_admin() {
        state.db.orders().cancel(&id, Some(&user.id)).await?
    } else {
        state.db.orders().cancel_pending(&id, &user.id).await?
    };
    Ok(Json(order))
}

async fn pay_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    user.require_admin()?;
    Ok(Json(state.db.orders().pay(&id).await?))
}

async fn refund_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    user.require_admin()?;
    Ok(Json(state.db.orders().refund(&id).await?))
}
