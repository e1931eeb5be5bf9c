//! The caller's cart and checkout.
//!
//! ```text
//! POST /cart {branch_id}          open a cart at a branch (one per user)
//! GET  /cart                      lines + subtotal
//! POST /cart/items                add, merging with an existing line
//! PUT  /cart/items/{variant_id}   set quantity
//! DELETE /cart/items/{variant_id}
//! DELETE /cart                    empty it
//! POST /cart/checkout             reserve stock FEFO → pending order
//! ```

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use pharma_core::{AddCartItem, CartView, Checkout, CreateCart, OrderDetail, UpdateCartItem};
use pharma_db::retry_busy;
use tracing::info;

use crate::auth::User;
use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cart", get(get_cart).post(create_cart).delete(clear_cart))
        .route("/cart/items", post(add_item))
        .route(
            "/cart/items/{variant_id}",
            put(update_item).delete(remove_item),
        )
        .route("/cart/checkout", post(checkout))
}

async fn get_cart(State(state): State<Arc<AppState>>, user: User) -> ApiResult<Json<CartView>> {
    Ok(Json(state.db.carts().get_view(&user.id).await?))
}

async fn create_cart(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<CreateCart>,
) -> ApiResult<(StatusCode, Json<CartView>)> {
    let cart = state.db.carts().create(&user.id, input).await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

async fn clear_cart(State(state): State<Arc<AppState>>, user: User) -> ApiResult<StatusCode> {
    state.db.carts().clear(&user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<AddCartItem>,
) -> ApiResult<Json<CartView>> {
    Ok(Json(state.db.carts().add_item(&user.id, input).await?))
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(variant_id): Path<String>,
    ApiJson(input): ApiJson<UpdateCartItem>,
) -> ApiResult<Json<CartView>> {
    let cart = state
        .db
        .carts()
        .update_item(&user.id, &variant_id, input)
        .await?;
    Ok(Json(cart))
}

async fn remove_item(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(variant_id): Path<String>,
) -> ApiResult<Json<CartView>> {
    Ok(Json(
        state.db.carts().remove_item(&user.id, &variant_id).await?,
    ))
}

/// Checkout is all-or-nothing, so a busy database is safe to retry.
async fn checkout(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<Checkout>,
) -> ApiResult<(StatusCode, Json<OrderDetail>)> {
    let orders = state.db.orders();
    let order = retry_busy(state.config.busy_retries, || {
        let orders = orders.clone();
        let customer_id = user.id.clone();
        let input = input.clone();
        async move { orders.checkout(&customer_id, input).await }
    })
    .await?;

    info!(
        order_id = %order.order.id,
        customer_id = %user.id,
        total_cents = order.order.total_cents,
        "Checkout complete"
    );
    Ok((StatusCode::CREATED, Json(order)))
}
