//! Companies, branches, batches, stock levels and demand predictions.
//!
//! ```text
//! ┌──────────────────────────────────────┬───────────────────────────────┐
//! │ Route                                │ Who                           │
//! ├──────────────────────────────────────┼───────────────────────────────┤
//! │ GET  /companies /branches            │ any authenticated user        │
//! │ POST/PUT/DELETE companies, branches  │ admin, staff                  │
//! │ /batches, /batches/{id}/...          │ admin, staff, pharmacy owner  │
//! │ GET  /stock?branch=&variant=         │ public                        │
//! │ GET  /predictions                    │ admin, staff, pharmacy owner  │
//! │ POST /predictions                    │ admin, staff                  │
//! └──────────────────────────────────────┴───────────────────────────────┘
//! ```

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use pharma_core::{
    AdjustStock, Branch, BranchInput, Company, CompanyInput, CompanyKind, InventoryBatch,
    InventoryMovement, Prediction, PredictionInput, ReceiveStock, StockLevel,
};
use serde::Deserialize;

use crate::auth::{Principal, User};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/companies", get(list_companies).post(create_company))
        .route(
            "/companies/{id}",
            get(get_company).put(update_company).delete(delete_company),
        )
        .route("/branches", get(list_branches).post(create_branch))
        .route(
            "/branches/{id}",
            get(get_branch).put(update_branch).delete(delete_branch),
        )
        .route("/batches", get(list_batches).post(receive_stock))
        .route("/batches/{id}", get(get_batch))
        .route("/batches/{id}/adjust", post(adjust_stock))
        .route("/batches/{id}/availability", put(set_availability))
        .route("/batches/{id}/movements", get(list_movements))
        .route("/stock", get(stock_level))
        .route("/predictions", get(list_predictions).post(upsert_prediction))
}

// =============================================================================
// Companies
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct CompanyParams {
    kind: Option<CompanyKind>,
}

async fn list_companies(
    State(state): State<Arc<AppState>>,
    _user: User,
    ApiQuery(params): ApiQuery<CompanyParams>,
) -> ApiResult<Json<Vec<Company>>> {
    Ok(Json(state.db.inventory().list_companies(params.kind).await?))
}

async fn get_company(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<Company>> {
    Ok(Json(state.db.inventory().get_company(&id).await?))
}

async fn create_company(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<CompanyInput>,
) -> ApiResult<(StatusCode, Json<Company>)> {
    user.require_admin()?;
    let created = state.db.inventory().create_company(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_company(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<CompanyInput>,
) -> ApiResult<Json<Company>> {
    user.require_admin()?;
    Ok(Json(state.db.inventory().update_company(&id, input).await?))
}

async fn delete_company(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;
    state.db.inventory().delete_company(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Branches
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct BranchParams {
    company: Option<String>,
}

async fn list_branches(
    State(state): State<Arc<AppState>>,
    _user: User,
    ApiQuery(params): ApiQuery<BranchParams>,
) -> ApiResult<Json<Vec<Branch>>> {
    let branches = state
        .db
        .inventory()
        .list_branches(params.company.as_deref())
        .await?;
    Ok(Json(branches))
}

async fn get_branch(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<Branch>> {
    Ok(Json(state.db.inventory().get_branch(&id).await?))
}

async fn create_branch(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<BranchInput>,
) -> ApiResult<(StatusCode, Json<Branch>)> {
    user.require_admin()?;
    let created = state.db.inventory().create_branch(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_branch(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<BranchInput>,
) -> ApiResult<Json<Branch>> {
    user.require_admin()?;
    Ok(Json(state.db.inventory().update_branch(&id, input).await?))
}

async fn delete_branch(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;
    state.db.inventory().delete_branch(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Batches
// =============================================================================

/// `?branch=&variant=`, both optional.
#[derive(Debug, Default, Deserialize)]
struct BatchParams {
    branch: Option<String>,
    variant: Option<String>,
}

async fn list_batches(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiQuery(params): ApiQuery<BatchParams>,
) -> ApiResult<Json<Vec<InventoryBatch>>> {
    user.require_inventory()?;
    let batches = state
        .db
        .inventory()
        .list_batches(params.branch.as_deref(), params.variant.as_deref())
        .await?;
    Ok(Json(batches))
}

async fn get_batch(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<InventoryBatch>> {
    user.require_inventory()?;
    Ok(Json(state.db.inventory().get_batch(&id).await?))
}

async fn receive_stock(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<ReceiveStock>,
) -> ApiResult<(StatusCode, Json<InventoryBatch>)> {
    user.require_inventory()?;
    let batch = state
        .db
        .inventory()
        .receive_stock(input, Some(&user.id))
        .await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

async fn adjust_stock(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<AdjustStock>,
) -> ApiResult<Json<InventoryMovement>> {
    user.require_inventory()?;
    let movement = state
        .db
        .inventory()
        .adjust_stock(&id, input, Some(&user.id))
        .await?;
    Ok(Json(movement))
}

#[derive(Debug, Deserialize)]
struct Availability {
    is_available: bool,
}

async fn set_availability(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Availability>,
) -> ApiResult<Json<InventoryBatch>> {
    user.require_inventory()?;
    let batch = state
        .db
        .inventory()
        .set_availability(&id, body.is_available)
        .await?;
    Ok(Json(batch))
}

async fn list_movements(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<InventoryMovement>>> {
    user.require_inventory()?;
    Ok(Json(state.db.inventory().list_movements(&id).await?))
}

// =============================================================================
// Stock Levels
// =============================================================================

/// `?branch=&variant=`, both required.
#[derive(Debug, Deserialize)]
struct StockParams {
    branch: String,
    variant: String,
}

async fn stock_level(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    ApiQuery(params): ApiQuery<StockParams>,
) -> ApiResult<Json<StockLevel>> {
    let level = state
        .db
        .inventory()
        .availability(&params.branch, &params.variant)
        .await?;
    Ok(Json(level))
}

// =============================================================================
// Predictions
// =============================================================================

async fn list_predictions(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiQuery(params): ApiQuery<BatchParams>,
) -> ApiResult<Json<Vec<Prediction>>> {
    user.require_inventory()?;
    let predictions = state
        .db
        .inventory()
        .list_predictions(params.branch.as_deref(), params.variant.as_deref())
        .await?;
    Ok(Json(predictions))
}

/// Forecasts are written by the forecasting job under a staff token.
async fn upsert_prediction(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<PredictionInput>,
) -> ApiResult<Json<Prediction>> {
    user.require_admin()?;
    Ok(Json(state.db.inventory().upsert_prediction(input).await?))
}
