//! Lookup tables and products. Every method needs the admin privilege.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use pharma_core::{
    ActiveIngredient, AtcClass, AtcClassInput, DosageForm, Manufacturer, ManufacturerInput,
    NameInput, Product, ProductDetail, ProductInput,
};
use serde::Deserialize;

use super::Page;
use crate::auth::User;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/manufacturers",
            get(list_manufacturers).post(create_manufacturer),
        )
        .route(
            "/manufacturers/{id}",
            get(get_manufacturer)
                .put(update_manufacturer)
                .delete(delete_manufacturer),
        )
        .route("/dosages", get(list_dosages).post(create_dosage))
        .route(
            "/dosages/{id}",
            get(get_dosage).put(update_dosage).delete(delete_dosage),
        )
        .route("/ingredients", get(list_ingredients).post(create_ingredient))
        .route(
            "/ingredients/{id}",
            get(get_ingredient)
                .put(update_ingredient)
                .delete(delete_ingredient),
        )
        .route("/atc-classes", get(list_atc_classes).post(create_atc_class))
        .route(
            "/atc-classes/{id}",
            get(get_atc_class)
                .put(update_atc_class)
                .delete(delete_atc_class),
        )
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
}

// =============================================================================
// Manufacturers
// =============================================================================

async fn list_manufacturers(
    State(state): State<Arc<AppState>>,
    user: User,
) -> ApiResult<Json<Vec<Manufacturer>>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().list_manufacturers().await?))
}

async fn get_manufacturer(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<Manufacturer>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().get_manufacturer(&id).await?))
}

async fn create_manufacturer(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<ManufacturerInput>,
) -> ApiResult<(StatusCode, Json<Manufacturer>)> {
    user.require_admin()?;
    let created = state.db.catalog().create_manufacturer(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_manufacturer(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<ManufacturerInput>,
) -> ApiResult<Json<Manufacturer>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().update_manufacturer(&id, input).await?))
}

async fn delete_manufacturer(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;
    state.db.catalog().delete_manufacturer(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Dosage Forms
// =============================================================================

async fn list_dosages(
    State(state): State<Arc<AppState>>,
    user: User,
) -> ApiResult<Json<Vec<DosageForm>>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().list_dosage_forms().await?))
}

async fn get_dosage(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<DosageForm>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().get_dosage_form(&id).await?))
}

async fn create_dosage(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<NameInput>,
) -> ApiResult<(StatusCode, Json<DosageForm>)> {
    user.require_admin()?;
    let created = state.db.catalog().create_dosage_form(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_dosage(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<NameInput>,
) -> ApiResult<Json<DosageForm>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().update_dosage_form(&id, input).await?))
}

async fn delete_dosage(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;
    state.db.catalog().delete_dosage_form(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Active Ingredients
// =============================================================================

async fn list_ingredients(
    State(state): State<Arc<AppState>>,
    user: User,
) -> ApiResult<Json<Vec<ActiveIngredient>>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().list_ingredients().await?))
}

async fn get_ingredient(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<ActiveIngredient>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().get_ingredient(&id).await?))
}

async fn create_ingredient(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<NameInput>,
) -> ApiResult<(StatusCode, Json<ActiveIngredient>)> {
    user.require_admin()?;
    let created = state.db.catalog().create_ingredient(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_ingredient(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<NameInput>,
) -> ApiResult<Json<ActiveIngredient>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().update_ingredient(&id, input).await?))
}

async fn delete_ingredient(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;
    state.db.catalog().delete_ingredient(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// ATC Classes
// =============================================================================

async fn list_atc_classes(
    State(state): State<Arc<AppState>>,
    user: User,
) -> ApiResult<Json<Vec<AtcClass>>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().list_atc_classes().await?))
}

async fn get_atc_class(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<AtcClass>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().get_atc_class(&id).await?))
}

async fn create_atc_class(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<AtcClassInput>,
) -> ApiResult<(StatusCode, Json<AtcClass>)> {
    user.require_admin()?;
    let created = state.db.catalog().create_atc_class(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_atc_class(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<AtcClassInput>,
) -> ApiResult<Json<AtcClass>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().update_atc_class(&id, input).await?))
}

async fn delete_atc_class(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;
    state.db.catalog().delete_atc_class(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct ProductParams {
    search: Option<String>,
}

async fn list_products(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiQuery(params): ApiQuery<ProductParams>,
    ApiQuery(page): ApiQuery<Page>,
) -> ApiResult<Json<Vec<Product>>> {
    user.require_admin()?;
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let products = state
        .db
        .catalog()
        .list_products(search, page.limit(), page.offset())
        .await?;
    Ok(Json(products))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<ProductDetail>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().get_product(&id).await?))
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<ProductInput>,
) -> ApiResult<(StatusCode, Json<ProductDetail>)> {
    user.require_admin()?;
    let created = state.db.catalog().create_product(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<ProductInput>,
) -> ApiResult<Json<ProductDetail>> {
    user.require_admin()?;
    Ok(Json(state.db.catalog().update_product(&id, input).await?))
}

async fn delete_product(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;
    state.db.catalog().delete_product(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
