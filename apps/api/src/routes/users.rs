//! The caller's own profile and delivery addresses.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use pharma_core::{Address, AddressInput, ProfileInput, UserProfile};

use crate::auth::User;
use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me/profile", get(get_profile).put(put_profile))
        .route("/me/addresses", get(list_addresses).post(create_address))
        .route(
            "/me/addresses/{id}",
            get(get_address).put(update_address).delete(delete_address),
        )
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: User,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.db.users().get_profile(&user.id).await?))
}

/// The stored role always follows the token.
async fn put_profile(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<ProfileInput>,
) -> ApiResult<Json<UserProfile>> {
    let profile = state
        .db
        .users()
        .upsert_profile(&user.id, user.role, input)
        .await?;
    Ok(Json(profile))
}

async fn list_addresses(
    State(state): State<Arc<AppState>>,
    user: User,
) -> ApiResult<Json<Vec<Address>>> {
    Ok(Json(state.db.users().list_addresses(&user.id).await?))
}

async fn get_address(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<Json<Address>> {
    Ok(Json(state.db.users().get_address(&user.id, &id).await?))
}

async fn create_address(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<AddressInput>,
) -> ApiResult<(StatusCode, Json<Address>)> {
    let address = state
        .db
        .users()
        .create_address(&user.id, user.role, input)
        .await?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn update_address(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<AddressInput>,
) -> ApiResult<Json<Address>> {
    let address = state
        .db
        .users()
        .update_address(&user.id, &id, input)
        .await?;
    Ok(Json(address))
}

async fn delete_address(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.users().delete_address(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
