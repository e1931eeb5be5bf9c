use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use pharma_core::{Review, ReviewInput};

use super::Page;
use crate::auth::{Principal, User};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/variants/{id}/reviews",
        get(list_reviews).post(create_review),
    )
}

async fn list_reviews(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(variant_id): Path<String>,
    ApiQuery(page): ApiQuery<Page>,
) -> ApiResult<Json<Vec<Review>>> {
    state.db.variants().get(&variant_id).await?;
    let reviews = state
        .db
        .reviews()
        .list_for_variant(&variant_id, page.limit(), page.offset())
        .await?;
    Ok(Json(reviews))
}

/// The review is written under the caller's id.
async fn create_review(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(variant_id): Path<String>,
    ApiJson(input): ApiJson<ReviewInput>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    let review = state
        .db
        .reviews()
        .create(&user.id, &variant_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}
