//! Storefront variant listing.
//!
//! Reads are public; writes need the admin privilege. A request that does
//! send a token must send a valid one, even on the public reads.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use pharma_core::{ProductVariant, VariantInput, VariantListing, VariantOrdering, VariantQuery};
use serde::Deserialize;
use tracing::debug;

use super::Page;
use crate::auth::{Principal, User};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/variants", get(list_variants).post(create_variant))
        .route(
            "/variants/{id}",
            get(get_variant).put(update_variant).delete(delete_variant),
        )
}

/// `GET /variants` query string.
#[derive(Debug, Default, Deserialize)]
struct VariantParams {
    search: Option<String>,
    is_prescription_only: Option<bool>,
    is_otc: Option<bool>,
    dosage_form: Option<String>,
    ordering: Option<String>,
}

impl VariantParams {
    fn into_query(self, page: Page) -> ApiResult<VariantQuery> {
        let ordering = match self.ordering.as_deref() {
            Some(o) => o.parse::<VariantOrdering>()?,
            None => VariantOrdering::default(),
        };
        let query = VariantQuery {
            is_prescription_only: self.is_prescription_only,
            is_otc: self.is_otc,
            dosage_form_id: self.dosage_form.filter(|d| !d.trim().is_empty()),
            ordering,
            limit: page.limit(),
            offset: page.offset(),
            ..Default::default()
        }
        .with_search(self.search.as_deref())?;
        Ok(query)
    }
}

async fn list_variants(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiQuery(params): ApiQuery<VariantParams>,
    ApiQuery(page): ApiQuery<Page>,
) -> ApiResult<Json<Vec<VariantListing>>> {
    let query = params.into_query(page)?;
    let variants = state.db.variants().list(&query).await?;
    debug!(
        user = principal.user().map(|u| u.id.as_str()).unwrap_or("anonymous"),
        results = variants.len(),
        "Variant listing"
    );
    Ok(Json(variants))
}

async fn get_variant(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Json<VariantListing>> {
    Ok(Json(state.db.variants().get_listing(&id).await?))
}

async fn create_variant(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(input): ApiJson<VariantInput>,
) -> ApiResult<(StatusCode, Json<ProductVariant>)> {
    user.require_admin()?;
    let created = state.db.variants().create(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_variant(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<VariantInput>,
) -> ApiResult<Json<ProductVariant>> {
    user.require_admin()?;
    Ok(Json(state.db.variants().update(&id, input).await?))
}

async fn delete_variant(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;
    state.db.variants().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_params_build_query() {
        let params = VariantParams {
            search: Some("  Para ".to_string()),
            is_otc: Some(true),
            ordering: Some("-pack_size".to_string()),
            ..Default::default()
        };
        let query = params.into_query(Page::default()).unwrap();
        assert_eq!(query.search.as_deref(), Some("Para"));
        assert_eq!(query.is_otc, Some(true));
        assert_eq!(query.ordering, VariantOrdering::PackSizeDesc);
    }

    #[test]
    fn test_unknown_ordering_rejected() {
        let params = VariantParams {
            ordering: Some("price".to_string()),
            ..Default::default()
        };
        let err = params.into_query(Page::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[test]
    fn test_blank_search_is_dropped() {
        let params = VariantParams {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(params.into_query(Page::default()).unwrap().search, None);
    }
}
