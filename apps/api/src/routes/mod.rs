//! HTTP routes.
//!
//! ```text
//! /health                                   liveness + database check
//! /manufacturers /dosages /ingredients      lookup tables        (admin)
//! /atc-classes /products                                         (admin)
//! /variants                                 storefront listing   (public read)
//! /variants/{id}/reviews                    reviews              (public read)
//! /companies /branches                      stock holders        (admin write)
//! /batches /stock /predictions              inventory
//! /cart /cart/checkout                      the caller's cart
//! /orders                                   order workflow
//! /me/profile /me/addresses                 the caller's account
//! ```

use std::sync::Arc;

use axum::Router;
use pharma_core::validation::clamp_list_limit;
use serde::Deserialize;

use crate::state::AppState;

pub mod cart;
pub mod catalog;
pub mod health;
pub mod inventory;
pub mod orders;
pub mod reviews;
pub mod users;
pub mod variants;

/// Every route, before state is attached.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::router())
        .merge(catalog::router())
        .merge(variants::router())
        .merge(reviews::router())
        .merge(inventory::router())
        .merge(cart::router())
        .merge(orders::router())
        .merge(users::router())
}

/// `?limit=&offset=` on list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    pub fn limit(&self) -> i64 {
        clamp_list_limit(self.limit)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharma_core::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

    #[test]
    fn test_page_defaults_and_caps() {
        let page = Page::default();
        assert_eq!(page.limit(), DEFAULT_LIST_LIMIT);
        assert_eq!(page.offset(), 0);

        let page = Page {
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!(page.limit(), MAX_LIST_LIMIT);
        assert_eq!(page.offset(), 0);
    }
}
