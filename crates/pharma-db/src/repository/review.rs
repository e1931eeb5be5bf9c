//! Customer reviews of product variants.

use chrono::Utc;
use pharma_core::{Review, ReviewInput};
use sqlx::SqlitePool;
use tracing::info;

use super::generate_id;
use crate::error::{DbError, DbResult};

#[derive(Debug, Clone)]
pub struct ReviewRepository {
    pool: SqlitePool,
}

impl ReviewRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReviewRepository { pool }
    }

    /// Reviews of a variant, newest first.
    pub async fn list_for_variant(
        &self,
        variant_id: &str,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Review>> {
        let rows = sqlx::query_as::<_, Review>(
            r#"
            SELECT * FROM reviews WHERE variant_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(variant_id)
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create(
        &self,
        customer_id: &str,
        variant_id: &str,
        input: ReviewInput,
    ) -> DbResult<Review> {
        let input = input.validated()?;
        let review = Review {
            id: generate_id(),
            customer_id: customer_id.to_string(),
            variant_id: variant_id.to_string(),
            rating: input.rating,
            comment: input.comment,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO reviews (id, customer_id, variant_id, rating, comment, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&review.id)
        .bind(&review.customer_id)
        .bind(&review.variant_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::ForeignKeyViolation { .. } => DbError::not_found("ProductVariant", variant_id),
            other => other,
        })?;

        info!(review_id = %review.id, variant_id, rating = review.rating, "Review added");
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::fixture;

    #[tokio::test]
    async fn test_reviews_listed_newest_first() {
        let fx = fixture().await;
        let reviews = fx.db.reviews();
        let first = reviews
            .create("cust-1", &fx.variant_id, ReviewInput { rating: 4, comment: "ok".to_string() })
            .await
            .unwrap();
        let second = reviews
            .create("cust-2", &fx.variant_id, ReviewInput { rating: 5, comment: String::new() })
            .await
            .unwrap();

        let listed = reviews.list_for_variant(&fx.variant_id, 50, 0).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    }

    #[tokio::test]
    async fn test_review_rating_and_variant_checked() {
        let fx = fixture().await;
        let err = fx
            .db
            .reviews()
            .create("cust-1", &fx.variant_id, ReviewInput { rating: 6, comment: String::new() })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(_)));

        let err = fx
            .db
            .reviews()
            .create("cust-1", &generate_id(), ReviewInput { rating: 3, comment: String::new() })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
