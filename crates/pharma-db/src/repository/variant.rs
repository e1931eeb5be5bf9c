//! # Variant Repository
//!
//! Sellable product variants and the public catalog search.
//!
//! ## Search
//! ```text
//! search = "para"
//!    │
//!    ├── lower(products.brand_name)      LIKE '%para%'
//!    ├── lower(active_ingredients.name)  LIKE '%para%'   (via EXISTS on links)
//!    └── lower(product_variants.barcode) LIKE '%para%'
//! ```
//! Filters are ANDed with the search; ordering comes from [`VariantOrdering`]
//! and always ends with the variant id so pages are stable.

use chrono::Utc;
use pharma_core::{
    ProductVariant, VariantInput, VariantListing, VariantOrdering, VariantQuery,
    DEFAULT_LIST_LIMIT,
};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::{contains_pattern, generate_id};
use crate::error::{DbError, DbResult};

const LISTING_SELECT: &str = r#"
    SELECT v.id, v.product_id, p.brand_name, m.name AS manufacturer_name,
           v.dosage_form_id, d.name AS dosage_form_name, v.strength_text,
           v.pack_size, v.barcode_gtin, v.is_prescription_only, v.is_otc
    FROM product_variants v
    JOIN products p ON p.id = v.product_id
    JOIN manufacturers m ON m.id = p.manufacturer_id
    JOIN dosage_forms d ON d.id = v.dosage_form_id
"#;

fn order_clause(ordering: VariantOrdering) -> &'static str {
    match ordering {
        VariantOrdering::BrandNameAsc => "ORDER BY p.brand_name ASC, v.pack_size ASC, v.id",
        VariantOrdering::BrandNameDesc => "ORDER BY p.brand_name DESC, v.pack_size ASC, v.id",
        VariantOrdering::PackSizeAsc => "ORDER BY v.pack_size ASC, p.brand_name ASC, v.id",
        VariantOrdering::PackSizeDesc => "ORDER BY v.pack_size DESC, p.brand_name ASC, v.id",
    }
}

/// Repository for product variants.
#[derive(Debug, Clone)]
pub struct VariantRepository {
    pool: SqlitePool,
}

impl VariantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        VariantRepository { pool }
    }

    /// Public listing with search, filters and ordering.
    pub async fn list(&self, query: &VariantQuery) -> DbResult<Vec<VariantListing>> {
        let pattern = query.search.as_deref().map(contains_pattern);
        let limit = if query.limit > 0 {
            query.limit
        } else {
            DEFAULT_LIST_LIMIT
        };

        let sql = format!(
            r#"{LISTING_SELECT}
            WHERE (?1 IS NULL
                   OR lower(p.brand_name) LIKE ?1 ESCAPE '\'
                   OR lower(COALESCE(v.barcode_gtin, '')) LIKE ?1 ESCAPE '\'
                   OR EXISTS (
                       SELECT 1 FROM product_ingredients pi
                       JOIN active_ingredients ai ON ai.id = pi.ingredient_id
                       WHERE pi.product_id = v.product_id AND lower(ai.name) LIKE ?1 ESCAPE '\'))
              AND (?2 IS NULL OR v.is_prescription_only = ?2)
              AND (?3 IS NULL OR v.is_otc = ?3)
              AND (?4 IS NULL OR v.dosage_form_id = ?4)
            {}
            LIMIT ?5 OFFSET ?6"#,
            order_clause(query.ordering)
        );

        let rows = sqlx::query_as::<_, VariantListing>(&sql)
            .bind(&pattern)
            .bind(query.is_prescription_only)
            .bind(query.is_otc)
            .bind(&query.dosage_form_id)
            .bind(limit)
            .bind(query.offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        debug!(count = rows.len(), search = ?query.search, "Listed variants");
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> DbResult<ProductVariant> {
        sqlx::query_as::<_, ProductVariant>("SELECT * FROM product_variants WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("ProductVariant", id))
    }

    /// One variant joined with its product, manufacturer and dosage form names.
    pub async fn get_listing(&self, id: &str) -> DbResult<VariantListing> {
        let sql = format!("{LISTING_SELECT} WHERE v.id = ?");
        sqlx::query_as::<_, VariantListing>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("ProductVariant", id))
    }

    pub async fn create(&self, input: VariantInput) -> DbResult<ProductVariant> {
        let input = input.validated()?;
        let now = Utc::now();
        let variant = ProductVariant {
            id: generate_id(),
            product_id: input.product_id,
            dosage_form_id: input.dosage_form_id,
            strength_text: input.strength_text,
            pack_size: input.pack_size,
            barcode_gtin: input.barcode_gtin,
            is_prescription_only: input.is_prescription_only,
            is_otc: input.is_otc,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO product_variants (
                id, product_id, dosage_form_id, strength_text, pack_size,
                barcode_gtin, is_prescription_only, is_otc, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.product_id)
        .bind(&variant.dosage_form_id)
        .bind(&variant.strength_text)
        .bind(variant.pack_size)
        .bind(&variant.barcode_gtin)
        .bind(variant.is_prescription_only)
        .bind(variant.is_otc)
        .bind(variant.created_at)
        .bind(variant.updated_at)
        .execute(&self.pool)
        .await?;

        info!(id = %variant.id, product_id = %variant.product_id, pack_size = variant.pack_size, "Variant created");
        Ok(variant)
    }

    pub async fn update(&self, id: &str, input: VariantInput) -> DbResult<ProductVariant> {
        let input = input.validated()?;
        let rows = sqlx::query(
            r#"
            UPDATE product_variants
            SET product_id = ?, dosage_form_id = ?, strength_text = ?, pack_size = ?,
                barcode_gtin = ?, is_prescription_only = ?, is_otc = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&input.product_id)
        .bind(&input.dosage_form_id)
        .bind(&input.strength_text)
        .bind(input.pack_size)
        .bind(&input.barcode_gtin)
        .bind(input.is_prescription_only)
        .bind(input.is_otc)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(DbError::not_found("ProductVariant", id));
        }
        self.get(id).await
    }

    /// Rejected with `Protected` once the variant has stock or order lines.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let rows = sqlx::query("DELETE FROM product_variants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from(e).protect("ProductVariant", id))?
            .rows_affected();

        if rows == 0 {
            return Err(DbError::not_found("ProductVariant", id));
        }
        info!(%id, "Variant deleted");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
