//! # Catalog Repository
//!
//! Lookup tables (manufacturers, dosage forms, active ingredients, ATC
//! classes) and products with their ingredient links.
//!
//! ## Delete Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DELETE manufacturer   → RESTRICT if any product uses it → Protected   │
//! │  DELETE dosage form    → RESTRICT if any variant uses it → Protected   │
//! │  DELETE ATC class      → products.atc_class_id SET NULL                │
//! │  DELETE ingredient     → its product links CASCADE                     │
//! │  DELETE product        → ingredient links and variants CASCADE,        │
//! │                          Protected if a variant has batches or orders  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use pharma_core::{
    ActiveIngredient, AtcClass, AtcClassInput, DosageForm, IngredientLink, Manufacturer,
    ManufacturerInput, NameInput, Product, ProductDetail, ProductIngredient, ProductInput,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{contains_pattern, generate_id};
use crate::error::{DbError, DbResult};

/// Repository for catalog reference data.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

/// Lookup tables with a single unique `name` column.
#[derive(Debug, Clone, Copy)]
enum NameTable {
    DosageForms,
    Ingredients,
}

impl NameTable {
    fn table(&self) -> &'static str {
        match self {
            NameTable::DosageForms => "dosage_forms",
            NameTable::Ingredients => "active_ingredients",
        }
    }

    fn entity(&self) -> &'static str {
        match self {
            NameTable::DosageForms => "DosageForm",
            NameTable::Ingredients => "ActiveIngredient",
        }
    }

    fn max_len(&self) -> usize {
        match self {
            NameTable::DosageForms => 100,
            NameTable::Ingredients => 255,
        }
    }
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Manufacturers
    // =========================================================================

    pub async fn list_manufacturers(&self) -> DbResult<Vec<Manufacturer>> {
        let rows = sqlx::query_as::<_, Manufacturer>("SELECT * FROM manufacturers ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_manufacturer(&self, id: &str) -> DbResult<Manufacturer> {
        sqlx::query_as::<_, Manufacturer>("SELECT * FROM manufacturers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Manufacturer", id))
    }

    pub async fn create_manufacturer(&self, input: ManufacturerInput) -> DbResult<Manufacturer> {
        let input = input.validated()?;
        let manufacturer = Manufacturer {
            id: generate_id(),
            name: input.name,
            is_active: input.is_active,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO manufacturers (id, name, is_active, created_at) VALUES (?, ?, ?, ?)")
            .bind(&manufacturer.id)
            .bind(&manufacturer.name)
            .bind(manufacturer.is_active)
            .bind(manufacturer.created_at)
            .execute(&self.pool)
            .await?;

        info!(id = %manufacturer.id, name = %manufacturer.name, "Manufacturer created");
        Ok(manufacturer)
    }

    pub async fn update_manufacturer(
        &self,
        id: &str,
        input: ManufacturerInput,
    ) -> DbResult<Manufacturer> {
        let input = input.validated()?;
        let rows = sqlx::query("UPDATE manufacturers SET name = ?, is_active = ? WHERE id = ?")
            .bind(&input.name)
            .bind(input.is_active)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(DbError::not_found("Manufacturer", id));
        }
        self.get_manufacturer(id).await
    }

    /// Rejected with `Protected` while any product references it.
    pub async fn delete_manufacturer(&self, id: &str) -> DbResult<()> {
        self.delete_row("manufacturers", "Manufacturer", id).await
    }

    // =========================================================================
    // Dosage Forms & Active Ingredients
    // =========================================================================

    pub async fn list_dosage_forms(&self) -> DbResult<Vec<DosageForm>> {
        self.list_named(NameTable::DosageForms).await
    }

    pub async fn get_dosage_form(&self, id: &str) -> DbResult<DosageForm> {
        self.get_named(NameTable::DosageForms, id).await
    }

    pub async fn create_dosage_form(&self, input: NameInput) -> DbResult<DosageForm> {
        let id = self.insert_named(NameTable::DosageForms, input).await?;
        self.get_dosage_form(&id).await
    }

    pub async fn update_dosage_form(&self, id: &str, input: NameInput) -> DbResult<DosageForm> {
        self.update_named(NameTable::DosageForms, id, input).await?;
        self.get_dosage_form(id).await
    }

    pub async fn delete_dosage_form(&self, id: &str) -> DbResult<()> {
        let t = NameTable::DosageForms;
        self.delete_row(t.table(), t.entity(), id).await
    }

    pub async fn list_ingredients(&self) -> DbResult<Vec<ActiveIngredient>> {
        self.list_named(NameTable::Ingredients).await
    }

    pub async fn get_ingredient(&self, id: &str) -> DbResult<ActiveIngredient> {
        self.get_named(NameTable::Ingredients, id).await
    }

    pub async fn create_ingredient(&self, input: NameInput) -> DbResult<ActiveIngredient> {
        let id = self.insert_named(NameTable::Ingredients, input).await?;
        self.get_ingredient(&id).await
    }

    pub async fn update_ingredient(
        &self,
        id: &str,
        input: NameInput,
    ) -> DbResult<ActiveIngredient> {
        self.update_named(NameTable::Ingredients, id, input).await?;
        self.get_ingredient(id).await
    }

    pub async fn delete_ingredient(&self, id: &str) -> DbResult<()> {
        let t = NameTable::Ingredients;
        self.delete_row(t.table(), t.entity(), id).await
    }

    async fn list_named<T>(&self, t: NameTable) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let sql = format!("SELECT id, name FROM {} ORDER BY name", t.table());
        Ok(sqlx::query_as::<_, T>(&sql).fetch_all(&self.pool).await?)
    }

    async fn get_named<T>(&self, t: NameTable, id: &str) -> DbResult<T>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let sql = format!("SELECT id, name FROM {} WHERE id = ?", t.table());
        sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(t.entity(), id))
    }

    async fn insert_named(&self, t: NameTable, input: NameInput) -> DbResult<String> {
        let input = input.validated(t.max_len())?;
        let id = generate_id();
        let sql = format!("INSERT INTO {} (id, name) VALUES (?, ?)", t.table());
        sqlx::query(&sql)
            .bind(&id)
            .bind(&input.name)
            .execute(&self.pool)
            .await?;

        info!(table = t.table(), %id, name = %input.name, "Lookup row created");
        Ok(id)
    }

    async fn update_named(&self, t: NameTable, id: &str, input: NameInput) -> DbResult<()> {
        let input = input.validated(t.max_len())?;
        let sql = format!("UPDATE {} SET name = ? WHERE id = ?", t.table());
        let rows = sqlx::query(&sql)
            .bind(&input.name)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(DbError::not_found(t.entity(), id));
        }
        Ok(())
    }

    // =========================================================================
    // ATC Classes
    // =========================================================================

    pub async fn list_atc_classes(&self) -> DbResult<Vec<AtcClass>> {
        let rows = sqlx::query_as::<_, AtcClass>("SELECT * FROM atc_classes ORDER BY code")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_atc_class(&self, id: &str) -> DbResult<AtcClass> {
        sqlx::query_as::<_, AtcClass>("SELECT * FROM atc_classes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("AtcClass", id))
    }

    pub async fn create_atc_class(&self, input: AtcClassInput) -> DbResult<AtcClass> {
        let input = input.validated()?;
        let atc = AtcClass {
            id: generate_id(),
            code: input.code,
            name: input.name,
        };
        sqlx::query("INSERT INTO atc_classes (id, code, name) VALUES (?, ?, ?)")
            .bind(&atc.id)
            .bind(&atc.code)
            .bind(&atc.name)
            .execute(&self.pool)
            .await?;
        Ok(atc)
    }

    pub async fn update_atc_class(&self, id: &str, input: AtcClassInput) -> DbResult<AtcClass> {
        let input = input.validated()?;
        let rows = sqlx::query("UPDATE atc_classes SET code = ?, name = ? WHERE id = ?")
            .bind(&input.code)
            .bind(&input.name)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(DbError::not_found("AtcClass", id));
        }
        self.get_atc_class(id).await
    }

    /// Products keep existing with `atc_class_id = NULL`.
    pub async fn delete_atc_class(&self, id: &str) -> DbResult<()> {
        self.delete_row("atc_classes", "AtcClass", id).await
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Lists products by brand name. `search` matches brand name substrings.
    pub async fn list_products(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Product>> {
        let pattern = search.map(contains_pattern);
        let rows = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE (? IS NULL OR lower(brand_name) LIKE ? ESCAPE '\')
            ORDER BY brand_name
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_product(&self, id: &str) -> DbResult<ProductDetail> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;

        let ingredients = sqlx::query_as::<_, ProductIngredient>(
            "SELECT * FROM product_ingredients WHERE product_id = ? ORDER BY ingredient_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ProductDetail {
            product,
            ingredients,
        })
    }

    /// Creates a product and its ingredient links in one transaction.
    pub async fn create_product(&self, input: ProductInput) -> DbResult<ProductDetail> {
        let input = input.validated()?;
        let id = generate_id();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, brand_name, manufacturer_id, atc_class_id, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.brand_name)
        .bind(&input.manufacturer_id)
        .bind(&input.atc_class_id)
        .bind(&input.description)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if let Some(links) = &input.ingredients {
            insert_links(&mut *tx, &id, links).await?;
        }

        tx.commit().await?;

        info!(%id, brand_name = %input.brand_name, "Product created");
        self.get_product(&id).await
    }

    /// Updates a product. A given ingredient list replaces the old links
    /// atomically; `None` leaves them as they are.
    pub async fn update_product(&self, id: &str, input: ProductInput) -> DbResult<ProductDetail> {
        let input = input.validated()?;
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            UPDATE products
            SET brand_name = ?, manufacturer_id = ?, atc_class_id = ?, description = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&input.brand_name)
        .bind(&input.manufacturer_id)
        .bind(&input.atc_class_id)
        .bind(&input.description)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(DbError::not_found("Product", id));
        }

        if let Some(links) = &input.ingredients {
            sqlx::query("DELETE FROM product_ingredients WHERE product_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_links(&mut *tx, id, links).await?;
        }

        tx.commit().await?;

        debug!(%id, "Product updated");
        self.get_product(id).await
    }

    /// Cascades to ingredient links and variants.
    pub async fn delete_product(&self, id: &str) -> DbResult<()> {
        self.delete_row("products", "Product", id).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn delete_row(&self, table: &str, entity: &str, id: &str) -> DbResult<()> {
        let sql = format!("DELETE FROM {table} WHERE id = ?");
        let rows = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from(e).protect(entity, id))?
            .rows_affected();

        if rows == 0 {
            return Err(DbError::not_found(entity, id));
        }
        info!(entity, %id, "Deleted");
        Ok(())
    }
}

async fn insert_links(
    conn: &mut SqliteConnection,
    product_id: &str,
    links: &[IngredientLink],
) -> DbResult<()> {
    for link in links {
        sqlx::query(
            "INSERT INTO product_ingredients (id, product_id, ingredient_id, strength) VALUES (?, ?, ?, ?)",
        )
        .bind(generate_id())
        .bind(product_id)
        .bind(&link.ingredient_id)
        .bind(&link.strength)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
