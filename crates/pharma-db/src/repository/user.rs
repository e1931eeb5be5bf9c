//! # User Repository
//!
//! Profiles and delivery addresses. Accounts themselves are issued by the
//! identity provider; a profile row is created the first time a user
//! writes one, keyed by the token's subject.
//!
//! ## Default Address
//! ```text
//! create/update(is_default = true)
//!      │
//!      ├── UPDATE addresses SET is_default = 0 WHERE user_id = ?
//!      └── write the address with is_default = 1
//! ```
//! Both steps share a transaction, and a partial unique index backs it up.

use chrono::Utc;
use pharma_core::{Address, AddressInput, ProfileInput, Role, UserProfile};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::generate_id;
use crate::error::{DbError, DbResult};

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    pub async fn get_profile(&self, id: &str) -> DbResult<UserProfile> {
        sqlx::query_as::<_, UserProfile>("SELECT * FROM user_profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("UserProfile", id))
    }

    /// Creates or replaces the profile of `id`. The role is taken from the
    /// caller's token, never from the payload.
    pub async fn upsert_profile(
        &self,
        id: &str,
        role: Role,
        input: ProfileInput,
    ) -> DbResult<UserProfile> {
        let input = input.validated()?;
        let now = Utc::now();
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO user_profiles (id, full_name, phone, role, default_language, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                full_name = excluded.full_name,
                phone = excluded.phone,
                role = excluded.role,
                default_language = excluded.default_language,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.full_name)
        .bind(&input.phone)
        .bind(role)
        .bind(input.default_language)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        info!(user_id = id, role = %role, "Profile saved");
        Ok(profile)
    }

    // =========================================================================
    // Addresses
    // =========================================================================

    /// The user's addresses, default first.
    pub async fn list_addresses(&self, user_id: &str) -> DbResult<Vec<Address>> {
        let rows = sqlx::query_as::<_, Address>(
            "SELECT * FROM addresses WHERE user_id = ? ORDER BY is_default DESC, city, street, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Another user's address is reported as missing.
    pub async fn get_address(&self, user_id: &str, id: &str) -> DbResult<Address> {
        sqlx::query_as::<_, Address>("SELECT * FROM addresses WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Address", id))
    }

    pub async fn create_address(
        &self,
        user_id: &str,
        role: Role,
        input: AddressInput,
    ) -> DbResult<Address> {
        let input = input.validated()?;
        let id = generate_id();
        let mut tx = self.pool.begin().await?;

        ensure_profile(&mut *tx, user_id, role).await?;
        if input.is_default {
            clear_default(&mut *tx, user_id).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO addresses (
                id, user_id, governorate, city, district, street,
                building_no, apartment, geo_lat, geo_lng, is_default
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&input.governorate)
        .bind(&input.city)
        .bind(&input.district)
        .bind(&input.street)
        .bind(&input.building_no)
        .bind(&input.apartment)
        .bind(input.geo_lat)
        .bind(input.geo_lng)
        .bind(input.is_default)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(user_id, address_id = %id, is_default = input.is_default, "Address created");
        self.get_address(user_id, &id).await
    }

    pub async fn update_address(
        &self,
        user_id: &str,
        id: &str,
        input: AddressInput,
    ) -> DbResult<Address> {
        let input = input.validated()?;
        let mut tx = self.pool.begin().await?;

        if input.is_default {
            clear_default(&mut *tx, user_id).await?;
        }

        let rows = sqlx::query(
            r#"
            UPDATE addresses
            SET governorate = ?, city = ?, district = ?, street = ?, building_no = ?,
                apartment = ?, geo_lat = ?, geo_lng = ?, is_default = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&input.governorate)
        .bind(&input.city)
        .bind(&input.district)
        .bind(&input.street)
        .bind(&input.building_no)
        .bind(&input.apartment)
        .bind(input.geo_lat)
        .bind(input.geo_lng)
        .bind(input.is_default)
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(DbError::not_found("Address", id));
        }

        tx.commit().await?;
        self.get_address(user_id, id).await
    }

    /// Orders keep their history with `shipping_address_id = NULL`.
    pub async fn delete_address(&self, user_id: &str, id: &str) -> DbResult<()> {
        let rows = sqlx::query("DELETE FROM addresses WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(DbError::not_found("Address", id));
        }
        Ok(())
    }
}

/// Inserts an empty profile for `user_id` unless one exists.
async fn ensure_profile(conn: &mut SqliteConnection, user_id: &str, role: Role) -> DbResult<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO user_profiles (id, role, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(role)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn clear_default(conn: &mut SqliteConnection, user_id: &str) -> DbResult<()> {
    sqlx::query("UPDATE addresses SET is_default = 0 WHERE user_id = ? AND is_default = 1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
