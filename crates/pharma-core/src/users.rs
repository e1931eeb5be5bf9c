//! # User Types
//!
//! Profiles and addresses of the people behind access tokens.
//!
//! Accounts and credentials live in the identity service; this crate only
//! knows the user id (`sub` claim), the role and the profile data below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::validation::{
    validate_coordinates, validate_name, validate_phone, validate_text, ValidationResult,
};

// =============================================================================
// Role
// =============================================================================

/// Role carried in the access token.
///
/// ```text
/// ┌──────────────────┬──────────┬───────────┬────────────┬───────────────┐
/// │ Role             │ catalog  │ inventory │ all orders │ own cart/order│
/// │                  │ writes   │ writes    │            │               │
/// ├──────────────────┼──────────┼───────────┼────────────┼───────────────┤
/// │ admin            │    ✔     │     ✔     │     ✔      │      ✔        │
/// │ staff            │    ✔     │     ✔     │     ✔      │      ✔        │
/// │ pharmacy_owner   │          │     ✔     │            │      ✔        │
/// │ supplier_owner   │          │           │            │      ✔        │
/// │ customer         │          │           │            │      ✔        │
/// └──────────────────┴──────────┴───────────┴────────────┴───────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Customer,
    PharmacyOwner,
    SupplierOwner,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::PharmacyOwner => "pharmacy_owner",
            Role::SupplierOwner => "supplier_owner",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    /// Administrative privilege: catalog writes and every order.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }

    /// May receive, adjust and toggle stock.
    pub fn can_manage_inventory(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff | Role::PharmacyOwner)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Customer
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Language {
    Ar,
    #[default]
    En,
}

// =============================================================================
// Profile
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct UserProfile {
    /// Same value as the token's `sub` claim.
    pub id: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub default_language: Language,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Profile upsert payload. The role always comes from the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProfileInput {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub default_language: Language,
}

impl ProfileInput {
    pub fn validated(mut self) -> ValidationResult<Self> {
        self.full_name = validate_text("full_name", &self.full_name, 255)?;
        self.phone = match self.phone.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(p) => Some(validate_phone(p)?),
        };
        Ok(self)
    }
}

// =============================================================================
// Address
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Address {
    pub id: String,
    pub user_id: Option<String>,
    pub governorate: String,
    pub city: String,
    pub district: String,
    pub street: String,
    pub building_no: String,
    pub apartment: String,
    pub geo_lat: Option<f64>,
    pub geo_lng: Option<f64>,
    /// At most one default address per user.
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AddressInput {
    pub governorate: String,
    pub city: String,
    #[serde(default)]
    pub district: String,
    pub street: String,
    #[serde(default)]
    pub building_no: String,
    #[serde(default)]
    pub apartment: String,
    #[serde(default)]
    pub geo_lat: Option<f64>,
    #[serde(default)]
    pub geo_lng: Option<f64>,
    #[serde(default)]
    pub is_default: bool,
}

impl AddressInput {
    pub fn validated(mut self) -> ValidationResult<Self> {
        self.governorate = validate_name("governorate", &self.governorate, 100)?;
        self.city = validate_name("city", &self.city, 100)?;
        self.district = validate_text("district", &self.district, 100)?;
        self.street = validate_name("street", &self.street, 255)?;
        self.building_no = validate_text("building_no", &self.building_no, 50)?;
        self.apartment = validate_text("apartment", &self.apartment, 50)?;
        validate_coordinates(self.geo_lat, self.geo_lng)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_privileges() {
        assert!(Role::Admin.is_admin());
        assert!(Role::Staff.is_admin());
        assert!(!Role::PharmacyOwner.is_admin());
        assert!(Role::PharmacyOwner.can_manage_inventory());
        assert!(!Role::SupplierOwner.can_manage_inventory());
        assert!(!Role::Customer.can_manage_inventory());
    }

    #[test]
    fn test_role_wire_format() {
        let role: Role = serde_json::from_str("\"pharmacy_owner\"").unwrap();
        assert_eq!(role, Role::PharmacyOwner);
        assert_eq!(Role::SupplierOwner.to_string(), "supplier_owner");
    }

    #[test]
    fn test_address_requires_street() {
        let input = AddressInput {
            governorate: "Cairo".to_string(),
            city: "Nasr City".to_string(),
            district: String::new(),
            street: "  ".to_string(),
            building_no: "12".to_string(),
            apartment: String::new(),
            geo_lat: None,
            geo_lng: None,
            is_default: true,
        };
        assert!(input.validated().is_err());
    }

    #[test]
    fn test_profile_blank_phone_is_none() {
        let p = ProfileInput {
            full_name: "Mona".to_string(),
            phone: Some(" ".to_string()),
            default_language: Language::Ar,
        }
        .validated()
        .unwrap();
        assert_eq!(p.phone, None);
    }
}
