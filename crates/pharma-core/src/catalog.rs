//! # Catalog Types
//!
//! Leaf reference data: manufacturers, dosage forms, active ingredients,
//! ATC classes, branded products and their sellable variants.
//!
//! ## Entity Relationships
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Manufacturer ◄──RESTRICT── Product ──SET NULL──► AtcClass              │
//! │                               │  ▲                                      │
//! │                       CASCADE │  │ CASCADE                              │
//! │                               ▼  │                                      │
//! │   ActiveIngredient ◄──── ProductIngredient (strength)                   │
//! │                                                                         │
//! │   Product ◄──CASCADE── ProductVariant ──RESTRICT──► DosageForm          │
//! │                          (pack_size, barcode, Rx / OTC flags)           │
//! │                                                                         │
//! │   unique (product, dosage_form, pack_size)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::validation::{
    validate_atc_code, validate_barcode, validate_name, validate_pack_size,
    validate_search_query, validate_text, validate_uuid, ValidationResult,
};

// =============================================================================
// Lookup Tables
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Manufacturer {
    pub id: String,
    /// Unique, at most 255 characters.
    pub name: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Tablet, syrup, ampoule...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DosageForm {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ActiveIngredient {
    pub id: String,
    pub name: String,
}

/// Anatomical Therapeutic Chemical classification entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AtcClass {
    pub id: String,
    pub code: String,
    pub name: String,
}

/// Manufacturer create/update payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ManufacturerInput {
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ManufacturerInput {
    pub fn validated(mut self) -> ValidationResult<Self> {
        self.name = validate_name("name", &self.name, 255)?;
        Ok(self)
    }
}

/// Payload for lookup tables that only carry a unique name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NameInput {
    pub name: String,
}

impl NameInput {
    /// Dosage form names are capped at 100 characters, ingredients at 255.
    pub fn validated(mut self, max: usize) -> ValidationResult<Self> {
        self.name = validate_name("name", &self.name, max)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AtcClassInput {
    pub code: String,
    pub name: String,
}

impl AtcClassInput {
    pub fn validated(mut self) -> ValidationResult<Self> {
        self.code = validate_atc_code(&self.code)?;
        self.name = validate_name("name", &self.name, 255)?;
        Ok(self)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A branded medicine. Sold through one or more [`ProductVariant`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub brand_name: String,
    pub manufacturer_id: String,
    pub atc_class_id: Option<String>,
    pub description: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Link between a product and one of its active ingredients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductIngredient {
    pub id: String,
    pub product_id: String,
    pub ingredient_id: String,
    /// e.g. "500 mg"
    pub strength: String,
}

/// A product together with its ingredient links, as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub ingredients: Vec<ProductIngredient>,
}

/// Ingredient link in a product create/update payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IngredientLink {
    pub ingredient_id: String,
    #[serde(default)]
    pub strength: String,
}

/// Product create/update payload.
///
/// `ingredients: None` on update leaves existing links untouched;
/// `Some(list)` replaces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductInput {
    pub brand_name: String,
    pub manufacturer_id: String,
    #[serde(default)]
    pub atc_class_id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ingredients: Option<Vec<IngredientLink>>,
}

impl ProductInput {
    /// Normalizes and validates the payload.
    pub fn validated(mut self) -> ValidationResult<Self> {
        self.brand_name = validate_name("brand_name", &self.brand_name, 255)?;
        validate_uuid("manufacturer_id", &self.manufacturer_id)?;
        if let Some(atc) = &self.atc_class_id {
            validate_uuid("atc_class_id", atc)?;
        }
        self.description = validate_text("description", &self.description, 10_000)?;

        if let Some(links) = &mut self.ingredients {
            let mut seen = std::collections::HashSet::new();
            for link in links.iter_mut() {
                validate_uuid("ingredient_id", &link.ingredient_id)?;
                link.strength = validate_text("strength", &link.strength, 50)?;
                if !seen.insert(link.ingredient_id.clone()) {
                    return Err(ValidationError::InvalidFormat {
                        field: "ingredients".to_string(),
                        reason: format!("ingredient {} listed twice", link.ingredient_id),
                    });
                }
            }
        }
        Ok(self)
    }
}

// =============================================================================
// Product Variant
// =============================================================================

/// The sellable unit: one pack size of one dosage form of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    pub dosage_form_id: String,
    pub strength_text: String,
    pub pack_size: i64,
    pub barcode_gtin: Option<String>,
    pub is_prescription_only: bool,
    pub is_otc: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Variant joined with the names a storefront listing needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct VariantListing {
    pub id: String,
    pub product_id: String,
    pub brand_name: String,
    pub manufacturer_name: String,
    pub dosage_form_id: String,
    pub dosage_form_name: String,
    pub strength_text: String,
    pub pack_size: i64,
    pub barcode_gtin: Option<String>,
    pub is_prescription_only: bool,
    pub is_otc: bool,
}

/// Variant create/update payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VariantInput {
    pub product_id: String,
    pub dosage_form_id: String,
    #[serde(default)]
    pub strength_text: String,
    pub pack_size: i64,
    #[serde(default)]
    pub barcode_gtin: Option<String>,
    #[serde(default)]
    pub is_prescription_only: bool,
    #[serde(default = "default_true")]
    pub is_otc: bool,
}

fn default_true() -> bool {
    true
}

impl VariantInput {
    /// Normalizes and validates the payload. A blank barcode becomes `None`
    /// so it does not collide with other blank barcodes on the unique index.
    pub fn validated(mut self) -> ValidationResult<Self> {
        validate_uuid("product_id", &self.product_id)?;
        validate_uuid("dosage_form_id", &self.dosage_form_id)?;
        self.strength_text = validate_text("strength_text", &self.strength_text, 100)?;
        validate_pack_size(self.pack_size)?;
        self.barcode_gtin = match self.barcode_gtin.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(code) => Some(validate_barcode(code)?),
        };
        Ok(self)
    }
}

// =============================================================================
// Variant Query
// =============================================================================

/// Sort order for the public variant listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum VariantOrdering {
    #[default]
    #[serde(rename = "brand_name")]
    BrandNameAsc,
    #[serde(rename = "-brand_name")]
    BrandNameDesc,
    #[serde(rename = "pack_size")]
    PackSizeAsc,
    #[serde(rename = "-pack_size")]
    PackSizeDesc,
}

impl VariantOrdering {
    pub const ALLOWED: [&'static str; 4] = ["brand_name", "-brand_name", "pack_size", "-pack_size"];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantOrdering::BrandNameAsc => "brand_name",
            VariantOrdering::BrandNameDesc => "-brand_name",
            VariantOrdering::PackSizeAsc => "pack_size",
            VariantOrdering::PackSizeDesc => "-pack_size",
        }
    }
}

impl FromStr for VariantOrdering {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "brand_name" => Ok(VariantOrdering::BrandNameAsc),
            "-brand_name" => Ok(VariantOrdering::BrandNameDesc),
            "pack_size" => Ok(VariantOrdering::PackSizeAsc),
            "-pack_size" => Ok(VariantOrdering::PackSizeDesc),
            _ => Err(ValidationError::not_allowed("ordering", &Self::ALLOWED)),
        }
    }
}

/// Filters for the public variant listing.
///
/// ```text
/// GET /variants?search=para&is_otc=true&dosage_form=<id>&ordering=-pack_size
///                  │             │               │                │
///                  │             │               │                └─ VariantOrdering
///                  │             │               └─ exact dosage form id
///                  │             └─ exact flag match
///                  └─ case-insensitive substring of brand name,
///                     ingredient name or barcode
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantQuery {
    pub search: Option<String>,
    pub is_prescription_only: Option<bool>,
    pub is_otc: Option<bool>,
    pub dosage_form_id: Option<String>,
    pub ordering: VariantOrdering,
    pub limit: i64,
    pub offset: i64,
}

impl VariantQuery {
    /// Normalizes the search term: trimmed, and `None` when blank.
    pub fn with_search(mut self, search: Option<&str>) -> ValidationResult<Self> {
        self.search = match search {
            Some(s) => {
                let s = validate_search_query(s)?;
                (!s.is_empty()).then_some(s)
            }
            None => None,
        };
        Ok(self)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
