//! # Validation Module
//!
//! Input validation for catalog, inventory, order and user payloads.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler (apps/api)                                      │
//! │  ├── Type validation (serde deserialization)                           │
//! │  └── THIS MODULE: field rules, before any query runs                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                            │
//! │  ├── UNIQUE constraints        → 409 conflict                          │
//! │  ├── FOREIGN KEY (RESTRICT)    → 409 protected                         │
//! │  └── CHECK constraints         → 422 (stock invariant, ranges)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pharma_core::validation::{validate_atc_code, validate_quantity};
//!
//! assert!(validate_atc_code("N02BE01").is_ok());
//! assert!(validate_quantity(5).is_ok());
//! ```

use crate::error::ValidationError;
use crate::{DEFAULT_LIST_LIMIT, MAX_ITEM_QUANTITY, MAX_LIST_LIMIT};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required, length-limited text field and returns it trimmed.
///
/// Used for manufacturer, dosage form, ingredient, brand and company names,
/// all of which are unique in the database after trimming.
///
/// ## Example
/// ```rust
/// use pharma_core::validation::validate_name;
///
/// assert_eq!(validate_name("name", "  Pfizer ", 255).unwrap(), "Pfizer");
/// assert!(validate_name("name", "   ", 255).is_err());
/// assert!(validate_name("name", &"A".repeat(256), 255).is_err());
/// ```
pub fn validate_name(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value.to_string())
}

/// Validates an optional text field; empty strings are allowed.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(value.to_string())
}

/// Validates an ATC classification code.
///
/// ## Rules
/// - 1 to 10 characters
/// - First character is an uppercase anatomical group letter
/// - Only ASCII uppercase letters and digits
pub fn validate_atc_code(code: &str) -> ValidationResult<String> {
    let code = validate_name("code", code, 10)?;

    let mut chars = code.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_uppercase());
    if !starts_with_letter
        || !code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must start with an uppercase letter and contain only A-Z and 0-9"
                .to_string(),
        });
    }

    Ok(code)
}

/// Validates a GTIN / barcode.
///
/// ## Rules
/// - 1 to 50 characters
/// - Letters, digits and hyphens only
pub fn validate_barcode(barcode: &str) -> ValidationResult<String> {
    let barcode = validate_name("barcode_gtin", barcode, 50)?;

    if !barcode
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "barcode_gtin".to_string(),
            reason: "must contain only letters, numbers and hyphens".to_string(),
        });
    }

    Ok(barcode)
}

/// Validates a phone number: optional leading `+`, then 7-20 digits.
///
/// ## Example
/// ```rust
/// use pharma_core::validation::validate_phone;
///
/// assert!(validate_phone("+201001234567").is_ok());
/// assert!(validate_phone("12-34").is_err());
/// ```
pub fn validate_phone(phone: &str) -> ValidationResult<String> {
    let phone = validate_name("phone", phone, 20)?;
    let digits = phone.strip_prefix('+').unwrap_or(&phone);

    if digits.len() < 7 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must be 7-20 digits with an optional leading +".to_string(),
        });
    }

    Ok(phone)
}

/// Validates a search query and returns it trimmed. Empty means "no filter".
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    validate_text("search", query, 100)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an order or cart quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Cart: Add Item                                                         │
/// │                                                                         │
/// │  POST /cart/items { variant_id, quantity: 5 }                          │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(5) ← THIS FUNCTION                                  │
/// │       │                                                                 │
/// │       ├── qty <= 0?   → 400 "quantity must be positive"                │
/// │       ├── qty > 999?  → 400 "quantity must be between 1 and 999"       │
/// │       └── OK → CartRepository::add_item                                │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a received stock quantity. Receipts are not capped by the
/// per-line order limit, only by sanity.
pub fn validate_receipt_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "qty".to_string(),
        });
    }
    if qty > 1_000_000 {
        return Err(ValidationError::OutOfRange {
            field: "qty".to_string(),
            min: 1,
            max: 1_000_000,
        });
    }
    Ok(())
}

/// Validates a manual stock adjustment delta (signed, non-zero, at most
/// one receipt's worth in either direction).
pub fn validate_adjustment_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::InvalidFormat {
            field: "delta".to_string(),
            reason: "must not be zero".to_string(),
        });
    }
    if !(-1_000_000..=1_000_000).contains(&delta) {
        return Err(ValidationError::OutOfRange {
            field: "delta".to_string(),
            min: -1_000_000,
            max: 1_000_000,
        });
    }
    Ok(())
}

/// Validates a price in minor units. Zero is allowed (free samples).
///
/// ## Example
/// ```rust
/// use pharma_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents("sale_price", 1099).is_ok());
/// assert!(validate_price_cents("sale_price", 0).is_ok());
/// assert!(validate_price_cents("sale_price", -100).is_err());
/// ```
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a variant pack size (units per pack).
pub fn validate_pack_size(pack_size: i64) -> ValidationResult<()> {
    if pack_size <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "pack_size".to_string(),
        });
    }
    Ok(())
}

/// Validates a review rating (1 to 5 stars).
pub fn validate_rating(rating: i64) -> ValidationResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(ValidationError::OutOfRange {
            field: "rating".to_string(),
            min: 1,
            max: 5,
        });
    }
    Ok(())
}

/// Validates a demand prediction horizon (1 to 365 days).
pub fn validate_horizon_days(days: i64) -> ValidationResult<()> {
    if !(1..=365).contains(&days) {
        return Err(ValidationError::OutOfRange {
            field: "horizon_days".to_string(),
            min: 1,
            max: 365,
        });
    }
    Ok(())
}

/// Validates a predicted demand figure.
pub fn validate_predicted_demand(demand: f64) -> ValidationResult<()> {
    if !demand.is_finite() || demand < 0.0 {
        return Err(ValidationError::InvalidFormat {
            field: "predicted_demand".to_string(),
            reason: "must be a finite, non-negative number".to_string(),
        });
    }
    Ok(())
}

/// Validates optional geo coordinates; both or neither must be given.
pub fn validate_coordinates(lat: Option<f64>, lng: Option<f64>) -> ValidationResult<()> {
    match (lat, lng) {
        (None, None) => Ok(()),
        (Some(lat), Some(lng)) => {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(ValidationError::OutOfRange {
                    field: "geo_lat".to_string(),
                    min: -90,
                    max: 90,
                });
            }
            if !(-180.0..=180.0).contains(&lng) {
                return Err(ValidationError::OutOfRange {
                    field: "geo_lng".to_string(),
                    min: -180,
                    max: 180,
                });
            }
            Ok(())
        }
        _ => Err(ValidationError::InvalidFormat {
            field: "geo".to_string(),
            reason: "geo_lat and geo_lng must be given together".to_string(),
        }),
    }
}

/// Resolves a requested page size to something the list queries accept.
pub fn clamp_list_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if l > 0 => l.min(MAX_LIST_LIMIT),
        _ => DEFAULT_LIST_LIMIT,
    }
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use pharma_core::validation::validate_uuid;
///
/// assert!(validate_uuid("variant_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("variant_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("name", "Tablet", 100).unwrap(), "Tablet");
        assert!(validate_name("name", "", 100).is_err());
        assert!(matches!(
            validate_name("name", &"x".repeat(101), 100),
            Err(ValidationError::TooLong { max: 100, .. })
        ));
        // Multi-byte names are measured in characters, not bytes
        assert!(validate_name("name", &"د".repeat(100), 100).is_ok());
    }

    #[test]
    fn test_validate_atc_code() {
        assert!(validate_atc_code("N02BE01").is_ok());
        assert!(validate_atc_code("A").is_ok());
        assert!(validate_atc_code("n02be01").is_err());
        assert!(validate_atc_code("02BE").is_err());
        assert!(validate_atc_code("N02BE01XXXX").is_err());
        assert!(validate_atc_code("").is_err());
    }

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("6221234567890").is_ok());
        assert!(validate_barcode("has space").is_err());
        assert!(validate_barcode(&"1".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("01001234567").is_ok());
        assert!(validate_phone("+201001234567").is_ok());
        assert!(validate_phone("+12345").is_err());
        assert!(validate_phone("0100-123-4567").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_numeric_ranges() {
        assert!(validate_pack_size(30).is_ok());
        assert!(validate_pack_size(0).is_err());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(6).is_err());
        assert!(validate_rating(0).is_err());
        assert!(validate_horizon_days(30).is_ok());
        assert!(validate_horizon_days(0).is_err());
        assert!(validate_adjustment_delta(-3).is_ok());
        assert!(validate_adjustment_delta(0).is_err());
        assert!(validate_adjustment_delta(1_000_000).is_ok());
        assert!(validate_adjustment_delta(-1_000_001).is_err());
        assert!(validate_adjustment_delta(i64::MAX).is_err());
        assert!(validate_predicted_demand(12.5).is_ok());
        assert!(validate_predicted_demand(f64::NAN).is_err());
        assert!(validate_predicted_demand(-1.0).is_err());
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(None, None).is_ok());
        assert!(validate_coordinates(Some(30.04), Some(31.23)).is_ok());
        assert!(validate_coordinates(Some(30.04), None).is_err());
        assert!(validate_coordinates(Some(91.0), Some(0.0)).is_err());
    }

    #[test]
    fn test_clamp_list_limit() {
        assert_eq!(clamp_list_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_list_limit(Some(0)), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_list_limit(Some(10)), 10);
        assert_eq!(clamp_list_limit(Some(10_000)), MAX_LIST_LIMIT);
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "123").is_err());
    }
}
