//! # Repository Module
//!
//! Database repository implementations for the pharmacy backend.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  HTTP handler                                                          │
//! │       │                                                                 │
//! │       │  db.orders().checkout(customer_id, checkout)                    │
//! │       ▼                                                                 │
//! │  OrderRepository ──────────┐                                           │
//! │  ├── checkout()            │ uses                                      │
//! │  ├── pack()                ▼                                           │
//! │  └── cancel()         stock.rs (guarded batch updates + movements,     │
//! │       │               shared by inventory and order workflows)         │
//! │       │  SQL inside one transaction                                    │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`catalog::CatalogRepository`] - Lookup tables and products
//! - [`variant::VariantRepository`] - Variants and the public search
//! - [`inventory::InventoryRepository`] - Companies, branches, batches, movements
//! - [`cart::CartRepository`] - Carts and cart lines
//! - [`order::OrderRepository`] - Order workflow and reservations
//! - [`review::ReviewRepository`] - Variant reviews
//! - [`user::UserRepository`] - Profiles and addresses

pub mod cart;
pub mod catalog;
pub mod inventory;
pub mod order;
pub mod review;
pub(crate) mod stock;
pub mod user;
pub mod variant;

use uuid::Uuid;

/// Generates a new UUID v4 identifier.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// `?, ?, ?` with `n` placeholders, for `IN (...)` clauses.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// `%term%` for a case-insensitive `LIKE ... ESCAPE '\'` substring match.
///
/// `%`, `_` and `\` in the term match themselves.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::NaiveDate;
    use pharma_core::{
        BranchInput, CompanyInput, CompanyKind, InventoryBatch, ManufacturerInput, NameInput,
        ProductInput, ReceiveStock, VariantInput,
    };

    use crate::{Database, DbConfig};

    /// A migrated in-memory database with one sellable variant and one branch.
    pub(crate) struct Fixture {
        pub db: Database,
        pub manufacturer_id: String,
        pub dosage_form_id: String,
        pub product_id: String,
        pub variant_id: String,
        pub branch_id: String,
    }

    pub(crate) async fn fixture() -> Fixture {
        fixture_with(DbConfig::in_memory()).await
    }

    /// Same data on a caller-supplied database, e.g. a file-backed pool.
    pub(crate) async fn fixture_with(config: DbConfig) -> Fixture {
        let db = Database::new(config).await.unwrap();

        let manufacturer = db
            .catalog()
            .create_manufacturer(ManufacturerInput {
                name: "Pharco".to_string(),
                is_active: true,
            })
            .await
            .unwrap();
        let form = db
            .catalog()
            .create_dosage_form(NameInput {
                name: "Tablet".to_string(),
            })
            .await
            .unwrap();
        let product = db
            .catalog()
            .create_product(ProductInput {
                brand_name: "Panadol".to_string(),
                manufacturer_id: manufacturer.id.clone(),
                atc_class_id: None,
                description: String::new(),
                ingredients: None,
            })
            .await
            .unwrap();
        let variant = db
            .variants()
            .create(VariantInput {
                product_id: product.product.id.clone(),
                dosage_form_id: form.id.clone(),
                strength_text: "500 mg".to_string(),
                pack_size: 20,
                barcode_gtin: Some("6221000000017".to_string()),
                is_prescription_only: false,
                is_otc: true,
            })
            .await
            .unwrap();
        let company = db
            .inventory()
            .create_company(CompanyInput {
                kind: CompanyKind::Pharmacy,
                name: "Nile Pharmacies".to_string(),
                owner_id: "owner-1".to_string(),
                license_no: None,
                is_active: true,
            })
            .await
            .unwrap();
        let branch = db
            .inventory()
            .create_branch(BranchInput {
                company_id: company.id.clone(),
                name: "Zamalek".to_string(),
                address_id: None,
                shipping_available: true,
            })
            .await
            .unwrap();

        Fixture {
            db,
            manufacturer_id: manufacturer.id,
            dosage_form_id: form.id,
            product_id: product.product.id,
            variant_id: variant.id,
            branch_id: branch.id,
        }
    }

    impl Fixture {
        /// Receives `qty` units of the fixture variant at 10.00 each.
        pub async fn receive(&self, qty: i64, expiry: Option<NaiveDate>) -> InventoryBatch {
            self.receive_variant(&self.variant_id, qty, expiry).await
        }

        pub async fn receive_variant(
            &self,
            variant_id: &str,
            qty: i64,
            expiry: Option<NaiveDate>,
        ) -> InventoryBatch {
            self.db
                .inventory()
                .receive_stock(
                    ReceiveStock {
                        branch_id: self.branch_id.clone(),
                        variant_id: variant_id.to_string(),
                        supplier_id: None,
                        expiry_date: expiry,
                        qty,
                        cost_price_cents: 800,
                        sale_price_cents: 1000,
                    },
                    Some("staff-1"),
                )
                .await
                .unwrap()
        }

        /// Adds another variant of the fixture product with the given pack size.
        pub async fn add_variant(&self, pack_size: i64) -> String {
            self.db
                .variants()
                .create(VariantInput {
                    product_id: self.product_id.clone(),
                    dosage_form_id: self.dosage_form_id.clone(),
                    strength_text: "500 mg".to_string(),
                    pack_size,
                    barcode_gtin: None,
                    is_prescription_only: false,
                    is_otc: true,
                })
                .await
                .unwrap()
                .id
        }
    }

    /// A date `days` from today, for expiry fixtures.
    pub(crate) fn in_days(days: i64) -> NaiveDate {
        chrono::Utc::now().date_naive() + chrono::Duration::days(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("PANA"), "%pana%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }
}
