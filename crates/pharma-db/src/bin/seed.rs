//! # Seed Data Generator
//!
//! Populates a database with a demo pharmacy catalog and stock.
//!
//! ## Usage
//! ```bash
//! # Seed ./pharma_dev.db with 3 batches per variant (default)
//! cargo run -p pharma-db --bin seed
//!
//! # More batches per variant
//! cargo run -p pharma-db --bin seed -- --batches 6
//!
//! # Specify database path
//! cargo run -p pharma-db --bin seed -- --db ./data/pharma.db
//! ```
//!
//! ## Generated Data
//! - Manufacturers, dosage forms and active ingredients
//! - Products linked to their ingredients, each with a few pack sizes
//! - One pharmacy company with two branches and one supplier
//! - Batches per variant and branch with staggered expiry dates, so FEFO
//!   allocation and expiry filtering have something to work on

use chrono::{Duration, Utc};
use pharma_core::{
    BranchInput, CompanyInput, CompanyKind, IngredientLink, ManufacturerInput, NameInput,
    ProductInput, ReceiveStock, VariantInput,
};
use pharma_db::{Database, DbConfig};
use std::collections::HashMap;
use std::env;

const MANUFACTURERS: &[&str] = &["Pharco", "EIPICO", "Amoun", "GSK Egypt", "Pfizer Egypt"];

const DOSAGE_FORMS: &[&str] = &["Tablet", "Capsule", "Syrup", "Cream", "Drops"];

/// (brand, manufacturer, dosage form, prescription only, [(ingredient, strength)], [pack sizes])
type ProductSeed = (
    &'static str,
    &'static str,
    &'static str,
    bool,
    &'static [(&'static str, &'static str)],
    &'static [i64],
);

const PRODUCTS: &[ProductSeed] = &[
    ("Panadol", "GSK Egypt", "Tablet", false, &[("Paracetamol", "500 mg")], &[12, 24]),
    (
        "Panadol Extra",
        "GSK Egypt",
        "Tablet",
        false,
        &[("Paracetamol", "500 mg"), ("Caffeine", "65 mg")],
        &[12, 24],
    ),
    ("Brufen", "Pharco", "Tablet", false, &[("Ibuprofen", "400 mg")], &[20, 30]),
    ("Augmentin", "GSK Egypt", "Tablet", true, &[("Amoxicillin", "875 mg"), ("Clavulanic Acid", "125 mg")], &[14]),
    ("Antinal", "Amoun", "Capsule", false, &[("Nifuroxazide", "200 mg")], &[12, 24]),
    ("Congestal", "EIPICO", "Tablet", false, &[("Paracetamol", "650 mg"), ("Pseudoephedrine", "60 mg")], &[20]),
    ("Zithromax", "Pfizer Egypt", "Capsule", true, &[("Azithromycin", "250 mg")], &[6]),
    ("Otrivin", "EIPICO", "Drops", false, &[("Xylometazoline", "0.1 %")], &[1]),
    ("Fucidin", "Amoun", "Cream", true, &[("Fusidic Acid", "2 %")], &[1]),
    ("Tussivan", "Pharco", "Syrup", false, &[("Dextromethorphan", "15 mg/5 ml")], &[1]),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut batches_per_variant: i64 = 3;
    let mut db_path = String::from("./pharma_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--batches" | "-b" => {
                if i + 1 < args.len() {
                    batches_per_variant = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Pharmacy Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -b, --batches <N>  Batches per variant and branch (default: 3)");
                println!("  -d, --db <PATH>    Database file path (default: ./pharma_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Pharmacy Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!("Batches:  {} per variant and branch", batches_per_variant);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if !db.catalog().list_manufacturers().await?.is_empty() {
        println!("⚠ Database already has a catalog");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let catalog = db.catalog();

    // Lookup tables
    let mut manufacturers = HashMap::new();
    for name in MANUFACTURERS {
        let m = catalog
            .create_manufacturer(ManufacturerInput {
                name: name.to_string(),
                is_active: true,
            })
            .await?;
        manufacturers.insert(*name, m.id);
    }

    let mut forms = HashMap::new();
    for name in DOSAGE_FORMS {
        let f = catalog
            .create_dosage_form(NameInput {
                name: name.to_string(),
            })
            .await?;
        forms.insert(*name, f.id);
    }

    let mut ingredients: HashMap<&str, String> = HashMap::new();
    for (_, _, _, _, links, _) in PRODUCTS {
        for (ingredient, _) in links.iter() {
            if !ingredients.contains_key(ingredient) {
                let created = catalog
                    .create_ingredient(NameInput {
                        name: ingredient.to_string(),
                    })
                    .await?;
                ingredients.insert(*ingredient, created.id);
            }
        }
    }
    println!(
        "✓ {} manufacturers, {} dosage forms, {} ingredients",
        manufacturers.len(),
        forms.len(),
        ingredients.len()
    );

    // Companies and branches
    let inventory = db.inventory();
    let pharmacy = inventory
        .create_company(CompanyInput {
            kind: CompanyKind::Pharmacy,
            name: "Nile Pharmacies".to_string(),
            owner_id: "seed-owner".to_string(),
            license_no: Some("PH-0001".to_string()),
            is_active: true,
        })
        .await?;
    let supplier = inventory
        .create_company(CompanyInput {
            kind: CompanyKind::Supplier,
            name: "Delta Distribution".to_string(),
            owner_id: "seed-supplier".to_string(),
            license_no: Some("SP-0001".to_string()),
            is_active: true,
        })
        .await?;

    let mut branches = Vec::new();
    for name in ["Zamalek", "Heliopolis"] {
        let branch = inventory
            .create_branch(BranchInput {
                company_id: pharmacy.id.clone(),
                name: name.to_string(),
                address_id: None,
                shipping_available: true,
            })
            .await?;
        branches.push(branch.id);
    }
    println!("✓ 1 pharmacy with {} branches, 1 supplier", branches.len());

    // Products, variants and stock
    let today = Utc::now().date_naive();
    let mut variants = 0;
    let mut batches = 0;

    for (idx, (brand, manufacturer, form, rx_only, links, pack_sizes)) in
        PRODUCTS.iter().enumerate()
    {
        let product = catalog
            .create_product(ProductInput {
                brand_name: brand.to_string(),
                manufacturer_id: manufacturers[manufacturer].clone(),
                atc_class_id: None,
                description: String::new(),
                ingredients: Some(
                    links
                        .iter()
                        .map(|(name, strength)| IngredientLink {
                            ingredient_id: ingredients[name].clone(),
                            strength: strength.to_string(),
                        })
                        .collect(),
                ),
            })
            .await?;

        for (pack_idx, pack_size) in pack_sizes.iter().enumerate() {
            let variant = db
                .variants()
                .create(VariantInput {
                    product_id: product.product.id.clone(),
                    dosage_form_id: forms[form].clone(),
                    strength_text: links
                        .iter()
                        .map(|(_, s)| *s)
                        .collect::<Vec<_>>()
                        .join(" / "),
                    pack_size: *pack_size,
                    barcode_gtin: Some(format!("622{:06}{:04}", idx, pack_idx)),
                    is_prescription_only: *rx_only,
                    is_otc: !rx_only,
                })
                .await?;
            variants += 1;

            let seed = (idx * 7 + pack_idx * 3) as i64;
            let sale_price_cents = 1_500 + (seed * 137) % 8_000 + pack_size * 25;

            for branch_id in &branches {
                for n in 0..batches_per_variant {
                    // Staggered expiries: the first batch of every third
                    // variant is already expired.
                    let days = if n == 0 && seed % 3 == 0 {
                        -10
                    } else {
                        60 + n * 120 + seed % 30
                    };
                    inventory
                        .receive_stock(
                            ReceiveStock {
                                branch_id: branch_id.clone(),
                                variant_id: variant.id.clone(),
                                supplier_id: Some(supplier.id.clone()),
                                expiry_date: Some(today + Duration::days(days)),
                                qty: 10 + (seed + n * 11) % 90,
                                cost_price_cents: sale_price_cents * 70 / 100,
                                sale_price_cents,
                            },
                            Some("seed"),
                        )
                        .await?;
                    batches += 1;
                }
            }
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!(
        "✓ Generated {} products, {} variants, {} batches in {:?}",
        PRODUCTS.len(),
        variants,
        batches,
        elapsed
    );

    // Verify search
    println!();
    println!("Verifying search...");
    for term in ["para", "amox", "6220000"] {
        let query = pharma_core::VariantQuery {
            limit: 10,
            ..Default::default()
        }
        .with_search(Some(term))?;
        let found = db.variants().list(&query).await?;
        println!("  Search '{}': {} results", term, found.len());
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
