//! Black-box tests: the full router driven in-process with `oneshot`,
//! authenticated with tokens minted by the app's own JWT manager.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::{Duration, Utc};
use pharma_api::{build_app, ApiConfig, AppState};
use pharma_core::Role;
use pharma_db::{Database, DbConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    state: Arc<AppState>,
}

impl TestApp {
    async fn new() -> Self {
        let db = Database::new(DbConfig::in_memory())
            .await
            .expect("failed to open database");
        let config = ApiConfig {
            jwt_secret: "test-secret".to_string(),
            ..ApiConfig::default()
        };
        TestApp {
            state: Arc::new(AppState::new(db, config)),
        }
    }

    fn token(&self, user_id: &str, role: Role) -> String {
        self.state
            .jwt
            .issue_token(user_id, role)
            .expect("failed to mint token")
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = build_app(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, token, None).await
    }
}

/// Ids of a minimal catalog and one stocked branch.
struct Shop {
    admin: String,
    manufacturer_id: String,
    variant_id: String,
    branch_id: String,
}

async fn open_shop(app: &TestApp, units: i64) -> Shop {
    let admin = app.token("admin-1", Role::Admin);
    let t = Some(admin.as_str());

    let (status, manufacturer) = app
        .post("/manufacturers", t, json!({"name": "Pharco"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, form) = app.post("/dosages", t, json!({"name": "Tablet"})).await;
    let (_, ingredient) = app
        .post("/ingredients", t, json!({"name": "Paracetamol"}))
        .await;
    let (status, product) = app
        .post(
            "/products",
            t,
            json!({
                "brand_name": "Panadol",
                "manufacturer_id": manufacturer["id"],
                "ingredients": [{"ingredient_id": ingredient["id"], "strength": "500 mg"}],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, variant) = app
        .post(
            "/variants",
            t,
            json!({
                "product_id": product["id"],
                "dosage_form_id": form["id"],
                "strength_text": "500 mg",
                "pack_size": 24,
                "barcode_gtin": "6221000000017",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, company) = app
        .post(
            "/companies",
            t,
            json!({"kind": "pharmacy", "name": "Nile Pharmacies", "owner_id": "owner-1"}),
        )
        .await;
    let (status, branch) = app
        .post(
            "/branches",
            t,
            json!({"company_id": company["id"], "name": "Zamalek"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let expiry = (Utc::now().date_naive() + Duration::days(365)).to_string();
    let (status, _) = app
        .post(
            "/batches",
            t,
            json!({
                "branch_id": branch["id"],
                "variant_id": variant["id"],
                "expiry_date": expiry,
                "qty": units,
                "cost_price_cents": 800,
                "sale_price_cents": 1000,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    Shop {
        admin,
        manufacturer_id: manufacturer["id"].as_str().unwrap().to_string(),
        variant_id: variant["id"].as_str().unwrap().to_string(),
        branch_id: branch["id"].as_str().unwrap().to_string(),
    }
}

/// Fills the customer's cart with `qty` of the shop's variant.
async fn fill_cart(app: &TestApp, shop: &Shop, customer: &str, qty: i64) {
    let t = Some(customer);
    let (status, _) = app
        .post("/cart", t, json!({"branch_id": shop.branch_id}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, cart) = app
        .post(
            "/cart/items",
            t,
            json!({"variant_id": shop.variant_id, "quantity": qty}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["subtotal"], json!(1000 * qty));
}

async fn stock(app: &TestApp, shop: &Shop) -> Value {
    let uri = format!("/stock?branch={}&variant={}", shop.branch_id, shop.variant_id);
    let (status, level) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    level
}

// =============================================================================
// Auth
// =============================================================================

#[tokio::test]
async fn health_reports_database() {
    let app = TestApp::new().await;
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], json!(true));
}

#[tokio::test]
async fn anonymous_can_browse_but_not_write() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/variants", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = app
        .post("/manufacturers", None, json!({"name": "Pharco"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn customer_cannot_touch_catalog() {
    let app = TestApp::new().await;
    let customer = app.token("cust-1", Role::Customer);

    let (status, body) = app.get("/manufacturers", Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn invalid_token_rejected_even_on_public_routes() {
    let app = TestApp::new().await;
    let (status, _) = app.get("/variants", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn catalog_conflicts_map_to_409() {
    let app = TestApp::new().await;
    let shop = open_shop(&app, 10).await;
    let t = Some(shop.admin.as_str());

    let (status, body) = app
        .post("/manufacturers", t, json!({"name": "Pharco"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let uri = format!("/manufacturers/{}", shop.manufacturer_id);
    let (status, body) = app.delete(&uri, t).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "protected");
}

#[tokio::test]
async fn trailing_slash_and_missing_rows() {
    let app = TestApp::new().await;
    let admin = app.token("admin-1", Role::Admin);

    let (status, _) = app.get("/manufacturers/", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/manufacturers/{}", uuid::Uuid::new_v4());
    let (status, body) = app.get(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn invalid_payloads_are_400() {
    let app = TestApp::new().await;
    let admin = app.token("admin-1", Role::Admin);

    let (status, body) = app
        .post("/manufacturers", Some(&admin), json!({"name": "   "}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = app
        .post("/manufacturers", Some(&admin), json!({"title": 3}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn variant_search_and_filters() {
    let app = TestApp::new().await;
    open_shop(&app, 10).await;

    let (status, body) = app.get("/variants?search=PARA", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["brand_name"], "Panadol");

    let (_, body) = app.get("/variants?search=6221000", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = app.get("/variants?is_prescription_only=true", None).await;
    assert_eq!(body, json!([]));

    let (status, body) = app.get("/variants?ordering=price", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

// =============================================================================
// Checkout and Fulfilment
// =============================================================================

#[tokio::test]
async fn checkout_reserves_and_fulfils() {
    let app = TestApp::new().await;
    let shop = open_shop(&app, 10).await;
    let customer = app.token("cust-1", Role::Customer);
    let staff = app.token("staff-1", Role::Staff);

    fill_cart(&app, &shop, &customer, 4).await;
    let (status, order) = app
        .post("/cart/checkout", Some(&customer), json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["total_cents"], json!(4000));
    assert_eq!(order["allocations"][0]["quantity"], json!(4));

    let level = stock(&app, &shop).await;
    assert_eq!(level["reserved"], json!(4));
    assert_eq!(level["available"], json!(6));

    let id = order["id"].as_str().unwrap();
    for step in ["confirm", "pack"] {
        let (status, _) = app
            .post(&format!("/orders/{}/{}", id, step), Some(&staff), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK, "{} failed", step);
    }
    let (status, shipped) = app
        .post(
            &format!("/orders/{}/ship", id),
            Some(&staff),
            json!({"tracking_number": "EG123"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipped["shipment"]["tracking_number"], "EG123");

    let level = stock(&app, &shop).await;
    assert_eq!(level["on_hand"], json!(6));
    assert_eq!(level["reserved"], json!(0));

    let (status, orders) = app.get("/orders", Some(&customer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 1);

    let (_, cart) = app.get("/cart", Some(&customer)).await;
    assert_eq!(cart["items"], json!([]));
}

#[tokio::test]
async fn insufficient_stock_reserves_nothing() {
    let app = TestApp::new().await;
    let shop = open_shop(&app, 2).await;
    let customer = app.token("cust-1", Role::Customer);

    fill_cart(&app, &shop, &customer, 5).await;
    let (status, body) = app
        .post("/cart/checkout", Some(&customer), json!({}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_stock");

    let level = stock(&app, &shop).await;
    assert_eq!(level["reserved"], json!(0));

    // The cart survives the failed checkout.
    let (_, cart) = app.get("/cart", Some(&customer)).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_cart_checkout_is_422() {
    let app = TestApp::new().await;
    let shop = open_shop(&app, 2).await;
    let customer = app.token("cust-1", Role::Customer);

    app.post("/cart", Some(&customer), json!({"branch_id": shop.branch_id}))
        .await;
    let (status, body) = app
        .post("/cart/checkout", Some(&customer), json!({}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "empty_cart");
}

#[tokio::test]
async fn customers_only_see_and_cancel_their_own_orders() {
    let app = TestApp::new().await;
    let shop = open_shop(&app, 10).await;
    let owner = app.token("cust-1", Role::Customer);
    let stranger = app.token("cust-2", Role::Customer);
    let staff = app.token("staff-1", Role::Staff);

    fill_cart(&app, &shop, &owner, 3).await;
    let (_, order) = app.post("/cart/checkout", Some(&owner), json!({})).await;
    let id = order["id"].as_str().unwrap();

    let (status, _) = app.get(&format!("/orders/{}", id), Some(&stranger)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .post(&format!("/orders/{}/cancel", id), Some(&stranger), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post(&format!("/orders/{}/confirm", id), Some(&owner), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(&format!("/orders/{}/deliver", id), Some(&staff), json!({}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_transition");

    let (status, cancelled) = app
        .post(&format!("/orders/{}/cancel", id), Some(&owner), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let level = stock(&app, &shop).await;
    assert_eq!(level["reserved"], json!(0));
    assert_eq!(level["on_hand"], json!(10));
}

#[tokio::test]
async fn customer_cannot_cancel_after_confirmation() {
    let app = TestApp::new().await;
    let shop = open_shop(&app, 10).await;
    let owner = app.token("cust-1", Role::Customer);
    let staff = app.token("staff-1", Role::Staff);

    fill_cart(&app, &shop, &owner, 1).await;
    let (_, order) = app.post("/cart/checkout", Some(&owner), json!({})).await;
    let id = order["id"].as_str().unwrap();
    app.post(&format!("/orders/{}/confirm", id), Some(&staff), json!({}))
        .await;

    let (status, body) = app
        .post(&format!("/orders/{}/cancel", id), Some(&owner), json!({}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_transition");
}

// =============================================================================
// Inventory and Accounts
// =============================================================================

#[tokio::test]
async fn adjustment_below_reserved_is_rejected() {
    let app = TestApp::new().await;
    let shop = open_shop(&app, 5).await;
    let customer = app.token("cust-1", Role::Customer);
    let owner = app.token("owner-1", Role::PharmacyOwner);

    fill_cart(&app, &shop, &customer, 4).await;
    app.post("/cart/checkout", Some(&customer), json!({})).await;

    let uri = format!("/batches?variant={}", shop.variant_id);
    let (status, batches) = app.get(&uri, Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    let batch_id = batches[0]["id"].as_str().unwrap();

    let (status, body) = app
        .post(
            &format!("/batches/{}/adjust", batch_id),
            Some(&owner),
            json!({"delta": -3, "reason": "damaged"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "stock_invariant");

    let (status, body) = app
        .post(
            &format!("/batches/{}/adjust", batch_id),
            Some(&owner),
            json!({"delta": i64::MAX}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    let (status, level) = app
        .get(
            &format!("/stock?branch={}&variant={}", shop.branch_id, shop.variant_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(level["on_hand"], 5);

    let (status, movement) = app
        .post(
            &format!("/batches/{}/adjust", batch_id),
            Some(&owner),
            json!({"delta": -1, "reason": "damaged"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(movement["kind"], "adjustment");

    let (_, movements) = app
        .get(&format!("/batches/{}/movements", batch_id), Some(&owner))
        .await;
    assert_eq!(movements.as_array().unwrap().len(), 2);

    let (status, _) = app.get(&uri, Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn addresses_belong_to_the_caller() {
    let app = TestApp::new().await;
    let me = app.token("cust-1", Role::Customer);
    let other = app.token("cust-2", Role::Customer);

    let (status, address) = app
        .post(
            "/me/addresses",
            Some(&me),
            json!({
                "governorate": "Cairo",
                "city": "Nasr City",
                "street": "Makram Ebeid",
                "building_no": "12",
                "is_default": true,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(address["is_default"], json!(true));

    let (_, mine) = app.get("/me/addresses", Some(&me)).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let uri = format!("/me/addresses/{}", address["id"].as_str().unwrap());
    let (status, _) = app.get(&uri, Some(&other)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, profile) = app.get("/me/profile", Some(&me)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["role"], "customer");
}

#[tokio::test]
async fn reviews_are_public_to_read() {
    let app = TestApp::new().await;
    let shop = open_shop(&app, 1).await;
    let customer = app.token("cust-1", Role::Customer);
    let uri = format!("/variants/{}/reviews", shop.variant_id);

    let (status, _) = app
        .post(&uri, Some(&customer), json!({"rating": 5, "comment": "works"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, reviews) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviews[0]["rating"], json!(5));

    let (status, _) = app
        .post(&uri, None, json!({"rating": 5, "comment": ""}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
