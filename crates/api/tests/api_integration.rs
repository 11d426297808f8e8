//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::auth::{Authenticator, StaticTokenAuthenticator};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::Currency;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

const TOKEN: &str = "test-token";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> Router {
    let authenticator: Arc<dyn Authenticator> = Arc::new(StaticTokenAuthenticator::new([(
        TOKEN.to_string(),
        "tester".to_string(),
    )]));
    let state = Arc::new(AppState::new(
        InMemoryStore::new(),
        authenticator,
        Currency::EUR,
    ));
    api::create_app(state, get_metrics_handle())
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send(app, request(method, uri, Some(TOKEN), body)).await
}

async fn create_laptop(app: &Router) -> Value {
    let (status, json) = call(
        app,
        "POST",
        "/api/products",
        Some(json!({
            "name": "Laptop Pro 15",
            "sku": "lp-15-001",
            "price": "1299.99",
            "stock": 15
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["data"].clone()
}

async fn create_customer(app: &Router) -> Value {
    let (status, json) = call(
        app,
        "POST",
        "/api/customers",
        Some(json!({
            "firstName": "Jane",
            "lastName": "Doe",
            "email": "jane@example.com"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["data"].clone()
}

async fn set_order_status(app: &Router, order_id: &str, status: &str) -> (StatusCode, Value) {
    call(
        app,
        "PUT",
        &format!("/api/orders/{order_id}"),
        Some(json!({ "status": status })),
    )
    .await
}

mod public {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let app = setup();
        let (status, json) = send(&app, request("GET", "/health", None, None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = setup();
        let response = app
            .oneshot(request("GET", "/metrics", None, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}

mod authentication {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_is_rejected() {
        let app = setup();
        let (status, json) = send(&app, request("GET", "/api/products", None, None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json, json!({"success": false, "message": "Token required"}));
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let app = setup();
        let (status, json) =
            send(&app, request("GET", "/api/products", Some("guess"), None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["message"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn test_me_returns_the_principal() {
        let app = setup();
        let (status, json) = call(&app, "GET", "/api/auth/me", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["name"], "tester");
    }
}

mod products {
    use super::*;

    #[tokio::test]
    async fn test_product_lifecycle() {
        let app = setup();
        let product = create_laptop(&app).await;
        let id = product["id"].as_str().unwrap().to_string();

        assert_eq!(product["sku"], "LP-15-001");
        assert_eq!(product["stockQuantity"], 15);
        assert_eq!(product["minStockLevel"], 10);
        assert_eq!(product["isAvailable"], true);
        assert_eq!(product["price"]["amountInCents"], 129_999);
        assert_eq!(product["price"]["currency"], "EUR");
        assert_eq!(product["price"]["formatted"], "1 299,99 EUR");

        let (status, json) = call(&app, "GET", &format!("/api/products/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Product retrieved successfully");
        assert_eq!(json["data"]["name"], "Laptop Pro 15");

        let (status, json) = call(
            &app,
            "PUT",
            &format!("/api/products/{id}"),
            Some(json!({
                "name": "Laptop Pro 15",
                "sku": "LP-15-001",
                "price": 1199,
                "stock": 15,
                "active": false
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["data"]["price"]["amountInCents"], 119_900);
        assert_eq!(json["data"]["isActive"], false);

        let (status, json) = call(&app, "GET", "/api/products?active=false", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().unwrap().len(), 1);

        let (status, _) = call(&app, "DELETE", &format!("/api/products/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = call(&app, "GET", &format!("/api/products/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_partial_update_keeps_stock() {
        let app = setup();
        let product = create_laptop(&app).await;
        let id = product["id"].as_str().unwrap().to_string();

        let (status, json) = call(
            &app,
            "PUT",
            &format!("/api/products/{id}"),
            Some(json!({"name": "Laptop Pro 15", "sku": "LP-15-001", "price": "1299.99"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["data"]["stockQuantity"], 15);
        assert_eq!(json["data"]["isActive"], true);

        let (_, json) = call(
            &app,
            "GET",
            &format!("/api/stock-movements?productId={id}"),
            None,
        )
        .await;
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_rejected() {
        let app = setup();
        create_laptop(&app).await;

        let (status, json) = call(
            &app,
            "POST",
            "/api/products",
            Some(json!({"name": "Other laptop", "sku": "LP-15-001", "price": 10, "stock": 0})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let app = setup();

        let (status, _) = call(
            &app,
            "GET",
            "/api/products/00000000-0000-0000-0000-000000000000",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = call(&app, "GET", "/api/products/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Invalid ID format: not-a-uuid");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/products")
                    .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
    }
}

mod sales {
    use super::*;

    #[tokio::test]
    async fn test_order_to_paid_invoice() {
        let app = setup();
        let product = create_laptop(&app).await;
        let customer = create_customer(&app).await;
        let product_id = product["id"].as_str().unwrap();

        let (status, json) = call(
            &app,
            "POST",
            "/api/orders",
            Some(json!({
                "customerId": customer["id"],
                "items": [{ "productId": product_id, "quantity": 2 }],
                "totalAmount": 1
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        let order = json["data"].clone();
        let order_id = order["id"].as_str().unwrap();
        assert_eq!(order["status"], "pending");
        assert_eq!(order["totalAmount"]["amountInCents"], 259_998);
        assert!(order["orderNumber"].as_str().unwrap().starts_with("ORD-"));

        for next in ["confirmed", "processing", "shipped"] {
            let (status, json) = set_order_status(&app, order_id, next).await;
            assert_eq!(status, StatusCode::OK, "{json}");
            assert_eq!(json["data"]["status"], next);
        }

        let (_, json) = call(&app, "GET", &format!("/api/products/{product_id}"), None).await;
        assert_eq!(json["data"]["stockQuantity"], 13);

        let (_, json) = call(
            &app,
            "GET",
            &format!("/api/stock-movements?productId={product_id}"),
            None,
        )
        .await;
        let movements = json["data"].as_array().unwrap();
        assert_eq!(movements.len(), 2);
        assert!(
            movements
                .iter()
                .any(|m| m["type"] == "out" && m["reason"] == "sale" && m["quantity"] == 2)
        );

        let (status, json) = call(
            &app,
            "POST",
            "/api/invoices",
            Some(json!({ "orderId": order_id, "taxRate": "0.2", "status": "sent" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        let invoice = json["data"].clone();
        let invoice_id = invoice["id"].as_str().unwrap();
        let invoice_number = invoice["invoiceNumber"].as_str().unwrap().to_string();
        assert_eq!(invoice["status"], "sent");
        assert_eq!(invoice["netAmount"]["amountInCents"], 259_998);
        assert_eq!(invoice["taxAmount"]["amountInCents"], 52_000);
        assert_eq!(invoice["totalAmount"]["amountInCents"], 311_998);
        assert_eq!(invoice["items"].as_array().unwrap().len(), 1);

        let (status, json) = call(
            &app,
            "POST",
            "/api/invoices",
            Some(json!({ "orderId": order_id })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");

        let (status, json) = call(
            &app,
            "POST",
            &format!("/api/invoices/{invoice_id}/payments"),
            Some(json!({ "amount": "3119.98", "method": "bank_transfer" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        assert_eq!(json["data"]["payment"]["status"], "completed");
        assert_eq!(json["data"]["invoice"]["status"], "paid");

        let (_, json) = call(
            &app,
            "GET",
            &format!("/api/invoices/{invoice_id}/payments"),
            None,
        )
        .await;
        assert_eq!(json["data"].as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/api/invoices/{invoice_id}/download"),
                Some(TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains(&invoice_number));
        assert!(html.contains("Jane Doe"));

        let (status, _) = call(&app, "DELETE", &format!("/api/invoices/{invoice_id}"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_references_are_not_found() {
        let app = setup();
        let product = create_laptop(&app).await;

        let (status, json) = call(
            &app,
            "POST",
            "/api/orders",
            Some(json!({
                "customerId": "00000000-0000-0000-0000-000000000000",
                "items": [{ "productId": product["id"], "quantity": 1 }]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_invalid_transition_is_a_conflict() {
        let app = setup();
        let product = create_laptop(&app).await;
        let customer = create_customer(&app).await;

        let (_, json) = call(
            &app,
            "POST",
            "/api/orders",
            Some(json!({
                "customerId": customer["id"],
                "items": [{ "productId": product["id"], "quantity": 1 }]
            })),
        )
        .await;
        let order_id = json["data"]["id"].as_str().unwrap().to_string();

        let (status, json) = set_order_status(&app, &order_id, "delivered").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["success"], false);

        let (status, json) = set_order_status(&app, &order_id, "teleported").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
    }
}

mod dashboard {
    use super::*;

    #[tokio::test]
    async fn test_dashboard_stats() {
        let app = setup();
        create_laptop(&app).await;
        create_customer(&app).await;

        let (status, json) = call(&app, "GET", "/api/dashboard/stats", None).await;

        assert_eq!(status, StatusCode::OK, "{json}");
        let data = &json["data"];
        assert_eq!(data["products"]["total"], 1);
        assert_eq!(data["products"]["active"], 1);
        assert_eq!(data["customers"]["total"], 1);
        assert_eq!(data["customers"]["newThisMonth"], 1);
        assert_eq!(data["orders"]["total"], 0);
        assert_eq!(data["invoices"]["currency"], "EUR");
        assert_eq!(data["invoices"]["totalRevenue"]["amountInCents"], 0);
    }

    #[tokio::test]
    async fn test_since_must_be_a_timestamp() {
        let app = setup();
        let (status, _) = call(&app, "GET", "/api/dashboard/stats?since=yesterday", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
