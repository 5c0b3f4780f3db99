//! In-memory reference backend serving the order and account endpoints.
//!
//! It owns the canonical order state and enforces the same lifecycle rules as
//! the client, so the client can be exercised end to end.

pub mod handlers;
pub mod store;

use std::{sync::Arc, time::Duration};

use axum::{
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use rust_decimal_macros::dec;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    errors::ServiceError,
    models::{OrderDto, OrderStatus, Role, User},
    tracing::{request_id_middleware, RequestSpanMaker},
};

pub use store::{new_order, Store};

/// Envelope around every successful response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Shared state of the reference backend.
#[derive(Clone, Default)]
pub struct MockBackend {
    store: Arc<Store>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, ServiceError> {
        self.store.create_user(name, email, password, role)
    }

    /// Inserts or replaces an order.
    pub fn insert_order(&self, order: OrderDto) {
        self.store.insert_order(order);
    }

    pub fn order(&self, id: &str) -> Option<OrderDto> {
        self.store.order(id)
    }

    /// Seeds one administrator, one customer and an order in every status.
    pub fn seed_demo(
        &self,
        admin_email: &str,
        admin_password: &str,
    ) -> Result<(User, User), ServiceError> {
        let admin = self.create_user("Quản trị viên", admin_email, admin_password, Role::Admin)?;
        let customer =
            self.create_user("Nguyễn Thị Lan", "lan@example.vn", "khachhang", Role::Customer)?;

        let demo = [
            ("DH1001", OrderStatus::Pending, false),
            ("DH1002", OrderStatus::Processing, false),
            ("DH1003", OrderStatus::Completed, true),
            ("DH1004", OrderStatus::RefundRequested, true),
            ("DH1005", OrderStatus::Cancelled, false),
        ];
        for (id, status, paid) in demo {
            let mut order = new_order(
                id,
                &customer,
                &[
                    ("p-ao-thun", "Áo thun cotton", dec!(150000), 2),
                    ("p-quan-jean", "Quần jean", dec!(420000), 1),
                ],
                dec!(30000),
                "COD",
            );
            order.status = status.as_str().to_string();
            order.is_paid = paid;
            order.paid_at = paid.then(Utc::now);
            if status == OrderStatus::RefundRequested {
                order.refund_info = Some(crate::models::order::RefundInfoDto {
                    refund_reason: "damaged".to_string(),
                    notes: Some("Áo bị rách đường may".to_string()),
                    refund_date: Some(Utc::now()),
                    refund_transaction_id: None,
                    refund_method: None,
                    refund_amount: None,
                    admin_notes: None,
                    import_voucher_id: None,
                });
            }
            self.insert_order(order);
        }

        info!(admin = %admin.email, customer = %customer.email, "Seeded demo data");
        Ok((admin, customer))
    }
}

pub fn router(backend: MockBackend) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/users/login", post(handlers::login))
        .route("/api/users/register", post(handlers::register))
        .route("/api/users/logout", post(handlers::logout))
        .route(
            "/api/users/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route("/api/orders", get(handlers::list_orders))
        .route("/api/orders/myorders", get(handlers::list_my_orders))
        .route("/api/orders/:id", get(handlers::get_order))
        .route("/api/orders/:id/status", put(handlers::update_order_status))
        .route("/api/orders/:id/refund-request", post(handlers::request_refund))
        .route("/api/orders/:id/refund/approve", put(handlers::approve_refund))
        .route("/api/orders/:id/refund/reject", put(handlers::reject_refund))
        .layer(TraceLayer::new_for_http().make_span_with(RequestSpanMaker))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(backend)
}

/// Serves until the listener fails.
pub async fn serve(listener: TcpListener, backend: MockBackend) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Reference backend listening");
    }
    axum::serve(listener, router(backend)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn setup() -> (MockBackend, Router, String, String) {
        let backend = MockBackend::new();
        let (admin, customer) = backend.seed_demo("admin@shop.vn", "quantri").unwrap();
        let admin_token = backend.store().issue_token(&admin);
        let customer_token = backend.store().issue_token(&customer);
        let app = router(backend.clone());
        (backend, app, admin_token, customer_token)
    }

    #[tokio::test]
    async fn requests_without_token_are_unauthorized() {
        let (_, app, _, _) = setup();
        let (status, body) = call(&app, Method::GET, "/api/orders/DH1001", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].as_str().unwrap().contains("bearer"));
    }

    #[tokio::test]
    async fn login_returns_wrapped_token() {
        let (_, app, _, _) = setup();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({"email": "admin@shop.vn", "password": "quantri"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["user"]["role"], json!("admin"));
        assert!(body["data"]["token"].as_str().is_some());
    }

    #[tokio::test]
    async fn completing_sets_paid() {
        let (backend, app, admin, _) = setup();
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/orders/DH1002/status",
            Some(&admin),
            Some(json!({"status": "completed"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let order = backend.order("DH1002").unwrap();
        assert_eq!(order.status, "completed");
        assert!(order.is_paid);
        assert!(order.paid_at.is_some());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let (backend, app, admin, _) = setup();
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/orders/DH1001/status",
            Some(&admin),
            Some(json!({"status": "completed"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(backend.order("DH1001").unwrap().status, "pending");
    }

    #[tokio::test]
    async fn customers_cannot_change_status_or_list_everything() {
        let (_, app, _, customer) = setup();
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/orders/DH1001/status",
            Some(&customer),
            Some(json!({"status": "processing"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&app, Method::GET, "/api/orders", Some(&customer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            call(&app, Method::GET, "/api/orders/myorders", Some(&customer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn approval_records_refund_details() {
        let (backend, app, admin, _) = setup();
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/orders/DH1004/refund/approve",
            Some(&admin),
            Some(json!({
                "refundMethod": "bank_transfer",
                "amount": 750000,
                "createImportVoucher": true
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let order = backend.order("DH1004").unwrap();
        assert_eq!(order.status, "refunded");
        let refund = order.refund_info.unwrap();
        assert_eq!(refund.refund_method.as_deref(), Some("bank_transfer"));
        assert_eq!(refund.refund_amount, Some(dec!(750000)));
        assert!(refund.refund_transaction_id.unwrap().starts_with("RF-"));
        assert!(refund.import_voucher_id.unwrap().starts_with("PN-"));
    }

    #[tokio::test]
    async fn over_refund_is_rejected() {
        let (backend, app, admin, _) = setup();
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/orders/DH1004/refund/approve",
            Some(&admin),
            Some(json!({"refundMethod": "cash", "amount": 9999999, "createImportVoucher": false})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(backend.order("DH1004").unwrap().status, "refund_requested");
    }

    #[tokio::test]
    async fn list_paginates_and_filters() {
        let (_, app, admin, _) = setup();
        let (status, body) = call(
            &app,
            Method::GET,
            "/api/orders?page=2&limit=2",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], json!(5));
        assert_eq!(body["data"]["pages"], json!(3));
        assert_eq!(body["data"]["orders"].as_array().unwrap().len(), 2);

        let (_, body) = call(
            &app,
            Method::GET,
            "/api/orders?status=cancelled",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(body["data"]["orders"][0]["_id"], json!("DH1005"));
    }

    #[tokio::test]
    async fn pages_past_the_end_are_empty() {
        let (_, app, admin, _) = setup();
        let (status, body) = call(
            &app,
            Method::GET,
            "/api/orders?page=4294967295&limit=100",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["page"], json!(4294967295u32));
        assert_eq!(body["data"]["pages"], json!(1));
        assert_eq!(body["data"]["total"], json!(5));
        assert!(body["data"]["orders"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_orders_stay_hidden_on_status_change() {
        let (backend, app, _, _) = setup();
        let outsider = backend
            .create_user("Trần Văn Bình", "binh@example.vn", "matkhau", Role::Customer)
            .unwrap();
        let token = backend.store().issue_token(&outsider);

        let (status, _) = call(&app, Method::GET, "/api/orders/DH1003", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/orders/DH1003/status",
            Some(&token),
            Some(json!({"status": "pending"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body["message"].as_str().unwrap().contains("completed"));
        assert_eq!(backend.order("DH1003").unwrap().status, "completed");
    }

    #[tokio::test]
    async fn responses_echo_request_id() {
        let (_, app, admin, _) = setup();
        let request = Request::builder()
            .uri("/api/orders/DH1001")
            .header(header::AUTHORIZATION, format!("Bearer {admin}"))
            .header("x-request-id", "req-42")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-request-id"], "req-42");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["request_id"], json!("req-42"));
    }
}
