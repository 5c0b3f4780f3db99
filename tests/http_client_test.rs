//! Wire-level behaviour of the HTTP order service against a scripted server.

use std::{sync::Arc, time::Duration};

use assert_matches::assert_matches;
use orderdesk::{
    client::ApiClient,
    errors::ServiceError,
    models::{OrderId, OrderStatus, PaymentStatus, RefundReason},
    services::orders::{HttpOrderApi, OrderApi, OrderListQuery, RefundRequest, RejectRefundRequest},
    tracing::{scope_request_id, RequestId},
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use test_case::test_case;
use url::Url;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn wire_order(status: &str) -> Value {
    json!({
        "_id": "X1",
        "status": status,
        "isPaid": true,
        "orderItems": [{ "product": "p-1", "name": "Áo thun", "price": 150000, "qty": 2 }],
        "user": { "_id": "u-1", "name": "Lan", "email": "lan@example.vn" },
        "shippingAddress": { "address": "12 Lê Lợi", "city": "Huế" },
        "itemsPrice": 300000,
        "shippingPrice": 30000,
        "taxPrice": 0,
        "totalPrice": 330000,
        "paymentMethod": "COD"
    })
}

async fn api(server: &MockServer) -> (Arc<ApiClient>, HttpOrderApi) {
    let base = Url::parse(&format!("{}/", server.uri())).unwrap();
    let client = Arc::new(ApiClient::new(base, Duration::from_secs(2)).unwrap());
    client.set_token(Some("tok-1".into())).await;
    (client.clone(), HttpOrderApi::new(client))
}

fn x1() -> OrderId {
    OrderId::parse("X1").unwrap()
}

#[tokio::test]
async fn decodes_enveloped_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/X1"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": wire_order("completed"),
            "message": "ok"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let (_, api) = api(&server).await;

    let order = api.get_order(&x1()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.total, dec!(330000));
    assert_eq!(order.items[0].line_total, dec!(300000));
}

#[tokio::test]
async fn decodes_bare_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/X1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wire_order("pending")))
        .mount(&server)
        .await;
    let (_, api) = api(&server).await;

    let order = api.get_order(&x1()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn unknown_status_is_a_decode_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/X1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wire_order("shipped")))
        .mount(&server)
        .await;
    let (_, api) = api(&server).await;

    assert_matches!(api.get_order(&x1()).await, Err(ServiceError::InvalidStatus(s)) if s == "shipped");
}

#[test_case(400, json!({"message": "Trạng thái không hợp lệ"}) ; "bad request")]
#[test_case(401, json!({"error": "token expired"}) ; "unauthorized")]
#[test_case(403, json!({"message": "admin only"}) ; "forbidden")]
#[test_case(404, json!({"message": "Order not found"}) ; "not found")]
#[test_case(500, json!({"message": "boom"}) ; "server error")]
#[tokio::test]
async fn error_statuses_map_to_service_errors(status: u16, body: Value) {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/orders/X1/status"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    let (_, api) = api(&server).await;

    let err = api
        .update_order_status(&x1(), OrderStatus::Processing)
        .await
        .unwrap_err();
    match status {
        400 => assert_matches!(err, ServiceError::BadRequest(m) if m == "Trạng thái không hợp lệ"),
        401 => assert_matches!(err, ServiceError::Unauthorized(m) if m == "token expired"),
        403 => assert_matches!(err, ServiceError::Forbidden(_)),
        404 => assert_matches!(err, ServiceError::NotFound(_)),
        _ => assert_matches!(err, ServiceError::Api { status: 500, .. }),
    }
}

#[tokio::test]
async fn success_false_envelope_is_a_failure_despite_200() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/orders/X1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Đơn hàng đã bị hủy"
        })))
        .mount(&server)
        .await;
    let (_, api) = api(&server).await;

    let err = api
        .update_order_status(&x1(), OrderStatus::Processing)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::BadRequest(m) if m == "Đơn hàng đã bị hủy");
}

#[tokio::test]
async fn empty_acknowledgement_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/orders/X1/status"))
        .and(body_json(json!({"status": "cancelled"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let (_, api) = api(&server).await;

    api.update_order_status(&x1(), OrderStatus::Cancelled)
        .await
        .unwrap();
}

#[tokio::test]
async fn refund_request_posts_reason_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orders/X1/refund-request"))
        .and(body_json(json!({"reason": "size_issue", "notes": "chật"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": wire_order("refund_requested")})))
        .expect(1)
        .mount(&server)
        .await;
    let (_, api) = api(&server).await;

    api.request_refund(
        &x1(),
        &RefundRequest {
            reason: RefundReason::SizeIssue,
            notes: Some("chật".into()),
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn blank_rejection_notes_never_leave_the_client() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let (_, api) = api(&server).await;

    let err = api
        .reject_refund(&x1(), &RejectRefundRequest { notes: "  ".into() })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn list_sends_paging_and_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(query_param("page", "2"))
        .and(query_param("limit", "10"))
        .and(query_param("status", "completed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orders": [wire_order("completed")],
            "page": 2,
            "pages": 3
        })))
        .expect(1)
        .mount(&server)
        .await;
    let (_, api) = api(&server).await;

    let page = api
        .list_orders(&OrderListQuery {
            page: 2,
            limit: 10,
            status: Some(OrderStatus::Completed),
        })
        .await
        .unwrap();
    assert_eq!(page.page, 2);
    assert_eq!(page.pages, 3);
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn propagates_the_ambient_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/X1"))
        .and(header("x-request-id", "req-99"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wire_order("pending")))
        .expect(1)
        .mount(&server)
        .await;
    let (_, api) = api(&server).await;

    scope_request_id(RequestId::new("req-99"), async {
        api.get_order(&x1()).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn no_bearer_header_without_a_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/myorders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let (client, api) = api(&server).await;
    client.set_token(None).await;

    assert!(api.list_my_orders().await.unwrap().is_empty());
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}
