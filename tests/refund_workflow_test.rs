//! Refund request, approval and rejection end to end.

mod common;

use assert_matches::assert_matches;
use common::{TestApp, REFUND_METHOD};
use orderdesk::{
    errors::ServiceError,
    models::{OrderAction, OrderStatus, PaymentStatus, RefundReason},
    order_detail::{stepper::Branch, NoticeLevel, Operation, RequestState},
};
use rust_decimal_macros::dec;

#[tokio::test]
async fn customer_requests_a_refund_through_the_dialog() {
    let app = TestApp::spawn().await;
    app.seed_order("X1", OrderStatus::Completed, true);
    let customer = app.as_customer().await;
    let mut c = customer.open("X1").await;

    assert_eq!(c.available_actions(), vec![OrderAction::RequestRefund]);
    assert!(c.open_refund_dialog(OrderAction::RequestRefund));
    assert!(!c.refund_request_dialog().can_submit());

    c.refund_request_dialog().form_mut().reason = Some(RefundReason::Damaged);
    c.refund_request_dialog().form_mut().notes = "  Áo bị rách  ".into();
    c.submit_refund_request().await.unwrap();

    assert!(!c.refund_request_dialog().is_open());
    assert_eq!(c.status(), Some(OrderStatus::RefundRequested));
    assert_eq!(
        c.stepper_view().unwrap().branch,
        Some(Branch::RefundRequested)
    );
    let refund = c.order().unwrap().refund_info.clone().unwrap();
    assert_eq!(refund.refund_reason, "damaged");
    assert_eq!(refund.reason_text(), "Sản phẩm bị hư hỏng");
    assert_eq!(refund.notes.as_deref(), Some("Áo bị rách"));

    let notices = c.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].message, "Đã gửi yêu cầu hoàn tiền.");
}

#[tokio::test]
async fn unpaid_orders_cannot_be_refunded() {
    let app = TestApp::spawn().await;
    app.seed_order("X1", OrderStatus::Completed, false);
    let customer = app.as_customer().await;
    let mut c = customer.open("X1").await;

    assert!(c.available_actions().is_empty());
    assert!(!c.open_refund_dialog(OrderAction::RequestRefund));

    let err = c
        .request_refund(RefundReason::WrongItem, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
    assert_eq!(app.stored_status("X1"), "completed");
    assert_matches!(
        c.request_state(Operation::RequestRefund),
        RequestState::Failed(_)
    );
}

#[tokio::test]
async fn admin_cannot_request_a_refund() {
    let app = TestApp::spawn().await;
    app.seed_order("X1", OrderStatus::Completed, true);
    let admin = app.as_admin().await;
    let mut c = admin.open("X1").await;

    assert!(c.available_actions().is_empty());
    let err = c.request_refund(RefundReason::Other, None).await.unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn admin_approves_the_full_total_with_a_voucher() {
    let app = TestApp::spawn().await;
    app.seed_order("X1", OrderStatus::Completed, true);

    let customer = app.as_customer().await;
    let mut c = customer.open("X1").await;
    c.request_refund(RefundReason::SizeIssue, None).await.unwrap();

    let admin = app.as_admin().await;
    let mut c = admin.open("X1").await;
    assert_eq!(
        c.available_actions(),
        vec![OrderAction::ApproveRefund, OrderAction::RejectRefund]
    );

    assert!(c.open_refund_dialog(OrderAction::ApproveRefund));
    assert!(c.approval_dialog().form().create_import_voucher);
    c.approval_dialog().form_mut().notes = "Đã nhận lại hàng".into();
    c.submit_refund_approval().await.unwrap();

    assert_eq!(c.status(), Some(OrderStatus::Refunded));
    assert_eq!(c.payment_status(), Some(PaymentStatus::Paid));
    assert!(c.available_actions().is_empty());
    assert_eq!(c.stepper_view().unwrap().branch, Some(Branch::Refunded));

    let refund = c.order().unwrap().refund_info.clone().unwrap();
    assert_eq!(refund.refund_amount, Some(dec!(750000)));
    assert_eq!(refund.refund_method.as_deref(), Some(REFUND_METHOD));
    assert_eq!(refund.admin_notes.as_deref(), Some("Đã nhận lại hàng"));
    assert!(refund.refund_transaction_id.is_some());
    assert!(refund.import_voucher_id.is_some());
    assert_eq!(refund.refund_reason, "size_issue");
    assert_eq!(
        c.take_notices()[0].message,
        "Đã duyệt hoàn tiền cho đơn hàng."
    );
}

#[tokio::test]
async fn approval_without_voucher() {
    let app = TestApp::spawn().await;
    app.seed_order("X1", OrderStatus::Completed, true);
    app.as_customer()
        .await
        .open("X1")
        .await
        .request_refund(RefundReason::QualityIssue, Some("Vải xấu".into()))
        .await
        .unwrap();

    let admin = app.as_admin().await;
    let mut c = admin.open("X1").await;
    c.approve_refund(None, false).await.unwrap();

    let stored = app.backend.order("X1").unwrap();
    assert_eq!(stored.status, "refunded");
    let refund = stored.refund_info.unwrap();
    assert!(refund.import_voucher_id.is_none());
    assert!(refund.admin_notes.is_none());
}

#[tokio::test]
async fn rejection_returns_the_order_to_completed() {
    let app = TestApp::spawn().await;
    app.seed_order("X1", OrderStatus::Completed, true);
    app.as_customer()
        .await
        .open("X1")
        .await
        .request_refund(RefundReason::Other, None)
        .await
        .unwrap();

    let admin = app.as_admin().await;
    let mut c = admin.open("X1").await;

    assert!(c.open_refund_dialog(OrderAction::RejectRefund));
    c.rejection_dialog().form_mut().notes = "   ".into();
    assert!(!c.rejection_dialog().can_submit());
    assert!(c.submit_refund_rejection().await.is_err());
    assert!(c.rejection_dialog().is_open());
    assert_eq!(app.stored_status("X1"), "refund_requested");

    c.rejection_dialog().form_mut().notes = "Sản phẩm đã qua sử dụng".into();
    c.submit_refund_rejection().await.unwrap();

    assert!(!c.rejection_dialog().is_open());
    assert_eq!(c.status(), Some(OrderStatus::Completed));
    assert_eq!(c.payment_status(), Some(PaymentStatus::Paid));
    assert_eq!(
        c.order()
            .unwrap()
            .refund_info
            .as_ref()
            .and_then(|r| r.admin_notes.as_deref()),
        Some("Sản phẩm đã qua sử dụng")
    );
    let notices = c.take_notices();
    assert_eq!(notices.last().unwrap().level, NoticeLevel::Success);
    assert_eq!(
        notices.last().unwrap().message,
        "Đã từ chối yêu cầu hoàn tiền."
    );

    // A rejected order can be refunded again by its owner.
    let customer = app.as_customer().await;
    let c = customer.open("X1").await;
    assert_eq!(c.available_actions(), vec![OrderAction::RequestRefund]);
}

#[tokio::test]
async fn customer_cannot_decide_their_own_refund() {
    let app = TestApp::spawn().await;
    app.seed_order("X1", OrderStatus::Completed, true);
    let customer = app.as_customer().await;
    let mut c = customer.open("X1").await;
    c.request_refund(RefundReason::Damaged, None).await.unwrap();

    assert!(c.available_actions().is_empty());
    assert!(!c.open_refund_dialog(OrderAction::ApproveRefund));
    let err = c.approve_refund(None, true).await.unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
    assert_eq!(app.stored_status("X1"), "refund_requested");
}
