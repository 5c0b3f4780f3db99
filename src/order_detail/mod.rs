//! Order detail and status controller.
//!
//! Loads one order and turns every state-changing intent into a single
//! backend call. Local state moves only after the backend accepts, and every
//! accepted mutation is followed by a full re-fetch (server values win).

pub mod refund_dialogs;
pub mod stepper;

use std::{collections::HashMap, fmt, sync::Arc};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    errors::ServiceError,
    models::{Order, OrderAction, OrderId, OrderStatus, PaymentStatus, RefundReason},
    services::{
        order_status,
        orders::{ApproveRefundRequest, OrderApi, RefundRequest, RejectRefundRequest},
    },
    session::Session,
};

use self::{
    refund_dialogs::{
        optional_notes, RefundApprovalForm, RefundDialog, RefundRejectionForm, RefundRequestForm,
    },
    stepper::{OrderStepper, StepperView},
};

pub const ADMIN_ORDER_LIST_ROUTE: &str = "/admin/orders";
pub const CUSTOMER_ORDER_LIST_ROUTE: &str = "/profile/orders";

/// Operations whose progress the controller tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Load,
    ChangeStatus,
    RequestRefund,
    ApproveRefund,
    RejectRefund,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RequestState {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed(String),
}

impl RequestState {
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestState::Pending)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Toasts are transient; alerts block until dismissed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeChannel {
    Toast,
    Alert,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub channel: NoticeChannel,
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Static error panel shown when the order cannot be loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadFailure {
    pub message: String,
    pub back_to_list: &'static str,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderView {
    Loading,
    Loaded(Box<Order>),
    Failed(LoadFailure),
}

struct MutationOutcome {
    op: Operation,
    action: OrderAction,
    next: Option<OrderStatus>,
    success: &'static str,
    failure: &'static str,
    channel: NoticeChannel,
}

pub struct OrderDetailController {
    api: Arc<dyn OrderApi>,
    session: Arc<Session>,
    refund_method: String,
    view: OrderView,
    requests: HashMap<Operation, RequestState>,
    notices: Vec<Notice>,
    stepper: Option<OrderStepper>,
    refund_request_dialog: RefundDialog<RefundRequestForm>,
    approval_dialog: RefundDialog<RefundApprovalForm>,
    rejection_dialog: RefundDialog<RefundRejectionForm>,
}

impl OrderDetailController {
    /// `refund_method` is sent with every approval.
    pub fn new(
        api: Arc<dyn OrderApi>,
        session: Arc<Session>,
        refund_method: impl Into<String>,
    ) -> Self {
        Self {
            api,
            session,
            refund_method: refund_method.into(),
            view: OrderView::Loading,
            requests: HashMap::new(),
            notices: Vec::new(),
            stepper: None,
            refund_request_dialog: RefundDialog::default(),
            approval_dialog: RefundDialog::default(),
            rejection_dialog: RefundDialog::default(),
        }
    }

    pub fn view(&self) -> &OrderView {
        &self.view
    }

    pub fn order(&self) -> Option<&Order> {
        match &self.view {
            OrderView::Loaded(order) => Some(&**order),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<OrderStatus> {
        self.order().map(|o| o.status)
    }

    pub fn payment_status(&self) -> Option<PaymentStatus> {
        self.order().map(|o| o.payment_status)
    }

    pub fn request_state(&self, op: Operation) -> RequestState {
        self.requests.get(&op).cloned().unwrap_or_default()
    }

    /// Drains queued toasts and alerts.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Every action the session may take right now. Empty unless loaded.
    pub fn available_actions(&self) -> Vec<OrderAction> {
        match self.order() {
            Some(order) => order_status::available_actions(
                order.status,
                order.payment_status,
                self.session.role(),
            ),
            None => Vec::new(),
        }
    }

    pub fn stepper(&self) -> Option<&OrderStepper> {
        self.stepper.as_ref()
    }

    pub fn stepper_view(&self) -> Option<StepperView> {
        self.stepper.as_ref().map(OrderStepper::view)
    }

    pub fn refund_request_dialog(&mut self) -> &mut RefundDialog<RefundRequestForm> {
        &mut self.refund_request_dialog
    }

    pub fn approval_dialog(&mut self) -> &mut RefundDialog<RefundApprovalForm> {
        &mut self.approval_dialog
    }

    pub fn rejection_dialog(&mut self) -> &mut RefundDialog<RefundRejectionForm> {
        &mut self.rejection_dialog
    }

    fn back_to_list(&self) -> &'static str {
        if self.session.is_admin() {
            ADMIN_ORDER_LIST_ROUTE
        } else {
            CUSTOMER_ORDER_LIST_ROUTE
        }
    }

    fn set_state(&mut self, op: Operation, state: RequestState) {
        self.requests.insert(op, state);
    }

    fn notify(&mut self, level: NoticeLevel, channel: NoticeChannel, message: impl Into<String>) {
        self.notices.push(Notice {
            level,
            channel,
            message: message.into(),
        });
    }

    fn sync_stepper(&mut self) {
        let role = self.session.role();
        let Some((status, payment)) = self.order().map(|o| (o.status, o.payment_status)) else {
            self.stepper = None;
            return;
        };
        if let Some(stepper) = self.stepper.as_mut() {
            stepper.sync(status, payment, role);
        } else {
            self.stepper = Some(OrderStepper::new(status, payment, role));
        }
    }

    #[instrument(skip(self))]
    pub async fn load_order(&mut self, order_id: &str) -> Result<(), ServiceError> {
        self.view = OrderView::Loading;
        self.stepper = None;
        self.set_state(Operation::Load, RequestState::Pending);

        let result = match OrderId::parse(order_id) {
            Ok(id) => self.api.get_order(&id).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(order) => {
                info!(order_id = %order.id, status = %order.status, "Order loaded");
                self.view = OrderView::Loaded(Box::new(order));
                self.set_state(Operation::Load, RequestState::Succeeded);
                self.sync_stepper();
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to load order");
                let message = format!("Không thể tải thông tin đơn hàng. {}", e.user_message());
                self.view = OrderView::Failed(LoadFailure {
                    message: message.clone(),
                    back_to_list: self.back_to_list(),
                });
                self.set_state(Operation::Load, RequestState::Failed(message));
                Err(e)
            }
        }
    }

    fn loaded(&self) -> Result<(OrderId, OrderStatus, PaymentStatus), ServiceError> {
        self.order()
            .map(|o| (o.id.clone(), o.status, o.payment_status))
            .ok_or_else(|| ServiceError::ValidationError("no order is loaded".to_string()))
    }

    /// Rejected intent: recorded like a failed call, but no request was sent.
    fn refuse(
        &mut self,
        op: Operation,
        channel: NoticeChannel,
        failure: &str,
        err: ServiceError,
    ) -> ServiceError {
        warn!(error = %err, ?op, "Intent rejected before reaching the backend");
        let message = format!("{failure} {}", err.user_message());
        self.notify(NoticeLevel::Error, channel, message.clone());
        self.set_state(op, RequestState::Failed(message));
        err
    }

    async fn finish_mutation(
        &mut self,
        outcome: MutationOutcome,
        result: Result<(), ServiceError>,
    ) -> Result<(), ServiceError> {
        match result {
            Ok(()) => {
                info!(action = %outcome.action, next = ?outcome.next, "Backend accepted order mutation");
                self.apply_locally(outcome.action, outcome.next);
                self.refresh().await;
                self.notify(NoticeLevel::Success, NoticeChannel::Toast, outcome.success);
                self.set_state(outcome.op, RequestState::Succeeded);
                Ok(())
            }
            Err(e) => {
                error!(action = %outcome.action, error = %e, "Order mutation failed");
                let message = format!("{} {}", outcome.failure, e.user_message());
                self.notify(NoticeLevel::Error, outcome.channel, message.clone());
                self.set_state(outcome.op, RequestState::Failed(message));
                Err(e)
            }
        }
    }

    /// Completing an order is the only transition that touches payment.
    fn apply_locally(&mut self, action: OrderAction, next: Option<OrderStatus>) {
        let Some(next) = next else { return };
        if let OrderView::Loaded(order) = &mut self.view {
            order.status = next;
            if action == OrderAction::Complete {
                order.payment_status = PaymentStatus::Paid;
                order.paid_at.get_or_insert_with(Utc::now);
            }
        }
        self.sync_stepper();
    }

    /// Read-after-write. A failed re-fetch keeps the locally applied state.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) {
        let Ok((id, _, _)) = self.loaded() else { return };
        match self.api.get_order(&id).await {
            Ok(order) => {
                debug!(order_id = %id, status = %order.status, "Order re-fetched");
                self.view = OrderView::Loaded(Box::new(order));
                self.sync_stepper();
            }
            Err(e) => warn!(order_id = %id, error = %e, "Re-fetch after mutation failed; keeping local state"),
        }
    }

    /// Asks the backend to move the order to `new_status`.
    #[instrument(skip(self), fields(new_status = %new_status))]
    pub async fn change_status(&mut self, new_status: OrderStatus) -> Result<(), ServiceError> {
        const FAILURE: &str = "Cập nhật trạng thái đơn hàng thất bại.";
        let op = Operation::ChangeStatus;

        let (id, current, payment) = match self.loaded() {
            Ok(loaded) => loaded,
            Err(e) => return Err(self.refuse(op, NoticeChannel::Alert, FAILURE, e)),
        };

        let action = match order_status::action_for_target(current, new_status) {
            Some(action) if !action.is_refund_action() => action,
            _ => {
                let err = ServiceError::InvalidStatus(format!("{current} -> {new_status}"));
                return Err(self.refuse(op, NoticeChannel::Alert, FAILURE, err));
            }
        };
        if let Err(e) = order_status::authorize(current, payment, action, self.session.role()) {
            return Err(self.refuse(op, NoticeChannel::Alert, FAILURE, e));
        }

        self.set_state(op, RequestState::Pending);
        let result = self.api.update_order_status(&id, new_status).await;
        self.finish_mutation(
            MutationOutcome {
                op,
                action,
                next: Some(new_status),
                success: "Cập nhật trạng thái đơn hàng thành công.",
                failure: FAILURE,
                channel: NoticeChannel::Alert,
            },
            result,
        )
        .await
    }

    /// Opens the stepper's confirmation dialog for `action`.
    pub fn request_action(&mut self, action: OrderAction) -> bool {
        self.stepper
            .as_mut()
            .map(|stepper| stepper.request(action))
            .unwrap_or(false)
    }

    /// Confirms the stepper's open dialog and carries out its intent, if any.
    pub async fn confirm_action(&mut self) -> Result<(), ServiceError> {
        let Some(stepper) = self.stepper.as_mut() else {
            return Ok(());
        };
        match stepper.confirm() {
            Some(next) => self.change_status(next).await,
            None => Ok(()),
        }
    }

    pub fn dismiss_action(&mut self) {
        if let Some(stepper) = self.stepper.as_mut() {
            stepper.dismiss();
        }
    }

    #[instrument(skip(self, notes), fields(reason = %reason))]
    pub async fn request_refund(
        &mut self,
        reason: RefundReason,
        notes: Option<String>,
    ) -> Result<(), ServiceError> {
        const FAILURE: &str = "Gửi yêu cầu hoàn tiền thất bại.";
        let op = Operation::RequestRefund;
        let action = OrderAction::RequestRefund;

        let checked = self.loaded().and_then(|(id, status, payment)| {
            order_status::authorize(status, payment, action, self.session.role()).map(|_| id)
        });
        let id = match checked {
            Ok(id) => id,
            Err(e) => return Err(self.refuse(op, NoticeChannel::Toast, FAILURE, e)),
        };

        self.set_state(op, RequestState::Pending);
        let request = RefundRequest { reason, notes };
        let result = self.api.request_refund(&id, &request).await;
        self.finish_mutation(
            MutationOutcome {
                op,
                action,
                next: Some(OrderStatus::RefundRequested),
                success: "Đã gửi yêu cầu hoàn tiền.",
                failure: FAILURE,
                channel: NoticeChannel::Toast,
            },
            result,
        )
        .await
    }

    /// Approves a full refund of the order total.
    #[instrument(skip(self, notes))]
    pub async fn approve_refund(
        &mut self,
        notes: Option<String>,
        create_import_voucher: bool,
    ) -> Result<(), ServiceError> {
        const FAILURE: &str = "Duyệt hoàn tiền thất bại.";
        let op = Operation::ApproveRefund;
        let action = OrderAction::ApproveRefund;

        let checked = self.loaded().and_then(|(id, status, payment)| {
            order_status::authorize(status, payment, action, self.session.role()).map(|_| id)
        });
        let id = match checked {
            Ok(id) => id,
            Err(e) => return Err(self.refuse(op, NoticeChannel::Toast, FAILURE, e)),
        };
        let amount = self.order().map(|o| o.total).unwrap_or_default();

        self.set_state(op, RequestState::Pending);
        let request = ApproveRefundRequest {
            refund_method: self.refund_method.clone(),
            amount,
            notes,
            create_import_voucher,
        };
        let result = self.api.approve_refund(&id, &request).await;
        self.finish_mutation(
            MutationOutcome {
                op,
                action,
                next: Some(OrderStatus::Refunded),
                success: "Đã duyệt hoàn tiền cho đơn hàng.",
                failure: FAILURE,
                channel: NoticeChannel::Toast,
            },
            result,
        )
        .await
    }

    /// Rejects the pending refund; the order returns to `completed`.
    #[instrument(skip(self, notes))]
    pub async fn reject_refund(&mut self, notes: &str) -> Result<(), ServiceError> {
        const FAILURE: &str = "Từ chối hoàn tiền thất bại.";
        let op = Operation::RejectRefund;
        let action = OrderAction::RejectRefund;

        let checked = self.loaded().and_then(|(id, status, payment)| {
            order_status::authorize(status, payment, action, self.session.role())?;
            if notes.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "rejection notes are required".to_string(),
                ));
            }
            Ok(id)
        });
        let id = match checked {
            Ok(id) => id,
            Err(e) => return Err(self.refuse(op, NoticeChannel::Toast, FAILURE, e)),
        };

        self.set_state(op, RequestState::Pending);
        let request = RejectRefundRequest {
            notes: notes.trim().to_string(),
        };
        let result = self.api.reject_refund(&id, &request).await;
        self.finish_mutation(
            MutationOutcome {
                op,
                action,
                next: Some(OrderStatus::Completed),
                success: "Đã từ chối yêu cầu hoàn tiền.",
                failure: FAILURE,
                channel: NoticeChannel::Toast,
            },
            result,
        )
        .await
    }

    /// Opens the dialog that belongs to a refund action. False if not on offer.
    pub fn open_refund_dialog(&mut self, action: OrderAction) -> bool {
        if !self.available_actions().contains(&action) {
            return false;
        }
        match action {
            OrderAction::RequestRefund => self.refund_request_dialog.open(),
            OrderAction::ApproveRefund => self.approval_dialog.open(),
            OrderAction::RejectRefund => self.rejection_dialog.open(),
            _ => return false,
        }
        true
    }

    pub async fn submit_refund_request(&mut self) -> Result<(), ServiceError> {
        self.refund_request_dialog.begin_submit()?;
        let form = self.refund_request_dialog.form().clone();
        let result = match form.reason {
            Some(reason) => self.request_refund(reason, optional_notes(&form.notes)).await,
            None => Err(ServiceError::ValidationError(
                "refund reason is required".to_string(),
            )),
        };
        self.refund_request_dialog.finish_submit(result.is_ok());
        result
    }

    pub async fn submit_refund_approval(&mut self) -> Result<(), ServiceError> {
        self.approval_dialog.begin_submit()?;
        let form = self.approval_dialog.form().clone();
        let result = self
            .approve_refund(optional_notes(&form.notes), form.create_import_voucher)
            .await;
        self.approval_dialog.finish_submit(result.is_ok());
        result
    }

    pub async fn submit_refund_rejection(&mut self) -> Result<(), ServiceError> {
        self.rejection_dialog.begin_submit()?;
        let notes = self.rejection_dialog.form().notes.clone();
        let result = self.reject_refund(&notes).await;
        self.rejection_dialog.finish_submit(result.is_ok());
        result
    }
}
