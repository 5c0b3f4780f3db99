//! Order lifecycle rules shared by the controller, the stepper and the
//! reference backend.
//!
//! ```text
//! pending ──confirm──▶ processing ──complete──▶ completed ──request_refund──▶ refund_requested
//!    │                    │  ╰─ship (no state change)       ▲                     │      │
//!    ╰──cancel──▶ cancelled ◀──cancel                        ╰────reject_refund────╯      │
//!                                                                     refunded ◀──approve_refund
//! ```

use strum::IntoEnumIterator;
use tracing::debug;

use crate::{
    errors::ServiceError,
    models::{OrderAction, OrderStatus, PaymentStatus, Role},
};

/// Next status for `action` taken in `from`.
///
/// `Ok(None)` means the action is offered but does not move the order
/// (`ship` from `processing`).
pub fn transition(
    from: OrderStatus,
    action: OrderAction,
) -> Result<Option<OrderStatus>, ServiceError> {
    use OrderAction::*;
    use OrderStatus::*;

    let next = match (from, action) {
        (Pending, Confirm) => Some(Processing),
        (Pending, Cancel) => Some(Cancelled),

        (Processing, Ship) => None,
        (Processing, Complete) => Some(Completed),
        (Processing, Cancel) => Some(Cancelled),

        (Completed, RequestRefund) => Some(RefundRequested),

        (RefundRequested, ApproveRefund) => Some(Refunded),
        (RefundRequested, RejectRefund) => Some(Completed),

        _ => return Err(ServiceError::InvalidTransition { from, action }),
    };
    Ok(next)
}

/// True when the lifecycle table has a row for `(status, action)`.
pub fn is_offered(status: OrderStatus, action: OrderAction) -> bool {
    transition(status, action).is_ok()
}

/// Validates if a status transition is allowed
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    action_for_target(from, to).is_some()
}

/// The action that moves an order from `from` to `to`, if any.
pub fn action_for_target(from: OrderStatus, to: OrderStatus) -> Option<OrderAction> {
    OrderAction::iter().find(|action| matches!(transition(from, *action), Ok(Some(next)) if next == to))
}

/// Role an actor must hold to take `action`.
pub fn required_role(action: OrderAction) -> Role {
    match action {
        OrderAction::RequestRefund => Role::Customer,
        OrderAction::Confirm
        | OrderAction::Ship
        | OrderAction::Complete
        | OrderAction::Cancel
        | OrderAction::ApproveRefund
        | OrderAction::RejectRefund => Role::Admin,
    }
}

/// Checks the lifecycle table, the actor's role and the payment gate.
pub fn authorize(
    status: OrderStatus,
    payment: PaymentStatus,
    action: OrderAction,
    role: Option<Role>,
) -> Result<Option<OrderStatus>, ServiceError> {
    let next = transition(status, action)?;

    let role = role.ok_or_else(|| {
        ServiceError::Unauthorized("an authenticated session is required".to_string())
    })?;
    if role != required_role(action) {
        debug!(%action, %role, "action not permitted for role");
        return Err(ServiceError::Forbidden(format!(
            "role '{}' may not {}",
            role, action
        )));
    }

    if action == OrderAction::RequestRefund && !payment.is_paid() {
        return Err(ServiceError::InvalidTransition {
            from: status,
            action,
        });
    }

    Ok(next)
}

/// Actions the actor may invoke on an order in `status`, in display order.
pub fn available_actions(
    status: OrderStatus,
    payment: PaymentStatus,
    role: Option<Role>,
) -> Vec<OrderAction> {
    OrderAction::iter()
        .filter(|action| authorize(status, payment, *action, role).is_ok())
        .collect()
}
