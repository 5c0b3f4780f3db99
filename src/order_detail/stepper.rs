//! Order processing stepper: status to progress track and action buttons.
//!
//! The stepper never talks to the backend. Confirming an action yields the
//! target status for the controller to carry out.

use serde::Serialize;
use tracing::debug;

use crate::{
    models::{OrderAction, OrderStatus, PaymentStatus, Role},
    services::order_status::{self, transition},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Placed,
    Processing,
    Shipping,
    Completed,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Placed,
        Stage::Processing,
        Stage::Shipping,
        Stage::Completed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Placed => "Đặt hàng",
            Stage::Processing => "Đang xử lý",
            Stage::Shipping => "Giao hàng",
            Stage::Completed => "Hoàn thành",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Done,
    Current,
    Upcoming,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub stage: Stage,
    pub state: StageState,
}

/// Off-track outcome drawn beside the four stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Cancelled,
    RefundRequested,
    Refunded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StepperView {
    pub stages: Vec<StageView>,
    pub branch: Option<Branch>,
    pub actions: Vec<OrderAction>,
    /// Confirmation text while a dialog is open.
    pub prompt: Option<String>,
}

#[derive(Clone, Debug)]
pub struct OrderStepper {
    status: OrderStatus,
    payment: PaymentStatus,
    role: Option<Role>,
    pending: Option<OrderAction>,
}

impl OrderStepper {
    pub fn new(status: OrderStatus, payment: PaymentStatus, role: Option<Role>) -> Self {
        Self {
            status,
            payment,
            role,
            pending: None,
        }
    }

    /// Picks up new props. An open dialog survives only if its action is still offered.
    pub fn sync(&mut self, status: OrderStatus, payment: PaymentStatus, role: Option<Role>) {
        self.status = status;
        self.payment = payment;
        self.role = role;
        if let Some(action) = self.pending {
            if !self.actions().contains(&action) {
                self.pending = None;
            }
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Lifecycle buttons; refund actions live in their own dialogs.
    pub fn actions(&self) -> Vec<OrderAction> {
        order_status::available_actions(self.status, self.payment, self.role)
            .into_iter()
            .filter(|action| !action.is_refund_action())
            .collect()
    }

    pub fn pending_action(&self) -> Option<OrderAction> {
        self.pending
    }

    /// Opens the confirmation dialog. Returns false for actions not on offer.
    pub fn request(&mut self, action: OrderAction) -> bool {
        if !self.actions().contains(&action) {
            debug!(%action, status = %self.status, "stepper action not offered");
            return false;
        }
        self.pending = Some(action);
        true
    }

    /// Closes the dialog and returns the status to ask the controller for.
    ///
    /// `None` when nothing was pending or the action does not move the order.
    pub fn confirm(&mut self) -> Option<OrderStatus> {
        let action = self.pending.take()?;
        match transition(self.status, action) {
            Ok(next) => {
                if next.is_none() {
                    debug!(%action, "confirmed action has no status change");
                }
                next
            }
            Err(_) => None,
        }
    }

    pub fn dismiss(&mut self) {
        self.pending = None;
    }

    pub fn view(&self) -> StepperView {
        let (current, branch) = match self.status {
            OrderStatus::Pending => (Some(0), None),
            OrderStatus::Processing => (Some(1), None),
            OrderStatus::Completed => (None, None),
            OrderStatus::Cancelled => (Some(1), Some(Branch::Cancelled)),
            OrderStatus::RefundRequested => (None, Some(Branch::RefundRequested)),
            OrderStatus::Refunded => (None, Some(Branch::Refunded)),
        };

        let stages = Stage::ALL
            .iter()
            .enumerate()
            .map(|(idx, stage)| {
                let state = match current {
                    None => StageState::Done,
                    Some(cur) if idx < cur => StageState::Done,
                    Some(cur) if idx == cur && branch.is_none() => StageState::Current,
                    Some(_) => StageState::Upcoming,
                };
                StageView {
                    stage: *stage,
                    state,
                }
            })
            .collect();

        StepperView {
            stages,
            branch,
            actions: self.actions(),
            prompt: self.pending.map(|action| action.confirmation_prompt()),
        }
    }
}
