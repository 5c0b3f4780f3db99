use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use super::{store, ApiResponse, MockBackend};
use crate::{
    errors::ServiceError,
    models::{
        order::RefundInfoDto,
        user::{AuthResponse, LoginRequest, RegisterRequest, UpdateProfileRequest},
        OrderAction, OrderDto, OrderStatus, PaymentStatus, Role, User,
    },
    services::{
        order_status,
        orders::{
            ApproveRefundRequest, OrderPageDto, RefundRequest, RejectRefundRequest,
            UpdateOrderStatusRequest,
        },
    },
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ServiceError>;

/// Caller resolved from the bearer token.
pub struct Caller {
    pub user: User,
    pub token: String,
}

impl Caller {
    fn require_admin(&self) -> Result<(), ServiceError> {
        if self.user.role.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "Administrator role required".to_string(),
            ))
        }
    }

    fn can_see(&self, order: &OrderDto) -> bool {
        self.user.role.is_admin() || order.user.id.as_deref() == Some(self.user.id.as_str())
    }
}

#[async_trait]
impl FromRequestParts<MockBackend> for Caller {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &MockBackend,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".to_string()))?;

        let user = state
            .store()
            .user_for_token(token)
            .ok_or_else(|| ServiceError::Unauthorized("Invalid or expired token".to_string()))?;

        Ok(Caller {
            user,
            token: token.to_string(),
        })
    }
}

fn validation_message(errors: validator::ValidationErrors) -> ServiceError {
    let messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                format!(
                    "{}: {}",
                    field,
                    e.message.as_deref().unwrap_or("Invalid value")
                )
            })
        })
        .collect();
    ServiceError::ValidationError(messages.join("; "))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(ApiResponse::success("ok")))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub async fn login(
    State(state): State<MockBackend>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    request.validate().map_err(validation_message)?;
    let user = state
        .store()
        .verify_credentials(&request.email, &request.password)
        .ok_or_else(|| {
            warn!(email = %request.email, "Rejected login");
            ServiceError::Unauthorized("Invalid email or password".to_string())
        })?;
    let token = state.store().issue_token(&user);
    info!(user_id = %user.id, "User logged in");
    Ok(Json(ApiResponse::success(AuthResponse { token, user })))
}

pub async fn register(
    State(state): State<MockBackend>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), ServiceError> {
    request.validate().map_err(validation_message)?;
    let user = state.store().create_user(
        &request.name,
        &request.email,
        &request.password,
        Role::Customer,
    )?;
    let token = state.store().issue_token(&user);
    info!(user_id = %user.id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(AuthResponse { token, user })),
    ))
}

pub async fn logout(State(state): State<MockBackend>, caller: Caller) -> ApiResult<()> {
    state.store().revoke_token(&caller.token);
    Ok(Json(ApiResponse::message("Đăng xuất thành công")))
}

pub async fn get_profile(caller: Caller) -> ApiResult<User> {
    Ok(Json(ApiResponse::success(caller.user)))
}

pub async fn update_profile(
    State(state): State<MockBackend>,
    caller: Caller,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<User> {
    request.validate().map_err(validation_message)?;
    let user = state.store().update_user(
        &caller.user.id,
        request.name.as_deref(),
        request.email.as_deref(),
        request.password.as_deref(),
        request.phone.as_deref(),
    )?;
    Ok(Json(ApiResponse::success(user)))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

pub async fn list_orders(
    State(state): State<MockBackend>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> ApiResult<OrderPageDto> {
    caller.require_admin()?;

    let status = params
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<OrderStatus>)
        .transpose()?;
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    let all = state.store().orders(status);
    let total = all.len() as u64;
    let pages = u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX);
    let offset = u64::from(page - 1) * u64::from(limit);
    let orders = all
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(limit as usize)
        .collect();

    Ok(Json(ApiResponse::success(OrderPageDto {
        orders,
        page,
        pages: pages.max(1),
        total: Some(total),
    })))
}

pub async fn list_my_orders(
    State(state): State<MockBackend>,
    caller: Caller,
) -> ApiResult<Vec<OrderDto>> {
    Ok(Json(ApiResponse::success(
        state.store().orders_of(&caller.user.id),
    )))
}

pub async fn get_order(
    State(state): State<MockBackend>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<OrderDto> {
    let order = state
        .store()
        .order(&id)
        .filter(|o| caller.can_see(o))
        .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(ApiResponse::success(order)))
}

/// Checks ownership and the lifecycle table, returning the next status.
fn authorize_on(
    caller: &Caller,
    order: &OrderDto,
    action: OrderAction,
) -> Result<Option<OrderStatus>, ServiceError> {
    if !caller.can_see(order) {
        return Err(ServiceError::NotFound(format!("Order {} not found", order.id)));
    }
    let current: OrderStatus = order.status.parse()?;
    order_status::authorize(
        current,
        PaymentStatus::from_paid(order.is_paid),
        action,
        Some(caller.user.role),
    )
}

pub async fn update_order_status(
    State(state): State<MockBackend>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderDto> {
    let target = request.status;
    let updated = state.store().update_order(&id, |order| {
        if !caller.can_see(order) {
            return Err(ServiceError::NotFound(format!("Order {} not found", order.id)));
        }
        let current: OrderStatus = order.status.parse()?;
        let action = order_status::action_for_target(current, target)
            .filter(|a| !a.is_refund_action())
            .ok_or_else(|| {
                ServiceError::BadRequest(format!(
                    "Cannot change status from '{current}' to '{target}'"
                ))
            })?;
        authorize_on(&caller, order, action)?;

        order.status = target.as_str().to_string();
        if action == OrderAction::Complete && !order.is_paid {
            order.is_paid = true;
            order.paid_at = Some(Utc::now());
        }
        Ok(())
    })?;

    info!(order_id = %id, status = %target, "Order status updated");
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn request_refund(
    State(state): State<MockBackend>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<RefundRequest>,
) -> ApiResult<OrderDto> {
    let updated = state.store().update_order(&id, |order| {
        let next = authorize_on(&caller, order, OrderAction::RequestRefund)?;
        if let Some(next) = next {
            order.status = next.as_str().to_string();
        }
        order.refund_info = Some(RefundInfoDto {
            refund_reason: request.reason.code().to_string(),
            notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
            refund_date: Some(Utc::now()),
            refund_transaction_id: None,
            refund_method: None,
            refund_amount: None,
            admin_notes: None,
            import_voucher_id: None,
        });
        Ok(())
    })?;

    info!(order_id = %id, reason = %request.reason, "Refund requested");
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn approve_refund(
    State(state): State<MockBackend>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<ApproveRefundRequest>,
) -> ApiResult<OrderDto> {
    caller.require_admin()?;
    request.validate().map_err(validation_message)?;

    let updated = state.store().update_order(&id, |order| {
        let next = authorize_on(&caller, order, OrderAction::ApproveRefund)?;
        if request.amount <= rust_decimal::Decimal::ZERO || request.amount > order.total_price {
            return Err(ServiceError::BadRequest(format!(
                "Refund amount must be between 0 and {}",
                order.total_price
            )));
        }
        if let Some(next) = next {
            order.status = next.as_str().to_string();
        }
        let refund = order.refund_info.get_or_insert_with(|| RefundInfoDto {
            refund_reason: "other".to_string(),
            notes: None,
            refund_date: None,
            refund_transaction_id: None,
            refund_method: None,
            refund_amount: None,
            admin_notes: None,
            import_voucher_id: None,
        });
        refund.refund_method = Some(request.refund_method.clone());
        refund.refund_amount = Some(request.amount);
        refund.refund_transaction_id = Some(store::transaction_id());
        refund.refund_date = Some(Utc::now());
        refund.admin_notes = request.notes.clone().filter(|n| !n.trim().is_empty());
        refund.import_voucher_id = request.create_import_voucher.then(store::voucher_id);
        Ok(())
    })?;

    info!(order_id = %id, amount = %request.amount, voucher = request.create_import_voucher, "Refund approved");
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn reject_refund(
    State(state): State<MockBackend>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<RejectRefundRequest>,
) -> ApiResult<OrderDto> {
    caller.require_admin()?;
    if request.notes.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "notes: Rejection notes are required".to_string(),
        ));
    }

    let updated = state.store().update_order(&id, |order| {
        let next = authorize_on(&caller, order, OrderAction::RejectRefund)?;
        if let Some(next) = next {
            order.status = next.as_str().to_string();
        }
        if let Some(refund) = order.refund_info.as_mut() {
            refund.admin_notes = Some(request.notes.trim().to_string());
        }
        Ok(())
    })?;

    info!(order_id = %id, "Refund rejected");
    Ok(Json(ApiResponse::success(updated)))
}
