use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use validator::Validate;

use crate::{
    client::ApiClient,
    errors::ServiceError,
    models::{Order, OrderDto, OrderId, OrderStatus, RefundReason},
};

const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Body of `PUT /api/orders/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// Body of `POST /api/orders/{id}/refund-request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub reason: RefundReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Body of `PUT /api/orders/{id}/refund/approve`. Always a full refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRefundRequest {
    #[validate(length(min = 1, message = "Refund method is required"))]
    pub refund_method: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default = "default_create_import_voucher")]
    pub create_import_voucher: bool,
}

fn default_create_import_voucher() -> bool {
    true
}

/// Body of `PUT /api/orders/{id}/refund/reject`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RejectRefundRequest {
    #[validate(length(min = 1, message = "Rejection notes are required"))]
    pub notes: String,
}

/// Admin order list filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderListQuery {
    pub page: u32,
    pub limit: u32,
    pub status: Option<OrderStatus>,
}

impl Default for OrderListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            status: None,
        }
    }
}

impl OrderListQuery {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.max(1).to_string()),
            ("limit", self.limit.max(1).to_string()),
        ];
        if let Some(status) = self.status {
            params.push(("status", status.as_str().to_string()));
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub page: u32,
    pub pages: u32,
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPageDto {
    pub orders: Vec<OrderDto>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "first_page")]
    pub pages: u32,
    #[serde(default)]
    pub total: Option<u64>,
}

fn first_page() -> u32 {
    1
}

impl TryFrom<OrderPageDto> for OrderPage {
    type Error = ServiceError;

    fn try_from(dto: OrderPageDto) -> Result<Self, Self::Error> {
        let orders = dto
            .orders
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            total: dto.total.unwrap_or(orders.len() as u64),
            orders,
            page: dto.page,
            pages: dto.pages,
        })
    }
}

/// Backend order and refund endpoints consumed by the order-management core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn get_order(&self, id: &OrderId) -> Result<Order, ServiceError>;

    async fn list_orders(&self, query: &OrderListQuery) -> Result<OrderPage, ServiceError>;

    async fn list_my_orders(&self) -> Result<Vec<Order>, ServiceError>;

    async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), ServiceError>;

    async fn request_refund(
        &self,
        id: &OrderId,
        request: &RefundRequest,
    ) -> Result<(), ServiceError>;

    async fn approve_refund(
        &self,
        id: &OrderId,
        request: &ApproveRefundRequest,
    ) -> Result<(), ServiceError>;

    async fn reject_refund(
        &self,
        id: &OrderId,
        request: &RejectRefundRequest,
    ) -> Result<(), ServiceError>;
}

/// [`OrderApi`] over the backend's REST endpoints.
#[derive(Clone)]
pub struct HttpOrderApi {
    client: Arc<ApiClient>,
}

impl HttpOrderApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

fn order_path(id: &OrderId, suffix: &str) -> String {
    format!("/api/orders/{}{}", id.as_str(), suffix)
}

#[async_trait]
impl OrderApi for HttpOrderApi {
    #[instrument(skip(self), fields(order_id = %id))]
    async fn get_order(&self, id: &OrderId) -> Result<Order, ServiceError> {
        let dto: OrderDto = self
            .client
            .get_json(&order_path(id, ""), &[])
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch order");
                e
            })?;
        Order::try_from(dto)
    }

    #[instrument(skip(self))]
    async fn list_orders(&self, query: &OrderListQuery) -> Result<OrderPage, ServiceError> {
        let dto: OrderPageDto = self.client.get_json("/api/orders", &query.to_query()).await?;
        OrderPage::try_from(dto)
    }

    #[instrument(skip(self))]
    async fn list_my_orders(&self) -> Result<Vec<Order>, ServiceError> {
        let dtos: Vec<OrderDto> = self.client.get_json("/api/orders/myorders", &[]).await?;
        dtos.into_iter().map(Order::try_from).collect()
    }

    #[instrument(skip(self), fields(order_id = %id, status = %status))]
    async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), ServiceError> {
        let body = UpdateOrderStatusRequest { status };
        self.client
            .send_command(Method::PUT, &order_path(id, "/status"), Some(&body))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to update order status");
                e
            })?;
        info!("Order status update accepted");
        Ok(())
    }

    #[instrument(skip(self, request), fields(order_id = %id, reason = %request.reason))]
    async fn request_refund(
        &self,
        id: &OrderId,
        request: &RefundRequest,
    ) -> Result<(), ServiceError> {
        self.client
            .send_command(Method::POST, &order_path(id, "/refund-request"), Some(request))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to request refund");
                e
            })?;
        info!("Refund request accepted");
        Ok(())
    }

    #[instrument(skip(self, request), fields(order_id = %id, amount = %request.amount))]
    async fn approve_refund(
        &self,
        id: &OrderId,
        request: &ApproveRefundRequest,
    ) -> Result<(), ServiceError> {
        request.validate()?;
        self.client
            .send_command(Method::PUT, &order_path(id, "/refund/approve"), Some(request))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to approve refund");
                e
            })?;
        info!("Refund approval accepted");
        Ok(())
    }

    #[instrument(skip(self, request), fields(order_id = %id))]
    async fn reject_refund(
        &self,
        id: &OrderId,
        request: &RejectRefundRequest,
    ) -> Result<(), ServiceError> {
        if request.notes.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "rejection notes are required".to_string(),
            ));
        }
        self.client
            .send_command(Method::PUT, &order_path(id, "/refund/reject"), Some(request))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to reject refund");
                e
            })?;
        info!("Refund rejection accepted");
        Ok(())
    }
}
