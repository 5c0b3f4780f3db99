use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::EnumIter;

use crate::errors::ServiceError;

/// Backend-assigned order identifier. Never empty, and always a single URL path segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderId(String);

impl OrderId {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::ValidationError(
                "order id must not be empty".to_string(),
            ));
        }
        if let Some(c) = trimmed.chars().find(|c| {
            matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control()
        }) {
            return Err(ServiceError::ValidationError(format!(
                "order id must not contain {c:?}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OrderId {
    type Error = ServiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderId> for String {
    fn from(id: OrderId) -> Self {
        id.0
    }
}

impl FromStr for OrderId {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Lifecycle stage of an order.
///
/// The wire strings are fixed by the backend; [`OrderStatus::as_str`] and
/// [`OrderStatus::from_str`] are the only places they are spelled out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    RefundRequested,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::RefundRequested => "refund_requested",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Chờ xác nhận",
            OrderStatus::Processing => "Đang xử lý",
            OrderStatus::Completed => "Hoàn thành",
            OrderStatus::Cancelled => "Đã hủy",
            OrderStatus::RefundRequested => "Yêu cầu hoàn tiền",
            OrderStatus::Refunded => "Đã hoàn tiền",
        }
    }

    /// No action leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refund_requested" => Ok(OrderStatus::RefundRequested),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(ServiceError::InvalidStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = ServiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
}

impl PaymentStatus {
    pub fn from_paid(is_paid: bool) -> Self {
        if is_paid {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Unpaid
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "Đã thanh toán",
            PaymentStatus::Unpaid => "Chưa thanh toán",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
        })
    }
}

/// Every intent a user can raise against an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Confirm,
    Ship,
    Complete,
    Cancel,
    RequestRefund,
    ApproveRefund,
    RejectRefund,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Confirm => "confirm",
            OrderAction::Ship => "ship",
            OrderAction::Complete => "complete",
            OrderAction::Cancel => "cancel",
            OrderAction::RequestRefund => "request_refund",
            OrderAction::ApproveRefund => "approve_refund",
            OrderAction::RejectRefund => "reject_refund",
        }
    }

    /// Button caption; also names the action in its confirmation prompt.
    pub fn label(&self) -> &'static str {
        match self {
            OrderAction::Confirm => "Xác nhận đơn hàng",
            OrderAction::Ship => "Giao hàng",
            OrderAction::Complete => "Hoàn thành đơn hàng",
            OrderAction::Cancel => "Hủy đơn hàng",
            OrderAction::RequestRefund => "Yêu cầu hoàn tiền",
            OrderAction::ApproveRefund => "Duyệt hoàn tiền",
            OrderAction::RejectRefund => "Từ chối hoàn tiền",
        }
    }

    pub fn confirmation_prompt(&self) -> String {
        format!(
            "Bạn có chắc chắn muốn thực hiện \"{}\" cho đơn hàng này?",
            self.label()
        )
    }

    /// Actions carried out through a refund dialog rather than the stepper.
    pub fn is_refund_action(&self) -> bool {
        matches!(
            self,
            OrderAction::RequestRefund | OrderAction::ApproveRefund | OrderAction::RejectRefund
        )
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of refund reason codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    Damaged,
    WrongItem,
    SizeIssue,
    QualityIssue,
    Other,
}

impl RefundReason {
    pub fn code(&self) -> &'static str {
        match self {
            RefundReason::Damaged => "damaged",
            RefundReason::WrongItem => "wrong_item",
            RefundReason::SizeIssue => "size_issue",
            RefundReason::QualityIssue => "quality_issue",
            RefundReason::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RefundReason::Damaged => "Sản phẩm bị hư hỏng",
            RefundReason::WrongItem => "Giao sai sản phẩm",
            RefundReason::SizeIssue => "Không vừa kích thước",
            RefundReason::QualityIssue => "Chất lượng không như mong đợi",
            RefundReason::Other => "Lý do khác",
        }
    }
}

impl fmt::Display for RefundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RefundReason {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "damaged" => Ok(RefundReason::Damaged),
            "wrong_item" => Ok(RefundReason::WrongItem),
            "size_issue" => Ok(RefundReason::SizeIssue),
            "quality_issue" => Ok(RefundReason::QualityIssue),
            "other" => Ok(RefundReason::Other),
            other => Err(ServiceError::ValidationError(format!(
                "unknown refund reason '{other}'"
            ))),
        }
    }
}

/// Display text for a refund reason code; unknown codes are shown as-is.
pub fn refund_reason_text(code: &str) -> String {
    match code.parse::<RefundReason>() {
        Ok(reason) => reason.label().to_string(),
        Err(_) => code.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundInfo {
    /// Raw reason code as stored by the backend.
    pub refund_reason: String,
    pub notes: Option<String>,
    pub refund_date: Option<DateTime<Utc>>,
    pub refund_transaction_id: Option<String>,
    pub refund_method: Option<String>,
    pub refund_amount: Option<Decimal>,
    pub admin_notes: Option<String>,
    /// Warehouse stock-in voucher created on approval, if requested.
    pub import_voucher_id: Option<String>,
}

impl RefundInfo {
    pub fn reason_text(&self) -> String {
        refund_reason_text(&self.refund_reason)
    }
}

/// Contact snapshot embedded in the order. Phone and address are part of the
/// shape but the backend mapping only fills name and email.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: String,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: Option<String>,
    pub address: String,
    pub city: String,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
}

/// Client-side projection of one order. The backend owns the canonical copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub customer: CustomerSnapshot,
    pub items: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub payment_method: String,
    pub note: Option<String>,
    pub refund_info: Option<RefundInfo>,
    pub created_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Backend wire representation
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUserDto {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDto {
    pub product: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub price: Decimal,
    pub qty: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundInfoDto {
    pub refund_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_voucher_id: Option<String>,
}

/// Order as the backend serializes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order_items: Vec<OrderItemDto>,
    #[serde(default)]
    pub user: OrderUserDto,
    #[serde(default)]
    pub shipping_address: ShippingAddressDto,
    #[serde(default)]
    pub items_price: Decimal,
    #[serde(default)]
    pub shipping_price: Decimal,
    #[serde(default)]
    pub tax_price: Decimal,
    #[serde(default)]
    pub total_price: Decimal,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_info: Option<RefundInfoDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<RefundInfoDto> for RefundInfo {
    fn from(dto: RefundInfoDto) -> Self {
        Self {
            refund_reason: dto.refund_reason,
            notes: dto.notes.filter(|n| !n.trim().is_empty()),
            refund_date: dto.refund_date,
            refund_transaction_id: dto.refund_transaction_id,
            refund_method: dto.refund_method,
            refund_amount: dto.refund_amount,
            admin_notes: dto.admin_notes.filter(|n| !n.trim().is_empty()),
            import_voucher_id: dto.import_voucher_id,
        }
    }
}

impl From<OrderItemDto> for OrderLine {
    fn from(dto: OrderItemDto) -> Self {
        Self {
            line_total: dto.price * Decimal::from(dto.qty),
            product_id: dto.product,
            name: dto.name,
            image: dto.image,
            unit_price: dto.price,
            quantity: dto.qty,
        }
    }
}

impl From<ShippingAddressDto> for ShippingAddress {
    fn from(dto: ShippingAddressDto) -> Self {
        Self {
            full_name: dto.full_name,
            address: dto.address,
            city: dto.city,
            postal_code: dto.postal_code,
            country: dto.country,
            phone: dto.phone,
        }
    }
}

impl TryFrom<OrderDto> for Order {
    type Error = ServiceError;

    fn try_from(dto: OrderDto) -> Result<Self, Self::Error> {
        let id = OrderId::parse(&dto.id)?;
        let status = dto.status.parse::<OrderStatus>()?;

        Ok(Self {
            id,
            status,
            payment_status: PaymentStatus::from_paid(dto.is_paid),
            paid_at: dto.paid_at,
            customer: CustomerSnapshot {
                name: dto.user.name,
                email: dto.user.email,
                phone: None,
                address: None,
            },
            items: dto.order_items.into_iter().map(OrderLine::from).collect(),
            shipping_address: dto.shipping_address.into(),
            subtotal: dto.items_price,
            shipping: dto.shipping_price,
            tax: dto.tax_price,
            total: dto.total_price,
            payment_method: dto.payment_method,
            note: dto.note.filter(|n| !n.trim().is_empty()),
            refund_info: dto.refund_info.map(RefundInfo::from),
            created_at: dto.created_at,
        })
    }
}
