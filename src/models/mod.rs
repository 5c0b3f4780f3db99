pub mod order;
pub mod user;

pub use order::{
    refund_reason_text, CustomerSnapshot, Order, OrderAction, OrderDto, OrderId, OrderLine,
    OrderStatus, PaymentStatus, RefundInfo, RefundReason, ShippingAddress,
};
pub use user::{AuthenticatedUser, Role, User};
