//! In-memory users, tokens and orders for the reference backend.

use dashmap::DashMap;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::{
        order::{OrderItemDto, OrderUserDto, ShippingAddressDto},
        OrderDto, OrderStatus, Role, User,
    },
};

#[derive(Clone, Debug)]
struct UserRecord {
    user: User,
    password_hash: String,
}

/// Salted with the user id so equal passwords never share a digest.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn short_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{prefix}-{}", &raw[..12])
}

#[derive(Default)]
pub struct Store {
    users: DashMap<String, UserRecord>,
    /// email -> user id
    emails: DashMap<String, String>,
    /// token -> user id
    tokens: DashMap<String, String>,
    orders: DashMap<String, OrderDto>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        let id = Uuid::new_v4().simple().to_string();

        match self.emails.entry(email.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ServiceError::Conflict(format!(
                    "email {email} is already registered"
                )))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let user = User {
            id: id.clone(),
            name: name.trim().to_string(),
            email: email.clone(),
            role,
            phone: None,
        };
        self.users.insert(
            id,
            UserRecord {
                user: user.clone(),
                password_hash: hash_password(&user.id, password),
            },
        );
        Ok(user)
    }

    pub fn verify_credentials(&self, email: &str, password: &str) -> Option<User> {
        let id = self.emails.get(&normalize_email(email))?.value().clone();
        let record = self.users.get(&id)?;
        if record.password_hash == hash_password(&id, password) {
            Some(record.user.clone())
        } else {
            None
        }
    }

    pub fn issue_token(&self, user: &User) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), user.id.clone());
        token
    }

    pub fn revoke_token(&self, token: &str) {
        self.tokens.remove(token);
    }

    pub fn user_for_token(&self, token: &str) -> Option<User> {
        let id = self.tokens.get(token)?.value().clone();
        self.users.get(&id).map(|r| r.user.clone())
    }

    pub fn update_user(
        &self,
        id: &str,
        name: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
        phone: Option<&str>,
    ) -> Result<User, ServiceError> {
        let mut record = self
            .users
            .get_mut(id)
            .ok_or_else(|| ServiceError::NotFound(format!("user {id} not found")))?;

        if let Some(new_email) = email.map(normalize_email) {
            if new_email != record.user.email {
                match self.emails.entry(new_email.clone()) {
                    dashmap::mapref::entry::Entry::Occupied(_) => {
                        return Err(ServiceError::Conflict(format!(
                            "email {new_email} is already registered"
                        )))
                    }
                    dashmap::mapref::entry::Entry::Vacant(slot) => {
                        slot.insert(id.to_string());
                    }
                }
                self.emails.remove(&record.user.email);
                record.user.email = new_email;
            }
        }
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            record.user.name = name.to_string();
        }
        if let Some(phone) = phone {
            record.user.phone = Some(phone.trim().to_string()).filter(|p| !p.is_empty());
        }
        if let Some(password) = password {
            record.password_hash = hash_password(id, password);
        }
        Ok(record.user.clone())
    }

    pub fn insert_order(&self, order: OrderDto) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn order(&self, id: &str) -> Option<OrderDto> {
        self.orders.get(id).map(|o| o.clone())
    }

    /// Newest first, optionally filtered by status.
    pub fn orders(&self, status: Option<OrderStatus>) -> Vec<OrderDto> {
        let mut orders: Vec<OrderDto> = self
            .orders
            .iter()
            .filter(|o| status.map_or(true, |s| o.status == s.as_str()))
            .map(|o| o.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    pub fn orders_of(&self, user_id: &str) -> Vec<OrderDto> {
        let mut orders: Vec<OrderDto> = self
            .orders
            .iter()
            .filter(|o| o.user.id.as_deref() == Some(user_id))
            .map(|o| o.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    /// Runs `f` with the order locked; nothing is written if `f` fails.
    pub fn update_order<F>(&self, id: &str, f: F) -> Result<OrderDto, ServiceError>
    where
        F: FnOnce(&mut OrderDto) -> Result<(), ServiceError>,
    {
        let mut entry = self
            .orders
            .get_mut(id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
        let mut draft = entry.clone();
        f(&mut draft)?;
        *entry = draft.clone();
        Ok(draft)
    }
}

/// A new order owned by `owner`, priced from its lines.
pub fn new_order(
    id: &str,
    owner: &User,
    lines: &[(&str, &str, Decimal, u32)],
    shipping_price: Decimal,
    payment_method: &str,
) -> OrderDto {
    let order_items: Vec<OrderItemDto> = lines
        .iter()
        .map(|(product, name, price, qty)| OrderItemDto {
            product: (*product).to_string(),
            name: (*name).to_string(),
            image: None,
            price: *price,
            qty: *qty,
        })
        .collect();
    let items_price: Decimal = order_items
        .iter()
        .map(|i| i.price * Decimal::from(i.qty))
        .sum();

    OrderDto {
        id: id.to_string(),
        status: OrderStatus::Pending.as_str().to_string(),
        is_paid: false,
        paid_at: None,
        order_items,
        user: OrderUserDto {
            id: Some(owner.id.clone()),
            name: Some(owner.name.clone()),
            email: owner.email.clone(),
        },
        shipping_address: ShippingAddressDto {
            full_name: Some(owner.name.clone()),
            address: "12 Lê Lợi".to_string(),
            city: "Huế".to_string(),
            postal_code: None,
            country: Some("Việt Nam".to_string()),
            phone: owner.phone.clone(),
        },
        items_price,
        shipping_price,
        tax_price: Decimal::ZERO,
        total_price: items_price + shipping_price,
        payment_method: payment_method.to_string(),
        note: None,
        refund_info: None,
        created_at: Some(chrono::Utc::now()),
    }
}

pub(crate) fn transaction_id() -> String {
    short_id("RF")
}

pub(crate) fn voucher_id() -> String {
    short_id("PN")
}
