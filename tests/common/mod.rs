#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use orderdesk::{
    client::ApiClient,
    mock_backend::{self, new_order, MockBackend},
    models::{OrderDto, OrderStatus, Role, User},
    order_detail::OrderDetailController,
    services::{auth::HttpAuthApi, orders::HttpOrderApi},
    session::Session,
};
use rust_decimal_macros::dec;
use tokio::net::TcpListener;
use url::Url;

pub const ADMIN_EMAIL: &str = "admin@shop.vn";
pub const ADMIN_PASSWORD: &str = "quantri123";
pub const CUSTOMER_EMAIL: &str = "khach@shop.vn";
pub const CUSTOMER_PASSWORD: &str = "khachhang";
pub const REFUND_METHOD: &str = "bank_transfer";

/// A reference backend bound to an ephemeral port, plus one admin and one customer.
pub struct TestApp {
    pub backend: MockBackend,
    pub base_url: Url,
    pub admin: User,
    pub customer: User,
    _server: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let backend = MockBackend::new();
        let admin = backend
            .create_user("Quản trị", ADMIN_EMAIL, ADMIN_PASSWORD, Role::Admin)
            .expect("seed admin");
        let customer = backend
            .create_user("Khách hàng", CUSTOMER_EMAIL, CUSTOMER_PASSWORD, Role::Customer)
            .expect("seed customer");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        let server_backend = backend.clone();
        let server = tokio::spawn(async move {
            let _ = mock_backend::serve(listener, server_backend).await;
        });

        Self {
            backend,
            base_url: Url::parse(&format!("http://{addr}/")).expect("base url"),
            admin,
            customer,
            _server: server,
        }
    }

    /// Inserts order `id` owned by the customer in `status` (total 750 000).
    pub fn seed_order(&self, id: &str, status: OrderStatus, paid: bool) -> OrderDto {
        let mut order = new_order(
            id,
            &self.customer,
            &[
                ("p-ao-thun", "Áo thun", dec!(150000), 2),
                ("p-quan-jean", "Quần jean", dec!(420000), 1),
            ],
            dec!(30000),
            "COD",
        );
        order.status = status.as_str().to_string();
        order.is_paid = paid;
        order.paid_at = paid.then(chrono::Utc::now);
        self.backend.insert_order(order.clone());
        order
    }

    pub fn client(&self) -> Arc<ApiClient> {
        Arc::new(ApiClient::new(self.base_url.clone(), Duration::from_secs(5)).expect("client"))
    }

    /// A fresh client stack with nobody signed in.
    pub fn anonymous(&self) -> Desk {
        let client = self.client();
        Desk {
            session: Arc::new(Session::new(Arc::new(HttpAuthApi::new(client.clone())))),
            orders: Arc::new(HttpOrderApi::new(client.clone())),
            client,
        }
    }

    pub async fn as_admin(&self) -> Desk {
        let desk = self.anonymous();
        desk.session
            .login(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .expect("admin login");
        desk
    }

    pub async fn as_customer(&self) -> Desk {
        let desk = self.anonymous();
        desk.session
            .login(CUSTOMER_EMAIL, CUSTOMER_PASSWORD)
            .await
            .expect("customer login");
        desk
    }

    pub fn stored_status(&self, id: &str) -> String {
        self.backend.order(id).expect("order exists").status
    }
}

pub struct Desk {
    pub client: Arc<ApiClient>,
    pub session: Arc<Session>,
    pub orders: Arc<HttpOrderApi>,
}

impl Desk {
    pub fn controller(&self) -> OrderDetailController {
        OrderDetailController::new(self.orders.clone(), self.session.clone(), REFUND_METHOD)
    }

    pub async fn open(&self, id: &str) -> OrderDetailController {
        let mut controller = self.controller();
        controller.load_order(id).await.expect("order loads");
        controller
    }
}
