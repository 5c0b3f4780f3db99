use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::{
    client::ApiClient,
    errors::ServiceError,
    models::{
        user::{AuthResponse, LoginRequest, RegisterRequest, UpdateProfileRequest},
        AuthenticatedUser, User,
    },
};

/// Account endpoints backing the session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthenticatedUser, ServiceError>;

    async fn register(&self, request: &RegisterRequest)
        -> Result<AuthenticatedUser, ServiceError>;

    async fn logout(&self) -> Result<(), ServiceError>;

    async fn get_profile(&self) -> Result<User, ServiceError>;

    async fn update_profile(&self, request: &UpdateProfileRequest) -> Result<User, ServiceError>;

    /// Installs (or clears) the bearer token used by later calls.
    async fn set_token(&self, token: Option<String>);
}

#[derive(Clone)]
pub struct HttpAuthApi {
    client: Arc<ApiClient>,
}

impl HttpAuthApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn login(&self, request: &LoginRequest) -> Result<AuthenticatedUser, ServiceError> {
        let response: AuthResponse = self
            .client
            .send_json(Method::POST, "/api/users/login", Some(request))
            .await?;
        Ok(response.into())
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn register(
        &self,
        request: &RegisterRequest,
    ) -> Result<AuthenticatedUser, ServiceError> {
        let response: AuthResponse = self
            .client
            .send_json(Method::POST, "/api/users/register", Some(request))
            .await?;
        Ok(response.into())
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> Result<(), ServiceError> {
        self.client
            .send_command::<()>(Method::POST, "/api/users/logout", None)
            .await
            .map_err(|e| {
                warn!(error = %e, "Backend logout failed");
                e
            })
    }

    #[instrument(skip(self))]
    async fn get_profile(&self) -> Result<User, ServiceError> {
        self.client.get_json("/api/users/profile", &[]).await
    }

    #[instrument(skip(self, request))]
    async fn update_profile(&self, request: &UpdateProfileRequest) -> Result<User, ServiceError> {
        self.client
            .send_json(Method::PUT, "/api/users/profile", Some(request))
            .await
    }

    async fn set_token(&self, token: Option<String>) {
        self.client.set_token(token).await;
    }
}
