//! Session and identity provider.
//!
//! One [`Session`] is built at startup and handed out as `Arc<Session>` to
//! everything that needs the signed-in user or its role.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    errors::ServiceError,
    models::{
        user::{LoginRequest, RegisterRequest, UpdateProfileRequest},
        AuthenticatedUser, Role, User,
    },
    services::auth::AuthApi,
};

pub struct Session {
    auth: Arc<dyn AuthApi>,
    state: RwLock<Option<AuthenticatedUser>>,
}

impl Session {
    pub fn new(auth: Arc<dyn AuthApi>) -> Self {
        Self {
            auth,
            state: RwLock::new(None),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<AuthenticatedUser>> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<AuthenticatedUser>> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn install(&self, authenticated: AuthenticatedUser) -> User {
        self.auth.set_token(Some(authenticated.token.clone())).await;
        let user = authenticated.user.clone();
        *self.write() = Some(authenticated);
        user
    }

    async fn clear(&self) {
        self.auth.set_token(None).await;
        *self.write() = None;
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        request.validate()?;

        let authenticated = self.auth.login(&request).await?;
        let user = self.install(authenticated).await;
        info!(user_id = %user.id, role = %user.role, "Signed in");
        Ok(user)
    }

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, ServiceError> {
        let request = RegisterRequest {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        request.validate()?;

        let authenticated = self.auth.register(&request).await?;
        let user = self.install(authenticated).await;
        info!(user_id = %user.id, "Registered and signed in");
        Ok(user)
    }

    /// Signs out. The backend call is best-effort; local state is always cleared.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if self.is_authenticated() {
            if let Err(e) = self.auth.logout().await {
                warn!(error = %e, "Backend logout failed; clearing local session anyway");
            }
        }
        self.clear().await;
        info!("Signed out");
    }

    /// Re-reads the profile; an expired token ends the session.
    #[instrument(skip(self))]
    pub async fn refresh_profile(&self) -> Result<User, ServiceError> {
        self.require_authenticated()?;

        match self.auth.get_profile().await {
            Ok(user) => {
                if let Some(current) = self.write().as_mut() {
                    current.user = user.clone();
                }
                Ok(user)
            }
            Err(ServiceError::Unauthorized(msg)) => {
                warn!("Session rejected by backend; signing out locally");
                self.clear().await;
                Err(ServiceError::Unauthorized(msg))
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, request))]
    pub async fn update_profile(&self, request: UpdateProfileRequest) -> Result<User, ServiceError> {
        self.require_authenticated()?;
        request.validate()?;

        let user = self.auth.update_profile(&request).await?;
        if let Some(current) = self.write().as_mut() {
            current.user = user.clone();
        }
        Ok(user)
    }

    /// Rehydrates a previously persisted session without a network call.
    pub async fn restore(&self, authenticated: AuthenticatedUser) {
        self.install(authenticated).await;
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    pub fn current_user(&self) -> Option<User> {
        self.read().as_ref().map(|a| a.user.clone())
    }

    /// Signed-in user together with the token, for persistence.
    pub fn snapshot(&self) -> Option<AuthenticatedUser> {
        self.read().clone()
    }

    pub fn role(&self) -> Option<Role> {
        self.read().as_ref().map(AuthenticatedUser::role)
    }

    pub fn is_admin(&self) -> bool {
        self.role().map(|r| r.is_admin()).unwrap_or(false)
    }

    fn require_authenticated(&self) -> Result<(), ServiceError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized(
                "no authenticated session".to_string(),
            ))
        }
    }
}
