//! The identity-provider contract.
//!
//! Sessions are owned by the provider; the application reads and exchanges
//! them but never mutates one. Auth lifecycle changes arrive on a broadcast
//! channel in the same command/notification style the rest of the workspace
//! uses for live feeds.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use metier_shared::{Session, User};

/// Errors produced by the identity provider.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// A confirmation-code exchange was rejected.
    #[error("Code exchange failed: {0}")]
    Exchange(String),

    /// The current session could not be resolved (transport, token refresh).
    #[error("Session lookup failed: {0}")]
    Session(String),
}

/// Auth lifecycle notifications.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

/// Contract of the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an email-confirmation code for a session.
    async fn exchange_code(&self, code: &str) -> Result<Session, IdentityError>;

    /// The current session, if any. `None` is a normal signed-out state.
    async fn session(&self) -> Result<Option<Session>, IdentityError>;

    /// The current user record, if signed in.
    async fn user(&self) -> Result<Option<User>, IdentityError>;

    /// Destroy the current session.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Subscribe to auth lifecycle events.
    fn on_auth_change(&self) -> broadcast::Receiver<AuthEvent>;
}
