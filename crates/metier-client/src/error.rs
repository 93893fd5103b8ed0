use thiserror::Error;

use metier_data::{DataError, IdentityError};
use metier_shared::Role;

/// Errors produced by the client core.
///
/// A missing profile row is not an error; lookups return `Option`. Bootstrap
/// and guard flows convert each of these into a terminal redirect or a
/// visible error state; nothing is retried automatically.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The confirmation-code exchange was rejected by the identity provider.
    #[error("Identity exchange failed: {0}")]
    IdentityExchange(String),

    /// The current session could not be resolved.
    #[error("Session lookup failed: {0}")]
    SessionLookup(String),

    /// A profile read failed (distinct from "no matching row").
    #[error("Profile lookup failed: {0}")]
    ProfileLookup(String),

    /// A profile insert failed.
    #[error("Profile creation failed: {0}")]
    ProfileCreate(String),

    /// The subject's role does not satisfy a guard.
    #[error("Authorization denied: required {required}, found {found}")]
    AuthorizationDenied { required: Role, found: Role },

    /// Generic data-service failure (read/write/count/subscribe).
    #[error(transparent)]
    Data(#[from] DataError),
}

impl From<IdentityError> for ClientError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Exchange(msg) => ClientError::IdentityExchange(msg),
            IdentityError::Session(msg) => ClientError::SessionLookup(msg),
        }
    }
}
