//! Role gate for role-restricted views.
//!
//! Callers await [`RoleGuard::check`] before rendering anything protected:
//! the pending future is the `CHECKING` state (render a blocking placeholder),
//! and children may only render on [`GuardDecision::Authorized`]. Every other
//! outcome is a hard navigation target, so protected content never flashes.

use std::sync::Arc;

use tracing::{info, warn};

use metier_data::{DataService, IdentityProvider};
use metier_shared::routes::{dashboard_path, LOGIN_PATH};
use metier_shared::{Profile, Role};

use crate::error::ClientError;
use crate::profiles::ProfileStore;

/// Terminal guard decision.
#[derive(Debug, Clone)]
pub enum GuardDecision {
    /// Render children; the profile is handed over for their use.
    Authorized(Profile),
    /// Hard navigation (full redirect, not an in-place render).
    Redirect(String),
}

/// Gates one role-restricted view.
pub struct RoleGuard {
    identity: Arc<dyn IdentityProvider>,
    profiles: ProfileStore,
    required: Role,
}

impl RoleGuard {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        data: Arc<dyn DataService>,
        required: Role,
    ) -> Self {
        Self {
            identity,
            profiles: ProfileStore::new(data),
            required,
        }
    }

    /// Error-typed authorization: the session's profile, if its role matches.
    pub async fn authorize(&self) -> Result<Profile, ClientError> {
        let session = self
            .identity
            .session()
            .await
            .map_err(ClientError::from)?
            .ok_or_else(|| ClientError::SessionLookup("no active session".to_string()))?;

        let profile = self
            .profiles
            .fetch(session.subject)
            .await?
            .ok_or_else(|| {
                ClientError::ProfileLookup(format!("no profile for subject {}", session.subject))
            })?;

        if profile.role == self.required {
            Ok(profile)
        } else {
            Err(ClientError::AuthorizationDenied {
                required: self.required,
                found: profile.role,
            })
        }
    }

    /// Resolve the guard to a terminal decision. A role mismatch navigates
    /// to the subject's own landing area; everything else falls back to
    /// login.
    pub async fn check(&self) -> GuardDecision {
        match self.authorize().await {
            Ok(profile) => GuardDecision::Authorized(profile),
            Err(ClientError::AuthorizationDenied { required, found }) => {
                info!(%required, %found, "role mismatch, redirecting to own dashboard");
                GuardDecision::Redirect(dashboard_path(found).to_string())
            }
            Err(e) => {
                warn!(error = %e, "guard fell back to login");
                GuardDecision::Redirect(LOGIN_PATH.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use metier_data::{MemoryDataService, MemoryIdentityProvider};
    use metier_shared::constants::RESOURCE_PROFILES;
    use metier_shared::{Session, SubjectId};
    use std::collections::HashMap;

    fn session(subject: SubjectId) -> Session {
        Session {
            access_token: "tok".to_string(),
            subject,
            email: "user@example.com".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            metadata: HashMap::new(),
        }
    }

    async fn seed_profile(data: &MemoryDataService, subject: SubjectId, role: Role) {
        let profile = Profile {
            id: subject,
            email: "user@example.com".to_string(),
            display_name: String::new(),
            phone: String::new(),
            role,
            created_at: Utc::now(),
        };
        data.seed(
            RESOURCE_PROFILES,
            vec![serde_json::to_value(profile).unwrap()],
        )
        .await;
    }

    #[tokio::test]
    async fn role_mismatch_redirects_and_never_authorizes() {
        let data = Arc::new(MemoryDataService::new());
        let subject = SubjectId::new();
        seed_profile(&data, subject, Role::Consumer).await;
        let identity = Arc::new(MemoryIdentityProvider::with_session(session(subject)));

        let guard = RoleGuard::new(identity, data, Role::Provider);
        match guard.check().await {
            GuardDecision::Redirect(target) => assert_eq!(target, "/consumer/dashboard"),
            GuardDecision::Authorized(_) => panic!("consumer must not pass a provider guard"),
        }
        assert!(matches!(
            guard.authorize().await,
            Err(ClientError::AuthorizationDenied {
                required: Role::Provider,
                found: Role::Consumer,
            })
        ));
    }

    #[tokio::test]
    async fn matching_role_is_authorized() {
        let data = Arc::new(MemoryDataService::new());
        let subject = SubjectId::new();
        seed_profile(&data, subject, Role::Provider).await;
        let identity = Arc::new(MemoryIdentityProvider::with_session(session(subject)));

        let guard = RoleGuard::new(identity, data, Role::Provider);
        match guard.check().await {
            GuardDecision::Authorized(profile) => assert_eq!(profile.id, subject),
            GuardDecision::Redirect(target) => panic!("unexpected redirect to {target}"),
        }
    }

    #[tokio::test]
    async fn missing_session_or_profile_falls_back_to_login() {
        let data = Arc::new(MemoryDataService::new());

        let signed_out = Arc::new(MemoryIdentityProvider::anonymous());
        let guard = RoleGuard::new(signed_out, data.clone(), Role::Consumer);
        assert!(
            matches!(guard.check().await, GuardDecision::Redirect(t) if t == "/login")
        );

        let subject = SubjectId::new();
        let signed_in = Arc::new(MemoryIdentityProvider::with_session(session(subject)));
        let guard = RoleGuard::new(signed_in, data, Role::Consumer);
        assert!(
            matches!(guard.check().await, GuardDecision::Redirect(t) if t == "/login")
        );
    }
}
