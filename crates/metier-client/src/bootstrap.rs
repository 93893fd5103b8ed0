//! Session bootstrap: reconcile a fresh session with its profile and decide
//! where to send the user.
//!
//! Two entry points share one reconcile path
//! ([`ProfileStore::resolve_or_create`]):
//!
//! - [`confirm_redirect`] — the stateless server-redirect entry, one pass,
//!   no retries, every outcome a terminal redirect
//! - [`ClientBootstrap`] — the client-polling entry used when the user lands
//!   directly on the client, with observable phases and fixed display delays
//!   before each redirect

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use metier_data::{DataService, IdentityProvider};
use metier_shared::routes::{
    dashboard_path, CODE_CONFIRMATION_FAILED, CODE_PLEASE_CHECK_EMAIL,
    CODE_PROFILE_CREATION_FAILED, LANDING_PATH, LOGIN_PATH,
};
use metier_shared::Role;

use crate::error::ClientError;
use crate::profiles::ProfileStore;

/// How long the "please sign in" status stays visible before the client
/// entry redirects a session-less user to login.
pub const NO_SESSION_REDIRECT_DELAY: Duration = Duration::from_millis(2000);

/// How long the success status stays visible before the client entry
/// redirects to the computed target.
pub const PROCEED_REDIRECT_DELAY: Duration = Duration::from_millis(1000);

// ---------------------------------------------------------------------------
// Redirect targets
// ---------------------------------------------------------------------------

/// A terminal redirect decision. The location strings (paths and query
/// codes) are part of the externally observable contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: String,
}

impl Redirect {
    pub fn login_error(code: &str) -> Self {
        Self {
            location: format!("{LOGIN_PATH}?error={code}"),
        }
    }

    pub fn landing_error(code: &str) -> Self {
        Self {
            location: format!("{LANDING_PATH}?error={code}"),
        }
    }

    pub fn landing_info(code: &str) -> Self {
        Self {
            location: format!("{LANDING_PATH}?info={code}"),
        }
    }

    pub fn landing_login_success() -> Self {
        Self {
            location: format!("{LANDING_PATH}?login=success"),
        }
    }

    /// Role dashboard after a confirmed login; `welcome` marks a profile
    /// created on this pass.
    pub fn dashboard(role: Role, welcome: bool) -> Self {
        let path = dashboard_path(role);
        let location = if welcome {
            format!("{path}?welcome=true&confirmed=true")
        } else {
            format!("{path}?confirmed=true")
        };
        Self { location }
    }
}

// ---------------------------------------------------------------------------
// Server-redirect entry
// ---------------------------------------------------------------------------

/// One stateless pass over the confirmation flow. Never retries; every
/// branch terminates in a redirect.
pub async fn confirm_redirect(
    identity: &dyn IdentityProvider,
    data: Arc<dyn DataService>,
    code: Option<&str>,
) -> Redirect {
    let Some(code) = code else {
        return match identity.session().await {
            Ok(Some(_)) => Redirect::landing_login_success(),
            Ok(None) => Redirect::landing_info(CODE_PLEASE_CHECK_EMAIL),
            Err(e) => {
                warn!(error = %e, "session lookup failed during confirmation");
                Redirect::landing_info(CODE_PLEASE_CHECK_EMAIL)
            }
        };
    };

    let session = match identity.exchange_code(code).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "confirmation code exchange failed");
            return Redirect::login_error(CODE_CONFIRMATION_FAILED);
        }
    };

    match ProfileStore::new(data).resolve_or_create(&session).await {
        Ok((profile, created)) => {
            info!(
                subject = %profile.id,
                role = %profile.role,
                created,
                "confirmation bootstrap complete"
            );
            Redirect::dashboard(profile.role, created)
        }
        Err(e) => {
            error!(subject = %session.subject, error = %e, "profile reconciliation failed");
            Redirect::landing_error(CODE_PROFILE_CREATION_FAILED)
        }
    }
}

// ---------------------------------------------------------------------------
// Client-polling entry
// ---------------------------------------------------------------------------

/// Observable phase of the client-polling bootstrap, for status display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapPhase {
    Idle,
    CheckingSession,
    CheckingProfile,
    Redirecting { target: String },
    Failed { message: String },
}

/// Terminal outcome of one client bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Redirect(String),
    /// The raw failure message plus the manual recovery target the caller
    /// should offer ("return to login").
    Error {
        message: String,
        recovery: String,
    },
}

/// Client-side bootstrap used when the user lands directly on the client
/// without the server pass having run.
pub struct ClientBootstrap {
    identity: Arc<dyn IdentityProvider>,
    data: Arc<dyn DataService>,
    phase_tx: watch::Sender<BootstrapPhase>,
}

impl ClientBootstrap {
    pub fn new(identity: Arc<dyn IdentityProvider>, data: Arc<dyn DataService>) -> Self {
        let (phase_tx, _) = watch::channel(BootstrapPhase::Idle);
        Self {
            identity,
            data,
            phase_tx,
        }
    }

    /// Watch the machine's phase (status display while it waits).
    pub fn phase(&self) -> watch::Receiver<BootstrapPhase> {
        self.phase_tx.subscribe()
    }

    /// Run the machine to a terminal outcome. `redirect_param` is the
    /// explicit post-login target, overriding the role-based default.
    pub async fn run(&self, redirect_param: Option<&str>) -> BootstrapOutcome {
        self.set_phase(BootstrapPhase::CheckingSession);

        let session = match self.identity.session().await {
            Ok(session) => session,
            Err(e) => return self.fail(ClientError::from(e)),
        };

        let Some(session) = session else {
            // Show the status long enough to read, then send to login.
            self.set_phase(BootstrapPhase::Redirecting {
                target: LOGIN_PATH.to_string(),
            });
            tokio::time::sleep(NO_SESSION_REDIRECT_DELAY).await;
            return BootstrapOutcome::Redirect(LOGIN_PATH.to_string());
        };

        self.set_phase(BootstrapPhase::CheckingProfile);
        let profiles = ProfileStore::new(self.data.clone());
        let profile = match profiles.resolve_or_create(&session).await {
            Ok((profile, _)) => profile,
            Err(e) => return self.fail(e),
        };

        let target = redirect_param
            .map(str::to_string)
            .unwrap_or_else(|| dashboard_path(profile.role).to_string());

        self.set_phase(BootstrapPhase::Redirecting {
            target: target.clone(),
        });
        tokio::time::sleep(PROCEED_REDIRECT_DELAY).await;
        BootstrapOutcome::Redirect(target)
    }

    fn set_phase(&self, phase: BootstrapPhase) {
        self.phase_tx.send_replace(phase);
    }

    fn fail(&self, err: ClientError) -> BootstrapOutcome {
        let message = err.to_string();
        error!(error = %message, "client bootstrap failed");
        self.set_phase(BootstrapPhase::Failed {
            message: message.clone(),
        });
        BootstrapOutcome::Error {
            message,
            recovery: LOGIN_PATH.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use metier_data::{Filter, MemoryDataService, MemoryIdentityProvider};
    use metier_shared::constants::{RESOURCE_PROFILES, RESOURCE_PROVIDER_PROFILES};
    use metier_shared::{Profile, Session, SubjectId};
    use std::collections::HashMap;

    fn session(subject: SubjectId, entries: &[(&str, &str)]) -> Session {
        Session {
            access_token: "tok".to_string(),
            subject,
            email: "user@example.com".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            metadata: entries
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn data_service() -> Arc<MemoryDataService> {
        Arc::new(
            MemoryDataService::new()
                .with_unique_key(RESOURCE_PROFILES, "id")
                .with_unique_key(RESOURCE_PROVIDER_PROFILES, "profile_id"),
        )
    }

    async fn seed_profile(data: &MemoryDataService, subject: SubjectId, role: Role) {
        let profile = Profile {
            id: subject,
            email: "user@example.com".to_string(),
            display_name: "Ana".to_string(),
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
    async fn new_user_gets_one_profile_and_welcome_redirect() {
        let data = data_service();
        let identity = MemoryIdentityProvider::anonymous();
        let subject = SubjectId::new();
        identity.register_code("code-1", session(subject, &[])).await;

        let redirect = confirm_redirect(&identity, data.clone(), Some("code-1")).await;
        assert_eq!(
            redirect.location,
            "/provider/dashboard?welcome=true&confirmed=true"
        );

        let rows = data
            .count(RESOURCE_PROFILES, &Filter::all().eq("id", subject.to_string()))
            .await
            .unwrap();
        assert_eq!(rows, 1, "exactly one profile row created");
    }

    #[tokio::test]
    async fn existing_consumer_redirects_without_insert() {
        let data = data_service();
        let identity = MemoryIdentityProvider::anonymous();
        let subject = SubjectId::new();
        seed_profile(&data, subject, Role::Consumer).await;
        identity
            .register_code("code-1", session(subject, &[("role", "provider")]))
            .await;

        let redirect = confirm_redirect(&identity, data.clone(), Some("code-1")).await;
        assert_eq!(redirect.location, "/consumer/dashboard?confirmed=true");

        let rows = data.count(RESOURCE_PROFILES, &Filter::all()).await.unwrap();
        assert_eq!(rows, 1, "no second profile row");
    }

    #[tokio::test]
    async fn failed_exchange_redirects_before_any_profile_io() {
        let data = data_service();
        let identity = MemoryIdentityProvider::anonymous();

        let redirect = confirm_redirect(&identity, data.clone(), Some("bogus")).await;
        assert_eq!(redirect.location, "/login?error=confirmation_failed");
        assert_eq!(data.reads(), 0, "no profile read attempted");
        assert_eq!(data.count(RESOURCE_PROFILES, &Filter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn no_code_branches_on_existing_session() {
        let data = data_service();

        let signed_in =
            MemoryIdentityProvider::with_session(session(SubjectId::new(), &[]));
        let redirect = confirm_redirect(&signed_in, data.clone(), None).await;
        assert_eq!(redirect.location, "/?login=success");

        let signed_out = MemoryIdentityProvider::anonymous();
        let redirect = confirm_redirect(&signed_out, data, None).await;
        assert_eq!(redirect.location, "/?info=please_check_email");
    }

    #[tokio::test]
    async fn profile_creation_failure_lands_with_error_code() {
        let data = data_service();
        let identity = MemoryIdentityProvider::anonymous();
        let subject = SubjectId::new();
        identity.register_code("code-1", session(subject, &[])).await;
        data.set_read_failure(true); // profile lookup will fail

        let redirect = confirm_redirect(&identity, data, Some("code-1")).await;
        assert_eq!(redirect.location, "/?error=profile_creation_failed");
    }

    #[tokio::test(start_paused = true)]
    async fn client_entry_sends_sessionless_user_to_login_after_delay() {
        let data = data_service();
        let identity = Arc::new(MemoryIdentityProvider::anonymous());
        let bootstrap = ClientBootstrap::new(identity, data);
        let phases = bootstrap.phase();

        let outcome = bootstrap.run(None).await;
        assert_eq!(outcome, BootstrapOutcome::Redirect("/login".to_string()));
        assert_eq!(
            *phases.borrow(),
            BootstrapPhase::Redirecting {
                target: "/login".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn client_entry_creates_missing_profile_and_redirects_by_role() {
        let data = data_service();
        let subject = SubjectId::new();
        let identity = Arc::new(MemoryIdentityProvider::with_session(session(
            subject,
            &[],
        )));
        let bootstrap = ClientBootstrap::new(identity, data.clone());

        let outcome = bootstrap.run(None).await;
        assert_eq!(
            outcome,
            BootstrapOutcome::Redirect("/provider/dashboard".to_string())
        );
        assert_eq!(
            data.count(RESOURCE_PROFILES, &Filter::all()).await.unwrap(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn client_entry_honors_explicit_redirect_param() {
        let data = data_service();
        let identity = Arc::new(MemoryIdentityProvider::with_session(session(
            SubjectId::new(),
            &[("role", "consumer")],
        )));
        let bootstrap = ClientBootstrap::new(identity, data);

        let outcome = bootstrap.run(Some("/conversations/42")).await;
        assert_eq!(
            outcome,
            BootstrapOutcome::Redirect("/conversations/42".to_string())
        );
    }

    #[tokio::test]
    async fn client_entry_surfaces_lookup_failures() {
        let data = data_service();
        data.set_read_failure(true);
        let identity = Arc::new(MemoryIdentityProvider::with_session(session(
            SubjectId::new(),
            &[],
        )));
        let bootstrap = ClientBootstrap::new(identity, data);

        match bootstrap.run(None).await {
            BootstrapOutcome::Error { message, recovery } => {
                assert!(message.contains("Profile lookup failed"));
                assert_eq!(recovery, "/login");
            }
            other => panic!("expected error outcome, got {other:?}"),
        }
        assert!(matches!(
            *bootstrap.phase().borrow(),
            BootstrapPhase::Failed { .. }
        ));
    }
}
