//! Profile lookup and creation over the data service.
//!
//! [`ProfileStore::resolve_or_create`] is the single reconcile path shared by
//! both bootstrap entry points and (read-only) by the role guard, so the
//! session → profile logic cannot drift between them.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use metier_data::{DataError, DataService, Filter};
use metier_shared::constants::{RESOURCE_PROFILES, RESOURCE_PROVIDER_PROFILES};
use metier_shared::{Profile, ProviderProfile, Role, Session, SubjectId};

use crate::error::ClientError;

/// Typed profile access over the generic data service.
#[derive(Clone)]
pub struct ProfileStore {
    data: Arc<dyn DataService>,
}

impl ProfileStore {
    pub fn new(data: Arc<dyn DataService>) -> Self {
        Self { data }
    }

    /// Fetch the profile for a subject. `None` is the normal not-found
    /// outcome, never an error.
    pub async fn fetch(&self, subject: SubjectId) -> Result<Option<Profile>, ClientError> {
        let rows = self
            .data
            .read(
                RESOURCE_PROFILES,
                "*",
                &Filter::all().eq("id", subject.to_string()),
            )
            .await
            .map_err(|e| ClientError::ProfileLookup(e.to_string()))?;

        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| ClientError::ProfileLookup(e.to_string())),
            None => Ok(None),
        }
    }

    /// Create a profile from the session's signup metadata (display name,
    /// phone, role) with empty-string fallbacks and the provider default.
    ///
    /// The insert is attempted exactly once. A unique violation means a
    /// concurrent bootstrap won the race; the existing row is re-read and
    /// returned as-is.
    pub async fn create_from_session(&self, session: &Session) -> Result<Profile, ClientError> {
        let profile = Profile {
            id: session.subject,
            email: session.email.clone(),
            display_name: session.display_name(),
            phone: session.phone(),
            role: session.intended_role(),
            created_at: Utc::now(),
        };

        let record = serde_json::to_value(&profile)
            .map_err(|e| ClientError::ProfileCreate(e.to_string()))?;

        match self.data.insert(RESOURCE_PROFILES, record).await {
            Ok(()) => {
                info!(subject = %profile.id, role = %profile.role, "profile created");
                Ok(profile)
            }
            Err(DataError::UniqueViolation { .. }) => {
                warn!(subject = %profile.id, "profile insert collided, re-reading");
                self.fetch(profile.id).await?.ok_or_else(|| {
                    ClientError::ProfileCreate(
                        "insert collided but the existing row is unreadable".to_string(),
                    )
                })
            }
            Err(e) => Err(ClientError::ProfileCreate(e.to_string())),
        }
    }

    /// Lazily create the provider role-extension record. A no-op for
    /// consumer profiles and for providers that already have one.
    pub async fn ensure_provider_profile(&self, profile: &Profile) -> Result<(), ClientError> {
        if profile.role != Role::Provider {
            return Ok(());
        }

        let existing = self
            .data
            .read(
                RESOURCE_PROVIDER_PROFILES,
                "profile_id",
                &Filter::all().eq("profile_id", profile.id.to_string()),
            )
            .await
            .map_err(|e| ClientError::ProfileLookup(e.to_string()))?;
        if !existing.is_empty() {
            return Ok(());
        }

        let extension = ProviderProfile::defaults_for(profile.id);
        let record = serde_json::to_value(&extension)
            .map_err(|e| ClientError::ProfileCreate(e.to_string()))?;

        match self.data.insert(RESOURCE_PROVIDER_PROFILES, record).await {
            Ok(()) => {
                info!(subject = %profile.id, "provider profile created");
                Ok(())
            }
            // Another bootstrap created it in between; that is the goal state.
            Err(DataError::UniqueViolation { .. }) => Ok(()),
            Err(e) => Err(ClientError::ProfileCreate(e.to_string())),
        }
    }

    /// Reconcile a session with its profile: return the existing row or
    /// create one from session metadata. The boolean reports whether this
    /// pass created it. Provider profiles get their role extension either way.
    pub async fn resolve_or_create(
        &self,
        session: &Session,
    ) -> Result<(Profile, bool), ClientError> {
        if let Some(existing) = self.fetch(session.subject).await? {
            self.ensure_provider_profile(&existing).await?;
            return Ok((existing, false));
        }

        let created = self.create_from_session(session).await?;
        self.ensure_provider_profile(&created).await?;
        Ok((created, true))
    }
}
