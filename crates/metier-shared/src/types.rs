use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{METADATA_DISPLAY_NAME, METADATA_PHONE, METADATA_ROLE};

// Subject identity = the identity provider's user id (UUID)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SubjectId(pub Uuid);

impl SubjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two user populations of the marketplace.
///
/// When a session carries no role in its signup metadata, the bootstrap
/// defaults to [`Role::Provider`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Consumer,
    Provider,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Consumer => "consumer",
            Role::Provider => "provider",
        }
    }

}

impl Default for Role {
    fn default() -> Self {
        Role::Provider
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consumer" => Ok(Role::Consumer),
            "provider" => Ok(Role::Provider),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

/// An authenticated identity issued by the external identity provider.
///
/// The application only reads sessions; it never mutates one. The metadata
/// map carries whatever the signup form supplied (intended role, display
/// name, contact fields) and is the source of defaults when a profile has
/// to be created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token, passed through to collaborators as-is.
    pub access_token: String,
    pub subject: SubjectId,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Session {
    /// String-valued metadata lookup; non-string values read as absent.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// The role chosen at signup, defaulting to [`Role::Provider`] when the
    /// metadata carries none (or carries garbage).
    pub fn intended_role(&self) -> Role {
        self.metadata_str(METADATA_ROLE)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Display name from signup metadata, empty string when absent.
    pub fn display_name(&self) -> String {
        self.metadata_str(METADATA_DISPLAY_NAME)
            .unwrap_or_default()
            .to_string()
    }

    /// Contact phone from signup metadata, empty string when absent.
    pub fn phone(&self) -> String {
        self.metadata_str(METADATA_PHONE)
            .unwrap_or_default()
            .to_string()
    }
}

/// Minimal identity-provider user record (see `IdentityProvider::user`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: SubjectId,
    pub email: String,
}

/// Application-owned record for one authenticated subject.
///
/// Invariant: at most one profile per subject id. The data service enforces
/// a unique key on `id`; the application treats a unique violation on insert
/// as "already exists" and re-reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: SubjectId,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub phone: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Provider role-extension record, keyed 1:1 with `Profile.id`.
///
/// Created lazily the first time a provider-role profile is bootstrapped,
/// from session metadata with empty/zero fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub profile_id: SubjectId,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub hourly_rate: u32,
    #[serde(default)]
    pub availability: String,
}

impl ProviderProfile {
    /// Empty extension record for a freshly bootstrapped provider.
    pub fn defaults_for(profile_id: SubjectId) -> Self {
        Self {
            profile_id,
            skills: Vec::new(),
            hourly_rate: 0,
            availability: String::new(),
        }
    }
}

/// An unordered (consumer, provider) pair owning an ordered message sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub consumer_id: SubjectId,
    pub provider_id: SubjectId,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, subject: SubjectId) -> bool {
        self.consumer_id == subject || self.provider_id == subject
    }
}

/// A single message inside a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: SubjectId,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A message is unread by `subject` iff someone else sent it and the
    /// read flag is still down. Participation in the conversation is the
    /// caller's concern.
    pub fn unread_by(&self, subject: SubjectId) -> bool {
        self.sender_id != subject && !self.read
    }
}
