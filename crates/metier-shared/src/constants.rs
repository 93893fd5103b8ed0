/// Application name
pub const APP_NAME: &str = "Métier";

/// Data-service resource holding one row per authenticated subject.
pub const RESOURCE_PROFILES: &str = "profiles";

/// Data-service resource holding the provider role-extension rows.
pub const RESOURCE_PROVIDER_PROFILES: &str = "provider_profiles";

/// Data-service resource holding consumer/provider conversation pairs.
pub const RESOURCE_CONVERSATIONS: &str = "conversations";

/// Data-service resource holding conversation messages.
pub const RESOURCE_MESSAGES: &str = "messages";

/// Session metadata key carrying the role chosen at signup.
pub const METADATA_ROLE: &str = "role";

/// Session metadata key carrying the display name entered at signup.
pub const METADATA_DISPLAY_NAME: &str = "display_name";

/// Session metadata key carrying the contact phone entered at signup.
pub const METADATA_PHONE: &str = "phone";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
