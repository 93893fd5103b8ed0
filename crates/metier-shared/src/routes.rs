//! Route table and redirect query codes.
//!
//! The paths and codes here are part of the externally observable contract:
//! the bootstrap state machine and the role guard compose their redirect
//! targets exclusively from these constants.

use crate::types::Role;

/// Public landing page.
pub const LANDING_PATH: &str = "/";

/// Login page, also the recovery target for every terminal error state.
pub const LOGIN_PATH: &str = "/login";

/// Consumer dashboard.
pub const CONSUMER_DASHBOARD_PATH: &str = "/consumer/dashboard";

/// Provider dashboard.
pub const PROVIDER_DASHBOARD_PATH: &str = "/provider/dashboard";

/// Emitted when the confirmation-code exchange fails.
pub const CODE_CONFIRMATION_FAILED: &str = "confirmation_failed";

/// Emitted when the profile insert fails during bootstrap.
pub const CODE_PROFILE_CREATION_FAILED: &str = "profile_creation_failed";

/// Emitted when the user arrives without a code or session.
pub const CODE_PLEASE_CHECK_EMAIL: &str = "please_check_email";

/// Dashboard landing area for a role.
pub fn dashboard_path(role: Role) -> &'static str {
    match role {
        Role::Consumer => CONSUMER_DASHBOARD_PATH,
        Role::Provider => PROVIDER_DASHBOARD_PATH,
    }
}
