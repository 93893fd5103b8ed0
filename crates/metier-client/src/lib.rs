//! # metier-client
//!
//! The stateful core of the Métier application:
//!
//! - [`query`]: generic keyed read-through cache with TTL and mount-aware
//!   cancellation; everything that reads data builds on it
//! - [`read_state`]: best-effort bulk read-flag mutation on messages
//! - [`unread`]: live unread count derived from the message change feed
//! - [`bootstrap`]: session → profile reconciliation and redirect decisions,
//!   with a server-redirect entry and a client-polling entry over the same
//!   reconcile path
//! - [`guard`]: role gate in front of role-restricted views
//!
//! Collaborators (`IdentityProvider`, `DataService`) are passed-down trait
//! objects, never ambient globals.

pub mod bootstrap;
pub mod cache;
pub mod guard;
pub mod profiles;
pub mod query;
pub mod read_state;
pub mod unread;

mod error;

pub use bootstrap::{confirm_redirect, BootstrapOutcome, BootstrapPhase, ClientBootstrap, Redirect};
pub use cache::{QueryCache, QUERY_TTL};
pub use error::ClientError;
pub use guard::{GuardDecision, RoleGuard};
pub use profiles::ProfileStore;
pub use query::{Query, QueryClient, QueryOptions, QuerySpec, QueryState};
pub use read_state::ReadStateMutator;
pub use unread::{UnreadCounter, UnreadPhase, UnreadSnapshot};
