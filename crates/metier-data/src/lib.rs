//! # metier-data
//!
//! Collaborator contracts consumed by the Métier core: the queryable
//! [`DataService`] (rows, filters, change feed) and the [`IdentityProvider`]
//! (sessions, code exchange, auth events).
//!
//! Both are consumed through trait objects so the concrete backend is an
//! explicitly constructed, passed-down handle rather than an ambient global.
//! The crate ships an in-memory implementation of each ([`MemoryDataService`],
//! [`MemoryIdentityProvider`]) used for local development and as the test
//! double for every crate above this one.

pub mod error;
pub mod filter;
pub mod identity;
pub mod memory;
pub mod service;

pub use error::{DataError, Result};
pub use filter::Filter;
pub use identity::{AuthEvent, IdentityError, IdentityProvider};
pub use memory::{MemoryDataService, MemoryIdentityProvider};
pub use service::{ChangeEvent, ChangeKind, DataService, EventMask, Subscription};
