//! # metier-shared
//!
//! Domain types shared by every Métier crate: subject ids, roles, sessions,
//! profiles, conversations and messages, plus the route table and the
//! redirect codes that make up the externally observable contract.

pub mod constants;
pub mod routes;
pub mod types;

pub use types::*;
