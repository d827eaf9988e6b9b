//! Collabra models — access-gated organizational entities and their
//! relationship operations.
//!
//! This crate provides:
//! - The typed entity models ([`Organization`], [`Person`], [`Role`])
//!   layered over any store implementing the core contracts
//! - The tree and membership relationship operations, the only
//!   sanctioned mutation surface for `parentId` and association rows
//! - Session-context resolution ([`context::resolve_caller`])
//!
//! Every multi-row mutation runs inside one transaction and is rolled
//! back whole on the first failure.

mod account;
mod membership;
mod model;

pub mod context;
pub mod organization;
pub mod person;
pub mod role;

pub use organization::Organization;
pub use person::{GENDER_FEMALE, GENDER_MALE, Person};
pub use role::{CAP_CAN_EDIT, ROLE_ORG_CREATOR, ROLE_PERSON_CREATOR, ROLE_SYSTEM_ADMIN, Role};
