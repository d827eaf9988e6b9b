//! Collabra core — shared contracts for the access-controlled entity
//! engine.
//!
//! This crate provides:
//! - The error taxonomy ([`CollabError`], [`CollabResult`])
//! - Attribute values and records ([`value::Value`], [`value::Record`])
//! - The entity-store and transaction contracts ([`store::EntityStore`],
//!   [`txn::TransactionCoordinator`])
//! - The declarative access-requirement language and its evaluator
//!   ([`access::Requirement`], [`access::Caller`])
//! - Entity/attribute descriptor tables ([`descriptor::EntityDescriptor`])
//!
//! Storage engines implement the store traits elsewhere; the model layer
//! is generic over them.

pub mod access;
pub mod descriptor;
pub mod error;
pub mod store;
pub mod txn;
pub mod value;

pub use error::{CollabError, CollabResult};
