//! Entity and attribute descriptors — the declarative gating tables.
//!
//! Every model declares, as plain data, which attributes exist, whether
//! each one can be read or written through the generic accessors, and
//! which access requirement gates each lifecycle operation. The model
//! layer evaluates these tables; nothing is derived from reflection.

use crate::access::Requirement;

/// Per-attribute declaration.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSpec {
    pub name: &'static str,
    /// Readable through the generic getters.
    pub readable: bool,
    /// Writable through the generic setters.
    pub writable: bool,
    /// Must be present (and non-null) at creation.
    pub required: bool,
    /// Mutable only through a dedicated relationship operation; the
    /// generic setters reject it loudly.
    pub protected: bool,
    pub read_requirement: Requirement,
    pub write_requirement: Requirement,
}

impl AttributeSpec {
    /// Baseline: readable, writable, optional, open requirements.
    pub const fn new(name: &'static str) -> Self {
        AttributeSpec {
            name,
            readable: true,
            writable: true,
            required: false,
            protected: false,
            read_requirement: Requirement::OPEN,
            write_requirement: Requirement::OPEN,
        }
    }

    pub const fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self.writable = false;
        self
    }

    pub const fn write_requires(mut self, requirement: Requirement) -> Self {
        self.write_requirement = requirement;
        self
    }

    pub const fn read_requires(mut self, requirement: Requirement) -> Self {
        self.read_requirement = requirement;
        self
    }
}

/// Per-entity declaration: attribute table plus the requirement gating
/// each lifecycle operation.
#[derive(Debug, Clone, Copy)]
pub struct EntityDescriptor {
    /// Entity name used in errors and target references.
    pub entity: &'static str,
    /// Store table backing this entity.
    pub table: &'static str,
    pub attributes: &'static [AttributeSpec],
    pub create: Requirement,
    pub find: Requirement,
    pub construct: Requirement,
    pub update: Requirement,
    pub delete: Requirement,
}

impl EntityDescriptor {
    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|spec| spec.name == name)
    }
}
