//! Declarative access requirements and their evaluator.
//!
//! A requirement is a disjunction of alternatives; each alternative is a
//! conjunction of conditions ("caller holds role R", "caller holds
//! capability C on the target object"). Evaluation is pure: it sees only
//! the explicit caller context and the target reference, never ambient
//! session state, so the same inputs always produce the same decision.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::{CollabError, CollabResult};

/// Pseudo-role held by every non-anonymous caller context.
pub const ROLE_AUTHENTICATED: &str = "authenticated";

/// A single condition inside an access-requirement alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Caller holds the named role.
    Role(&'static str),
    /// Caller holds the named capability on the target object.
    Capability(&'static str),
}

/// Declared access requirement: OR across alternatives, AND within one.
#[derive(Debug, Clone, Copy)]
pub struct Requirement {
    alternatives: &'static [&'static [Condition]],
}

impl Requirement {
    /// No explicit requirement; every caller passes.
    pub const OPEN: Requirement = Requirement { alternatives: &[] };

    pub const fn any(alternatives: &'static [&'static [Condition]]) -> Self {
        Requirement { alternatives }
    }

    /// Pure allow/deny decision for `caller` against `target`.
    ///
    /// Capability conditions can only be satisfied when a target is
    /// present; role conditions are target-independent.
    pub fn evaluate(&self, caller: &dyn Caller, target: Option<&TargetRef>) -> bool {
        if self.alternatives.is_empty() {
            return true;
        }
        self.alternatives.iter().any(|alternative| {
            alternative.iter().all(|condition| match condition {
                Condition::Role(role) => caller.has_role(role),
                Condition::Capability(capability) => {
                    target.is_some_and(|t| caller.has_capability(capability, t))
                }
            })
        })
    }

    /// Evaluate, turning a denial into [`CollabError::AccessDenied`].
    pub fn check(
        &self,
        caller: &dyn Caller,
        target: Option<&TargetRef>,
        operation: &str,
    ) -> CollabResult<()> {
        if self.evaluate(caller, target) {
            Ok(())
        } else {
            Err(CollabError::access_denied(format!(
                "{operation} is not permitted for this caller"
            )))
        }
    }
}

/// Reference to the object an operation targets, used to resolve
/// capability conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetRef {
    pub entity: &'static str,
    pub id: Uuid,
}

impl TargetRef {
    pub fn new(entity: &'static str, id: Uuid) -> Self {
        TargetRef { entity, id }
    }
}

/// Explicit caller context passed into every gated operation.
pub trait Caller: Send + Sync {
    fn has_role(&self, role: &str) -> bool;

    fn has_capability(&self, capability: &str, target: &TargetRef) -> bool;

    /// Person identity behind this context, if any. Used for row-level
    /// visibility rules.
    fn person_id(&self) -> Option<Uuid> {
        None
    }
}

/// Caller context with pre-resolved roles and capability grants.
#[derive(Debug, Clone, Default)]
pub struct StaticCaller {
    roles: HashSet<String>,
    grants: HashMap<TargetRef, HashSet<String>>,
    person: Option<Uuid>,
}

impl StaticCaller {
    /// Context with no roles at all, not even [`ROLE_AUTHENTICATED`].
    pub fn anonymous() -> Self {
        StaticCaller::default()
    }

    /// Authenticated context holding the given roles.
    pub fn with_roles<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        let mut all: HashSet<String> = roles.into_iter().map(Into::into).collect();
        all.insert(ROLE_AUTHENTICATED.to_string());
        StaticCaller {
            roles: all,
            grants: HashMap::new(),
            person: None,
        }
    }

    /// Authenticated context for a known person.
    pub fn for_person<I, R>(person_id: Uuid, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        let mut caller = StaticCaller::with_roles(roles);
        caller.person = Some(person_id);
        caller
    }

    /// Grant a capability on one target object.
    pub fn grant(mut self, capability: impl Into<String>, target: TargetRef) -> Self {
        self.grants
            .entry(target)
            .or_default()
            .insert(capability.into());
        self
    }
}

impl Caller for StaticCaller {
    fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    fn has_capability(&self, capability: &str, target: &TargetRef) -> bool {
        self.grants
            .get(target)
            .is_some_and(|capabilities| capabilities.contains(capability))
    }

    fn person_id(&self) -> Option<Uuid> {
        self.person
    }
}
