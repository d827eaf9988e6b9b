//! Session-context resolution helpers.
//!
//! The access evaluator only ever sees an explicit [`Caller`] value.
//! This module builds one from stored state: role assignments become
//! roles, and membership in an organization grants the `canEdit`
//! capability on it.

use collabra_core::access::{Caller, StaticCaller, TargetRef};
use collabra_core::error::CollabResult;
use collabra_core::store::Backend;
use collabra_core::txn::in_transaction;
use uuid::Uuid;

use crate::membership;
use crate::organization::ORGANIZATION;
use crate::role::{self, CAP_CAN_EDIT};

/// Resolve a caller context for a person, reading role assignments and
/// memberships in one read-only transaction.
pub async fn resolve_caller<S: Backend>(store: &S, person_id: Uuid) -> CollabResult<StaticCaller> {
    in_transaction(store, true, async {
        let roles = role::role_names_for(store, person_id).await?;
        let mut caller = StaticCaller::for_person(person_id, roles);
        for organization_id in membership::organization_ids_for(store, person_id).await? {
            caller = caller.grant(
                CAP_CAN_EDIT,
                TargetRef::new(ORGANIZATION.entity, organization_id),
            );
        }
        Ok(caller)
    })
    .await
}

/// Convenience check mirroring the capability grants produced by
/// [`resolve_caller`].
pub fn can_edit_organization(caller: &dyn Caller, organization_id: Uuid) -> bool {
    caller.has_capability(CAP_CAN_EDIT, &TargetRef::new(ORGANIZATION.entity, organization_id))
}
