//! Role entity, person–role assignment rows, and the access vocabulary.
//!
//! Roles are broad caller-held labels; assignment data feeds session
//! construction (see [`crate::context`]), while the evaluator itself
//! only ever sees the explicit caller context.

use std::fmt;
use std::sync::Arc;

use collabra_core::access::{Caller, Condition, ROLE_AUTHENTICATED, Requirement};
use collabra_core::descriptor::{AttributeSpec, EntityDescriptor};
use collabra_core::error::{CollabError, CollabResult};
use collabra_core::store::{Backend, EntityStore, Filter, Row};
use collabra_core::txn::in_transaction;
use collabra_core::value::{Value, record};
use uuid::Uuid;

use crate::model::{self, ModelCore};

pub const ROLE_SYSTEM_ADMIN: &str = "systemAdmin";
pub const ROLE_ORG_CREATOR: &str = "orgCreator";
pub const ROLE_PERSON_CREATOR: &str = "personCreator";

/// Capability resolved against a specific target object.
pub const CAP_CAN_EDIT: &str = "canEdit";

pub(crate) const AUTHENTICATED: Requirement =
    Requirement::any(&[&[Condition::Role(ROLE_AUTHENTICATED)]]);

pub(crate) const ADMIN_ONLY: Requirement =
    Requirement::any(&[&[Condition::Role(ROLE_SYSTEM_ADMIN)]]);

pub(crate) const ADMIN_OR_CAN_EDIT: Requirement = Requirement::any(&[
    &[Condition::Role(ROLE_SYSTEM_ADMIN)],
    &[Condition::Capability(CAP_CAN_EDIT)],
]);

static ROLE: EntityDescriptor = EntityDescriptor {
    entity: "role",
    table: "role",
    attributes: &[
        AttributeSpec::new("id").read_only(),
        AttributeSpec::new("name").required(),
    ],
    create: ADMIN_ONLY,
    find: AUTHENTICATED,
    construct: AUTHENTICATED,
    update: ADMIN_ONLY,
    delete: ADMIN_ONLY,
};

/// A named role record.
pub struct Role<S> {
    core: ModelCore<S>,
}

impl<S> Clone for Role<S> {
    fn clone(&self) -> Self {
        Role {
            core: self.core.clone(),
        }
    }
}

impl<S> fmt::Debug for Role<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Role").field(&self.core).finish()
    }
}

impl<S: Backend> Role<S> {
    pub async fn create(store: Arc<S>, caller: &dyn Caller, name: &str) -> CollabResult<Self> {
        ROLE.create.check(caller, None, "role create")?;
        let core = in_transaction(store.as_ref(), false, async {
            let existing = store
                .find_by(ROLE.table, &Filter::new().eq("name", name), &[], None, None)
                .await?;
            if !existing.is_empty() {
                return Err(CollabError::bad_input(format!("role {name} already exists")));
            }
            model::insert_entity(&store, &ROLE, record([("name", name.into())])).await
        })
        .await?;
        Ok(Role { core })
    }

    pub async fn construct(store: Arc<S>, caller: &dyn Caller, id: Uuid) -> CollabResult<Self> {
        let core = model::load_entity(&store, &ROLE, caller, id).await?;
        Ok(Role { core })
    }

    pub async fn construct_by_name(
        store: Arc<S>,
        caller: &dyn Caller,
        name: &str,
    ) -> CollabResult<Self> {
        ROLE.construct.check(caller, None, "role construct")?;
        let rows = store
            .find_by(ROLE.table, &Filter::new().eq("name", name), &[], None, None)
            .await?;
        let row = rows.into_iter().next().ok_or_else(|| CollabError::NotFound {
            entity: "role".to_string(),
            id: name.to_string(),
        })?;
        Ok(Role {
            core: model::core_from_row(&store, &ROLE, row),
        })
    }

    pub(crate) async fn find_by_ids(
        store: Arc<S>,
        caller: &dyn Caller,
        ids: Vec<Uuid>,
    ) -> CollabResult<Vec<Self>> {
        let ids: Vec<Value> = ids.into_iter().map(Value::Id).collect();
        let cores = model::find_entities(
            &store,
            &ROLE,
            caller,
            &Filter::new().in_set("id", ids),
            &[],
            None,
            None,
        )
        .await?;
        Ok(cores.into_iter().map(|core| Role { core }).collect())
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn get_attribute(&self, caller: &dyn Caller, name: &str) -> CollabResult<Value> {
        self.core.get_attribute(caller, name)
    }

    /// Delete the role and every assignment of it.
    pub async fn delete(self, caller: &dyn Caller) -> CollabResult<()> {
        self.core.ensure_initialised()?;
        ROLE.delete
            .check(caller, Some(&self.core.target()), "role delete")?;
        let store = self.core.store.as_ref();
        let id = self.core.id;
        in_transaction(store, false, async {
            unassign_all_for_role(store, id).await?;
            store.delete_row(ROLE.table, id).await
        })
        .await
    }

    pub(crate) fn ensure_initialised(&self) -> CollabResult<()> {
        self.core.ensure_initialised()
    }
}

// -----------------------------------------------------------------------
// Person-role assignment rows
// -----------------------------------------------------------------------

pub(crate) const ASSIGNMENT_TABLE: &str = "person_role";

async fn assignment_rows<S: EntityStore>(
    store: &S,
    person_id: Uuid,
    role_id: Uuid,
) -> CollabResult<Vec<Row>> {
    store
        .find_by(
            ASSIGNMENT_TABLE,
            &Filter::new()
                .eq("personId", Value::Id(person_id))
                .eq("roleId", Value::Id(role_id)),
            &[],
            None,
            None,
        )
        .await
}

pub(crate) async fn assign<S: EntityStore>(
    store: &S,
    person_id: Uuid,
    role_id: Uuid,
) -> CollabResult<()> {
    if !assignment_rows(store, person_id, role_id).await?.is_empty() {
        return Err(CollabError::bad_input(format!(
            "role {role_id} is already assigned to person {person_id}"
        )));
    }
    store
        .insert(
            ASSIGNMENT_TABLE,
            record([
                ("personId", Value::Id(person_id)),
                ("roleId", Value::Id(role_id)),
            ]),
        )
        .await?;
    Ok(())
}

pub(crate) async fn unassign<S: EntityStore>(
    store: &S,
    person_id: Uuid,
    role_id: Uuid,
) -> CollabResult<()> {
    let rows = assignment_rows(store, person_id, role_id).await?;
    let Some(row) = rows.first() else {
        return Err(CollabError::bad_input(format!(
            "role {role_id} is not assigned to person {person_id}"
        )));
    };
    store.delete_row(ASSIGNMENT_TABLE, row.id).await
}

pub(crate) async fn role_ids_for<S: EntityStore>(
    store: &S,
    person_id: Uuid,
) -> CollabResult<Vec<Uuid>> {
    let rows = store
        .find_by(
            ASSIGNMENT_TABLE,
            &Filter::new().eq("personId", Value::Id(person_id)),
            &[],
            None,
            None,
        )
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.attrs.get("roleId").and_then(Value::as_id))
        .collect())
}

/// Names of the roles assigned to a person, for session construction.
pub(crate) async fn role_names_for<S: EntityStore>(
    store: &S,
    person_id: Uuid,
) -> CollabResult<Vec<String>> {
    let ids: Vec<Value> = role_ids_for(store, person_id)
        .await?
        .into_iter()
        .map(Value::Id)
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = store
        .find_by(ROLE.table, &Filter::new().in_set("id", ids), &[], None, None)
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.attrs.get("name").and_then(|v| v.as_text()))
        .map(str::to_string)
        .collect())
}

pub(crate) async fn unassign_all_for_person<S: EntityStore>(
    store: &S,
    person_id: Uuid,
) -> CollabResult<()> {
    let rows = store
        .find_by(
            ASSIGNMENT_TABLE,
            &Filter::new().eq("personId", Value::Id(person_id)),
            &[],
            None,
            None,
        )
        .await?;
    for row in rows {
        store.delete_row(ASSIGNMENT_TABLE, row.id).await?;
    }
    Ok(())
}

pub(crate) async fn unassign_all_for_role<S: EntityStore>(
    store: &S,
    role_id: Uuid,
) -> CollabResult<()> {
    let rows = store
        .find_by(
            ASSIGNMENT_TABLE,
            &Filter::new().eq("roleId", Value::Id(role_id)),
            &[],
            None,
            None,
        )
        .await?;
    for row in rows {
        store.delete_row(ASSIGNMENT_TABLE, row.id).await?;
    }
    Ok(())
}
