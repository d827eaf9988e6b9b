//! Person model — gated lifecycle, row-level find visibility, and role
//! assignment.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use collabra_core::access::{Caller, Condition, Requirement};
use collabra_core::descriptor::{AttributeSpec, EntityDescriptor};
use collabra_core::error::{CollabError, CollabResult};
use collabra_core::store::{Backend, EntityStore, Filter, Pagination, RawPredicate, SortKey};
use collabra_core::txn::in_transaction;
use collabra_core::value::{Record, Value};
use tracing::debug;
use uuid::Uuid;

use crate::account;
use crate::membership;
use crate::model::{self, ModelCore};
use crate::role::{self, ADMIN_ONLY, ADMIN_OR_CAN_EDIT, AUTHENTICATED, ROLE_PERSON_CREATOR, ROLE_SYSTEM_ADMIN, Role};

pub const GENDER_MALE: &str = "male";
pub const GENDER_FEMALE: &str = "female";

pub(crate) const TABLE: &str = "person";

const CREATE: Requirement = Requirement::any(&[
    &[Condition::Role(ROLE_SYSTEM_ADMIN)],
    &[Condition::Role(ROLE_PERSON_CREATOR)],
]);

static PERSON: EntityDescriptor = EntityDescriptor {
    entity: "person",
    table: TABLE,
    attributes: &[
        AttributeSpec::new("id").read_only(),
        AttributeSpec::new("accountId").read_only(),
        AttributeSpec::new("accountName").read_only(),
        AttributeSpec::new("firstName").required(),
        AttributeSpec::new("middleName"),
        AttributeSpec::new("lastName"),
        AttributeSpec::new("dob"),
        AttributeSpec::new("gender"),
        AttributeSpec::new("contact"),
    ],
    create: CREATE,
    find: AUTHENTICATED,
    construct: AUTHENTICATED,
    update: ADMIN_OR_CAN_EDIT,
    delete: ADMIN_OR_CAN_EDIT,
};

/// A person that is-a account.
pub struct Person<S> {
    core: ModelCore<S>,
}

impl<S> Clone for Person<S> {
    fn clone(&self) -> Self {
        Person {
            core: self.core.clone(),
        }
    }
}

impl<S> fmt::Debug for Person<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Person").field(&self.core).finish()
    }
}

/// Person ids visible to a non-admin caller: themselves plus the
/// members of every organization they belong to.
async fn visible_person_ids<S: EntityStore>(
    store: &S,
    caller: &dyn Caller,
) -> CollabResult<HashSet<Uuid>> {
    let Some(person_id) = caller.person_id() else {
        return Ok(HashSet::new());
    };
    let mut visible = HashSet::from([person_id]);
    for organization_id in membership::organization_ids_for(store, person_id).await? {
        visible.extend(membership::member_person_ids(store, organization_id).await?);
    }
    Ok(visible)
}

impl<S: Backend> Person<S> {
    /// Create a person together with their account row, both inserted
    /// in one transaction.
    pub async fn create(
        store: Arc<S>,
        caller: &dyn Caller,
        mut attrs: Record,
    ) -> CollabResult<Self> {
        PERSON.create.check(caller, None, "person create")?;
        let account_name = account::take_account_name(&mut attrs)?;
        model::validate_new_attributes(&PERSON, &attrs)?;

        let mut core = in_transaction(store.as_ref(), false, async {
            let account_id = account::create_account(store.as_ref(), &account_name).await?;
            attrs.insert("accountId".to_string(), Value::Id(account_id));
            model::insert_entity(&store, &PERSON, attrs).await
        })
        .await?;
        core.attrs
            .insert("accountName".to_string(), Value::Text(account_name));
        Ok(Person { core })
    }

    /// Gated query with row-level visibility: a caller without the
    /// system-admin role sees only themselves and members of their own
    /// organizations.
    pub async fn find(
        store: Arc<S>,
        caller: &dyn Caller,
        filter: Filter,
        sort: &[SortKey],
        pagination: Option<Pagination>,
        raw: Option<RawPredicate>,
    ) -> CollabResult<Vec<Self>> {
        let cores = in_transaction(store.as_ref(), true, async {
            let mut cores =
                model::find_entities(&store, &PERSON, caller, &filter, sort, pagination, raw)
                    .await?;
            if !caller.has_role(ROLE_SYSTEM_ADMIN) {
                let visible = visible_person_ids(store.as_ref(), caller).await?;
                cores.retain(|core| visible.contains(&core.id));
            }
            account::attach_account_names(store.as_ref(), &mut cores).await?;
            Ok(cores)
        })
        .await?;
        Ok(cores.into_iter().map(|core| Person { core }).collect())
    }

    /// Load an existing person by primary key.
    pub async fn construct(store: Arc<S>, caller: &dyn Caller, id: Uuid) -> CollabResult<Self> {
        let core = in_transaction(store.as_ref(), true, async {
            let mut core = model::load_entity(&store, &PERSON, caller, id).await?;
            account::attach_account_names(store.as_ref(), std::slice::from_mut(&mut core)).await?;
            Ok(core)
        })
        .await?;
        Ok(Person { core })
    }

    /// Load an existing person by their unique account handle.
    pub async fn construct_by_account_name(
        store: Arc<S>,
        caller: &dyn Caller,
        account_name: &str,
    ) -> CollabResult<Self> {
        PERSON.construct.check(caller, None, "person construct")?;
        let core = in_transaction(store.as_ref(), true, async {
            let account_id = account::account_id_by_name(store.as_ref(), account_name)
                .await?
                .ok_or_else(|| CollabError::NotFound {
                    entity: "person".to_string(),
                    id: account_name.to_string(),
                })?;
            let rows = store
                .find_by(
                    TABLE,
                    &Filter::new().eq("accountId", Value::Id(account_id)),
                    &[],
                    None,
                    None,
                )
                .await?;
            let row = rows.into_iter().next().ok_or_else(|| CollabError::NotFound {
                entity: "person".to_string(),
                id: account_name.to_string(),
            })?;
            let mut core = model::core_from_row(&store, &PERSON, row);
            core.attrs.insert(
                "accountName".to_string(),
                Value::Text(account_name.to_string()),
            );
            Ok(core)
        })
        .await?;
        Ok(Person { core })
    }

    /// Detached handle: usable as a relationship endpoint, but every
    /// gated operation fails until the instance is actually loaded.
    pub fn reference(store: Arc<S>, id: Uuid) -> Self {
        Person {
            core: ModelCore::detached(store, &PERSON, id),
        }
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn get_attribute(&self, caller: &dyn Caller, name: &str) -> CollabResult<Value> {
        self.core.get_attribute(caller, name)
    }

    pub fn get_attributes(&self, caller: &dyn Caller, names: &[&str]) -> CollabResult<Record> {
        self.core.get_attributes(caller, names)
    }

    pub async fn set_attribute(
        &mut self,
        caller: &dyn Caller,
        name: &str,
        value: Value,
    ) -> CollabResult<()> {
        self.core.set_attribute(caller, name, value).await
    }

    pub async fn set_attributes(&mut self, caller: &dyn Caller, attrs: Record) -> CollabResult<()> {
        self.core.set_attributes(caller, attrs).await
    }

    /// Delete the person, their account row, their memberships, and
    /// their role assignments, all in one transaction.
    pub async fn delete(self, caller: &dyn Caller) -> CollabResult<()> {
        self.core.ensure_initialised()?;
        PERSON
            .delete
            .check(caller, Some(&self.core.target()), "person delete")?;
        let store = self.core.store.as_ref();
        let id = self.core.id;
        let account_id = self.core.attrs.get("accountId").and_then(Value::as_id);

        in_transaction(store, false, async {
            membership::unlink_all_for_person(store, id).await?;
            role::unassign_all_for_person(store, id).await?;
            store.delete_row(TABLE, id).await?;
            if let Some(account_id) = account_id {
                account::delete_account(store, account_id).await?;
            }
            debug!(%id, "person deleted");
            Ok(())
        })
        .await
    }

    // -------------------------------------------------------------------
    // Role assignment
    // -------------------------------------------------------------------

    /// Roles assigned to this person.
    pub async fn get_roles(&self, caller: &dyn Caller) -> CollabResult<Vec<Role<S>>> {
        self.core.ensure_initialised()?;
        let store = self.core.store.as_ref();
        let person_id = self.core.id;
        in_transaction(store, true, async {
            let role_ids = role::role_ids_for(store, person_id).await?;
            Role::find_by_ids(Arc::clone(&self.core.store), caller, role_ids).await
        })
        .await
    }

    /// Assign `roles` to this person, one assignment row per role, all
    /// in one transaction; an already-assigned role fails the batch.
    pub async fn add_roles(&self, caller: &dyn Caller, roles: &[Role<S>]) -> CollabResult<()> {
        self.core.ensure_initialised()?;
        ADMIN_ONLY.check(caller, Some(&self.core.target()), "person addRoles")?;
        for role in roles {
            role.ensure_initialised()?;
        }
        let store = self.core.store.as_ref();
        let person_id = self.core.id;

        in_transaction(store, false, async {
            for role in roles {
                role::assign(store, person_id, role.id()).await?;
            }
            Ok(())
        })
        .await?;
        debug!(person = %person_id, count = roles.len(), "roles assigned");
        Ok(())
    }

    /// Remove the assignment rows for `roles`, all in one transaction;
    /// a role that is not assigned fails the batch.
    pub async fn remove_roles(&self, caller: &dyn Caller, roles: &[Role<S>]) -> CollabResult<()> {
        self.core.ensure_initialised()?;
        ADMIN_ONLY.check(caller, Some(&self.core.target()), "person removeRoles")?;
        for role in roles {
            role.ensure_initialised()?;
        }
        let store = self.core.store.as_ref();
        let person_id = self.core.id;

        in_transaction(store, false, async {
            for role in roles {
                role::unassign(store, person_id, role.id()).await?;
            }
            Ok(())
        })
        .await?;
        debug!(person = %person_id, count = roles.len(), "roles removed");
        Ok(())
    }
}
