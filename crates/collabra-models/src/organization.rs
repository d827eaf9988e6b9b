//! Organization model — gated lifecycle plus the tree and membership
//! relationship operations.
//!
//! Organizations form a forest: each has at most one parent, referenced
//! by the protected `parentId` attribute. The dedicated operations here
//! are the only sanctioned way to mutate the tree or the membership
//! association; every batch runs in one transaction and is rolled back
//! whole on the first failure.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use collabra_core::access::{Caller, Condition, Requirement};
use collabra_core::descriptor::{AttributeSpec, EntityDescriptor};
use collabra_core::error::{CollabError, CollabResult};
use collabra_core::store::{Backend, Filter, Pagination, RawPredicate, SortKey};
use collabra_core::txn::in_transaction;
use collabra_core::value::{Record, Value, record};
use tracing::debug;
use uuid::Uuid;

use crate::account;
use crate::membership;
use crate::model::{self, ModelCore};
use crate::person::Person;
use crate::role::{ADMIN_OR_CAN_EDIT, AUTHENTICATED, ROLE_ORG_CREATOR, ROLE_SYSTEM_ADMIN};

const CREATE: Requirement = Requirement::any(&[
    &[Condition::Role(ROLE_SYSTEM_ADMIN)],
    &[Condition::Role(ROLE_ORG_CREATOR)],
]);

pub(crate) static ORGANIZATION: EntityDescriptor = EntityDescriptor {
    entity: "organization",
    table: "organization",
    attributes: &[
        AttributeSpec::new("id").read_only(),
        AttributeSpec::new("accountId").read_only(),
        AttributeSpec::new("accountName").read_only(),
        AttributeSpec::new("name").required(),
        AttributeSpec::new("doi"),
        AttributeSpec::new("type"),
        AttributeSpec::new("parentId").protected(),
    ],
    create: CREATE,
    find: AUTHENTICATED,
    construct: AUTHENTICATED,
    update: ADMIN_OR_CAN_EDIT,
    delete: ADMIN_OR_CAN_EDIT,
};

/// A named organization that is-a account.
pub struct Organization<S> {
    core: ModelCore<S>,
}

impl<S> Clone for Organization<S> {
    fn clone(&self) -> Self {
        Organization {
            core: self.core.clone(),
        }
    }
}

impl<S> fmt::Debug for Organization<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Organization").field(&self.core).finish()
    }
}

impl<S: Backend> Organization<S> {
    /// Create an organization together with its account row.
    ///
    /// `attrs` must carry `accountName` plus the organization's own
    /// attributes; both rows are inserted in one transaction.
    pub async fn create(
        store: Arc<S>,
        caller: &dyn Caller,
        mut attrs: Record,
    ) -> CollabResult<Self> {
        ORGANIZATION
            .create
            .check(caller, None, "organization create")?;
        let account_name = account::take_account_name(&mut attrs)?;
        model::validate_new_attributes(&ORGANIZATION, &attrs)?;

        let mut core = in_transaction(store.as_ref(), false, async {
            let account_id = account::create_account(store.as_ref(), &account_name).await?;
            attrs.insert("accountId".to_string(), Value::Id(account_id));
            model::insert_entity(&store, &ORGANIZATION, attrs).await
        })
        .await?;
        core.attrs
            .insert("accountName".to_string(), Value::Text(account_name));
        Ok(Organization { core })
    }

    pub async fn find(
        store: Arc<S>,
        caller: &dyn Caller,
        filter: Filter,
        sort: &[SortKey],
        pagination: Option<Pagination>,
        raw: Option<RawPredicate>,
    ) -> CollabResult<Vec<Self>> {
        let cores = in_transaction(store.as_ref(), true, async {
            let mut cores = model::find_entities(
                &store,
                &ORGANIZATION,
                caller,
                &filter,
                sort,
                pagination,
                raw,
            )
            .await?;
            account::attach_account_names(store.as_ref(), &mut cores).await?;
            Ok(cores)
        })
        .await?;
        Ok(cores.into_iter().map(|core| Organization { core }).collect())
    }

    /// Load an existing organization by primary key.
    pub async fn construct(store: Arc<S>, caller: &dyn Caller, id: Uuid) -> CollabResult<Self> {
        let core = in_transaction(store.as_ref(), true, async {
            let mut core = model::load_entity(&store, &ORGANIZATION, caller, id).await?;
            account::attach_account_names(store.as_ref(), std::slice::from_mut(&mut core)).await?;
            Ok(core)
        })
        .await?;
        Ok(Organization { core })
    }

    /// Load an existing organization by its unique account handle.
    pub async fn construct_by_account_name(
        store: Arc<S>,
        caller: &dyn Caller,
        account_name: &str,
    ) -> CollabResult<Self> {
        ORGANIZATION
            .construct
            .check(caller, None, "organization construct")?;
        let core = in_transaction(store.as_ref(), true, async {
            let account_id = account::account_id_by_name(store.as_ref(), account_name)
                .await?
                .ok_or_else(|| CollabError::NotFound {
                    entity: "organization".to_string(),
                    id: account_name.to_string(),
                })?;
            let rows = store
                .find_by(
                    ORGANIZATION.table,
                    &Filter::new().eq("accountId", Value::Id(account_id)),
                    &[],
                    None,
                    None,
                )
                .await?;
            let row = rows.into_iter().next().ok_or_else(|| CollabError::NotFound {
                entity: "organization".to_string(),
                id: account_name.to_string(),
            })?;
            let mut core = model::core_from_row(&store, &ORGANIZATION, row);
            core.attrs.insert(
                "accountName".to_string(),
                Value::Text(account_name.to_string()),
            );
            Ok(core)
        })
        .await?;
        Ok(Organization { core })
    }

    /// Detached handle: usable as a relationship endpoint, but every
    /// gated operation fails until the instance is actually loaded.
    pub fn reference(store: Arc<S>, id: Uuid) -> Self {
        Organization {
            core: ModelCore::detached(store, &ORGANIZATION, id),
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

    /// Delete the organization, its account row, and its membership
    /// rows. Children are detached, never cascade-deleted.
    pub async fn delete(self, caller: &dyn Caller) -> CollabResult<()> {
        self.core.ensure_initialised()?;
        ORGANIZATION
            .delete
            .check(caller, Some(&self.core.target()), "organization delete")?;
        let store = self.core.store.as_ref();
        let id = self.core.id;
        let account_id = self.core.attrs.get("accountId").and_then(Value::as_id);

        in_transaction(store, false, async {
            let children = store
                .find_by(
                    ORGANIZATION.table,
                    &Filter::new().eq("parentId", Value::Id(id)),
                    &[],
                    None,
                    None,
                )
                .await?;
            for child in children {
                store
                    .update(
                        ORGANIZATION.table,
                        child.id,
                        record([("parentId", Value::Null)]),
                    )
                    .await?;
            }
            membership::unlink_all_for_organization(store, id).await?;
            store.delete_row(ORGANIZATION.table, id).await?;
            if let Some(account_id) = account_id {
                account::delete_account(store, account_id).await?;
            }
            debug!(%id, "organization deleted");
            Ok(())
        })
        .await
    }

    // -------------------------------------------------------------------
    // Tree relationships
    // -------------------------------------------------------------------

    fn parent_id(&self) -> Option<Uuid> {
        self.core.attrs.get("parentId").and_then(Value::as_id)
    }

    fn display_name(&self) -> String {
        self.core
            .attrs
            .get("name")
            .and_then(|value| value.as_text())
            .map(str::to_string)
            .unwrap_or_else(|| self.core.id.to_string())
    }

    /// Ids of this organization and its ancestors, via raw store reads.
    /// Fails instead of looping if the stored chain is cyclic.
    async fn ancestor_ids(&self) -> CollabResult<HashSet<Uuid>> {
        let store = self.core.store.as_ref();
        let mut ids = HashSet::from([self.core.id]);
        let mut current = self.parent_id();
        while let Some(id) = current {
            if !ids.insert(id) {
                return Err(CollabError::bad_input(
                    "organization parent chain contains a cycle",
                ));
            }
            let rows = store
                .find_by(
                    ORGANIZATION.table,
                    &Filter::new().eq("id", Value::Id(id)),
                    &[],
                    None,
                    None,
                )
                .await?;
            current = rows
                .first()
                .and_then(|row| row.attrs.get("parentId"))
                .and_then(Value::as_id);
        }
        Ok(ids)
    }

    /// Organizations whose parent is this one. Access filtering is
    /// delegated to `find`.
    pub async fn get_children(&self, caller: &dyn Caller) -> CollabResult<Vec<Self>> {
        self.core.ensure_initialised()?;
        Self::find(
            Arc::clone(&self.core.store),
            caller,
            Filter::new().eq("parentId", Value::Id(self.core.id)),
            &[],
            None,
            None,
        )
        .await
    }

    pub async fn get_parent(&self, caller: &dyn Caller) -> CollabResult<Option<Self>> {
        self.core.ensure_initialised()?;
        match self.parent_id() {
            Some(parent_id) => Ok(Some(
                Self::construct(Arc::clone(&self.core.store), caller, parent_id).await?,
            )),
            None => Ok(None),
        }
    }

    /// Ordered ancestor chain, furthest ancestor first.
    pub async fn get_all_parents(&self, caller: &dyn Caller) -> CollabResult<Vec<Self>> {
        self.core.ensure_initialised()?;
        let mut visited = HashSet::from([self.core.id]);
        let mut chain = Vec::new();
        let mut current = self.get_parent(caller).await?;
        while let Some(parent) = current {
            if !visited.insert(parent.core.id) {
                return Err(CollabError::bad_input(
                    "organization parent chain contains a cycle",
                ));
            }
            current = parent.get_parent(caller).await?;
            chain.push(parent);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Attach `children` to this organization.
    ///
    /// The whole batch runs in one transaction: if any child already
    /// has a different parent, or attaching it would close a cycle,
    /// nothing is changed — including children processed earlier in
    /// the same call.
    pub async fn add_children(
        &self,
        caller: &dyn Caller,
        children: &mut [Organization<S>],
    ) -> CollabResult<()> {
        self.core.ensure_initialised()?;
        // Update access on the parent is checked before any child is
        // touched.
        ORGANIZATION.update.check(
            caller,
            Some(&self.core.target()),
            "organization addChildren",
        )?;
        for child in children.iter() {
            child.core.ensure_initialised()?;
        }
        let ancestors = self.ancestor_ids().await?;
        let store = self.core.store.as_ref();
        let parent_id = self.core.id;

        in_transaction(store, false, async {
            for child in children.iter() {
                match child.parent_id() {
                    Some(existing) if existing == parent_id => continue,
                    Some(existing) => {
                        return Err(CollabError::bad_input(format!(
                            "organization {} is already a child of organization with id {existing}",
                            child.display_name()
                        )));
                    }
                    None => {}
                }
                if ancestors.contains(&child.core.id) {
                    return Err(CollabError::bad_input(format!(
                        "attaching organization {} to {} would create a cycle",
                        child.display_name(),
                        parent_id
                    )));
                }
                store
                    .update(
                        ORGANIZATION.table,
                        child.core.id,
                        record([("parentId", Value::Id(parent_id))]),
                    )
                    .await?;
            }
            Ok(())
        })
        .await?;

        // Reflect the new parent on the instances only after the commit.
        for child in children.iter_mut() {
            child
                .core
                .attrs
                .insert("parentId".to_string(), Value::Id(parent_id));
        }
        debug!(parent = %parent_id, count = children.len(), "children attached");
        Ok(())
    }

    /// Detach `children` from this organization.
    ///
    /// Every child must currently be parented by this organization;
    /// otherwise the whole batch fails and nothing is changed. On
    /// success `parentId` is explicitly set to null.
    pub async fn remove_children(
        &self,
        caller: &dyn Caller,
        children: &mut [Organization<S>],
    ) -> CollabResult<()> {
        self.core.ensure_initialised()?;
        ORGANIZATION.update.check(
            caller,
            Some(&self.core.target()),
            "organization removeChildren",
        )?;
        for child in children.iter() {
            child.core.ensure_initialised()?;
        }
        let store = self.core.store.as_ref();
        let parent_id = self.core.id;
        let parent_name = self.display_name();

        in_transaction(store, false, async {
            for child in children.iter() {
                if child.parent_id() != Some(parent_id) {
                    return Err(CollabError::bad_input(format!(
                        "organization {} is not a child of {parent_name}",
                        child.display_name()
                    )));
                }
                store
                    .update(
                        ORGANIZATION.table,
                        child.core.id,
                        record([("parentId", Value::Null)]),
                    )
                    .await?;
            }
            Ok(())
        })
        .await?;

        for child in children.iter_mut() {
            child.core.attrs.insert("parentId".to_string(), Value::Null);
        }
        debug!(parent = %parent_id, count = children.len(), "children detached");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Membership relationships
    // -------------------------------------------------------------------

    /// People associated with this organization.
    ///
    /// Association rows and the referenced people are read inside one
    /// read-only transaction so both reads see a consistent snapshot.
    pub async fn get_people(&self, caller: &dyn Caller) -> CollabResult<Vec<Person<S>>> {
        self.core.ensure_initialised()?;
        let store = self.core.store.as_ref();
        let organization_id = self.core.id;
        in_transaction(store, true, async {
            let person_ids: Vec<Value> = membership::member_person_ids(store, organization_id)
                .await?
                .into_iter()
                .map(Value::Id)
                .collect();
            Person::find(
                Arc::clone(&self.core.store),
                caller,
                Filter::new().in_set("id", person_ids),
                &[],
                None,
                None,
            )
            .await
        })
        .await
    }

    /// Associate `people` with this organization, one association row
    /// per person, all in one transaction.
    pub async fn add_people(&self, caller: &dyn Caller, people: &[Person<S>]) -> CollabResult<()> {
        self.core.ensure_initialised()?;
        ORGANIZATION
            .update
            .check(caller, Some(&self.core.target()), "organization addPeople")?;
        let store = self.core.store.as_ref();
        let organization_id = self.core.id;

        in_transaction(store, false, async {
            for person in people {
                membership::link(store, organization_id, person.id()).await?;
            }
            Ok(())
        })
        .await?;
        debug!(organization = %organization_id, count = people.len(), "people added");
        Ok(())
    }

    /// Remove the association rows for `people`, all in one
    /// transaction; a pair that is not associated fails the batch.
    pub async fn remove_people(
        &self,
        caller: &dyn Caller,
        people: &[Person<S>],
    ) -> CollabResult<()> {
        self.core.ensure_initialised()?;
        ORGANIZATION.update.check(
            caller,
            Some(&self.core.target()),
            "organization removePeople",
        )?;
        let store = self.core.store.as_ref();
        let organization_id = self.core.id;

        in_transaction(store, false, async {
            for person in people {
                membership::unlink(store, organization_id, person.id()).await?;
            }
            Ok(())
        })
        .await?;
        debug!(organization = %organization_id, count = people.len(), "people removed");
        Ok(())
    }
}
