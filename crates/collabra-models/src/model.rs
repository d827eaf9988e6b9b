//! Generic gated lifecycle machinery shared by the typed models.
//!
//! Each typed model wraps a [`ModelCore`] and delegates attribute access
//! and lifecycle operations here; behavior is driven entirely by the
//! entity's descriptor table. An instance is uninitialised until `create`
//! or a successful load populates it — gated operations on a detached
//! instance fail with an object-state error, never a silent no-op.

use std::fmt;
use std::sync::Arc;

use collabra_core::access::{Caller, TargetRef};
use collabra_core::descriptor::EntityDescriptor;
use collabra_core::error::{CollabError, CollabResult};
use collabra_core::store::{Backend, Filter, Pagination, RawPredicate, Row, SortKey};
use collabra_core::value::{Record, Value, record};
use tracing::debug;
use uuid::Uuid;

/// Shared state of a typed model instance.
pub(crate) struct ModelCore<S> {
    pub(crate) store: Arc<S>,
    pub(crate) descriptor: &'static EntityDescriptor,
    pub(crate) id: Uuid,
    pub(crate) attrs: Record,
    pub(crate) initialised: bool,
}

impl<S> Clone for ModelCore<S> {
    fn clone(&self) -> Self {
        ModelCore {
            store: Arc::clone(&self.store),
            descriptor: self.descriptor,
            id: self.id,
            attrs: self.attrs.clone(),
            initialised: self.initialised,
        }
    }
}

impl<S> fmt::Debug for ModelCore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCore")
            .field("entity", &self.descriptor.entity)
            .field("id", &self.id)
            .field("initialised", &self.initialised)
            .finish()
    }
}

impl<S> ModelCore<S> {
    /// Detached handle: known id, nothing loaded.
    pub(crate) fn detached(
        store: Arc<S>,
        descriptor: &'static EntityDescriptor,
        id: Uuid,
    ) -> Self {
        ModelCore {
            store,
            descriptor,
            id,
            attrs: Record::new(),
            initialised: false,
        }
    }

    pub(crate) fn target(&self) -> TargetRef {
        TargetRef::new(self.descriptor.entity, self.id)
    }

    pub(crate) fn ensure_initialised(&self) -> CollabResult<()> {
        if self.initialised {
            Ok(())
        } else {
            Err(CollabError::object_state(format!(
                "{} instance is not initialised",
                self.descriptor.entity
            )))
        }
    }
}

impl<S: Backend> ModelCore<S> {
    /// Per-attribute gated read.
    pub(crate) fn get_attribute(&self, caller: &dyn Caller, name: &str) -> CollabResult<Value> {
        self.ensure_initialised()?;
        let spec = self.descriptor.attribute(name).ok_or_else(|| {
            CollabError::bad_input(format!(
                "{} has no attribute {name}",
                self.descriptor.entity
            ))
        })?;
        if !spec.readable {
            return Err(CollabError::bad_input(format!(
                "{}.{name} is not readable",
                self.descriptor.entity
            )));
        }
        spec.read_requirement.check(
            caller,
            Some(&self.target()),
            &format!("reading {}.{name}", self.descriptor.entity),
        )?;
        Ok(self.attrs.get(name).cloned().unwrap_or(Value::Null))
    }

    /// Bulk gated read of the named attributes.
    pub(crate) fn get_attributes(&self, caller: &dyn Caller, names: &[&str]) -> CollabResult<Record> {
        let mut out = Record::new();
        for name in names {
            out.insert((*name).to_string(), self.get_attribute(caller, name)?);
        }
        Ok(out)
    }

    /// Generic bulk write.
    ///
    /// Every key is validated before any write is issued; attributes
    /// that are only mutable through a dedicated relationship operation
    /// are rejected loudly rather than silently stripped.
    pub(crate) async fn set_attributes(
        &mut self,
        caller: &dyn Caller,
        attrs: Record,
    ) -> CollabResult<()> {
        self.ensure_initialised()?;
        let target = self.target();
        self.descriptor.update.check(
            caller,
            Some(&target),
            &format!("updating {}", self.descriptor.entity),
        )?;
        for name in attrs.keys() {
            let spec = self.descriptor.attribute(name).ok_or_else(|| {
                CollabError::bad_input(format!(
                    "{} has no attribute {name}",
                    self.descriptor.entity
                ))
            })?;
            if spec.protected {
                return Err(CollabError::bad_input(format!(
                    "{}.{name} can only be changed through its dedicated relationship operation",
                    self.descriptor.entity
                )));
            }
            if !spec.writable {
                return Err(CollabError::bad_input(format!(
                    "{}.{name} is not writable",
                    self.descriptor.entity
                )));
            }
            spec.write_requirement.check(
                caller,
                Some(&target),
                &format!("writing {}.{name}", self.descriptor.entity),
            )?;
        }
        self.store
            .update(self.descriptor.table, self.id, attrs.clone())
            .await?;
        for (name, value) in attrs {
            self.attrs.insert(name, value);
        }
        Ok(())
    }

    pub(crate) async fn set_attribute(
        &mut self,
        caller: &dyn Caller,
        name: &str,
        value: Value,
    ) -> CollabResult<()> {
        self.set_attributes(caller, record([(name, value)])).await
    }
}

/// Validate caller-supplied attributes for entity creation: every key
/// must be a declared, writable, unprotected attribute, and every
/// required attribute must be present and non-null.
pub(crate) fn validate_new_attributes(
    descriptor: &'static EntityDescriptor,
    attrs: &Record,
) -> CollabResult<()> {
    for name in attrs.keys() {
        let spec = descriptor.attribute(name).ok_or_else(|| {
            CollabError::bad_input(format!("{} has no attribute {name}", descriptor.entity))
        })?;
        if spec.protected || !spec.writable {
            return Err(CollabError::bad_input(format!(
                "{}.{name} cannot be supplied at creation",
                descriptor.entity
            )));
        }
    }
    for spec in descriptor.attributes {
        if spec.required && !attrs.get(spec.name).is_some_and(|value| !value.is_null()) {
            return Err(CollabError::bad_input(format!(
                "{}.{} is required",
                descriptor.entity, spec.name
            )));
        }
    }
    Ok(())
}

/// Insert a validated row and return a loaded core.
pub(crate) async fn insert_entity<S: Backend>(
    store: &Arc<S>,
    descriptor: &'static EntityDescriptor,
    mut attrs: Record,
) -> CollabResult<ModelCore<S>> {
    let id = store.insert(descriptor.table, attrs.clone()).await?;
    attrs.insert("id".to_string(), Value::Id(id));
    debug!(entity = descriptor.entity, %id, "entity created");
    Ok(ModelCore {
        store: Arc::clone(store),
        descriptor,
        id,
        attrs,
        initialised: true,
    })
}

pub(crate) fn core_from_row<S>(
    store: &Arc<S>,
    descriptor: &'static EntityDescriptor,
    row: Row,
) -> ModelCore<S> {
    ModelCore {
        store: Arc::clone(store),
        descriptor,
        id: row.id,
        attrs: row.attrs,
        initialised: true,
    }
}

/// Gated query returning loaded cores.
pub(crate) async fn find_entities<S: Backend>(
    store: &Arc<S>,
    descriptor: &'static EntityDescriptor,
    caller: &dyn Caller,
    filter: &Filter,
    sort: &[SortKey],
    pagination: Option<Pagination>,
    raw: Option<RawPredicate>,
) -> CollabResult<Vec<ModelCore<S>>> {
    descriptor
        .find
        .check(caller, None, &format!("{} find", descriptor.entity))?;
    let rows = store
        .find_by(descriptor.table, filter, sort, pagination, raw)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| core_from_row(store, descriptor, row))
        .collect())
}

/// Gated load by primary key. Construction is itself a gated operation:
/// the class-level check runs before any row data is read.
pub(crate) async fn load_entity<S: Backend>(
    store: &Arc<S>,
    descriptor: &'static EntityDescriptor,
    caller: &dyn Caller,
    id: Uuid,
) -> CollabResult<ModelCore<S>> {
    descriptor
        .construct
        .check(caller, None, &format!("{} construct", descriptor.entity))?;
    let rows = store
        .find_by(
            descriptor.table,
            &Filter::new().eq("id", Value::Id(id)),
            &[],
            None,
            None,
        )
        .await?;
    let row = rows.into_iter().next().ok_or_else(|| CollabError::NotFound {
        entity: descriptor.entity.to_string(),
        id: id.to_string(),
    })?;
    Ok(core_from_row(store, descriptor, row))
}
