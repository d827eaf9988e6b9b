//! Account rows — the shared identity behind organizations and people.
//!
//! Accounts are never created or deleted on their own; each subtype
//! creates its account row inside its own creation transaction and
//! removes it again when the subtype is deleted.

use std::collections::HashMap;

use collabra_core::error::{CollabError, CollabResult};
use collabra_core::store::{EntityStore, Filter};
use collabra_core::value::{Record, Value, record};
use uuid::Uuid;

use crate::model::ModelCore;

pub(crate) const TABLE: &str = "account";

/// Insert an account row, enforcing handle uniqueness.
pub(crate) async fn create_account<S: EntityStore>(
    store: &S,
    account_name: &str,
) -> CollabResult<Uuid> {
    let existing = store
        .find_by(
            TABLE,
            &Filter::new().eq("accountName", account_name),
            &[],
            None,
            None,
        )
        .await?;
    if !existing.is_empty() {
        return Err(CollabError::bad_input(format!(
            "account name {account_name} is already taken"
        )));
    }
    store
        .insert(TABLE, record([("accountName", account_name.into())]))
        .await
}

pub(crate) async fn account_id_by_name<S: EntityStore>(
    store: &S,
    account_name: &str,
) -> CollabResult<Option<Uuid>> {
    let rows = store
        .find_by(
            TABLE,
            &Filter::new().eq("accountName", account_name),
            &[],
            None,
            None,
        )
        .await?;
    Ok(rows.first().map(|row| row.id))
}

pub(crate) async fn delete_account<S: EntityStore>(store: &S, id: Uuid) -> CollabResult<()> {
    store.delete_row(TABLE, id).await
}

/// Take the mandatory `accountName` out of caller-supplied creation
/// attributes.
pub(crate) fn take_account_name(attrs: &mut Record) -> CollabResult<String> {
    match attrs.remove("accountName") {
        Some(Value::Text(name)) if !name.is_empty() => Ok(name),
        Some(_) => Err(CollabError::bad_input(
            "accountName must be a non-empty text value",
        )),
        None => Err(CollabError::bad_input("accountName is required")),
    }
}

/// Denormalize `accountName` into freshly loaded cores with one batched
/// account read.
pub(crate) async fn attach_account_names<S: EntityStore>(
    store: &S,
    cores: &mut [ModelCore<S>],
) -> CollabResult<()> {
    let account_ids: Vec<Value> = cores
        .iter()
        .filter_map(|core| core.attrs.get("accountId").and_then(Value::as_id))
        .map(Value::Id)
        .collect();
    if account_ids.is_empty() {
        return Ok(());
    }
    let rows = store
        .find_by(TABLE, &Filter::new().in_set("id", account_ids), &[], None, None)
        .await?;
    let names: HashMap<Uuid, Value> = rows
        .into_iter()
        .filter_map(|row| {
            let name = row.attrs.get("accountName").cloned()?;
            Some((row.id, name))
        })
        .collect();
    for core in cores {
        let account_id = core.attrs.get("accountId").and_then(Value::as_id);
        if let Some(name) = account_id.and_then(|id| names.get(&id)) {
            core.attrs.insert("accountName".to_string(), name.clone());
        }
    }
    Ok(())
}
