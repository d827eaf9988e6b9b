//! Organization–person membership rows.
//!
//! The association has no identity beyond its two foreign keys, and at
//! most one row exists per pair. It is only ever mutated through the
//! Organization membership operations, which is why nothing here is
//! public.

use collabra_core::error::{CollabError, CollabResult};
use collabra_core::store::{EntityStore, Filter, Row};
use collabra_core::value::{Value, record};
use uuid::Uuid;

pub(crate) const TABLE: &str = "organization_person";

async fn pair_rows<S: EntityStore>(
    store: &S,
    organization_id: Uuid,
    person_id: Uuid,
) -> CollabResult<Vec<Row>> {
    store
        .find_by(
            TABLE,
            &Filter::new()
                .eq("organizationId", Value::Id(organization_id))
                .eq("personId", Value::Id(person_id)),
            &[],
            None,
            None,
        )
        .await
}

/// Create the association row for one pair.
///
/// Fails if the pair is already linked or the person row does not
/// exist; a missing reference surfaces as bad input at this layer.
pub(crate) async fn link<S: EntityStore>(
    store: &S,
    organization_id: Uuid,
    person_id: Uuid,
) -> CollabResult<()> {
    let person = store
        .find_by(
            crate::person::TABLE,
            &Filter::new().eq("id", Value::Id(person_id)),
            &[],
            None,
            None,
        )
        .await?;
    if person.is_empty() {
        return Err(CollabError::bad_input(format!(
            "person {person_id} does not exist"
        )));
    }
    if !pair_rows(store, organization_id, person_id).await?.is_empty() {
        return Err(CollabError::bad_input(format!(
            "person {person_id} is already a member of organization {organization_id}"
        )));
    }
    store
        .insert(
            TABLE,
            record([
                ("organizationId", Value::Id(organization_id)),
                ("personId", Value::Id(person_id)),
            ]),
        )
        .await?;
    Ok(())
}

/// Delete the association row for one pair; fails if it does not exist.
pub(crate) async fn unlink<S: EntityStore>(
    store: &S,
    organization_id: Uuid,
    person_id: Uuid,
) -> CollabResult<()> {
    let rows = pair_rows(store, organization_id, person_id).await?;
    let Some(row) = rows.first() else {
        return Err(CollabError::bad_input(format!(
            "person {person_id} is not a member of organization {organization_id}"
        )));
    };
    store.delete_row(TABLE, row.id).await
}

pub(crate) async fn member_person_ids<S: EntityStore>(
    store: &S,
    organization_id: Uuid,
) -> CollabResult<Vec<Uuid>> {
    let rows = store
        .find_by(
            TABLE,
            &Filter::new().eq("organizationId", Value::Id(organization_id)),
            &[],
            None,
            None,
        )
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.attrs.get("personId").and_then(Value::as_id))
        .collect())
}

pub(crate) async fn organization_ids_for<S: EntityStore>(
    store: &S,
    person_id: Uuid,
) -> CollabResult<Vec<Uuid>> {
    let rows = store
        .find_by(
            TABLE,
            &Filter::new().eq("personId", Value::Id(person_id)),
            &[],
            None,
            None,
        )
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.attrs.get("organizationId").and_then(Value::as_id))
        .collect())
}

pub(crate) async fn unlink_all_for_organization<S: EntityStore>(
    store: &S,
    organization_id: Uuid,
) -> CollabResult<()> {
    let rows = store
        .find_by(
            TABLE,
            &Filter::new().eq("organizationId", Value::Id(organization_id)),
            &[],
            None,
            None,
        )
        .await?;
    for row in rows {
        store.delete_row(TABLE, row.id).await?;
    }
    Ok(())
}

pub(crate) async fn unlink_all_for_person<S: EntityStore>(
    store: &S,
    person_id: Uuid,
) -> CollabResult<()> {
    let rows = store
        .find_by(
            TABLE,
            &Filter::new().eq("personId", Value::Id(person_id)),
            &[],
            None,
            None,
        )
        .await?;
    for row in rows {
        store.delete_row(TABLE, row.id).await?;
    }
    Ok(())
}
