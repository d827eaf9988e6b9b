//! In-memory entity store with journaled transactions.
//!
//! Tables are created on first insert and keep rows in insertion order,
//! so unsorted queries return deterministic sequences. While a
//! transaction is open every mutation records its inverse in an undo
//! journal; `abort` replays the journal in reverse. A nested `begin`
//! joins the open transaction — only the outermost `commit` makes the
//! batch durable.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use collabra_core::error::CollabResult;
use collabra_core::store::{
    Direction, EntityStore, Filter, Pagination, Predicate, RawPredicate, Row, SortKey,
};
use collabra_core::txn::TransactionCoordinator;
use collabra_core::value::{Record, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
}

impl Table {
    fn position(&self, id: Uuid) -> Option<usize> {
        self.rows.iter().position(|row| row.id == id)
    }
}

#[derive(Debug)]
enum UndoOp {
    /// Remove an inserted row.
    Insert { table: String, id: Uuid },
    /// Restore the previous attribute state of an updated row.
    Update {
        table: String,
        id: Uuid,
        previous: Record,
    },
    /// Re-insert a deleted row at its original position.
    Delete {
        table: String,
        position: usize,
        row: Row,
    },
}

#[derive(Debug)]
struct Txn {
    depth: usize,
    read_only: bool,
    journal: Vec<UndoOp>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Table>,
    txn: Option<Txn>,
}

/// In-memory [`EntityStore`] + [`TransactionCoordinator`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another caller panicked mid-call;
        // the journal still describes a consistent rollback path.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn reject_if_read_only(inner: &Inner) -> Result<(), StoreError> {
    match &inner.txn {
        Some(txn) if txn.read_only => Err(StoreError::ReadOnlyViolation),
        _ => Ok(()),
    }
}

fn matches(filter: &Filter, record: &Record) -> bool {
    filter.iter().all(|(name, predicate)| {
        let value = record.get(name).unwrap_or(&Value::Null);
        match predicate {
            Predicate::Equal(expected) => value == expected,
            Predicate::Like(needle) => match value {
                Value::Text(text) => text.to_lowercase().contains(&needle.to_lowercase()),
                _ => false,
            },
            Predicate::In(set) => set.contains(value),
        }
    })
}

fn compare(a: &Row, b: &Row, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let left = a.attrs.get(&key.attribute).unwrap_or(&Value::Null);
        let right = b.attrs.get(&key.attribute).unwrap_or(&Value::Null);
        let ordering = match key.direction {
            Direction::Asc => left.cmp(right),
            Direction::Desc => left.cmp(right).reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn apply_undo(tables: &mut HashMap<String, Table>, op: UndoOp) {
    match op {
        UndoOp::Insert { table, id } => {
            if let Some(table) = tables.get_mut(&table) {
                if let Some(position) = table.position(id) {
                    table.rows.remove(position);
                }
            }
        }
        UndoOp::Update {
            table,
            id,
            previous,
        } => {
            if let Some(table) = tables.get_mut(&table) {
                if let Some(position) = table.position(id) {
                    table.rows[position].attrs = previous;
                }
            }
        }
        UndoOp::Delete {
            table,
            position,
            row,
        } => {
            if let Some(table) = tables.get_mut(&table) {
                let position = position.min(table.rows.len());
                table.rows.insert(position, row);
            }
        }
    }
}

impl EntityStore for MemoryStore {
    async fn insert(&self, table: &str, mut attrs: Record) -> CollabResult<Uuid> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        reject_if_read_only(inner)?;

        let id = Uuid::new_v4();
        attrs.insert("id".to_string(), Value::Id(id));
        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .rows
            .push(Row { id, attrs });

        if let Some(txn) = &mut inner.txn {
            txn.journal.push(UndoOp::Insert {
                table: table.to_string(),
                id,
            });
        }
        Ok(id)
    }

    async fn find_by(
        &self,
        table: &str,
        filter: &Filter,
        sort: &[SortKey],
        pagination: Option<Pagination>,
        raw: Option<RawPredicate>,
    ) -> CollabResult<Vec<Row>> {
        let guard = self.lock();
        let Some(table) = guard.tables.get(table) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<Row> = table
            .rows
            .iter()
            .filter(|row| matches(filter, &row.attrs))
            .filter(|row| raw.is_none_or(|predicate| predicate(&row.attrs)))
            .cloned()
            .collect();

        if !sort.is_empty() {
            rows.sort_by(|a, b| compare(a, b, sort));
        }

        if let Some(page) = pagination {
            rows = rows
                .into_iter()
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .collect();
        }
        Ok(rows)
    }

    async fn update(&self, table: &str, id: Uuid, attrs: Record) -> CollabResult<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        reject_if_read_only(inner)?;

        let rows = inner.tables.get_mut(table).map(|t| &mut t.rows);
        let row = rows
            .and_then(|rows| rows.iter_mut().find(|row| row.id == id))
            .ok_or_else(|| StoreError::RowNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;

        let previous = row.attrs.clone();
        for (name, value) in attrs {
            row.attrs.insert(name, value);
        }

        if let Some(txn) = &mut inner.txn {
            txn.journal.push(UndoOp::Update {
                table: table.to_string(),
                id,
                previous,
            });
        }
        Ok(())
    }

    async fn delete_row(&self, table: &str, id: Uuid) -> CollabResult<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        reject_if_read_only(inner)?;

        let position = inner
            .tables
            .get_mut(table)
            .and_then(|t| t.position(id))
            .ok_or_else(|| StoreError::RowNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;

        let row = inner
            .tables
            .get_mut(table)
            .map(|t| t.rows.remove(position))
            .ok_or_else(|| StoreError::RowNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;

        if let Some(txn) = &mut inner.txn {
            txn.journal.push(UndoOp::Delete {
                table: table.to_string(),
                position,
                row,
            });
        }
        Ok(())
    }
}

impl TransactionCoordinator for MemoryStore {
    async fn begin(&self, read_only: bool) -> CollabResult<()> {
        let mut guard = self.lock();
        match &mut guard.txn {
            Some(txn) => {
                txn.depth += 1;
                debug!(depth = txn.depth, "joined enclosing transaction");
            }
            None => {
                guard.txn = Some(Txn {
                    depth: 1,
                    read_only,
                    journal: Vec::new(),
                });
                debug!(read_only, "transaction started");
            }
        }
        Ok(())
    }

    async fn commit(&self) -> CollabResult<()> {
        let mut guard = self.lock();
        let txn = guard
            .txn
            .as_mut()
            .ok_or(StoreError::CommitWithoutTransaction)?;
        txn.depth -= 1;
        if txn.depth == 0 {
            guard.txn = None;
            debug!("transaction committed");
        }
        Ok(())
    }

    async fn abort(&self) -> CollabResult<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        // Aborting with no open transaction is a no-op so that every
        // enclosing layer can abort again on the way out.
        let Some(txn) = inner.txn.take() else {
            return Ok(());
        };
        for op in txn.journal.into_iter().rev() {
            apply_undo(&mut inner.tables, op);
        }
        debug!("transaction aborted");
        Ok(())
    }
}
