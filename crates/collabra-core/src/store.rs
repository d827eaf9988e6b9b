//! Entity-store contract consumed by the model layer.
//!
//! The store holds generic records keyed by server-assigned ids and
//! answers filter queries with comparison operators (equal, like,
//! in-set). Implementations live outside this crate; the model layer is
//! generic over the trait the same way services are generic over their
//! repositories.

use uuid::Uuid;

use crate::error::CollabResult;
use crate::txn::TransactionCoordinator;
use crate::value::{Record, Value};

/// Comparison predicate for a single attribute.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Exact match. `Equal(Value::Null)` matches absent attributes too.
    Equal(Value),
    /// Case-insensitive substring match on text attributes.
    Like(String),
    /// Set membership.
    In(Vec<Value>),
}

/// Conjunction of per-attribute predicates.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    predicates: Vec<(String, Predicate)>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn eq(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates
            .push((attribute.into(), Predicate::Equal(value.into())));
        self
    }

    pub fn like(mut self, attribute: impl Into<String>, needle: impl Into<String>) -> Self {
        self.predicates
            .push((attribute.into(), Predicate::Like(needle.into())));
        self
    }

    pub fn in_set(mut self, attribute: impl Into<String>, values: Vec<Value>) -> Self {
        self.predicates
            .push((attribute.into(), Predicate::In(values)));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Predicate)> {
        self.predicates.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One sort criterion; earlier keys take precedence.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub attribute: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(attribute: impl Into<String>) -> Self {
        SortKey {
            attribute: attribute.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(attribute: impl Into<String>) -> Self {
        SortKey {
            attribute: attribute.into(),
            direction: Direction::Desc,
        }
    }
}

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// Escape hatch for predicates the [`Filter`] language cannot express.
pub type RawPredicate = fn(&Record) -> bool;

/// A stored row: server-assigned id plus its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: Uuid,
    pub attrs: Record,
}

/// Generic persistence for typed records.
///
/// Rows come back in deterministic insertion order absent an explicit
/// sort. `update` merges only the provided keys; writing `Value::Null`
/// is an explicit set-to-null, distinct from leaving a key unset.
pub trait EntityStore: Send + Sync {
    fn insert(&self, table: &str, attrs: Record) -> impl Future<Output = CollabResult<Uuid>> + Send;

    fn find_by(
        &self,
        table: &str,
        filter: &Filter,
        sort: &[SortKey],
        pagination: Option<Pagination>,
        raw: Option<RawPredicate>,
    ) -> impl Future<Output = CollabResult<Vec<Row>>> + Send;

    fn update(
        &self,
        table: &str,
        id: Uuid,
        attrs: Record,
    ) -> impl Future<Output = CollabResult<()>> + Send;

    fn delete_row(&self, table: &str, id: Uuid) -> impl Future<Output = CollabResult<()>> + Send;
}

/// Combined bound for a store that also coordinates its transactions.
pub trait Backend: EntityStore + TransactionCoordinator {}

impl<T: EntityStore + TransactionCoordinator> Backend for T {}
