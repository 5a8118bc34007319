//! Record store port.
//!
//! The workflow never talks to a concrete database. Every invariant that must
//! survive concurrent service instances (first-write-wins answers, ledger
//! de-duplication, username uniqueness) is expressed as a [`Condition`] that the
//! store evaluates atomically together with the write it guards.

mod condition;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use condition::Condition;
pub use memory::MemoryStore;

/// A stored document. Items are JSON objects; nested objects are addressable by [`FieldPath`].
pub type Item = serde_json::Map<String, Value>;

/// Dotted path into a nested item, e.g. `rounds.2.answers`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Resolves the path inside `item`, returning `None` when any segment is missing.
    pub fn lookup<'a>(&self, item: &'a Item) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        let mut current = item.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Mutation applied to a single field of an item.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// Replace the value, creating intermediate objects as needed.
    Set(Value),
    /// Delete the field if present.
    Remove,
    /// Push onto a list, creating it when absent.
    Append(Value),
    /// Drop every list element equal to the value.
    RemoveValue(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub path: FieldPath,
    pub action: UpdateAction,
}

impl FieldUpdate {
    pub fn set(path: FieldPath, value: Value) -> Self {
        Self {
            path,
            action: UpdateAction::Set(value),
        }
    }

    pub fn remove(path: FieldPath) -> Self {
        Self {
            path,
            action: UpdateAction::Remove,
        }
    }

    pub fn append(path: FieldPath, value: Value) -> Self {
        Self {
            path,
            action: UpdateAction::Append(value),
        }
    }

    pub fn remove_value(path: FieldPath, value: Value) -> Self {
        Self {
            path,
            action: UpdateAction::RemoveValue(value),
        }
    }
}

/// Opaque continuation marker handed out by [`RecordStore::scan`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(pub String);

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One store-side scan page. `next` is `None` once the table is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub items: Vec<(String, Item)>,
    pub next: Option<PageToken>,
}

/// A single write inside [`RecordStore::transact`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    Delete {
        table: String,
        key: String,
    },
    Update {
        table: String,
        key: String,
        updates: Vec<FieldUpdate>,
        condition: Option<Condition>,
    },
}

/// Storage failures. Only [`StoreError::Unavailable`] is worth retrying.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("invalid update on '{path}': {detail}")]
    InvalidUpdate { path: String, detail: String },
    #[error("transaction cancelled: {0}")]
    TransactionCancelled(String),
    #[error("malformed item: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Malformed(value.to_string())
    }
}

/// Backend contract shared by every table.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Item>, StoreError>;

    /// Writes `item` only when no item exists under `key`. Returns `false` when one did.
    async fn put_if_absent(&self, table: &str, key: &str, item: Item) -> Result<bool, StoreError>;

    /// Applies `updates` atomically when `condition` holds, creating the item if missing.
    /// Returns `false` (and writes nothing) when the condition fails.
    async fn update(
        &self,
        table: &str,
        key: &str,
        updates: Vec<FieldUpdate>,
        condition: Option<Condition>,
    ) -> Result<bool, StoreError>;

    /// Evaluates at most `page_size` items after `start`, returning those matching `filter`.
    async fn scan(
        &self,
        table: &str,
        filter: Option<&Condition>,
        start: Option<&PageToken>,
        page_size: usize,
    ) -> Result<ScanPage, StoreError>;

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StoreError>;

    /// Applies every write or none of them.
    async fn transact(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;
}

/// Handle bound to one table of a shared store.
#[derive(Clone)]
pub struct Table {
    store: Arc<dyn RecordStore>,
    name: String,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("name", &self.name).finish()
    }
}

impl Table {
    pub fn new(store: Arc<dyn RecordStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &str) -> Result<Option<Item>, StoreError> {
        self.store.get(&self.name, key).await
    }

    pub async fn put_if_absent(&self, key: &str, item: Item) -> Result<bool, StoreError> {
        self.store.put_if_absent(&self.name, key, item).await
    }

    pub async fn update(
        &self,
        key: &str,
        updates: Vec<FieldUpdate>,
        condition: Option<Condition>,
    ) -> Result<bool, StoreError> {
        self.store.update(&self.name, key, updates, condition).await
    }

    pub async fn scan(
        &self,
        filter: Option<&Condition>,
        start: Option<&PageToken>,
        page_size: usize,
    ) -> Result<ScanPage, StoreError> {
        self.store.scan(&self.name, filter, start, page_size).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.store.delete(&self.name, key).await
    }

    pub fn delete_op(&self, key: &str) -> WriteOp {
        WriteOp::Delete {
            table: self.name.clone(),
            key: key.to_string(),
        }
    }

    pub fn update_op(
        &self,
        key: &str,
        updates: Vec<FieldUpdate>,
        condition: Option<Condition>,
    ) -> WriteOp {
        WriteOp::Update {
            table: self.name.clone(),
            key: key.to_string(),
            updates,
            condition,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}
