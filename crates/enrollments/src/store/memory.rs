use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    Condition, FieldPath, FieldUpdate, Item, PageToken, RecordStore, ScanPage, StoreError,
    UpdateAction, WriteOp,
};

#[derive(Debug, Clone)]
struct MemoryTable {
    key_field: String,
    items: BTreeMap<String, Item>,
}

/// Process-local [`RecordStore`] with the same conditional semantics a hosted
/// document store offers. Items are kept in key order so scans are stable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, MemoryTable>>,
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table whose items carry their key under `key_field`.
    /// Re-creating an existing table keeps its contents.
    pub fn create_table(&self, name: &str, key_field: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables
            .entry(name.to_string())
            .or_insert_with(|| MemoryTable {
                key_field: key_field.to_string(),
                items: BTreeMap::new(),
            });
        Ok(())
    }

    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn len(&self, table: &str) -> Result<usize, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        tables
            .get(table)
            .map(|t| t.items.len())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }
}

fn table_mut<'a>(
    tables: &'a mut HashMap<String, MemoryTable>,
    name: &str,
) -> Result<&'a mut MemoryTable, StoreError> {
    tables
        .get_mut(name)
        .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
}

/// Walks to the object holding the last path segment.
fn parent_object<'a>(
    item: &'a mut Item,
    path: &FieldPath,
    create: bool,
) -> Result<Option<(&'a mut Item, String)>, StoreError> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Err(StoreError::InvalidUpdate {
            path: path.to_string(),
            detail: "empty path".to_string(),
        });
    };

    let mut current = item;
    for segment in parents {
        if create && !current.contains_key(segment) {
            current.insert(segment.clone(), Value::Object(Item::new()));
        }
        match current.get_mut(segment) {
            Some(Value::Object(next)) => current = next,
            Some(_) => {
                return Err(StoreError::InvalidUpdate {
                    path: path.to_string(),
                    detail: format!("'{segment}' is not an object"),
                })
            }
            None => return Ok(None),
        }
    }

    Ok(Some((current, last.clone())))
}

fn apply_update(item: &mut Item, update: &FieldUpdate) -> Result<(), StoreError> {
    let path = &update.path;
    match &update.action {
        UpdateAction::Set(value) => {
            if let Some((parent, field)) = parent_object(item, path, true)? {
                parent.insert(field, value.clone());
            }
        }
        UpdateAction::Remove => {
            if let Some((parent, field)) = parent_object(item, path, false)? {
                parent.remove(&field);
            }
        }
        UpdateAction::Append(value) => {
            if let Some((parent, field)) = parent_object(item, path, true)? {
                let slot = parent
                    .entry(field)
                    .or_insert_with(|| Value::Array(Vec::new()));
                match slot {
                    Value::Array(values) => values.push(value.clone()),
                    _ => {
                        return Err(StoreError::InvalidUpdate {
                            path: path.to_string(),
                            detail: "append target is not a list".to_string(),
                        })
                    }
                }
            }
        }
        UpdateAction::RemoveValue(value) => {
            if let Some((parent, field)) = parent_object(item, path, false)? {
                if let Some(Value::Array(values)) = parent.get_mut(&field) {
                    values.retain(|existing| existing != value);
                }
            }
        }
    }
    Ok(())
}

/// Applies a guarded update to `table`. Returns `Ok(false)` when the guard fails.
fn update_in_place(
    table: &mut MemoryTable,
    key: &str,
    updates: &[FieldUpdate],
    condition: Option<&Condition>,
) -> Result<bool, StoreError> {
    let existing = table.items.get(key);
    if let Some(condition) = condition {
        if !condition.evaluate(existing) {
            return Ok(false);
        }
    }

    let mut staged = existing.cloned().unwrap_or_else(|| {
        let mut fresh = Item::new();
        fresh.insert(table.key_field.clone(), Value::String(key.to_string()));
        fresh
    });
    for update in updates {
        apply_update(&mut staged, update)?;
    }
    table.items.insert(key.to_string(), staged);
    Ok(true)
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Item>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let table = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(table.items.get(key).cloned())
    }

    async fn put_if_absent(&self, table: &str, key: &str, item: Item) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let table = table_mut(&mut tables, table)?;
        if table.items.contains_key(key) {
            return Ok(false);
        }
        let mut item = item;
        item.insert(table.key_field.clone(), Value::String(key.to_string()));
        table.items.insert(key.to_string(), item);
        Ok(true)
    }

    async fn update(
        &self,
        table: &str,
        key: &str,
        updates: Vec<FieldUpdate>,
        condition: Option<Condition>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let table = table_mut(&mut tables, table)?;
        update_in_place(table, key, &updates, condition.as_ref())
    }

    async fn scan(
        &self,
        table: &str,
        filter: Option<&Condition>,
        start: Option<&PageToken>,
        page_size: usize,
    ) -> Result<ScanPage, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let table = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let lower = match start {
            Some(token) => Bound::Excluded(token.0.clone()),
            None => Bound::Unbounded,
        };
        let mut remaining = table.items.range((lower, Bound::Unbounded));

        let mut page = ScanPage::default();
        let mut last_evaluated = None;
        for (key, item) in remaining.by_ref().take(page_size.max(1)) {
            last_evaluated = Some(key.clone());
            if filter.map_or(true, |condition| condition.evaluate(Some(item))) {
                page.items.push((key.clone(), item.clone()));
            }
        }

        if remaining.next().is_some() {
            page.next = last_evaluated.map(PageToken);
        }
        Ok(page)
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let table = table_mut(&mut tables, table)?;
        Ok(table.items.remove(key).is_some())
    }

    async fn transact(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;

        let mut staged: HashMap<String, MemoryTable> = HashMap::new();
        for op in &ops {
            let name = match op {
                WriteOp::Delete { table, .. } | WriteOp::Update { table, .. } => table,
            };
            if !staged.contains_key(name) {
                let current = tables
                    .get(name)
                    .ok_or_else(|| StoreError::UnknownTable(name.clone()))?;
                staged.insert(name.clone(), current.clone());
            }
        }

        for op in &ops {
            match op {
                WriteOp::Delete { table, key } => {
                    table_mut(&mut staged, table)?.items.remove(key);
                }
                WriteOp::Update {
                    table,
                    key,
                    updates,
                    condition,
                } => {
                    let applied =
                        update_in_place(table_mut(&mut staged, table)?, key, updates, condition.as_ref())?;
                    if !applied {
                        return Err(StoreError::TransactionCancelled(format!(
                            "condition failed for '{key}' in '{table}'"
                        )));
                    }
                }
            }
        }

        tables.extend(staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table("users", "email").expect("table");
        store
    }

    fn item(value: Value) -> Item {
        value.as_object().expect("object").clone()
    }

    #[tokio::test]
    async fn put_if_absent_keeps_the_first_item() {
        let store = store();
        let first = store
            .put_if_absent("users", "a@x.com", item(json!({ "name": "first" })))
            .await
            .expect("put");
        let second = store
            .put_if_absent("users", "a@x.com", item(json!({ "name": "second" })))
            .await
            .expect("put");

        assert!(first);
        assert!(!second);
        let stored = store.get("users", "a@x.com").await.expect("get").expect("item");
        assert_eq!(stored["name"], json!("first"));
        assert_eq!(stored["email"], json!("a@x.com"));
    }

    #[tokio::test]
    async fn update_creates_nested_objects_and_honors_conditions() {
        let store = store();
        let path = FieldPath::new(["rounds", "2", "answers"]);

        let written = store
            .update(
                "users",
                "a@x.com",
                vec![FieldUpdate::set(path.clone(), json!(["first"]))],
                Some(Condition::NotExists(path.clone())),
            )
            .await
            .expect("update");
        let rejected = store
            .update(
                "users",
                "a@x.com",
                vec![FieldUpdate::set(path.clone(), json!(["second"]))],
                Some(Condition::NotExists(path.clone())),
            )
            .await
            .expect("update");

        assert!(written);
        assert!(!rejected);
        let stored = store.get("users", "a@x.com").await.expect("get").expect("item");
        assert_eq!(path.lookup(&stored), Some(&json!(["first"])));
    }

    #[tokio::test]
    async fn append_and_remove_value_edit_lists() {
        let store = store();
        let path = FieldPath::new(["rounds", "1", "submitted"]);
        for value in ["WEB", "APP", "WEB"] {
            store
                .update(
                    "users",
                    "a@x.com",
                    vec![FieldUpdate::append(path.clone(), json!(value))],
                    None,
                )
                .await
                .expect("append");
        }
        store
            .update(
                "users",
                "a@x.com",
                vec![FieldUpdate::remove_value(path.clone(), json!("WEB"))],
                None,
            )
            .await
            .expect("remove");

        let stored = store.get("users", "a@x.com").await.expect("get").expect("item");
        assert_eq!(path.lookup(&stored), Some(&json!(["APP"])));
    }

    #[tokio::test]
    async fn append_onto_scalar_is_rejected() {
        let store = store();
        store
            .put_if_absent("users", "a@x.com", item(json!({ "tags": "x" })))
            .await
            .expect("put");

        let err = store
            .update(
                "users",
                "a@x.com",
                vec![FieldUpdate::append(FieldPath::new(["tags"]), json!("y"))],
                None,
            )
            .await
            .expect_err("scalar append fails");
        assert!(matches!(err, StoreError::InvalidUpdate { .. }));
    }

    #[tokio::test]
    async fn scan_pages_by_evaluated_items() {
        let store = store();
        for n in 0..5 {
            let key = format!("user{n}@x.com");
            store
                .put_if_absent("users", &key, item(json!({ "even": n % 2 == 0 })))
                .await
                .expect("put");
        }
        let filter = Condition::Equals(FieldPath::new(["even"]), json!(true));

        let first = store
            .scan("users", Some(&filter), None, 2)
            .await
            .expect("scan");
        assert_eq!(first.items.len(), 1);
        let token = first.next.clone().expect("more pages");

        let second = store
            .scan("users", Some(&filter), Some(&token), 2)
            .await
            .expect("scan");
        assert_eq!(second.items.len(), 1);

        let third = store
            .scan("users", Some(&filter), second.next.as_ref(), 2)
            .await
            .expect("scan");
        assert_eq!(third.items.len(), 1);
        assert!(third.next.is_none());
    }

    #[tokio::test]
    async fn transaction_is_all_or_nothing() {
        let store = store();
        store.create_table("web", "email").expect("table");
        store
            .put_if_absent("web", "a@x.com", item(json!({ "score": 1 })))
            .await
            .expect("put");

        let err = store
            .transact(vec![
                WriteOp::Delete {
                    table: "web".to_string(),
                    key: "a@x.com".to_string(),
                },
                WriteOp::Update {
                    table: "users".to_string(),
                    key: "a@x.com".to_string(),
                    updates: Vec::new(),
                    condition: Some(Condition::Exists(FieldPath::new(["email"]))),
                },
            ])
            .await
            .expect_err("missing user cancels");

        assert!(matches!(err, StoreError::TransactionCancelled(_)));
        assert!(store.get("web", "a@x.com").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn unknown_tables_are_reported() {
        let store = store();
        let err = store.get("missing", "k").await.expect_err("unknown");
        assert_eq!(err, StoreError::UnknownTable("missing".to_string()));
    }
}
