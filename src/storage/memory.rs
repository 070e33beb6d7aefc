use super::CrudBase;
use crate::core::{CrudError, Result};
use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Record fields as stored and exchanged with commands.
pub type Fields = serde_json::Map<String, Value>;

/// Primary key of a stored record. Integer keys sort numerically and can be
/// assigned by the table's counter; text keys are caller-supplied.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKey {
    Int(i64),
    Text(String),
}

impl RecordKey {
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int).ok_or_else(|| {
                CrudError::Storage(format!("unsupported primary key number: {n}"))
            }),
            Value::String(s) => Ok(Self::Text(s.clone())),
            other => Err(CrudError::Storage(format!(
                "unsupported primary key value: {other}"
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

// Keys serialize as tagged strings ("i:42", "t:slug") so row maps stay plain
// JSON objects in snapshots.
impl Serialize for RecordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Int(i) => serializer.serialize_str(&format!("i:{i}")),
            Self::Text(s) => serializer.serialize_str(&format!("t:{s}")),
        }
    }
}

impl<'de> Deserialize<'de> for RecordKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = RecordKey;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a record key of the form 'i:<n>' or 't:<text>'")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<RecordKey, E> {
                if let Some(rest) = v.strip_prefix("i:") {
                    rest.parse::<i64>()
                        .map(RecordKey::Int)
                        .map_err(|_| E::custom(format!("bad integer key: {v}")))
                } else if let Some(rest) = v.strip_prefix("t:") {
                    Ok(RecordKey::Text(rest.to_string()))
                } else {
                    Err(E::custom(format!("bad record key: {v}")))
                }
            }
        }

        deserializer.deserialize_str(KeyVisitor)
    }
}

/// A stored record plus bookkeeping metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRow {
    pub fields: Fields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRow {
    fn new(fields: Fields) -> Self {
        let now = Utc::now();
        Self {
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, fields: Fields) {
        self.fields = fields;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub primary_key: String,
    next_id: i64,
    rows: BTreeMap<RecordKey, StoredRow>,
}

impl Table {
    fn new(name: &str, primary_key: &str) -> Self {
        Self {
            name: name.to_string(),
            primary_key: primary_key.to_string(),
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A reversible change recorded while a transaction is open. Rollback
/// applies these in reverse.
#[derive(Debug)]
enum Change {
    Insert {
        table: String,
        key: RecordKey,
        prev_next_id: i64,
    },
    Update {
        table: String,
        key: RecordKey,
        old_row: StoredRow,
    },
    Delete {
        table: String,
        key: RecordKey,
        old_row: StoredRow,
    },
    CreateTable {
        name: String,
    },
}

/// The provided storage backend: tables of JSON records with an undo-log
/// transaction discipline and snapshot save/load.
#[derive(Debug, Default)]
pub struct InMemoryBase {
    tables: HashMap<String, Table>,
    undo_log: Vec<Change>,
    tx_depth: usize,
}

impl InMemoryBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.row_count())
    }

    pub(crate) fn tables(&self) -> &HashMap<String, Table> {
        &self.tables
    }

    pub(crate) fn restore_tables(tables: HashMap<String, Table>) -> Self {
        Self {
            tables,
            undo_log: Vec::new(),
            tx_depth: 0,
        }
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| CrudError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| CrudError::TableNotFound(name.to_string()))
    }

    fn record(&mut self, change: Change) {
        if self.tx_depth > 0 {
            self.undo_log.push(change);
        }
    }

    fn undo(&mut self, change: Change) {
        match change {
            Change::Insert {
                table,
                key,
                prev_next_id,
            } => {
                if let Some(table) = self.tables.get_mut(&table) {
                    table.rows.remove(&key);
                    table.next_id = prev_next_id;
                }
            }
            Change::Update { table, key, old_row } => {
                if let Some(table) = self.tables.get_mut(&table) {
                    table.rows.insert(key, old_row);
                }
            }
            Change::Delete { table, key, old_row } => {
                if let Some(table) = self.tables.get_mut(&table) {
                    table.rows.insert(key, old_row);
                }
            }
            Change::CreateTable { name } => {
                self.tables.remove(&name);
            }
        }
    }
}

impl CrudBase for InMemoryBase {
    fn create_table(&mut self, name: &str, primary_key: &str) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(CrudError::TableExists(name.to_string()));
        }
        self.tables
            .insert(name.to_string(), Table::new(name, primary_key));
        self.record(Change::CreateTable {
            name: name.to_string(),
        });
        Ok(())
    }

    fn ensure_table(&mut self, name: &str, primary_key: &str) -> Result<()> {
        if self.tables.contains_key(name) {
            return Ok(());
        }
        self.create_table(name, primary_key)
    }

    fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn insert(&mut self, table_name: &str, mut fields: Fields) -> Result<Fields> {
        let table = self.table_mut(table_name)?;
        let prev_next_id = table.next_id;
        let primary_key = table.primary_key.clone();

        let key = match fields.get(&primary_key) {
            Some(value) if !value.is_null() => {
                let key = RecordKey::from_value(value)?;
                if let RecordKey::Int(i) = key {
                    table.next_id = table.next_id.max(i + 1);
                }
                key
            }
            _ => {
                let key = RecordKey::Int(table.next_id);
                table.next_id += 1;
                fields.insert(primary_key.clone(), key.to_value());
                key
            }
        };

        if table.rows.contains_key(&key) {
            table.next_id = prev_next_id;
            return Err(CrudError::Storage(format!(
                "duplicate primary key '{key}' in table '{table_name}'"
            )));
        }
        table.rows.insert(key.clone(), StoredRow::new(fields.clone()));
        self.record(Change::Insert {
            table: table_name.to_string(),
            key,
            prev_next_id,
        });
        Ok(fields)
    }

    fn get(&self, table: &str, key: &RecordKey) -> Result<Option<Fields>> {
        Ok(self.table(table)?.rows.get(key).map(|row| row.fields.clone()))
    }

    fn update(&mut self, table_name: &str, key: &RecordKey, fields: Fields) -> Result<()> {
        let table = self.table_mut(table_name)?;
        let row = table.rows.get_mut(key).ok_or_else(|| {
            CrudError::Storage(format!(
                "no record '{key}' in table '{table_name}' to update"
            ))
        })?;
        let old_row = row.clone();
        row.touch(fields);
        self.record(Change::Update {
            table: table_name.to_string(),
            key: key.clone(),
            old_row,
        });
        Ok(())
    }

    fn delete(&mut self, table_name: &str, key: &RecordKey) -> Result<Option<Fields>> {
        let table = self.table_mut(table_name)?;
        match table.rows.remove(key) {
            Some(old_row) => {
                let fields = old_row.fields.clone();
                self.record(Change::Delete {
                    table: table_name.to_string(),
                    key: key.clone(),
                    old_row,
                });
                Ok(Some(fields))
            }
            None => Ok(None),
        }
    }

    fn scan(&self, table: &str) -> Result<Vec<Fields>> {
        Ok(self
            .table(table)?
            .rows
            .values()
            .map(|row| row.fields.clone())
            .collect())
    }

    fn begin(&mut self) {
        self.tx_depth += 1;
    }

    fn commit(&mut self) -> Result<()> {
        if self.tx_depth == 0 {
            return Err(CrudError::Storage("commit without open transaction".into()));
        }
        self.tx_depth -= 1;
        if self.tx_depth == 0 {
            self.undo_log.clear();
        }
        Ok(())
    }

    fn rollback(&mut self) {
        while let Some(change) = self.undo_log.pop() {
            self.undo(change);
        }
        self.tx_depth = 0;
    }

    fn in_transaction(&self) -> bool {
        self.tx_depth > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    fn base_with_users() -> InMemoryBase {
        let mut base = InMemoryBase::new();
        base.create_table("User", "id").unwrap();
        base
    }

    #[test]
    fn insert_assigns_integer_keys_in_order() {
        let mut base = base_with_users();
        let first = base.insert("User", fields(json!({"name": "a"}))).unwrap();
        let second = base.insert("User", fields(json!({"name": "b"}))).unwrap();
        assert_eq!(first["id"], json!(1));
        assert_eq!(second["id"], json!(2));

        let all = base.scan("User").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["name"], json!("a"));
    }

    #[test]
    fn insert_respects_caller_supplied_keys() {
        let mut base = base_with_users();
        base.insert("User", fields(json!({"id": 10, "name": "x"})))
            .unwrap();
        let next = base.insert("User", fields(json!({"name": "y"}))).unwrap();
        assert_eq!(next["id"], json!(11));

        let duplicate = base.insert("User", fields(json!({"id": 10})));
        assert!(matches!(duplicate, Err(CrudError::Storage(_))));
    }

    #[test]
    fn rollback_reverses_all_changes() {
        let mut base = base_with_users();
        base.insert("User", fields(json!({"name": "kept"}))).unwrap();

        base.begin();
        base.insert("User", fields(json!({"name": "dropped"}))).unwrap();
        base.update(
            "User",
            &RecordKey::Int(1),
            fields(json!({"id": 1, "name": "mutated"})),
        )
        .unwrap();
        base.create_table("Review", "id").unwrap();
        base.rollback();

        assert_eq!(base.row_count("User").unwrap(), 1);
        let kept = base.get("User", &RecordKey::Int(1)).unwrap().unwrap();
        assert_eq!(kept["name"], json!("kept"));
        assert!(!base.table_exists("Review"));

        // The assigned-id counter rewinds with the insert.
        let reinserted = base.insert("User", fields(json!({"name": "again"}))).unwrap();
        assert_eq!(reinserted["id"], json!(2));
    }

    #[test]
    fn inner_begin_joins_outer_transaction() {
        let mut base = base_with_users();
        base.begin();
        base.insert("User", fields(json!({"name": "outer"}))).unwrap();

        base.begin();
        base.insert("User", fields(json!({"name": "inner"}))).unwrap();
        base.commit().unwrap();
        assert!(base.in_transaction());

        base.rollback();
        assert_eq!(base.row_count("User").unwrap(), 0);
    }

    #[test]
    fn record_keys_round_trip_through_serde() {
        for key in [RecordKey::Int(42), RecordKey::Text("slug".into())] {
            let encoded = serde_json::to_string(&key).unwrap();
            let decoded: RecordKey = serde_json::from_str(&encoded).unwrap();
            assert_eq!(key, decoded);
        }
    }
}
