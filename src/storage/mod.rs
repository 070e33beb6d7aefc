pub mod memory;
pub mod snapshot;

pub use memory::{Fields, InMemoryBase, RecordKey, StoredRow, Table};
pub use snapshot::BaseSnapshot;

use crate::core::Result;

/// Storage backend boundary - allows pluggable bases.
///
/// Transactions use join-not-nest semantics: an inner `begin` joins the
/// already-open transaction and only the outermost `commit` makes the
/// buffered work permanent. `rollback` discards the whole open transaction.
pub trait CrudBase {
    /// Create a table keyed by `primary_key`.
    fn create_table(&mut self, name: &str, primary_key: &str) -> Result<()>;

    /// Create a table unless it already exists.
    fn ensure_table(&mut self, name: &str, primary_key: &str) -> Result<()>;

    fn table_exists(&self, name: &str) -> bool;

    /// Insert a record. An absent integer primary key is assigned by the
    /// table's counter. Returns the stored fields including the key.
    fn insert(&mut self, table: &str, fields: Fields) -> Result<Fields>;

    fn get(&self, table: &str, key: &RecordKey) -> Result<Option<Fields>>;

    /// Replace the fields of an existing record.
    fn update(&mut self, table: &str, key: &RecordKey, fields: Fields) -> Result<()>;

    /// Remove a record, returning its last fields.
    fn delete(&mut self, table: &str, key: &RecordKey) -> Result<Option<Fields>>;

    /// All records in key order (insertion order for assigned integer keys).
    fn scan(&self, table: &str) -> Result<Vec<Fields>>;

    fn begin(&mut self);
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self);
    fn in_transaction(&self) -> bool;
}
