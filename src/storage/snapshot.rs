//! JSON snapshot persistence for the in-memory base.
//!
//! Snapshots are written atomically: the serialized state goes to a
//! temporary file in the target directory first, then replaces the
//! destination in one rename.

use super::memory::{InMemoryBase, Table};
use crate::core::{CrudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use tracing::info;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct BaseSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub tables: HashMap<String, Table>,
}

impl InMemoryBase {
    /// Serializes the whole base to `path`. Refuses to run while a
    /// transaction is open, since the undo log is not part of a snapshot.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        use super::CrudBase;

        if self.in_transaction() {
            return Err(CrudError::Storage(
                "cannot snapshot while a transaction is open".into(),
            ));
        }

        let snapshot = BaseSnapshot {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            tables: self.tables().clone(),
        };

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, &snapshot)?;
        tmp.flush()?;
        tmp.persist(path)
            .map_err(|e| CrudError::IoError(e.to_string()))?;

        info!(
            path = %path.display(),
            tables = snapshot.tables.len(),
            "saved base snapshot"
        );
        Ok(())
    }

    /// Rebuilds a base from a snapshot written by `save_snapshot`.
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let snapshot: BaseSnapshot = serde_json::from_reader(BufReader::new(file))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CrudError::Storage(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        info!(
            path = %path.display(),
            tables = snapshot.tables.len(),
            "loaded base snapshot"
        );
        Ok(Self::restore_tables(snapshot.tables))
    }
}
