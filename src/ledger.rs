//! The type ledger.
//!
//! Every new registration is written to the `persisted_types` table as a
//! `PersistedTypeRecord`, so the whole type graph and its synthesized
//! commands can be rebuilt by replaying the ledger at startup. Records
//! are written once, read in bulk, and never updated or deleted here.

use crate::core::{CrudError, Result};
use crate::engine::RegistryContext;
use crate::registrar::{RegisteredType, TypeRegistrar};
use crate::storage::{CrudBase, Fields};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Reserved table holding one record per registered type declaration.
pub const LEDGER_TABLE: &str = "persisted_types";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTypeRecord {
    /// Assigned by storage on insert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// The post-compilation canonical declaration.
    pub type_declaration: Value,
    pub type_symbol: String,
    /// Scoped domain name; absent means the global domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_domain_name: Option<String>,
}

impl PersistedTypeRecord {
    pub fn from_fields(fields: &Fields) -> Result<Self> {
        serde_json::from_value(Value::Object(fields.clone()))
            .map_err(|e| CrudError::Storage(format!("malformed ledger record: {e}")))
    }

    pub fn to_fields(&self) -> Fields {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => Fields::new(),
        }
    }
}

/// Counters reported by a ledger replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub types_rebuilt: usize,
    pub entities: usize,
    pub commands_bound: usize,
}

/// Wraps the registrar with transactional persistence and startup replay.
pub struct TypeLedger<'a> {
    ctx: &'a mut RegistryContext,
    base: &'a mut dyn CrudBase,
}

impl<'a> TypeLedger<'a> {
    pub fn new(ctx: &'a mut RegistryContext, base: &'a mut dyn CrudBase) -> Self {
        Self { ctx, base }
    }

    /// Registers a declaration and writes its ledger record atomically with
    /// the registration's visible effects: the write joins an already-open
    /// transaction, and a failed write unwinds the registration so no
    /// half-registered type is observable.
    ///
    /// Re-registering a structurally identical declaration writes no second
    /// record; duplicate suppression is keyed by type identity.
    pub fn persist_and_build(
        &mut self,
        declaration: &Value,
        symbol: Option<&str>,
        domain: Option<&str>,
    ) -> Result<RegisteredType> {
        self.base.begin();

        let registered = match TypeRegistrar::new(self.ctx).register(declaration, symbol, domain)
        {
            Ok(registered) => registered,
            Err(e) => {
                self.base.rollback();
                return Err(e);
            }
        };

        if registered.newly_registered {
            if let Err(e) = self.write_record(&registered) {
                self.ctx.unregister(&registered);
                self.base.rollback();
                return Err(e);
            }
        }

        self.base.commit()?;
        Ok(registered)
    }

    fn write_record(&mut self, registered: &RegisteredType) -> Result<()> {
        self.base.ensure_table(LEDGER_TABLE, "id")?;
        let record = PersistedTypeRecord {
            id: None,
            type_declaration: registered.compiled.declaration.clone(),
            type_symbol: registered.symbol.clone(),
            full_domain_name: registered.domain_name().map(str::to_string),
        };
        let stored = self.base.insert(LEDGER_TABLE, record.to_fields())?;
        debug!(
            symbol = %registered.symbol,
            id = stored.get("id").and_then(|v| v.as_i64()),
            "persisted type record"
        );
        Ok(())
    }

    /// Rebuilds the type graph from the ledger, re-synthesizing commands as
    /// a registration side effect. Safe to run repeatedly against an
    /// unchanged ledger; a ledger whose declarations changed meanwhile may
    /// surface `SymbolMismatch`.
    pub fn replay_all(&mut self) -> Result<ReplayStats> {
        self.base.ensure_table(LEDGER_TABLE, "id")?;

        let mut stats = ReplayStats::default();
        for fields in self.base.scan(LEDGER_TABLE)? {
            let record = PersistedTypeRecord::from_fields(&fields)?;
            let registered = TypeRegistrar::new(self.ctx).register(
                &record.type_declaration,
                Some(&record.type_symbol),
                record.full_domain_name.as_deref(),
            )?;
            stats.types_rebuilt += 1;
            if registered.entity.is_some() {
                stats.entities += 1;
            }
            stats.commands_bound += registered.synthesized.len();
        }

        info!(
            types = stats.types_rebuilt,
            entities = stats.entities,
            commands = stats.commands_bound,
            "replayed type ledger"
        );
        Ok(stats)
    }

    /// The startup entrypoint: registers the ledger's own record table
    /// against storage, then replays the full ledger.
    pub fn install(&mut self) -> Result<ReplayStats> {
        self.base.ensure_table(LEDGER_TABLE, "id")?;
        self.replay_all()
    }
}
