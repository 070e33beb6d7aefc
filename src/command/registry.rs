//! The command table.
//!
//! Synthesized commands are data, not types: each entry pairs a generated
//! name with the entity it operates on, the operation kind, a derived input
//! schema, a result contract and the statically declared failure kinds.
//! Execution dispatches on the kind tag (see `command::executor`).

use crate::command::outcome::FailureKind;
use crate::command::payload::PayloadSchema;
use crate::core::{CrudError, Result};
use crate::schema::EntityDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The fixed set of operation kinds a command can be synthesized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Create,
    Find,
    FindBy,
    Query,
    QueryAll,
    UpdateAtom,
    UpdateAggregate,
    HardDelete,
    Append,
    Remove,
}

impl CommandKind {
    /// All kinds, the default synthesis set.
    pub const ALL: [Self; 10] = [
        Self::Create,
        Self::Find,
        Self::FindBy,
        Self::Query,
        Self::QueryAll,
        Self::UpdateAtom,
        Self::UpdateAggregate,
        Self::HardDelete,
        Self::Append,
        Self::Remove,
    ];
}

/// What a successful execution returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultContract {
    /// One instance of the command's entity.
    Instance,
    /// A sequence of instances, possibly empty.
    InstanceList,
    /// One instance of an associated entity.
    Element { entity: String },
}

/// One synthesized command bound to one entity and one kind.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Fully scoped generated name, e.g. `crm.CreateUser`.
    pub name: String,
    pub kind: CommandKind,
    pub entity: Arc<EntityDescriptor>,
    pub input_schema: PayloadSchema,
    pub result: ResultContract,
    /// Business failures this command may collect, declared up front.
    pub possible_failures: Vec<FailureKind>,
    /// Attribute path of the collection for append/remove commands.
    pub collection_path: Option<Vec<String>>,
}

impl CommandSpec {
    /// Two specs describe the same operation when entity, kind and
    /// collection path agree; re-defining such a spec is idempotent.
    fn same_operation(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.collection_path == other.collection_path
            && self.entity.scoped_name() == other.entity.scoped_name()
    }
}

/// Registry of synthesized commands keyed by generated name.
///
/// The registry is add-only: `define` never mutates an existing entry.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandSpec>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command. Defining the identical operation again returns the
    /// existing entry; a name collision with a different operation fails.
    /// The boolean reports whether the entry is new.
    pub fn define(&mut self, spec: CommandSpec) -> Result<bool> {
        if let Some(existing) = self.commands.get(&spec.name) {
            if existing.same_operation(&spec) {
                return Ok(false);
            }
            return Err(CrudError::DuplicateCommand(spec.name));
        }
        self.commands.insert(spec.name.clone(), spec);
        Ok(true)
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Generated names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// All commands bound to one entity, in name order.
    pub fn commands_for_entity(&self, scoped_entity: &str) -> Vec<&CommandSpec> {
        self.commands
            .values()
            .filter(|spec| spec.entity.scoped_name() == scoped_entity)
            .collect()
    }

    /// Removes an entry; only used to unwind a registration whose ledger
    /// write failed.
    pub(crate) fn remove(&mut self, name: &str) {
        self.commands.remove(name);
    }
}
