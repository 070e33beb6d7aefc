//! # CrudForge
//!
//! Declarative entity registry that synthesizes named CRUD command
//! families and rebuilds them from a persisted type ledger.
//!
//! Declare an entity once and the engine derives its whole command family
//! (create, find, find-by, query, atomic and aggregate update, hard
//! delete, collection append/remove) bound into the entity's domain. Every
//! registration is persisted, so `install` rebuilds the full type graph and
//! all commands at process startup.
//!
//! # Examples
//!
//! ```
//! use crudforge::{AttrDecl, CrudEngine, EntityBuilder, InMemoryBase};
//! use serde_json::json;
//!
//! # fn main() -> crudforge::Result<()> {
//! let mut engine = CrudEngine::with_base(InMemoryBase::new());
//! engine.install()?;
//!
//! EntityBuilder::new("User")
//!     .attribute("id", AttrDecl::integer())
//!     .attribute("first_name", AttrDecl::text())
//!     .create(&mut engine)?;
//!
//! let outcome = engine.run("CreateUser", &json!({"first_name": "Ada"}))?;
//! assert!(outcome.is_success());
//!
//! let found = engine.run("FindUser", &json!({"id": 1}))?;
//! assert_eq!(found.result().unwrap()["first_name"], json!("Ada"));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod aggregate;
pub mod builder;
pub mod command;
pub mod core;
pub mod domain;
pub mod engine;
pub mod ledger;
pub mod registrar;
pub mod schema;
pub mod storage;
pub mod synth;

mod fieldpath;

// Re-export main types for convenience
pub use builder::{AttrDecl, EntityBuilder};
pub use command::{
    CommandKind, CommandRegistry, CommandSpec, Failure, FailureKind, FieldContract, FieldKind,
    Outcome, PayloadSchema, ResultContract,
};
pub use core::{CrudError, Result};
pub use domain::{Domain, DomainRegistry};
pub use engine::{CrudEngine, RegistryContext};
pub use ledger::{LEDGER_TABLE, PersistedTypeRecord, ReplayStats, TypeLedger};
pub use registrar::{RegisteredType, TypeRegistrar};
pub use schema::{
    Association, AttrType, AttributeDef, Cardinality, CompiledType, EntityDescriptor, EntityIndex,
    TypeId, TypeKind,
};
pub use storage::{BaseSnapshot, CrudBase, Fields, InMemoryBase, RecordKey, StoredRow};
