//! The engine facade and registry context.
//!
//! All registry state (domains, the command table and the entity index)
//! lives in an explicit `RegistryContext` owned by a `CrudEngine`; there is
//! no process-wide global. Tests construct a fresh engine per case.

use crate::command::executor;
use crate::command::outcome::Outcome;
use crate::command::registry::{CommandRegistry, CommandSpec};
use crate::core::{CrudError, Result};
use crate::domain::DomainRegistry;
use crate::ledger::{ReplayStats, TypeLedger};
use crate::registrar::{RegisteredType, TypeRegistrar};
use crate::schema::{EntityDescriptor, EntityIndex};
use crate::storage::CrudBase;
use serde_json::Value;
use std::sync::Arc;

/// Shared registry state mutated by registration and synthesis.
#[derive(Debug, Default)]
pub struct RegistryContext {
    pub domains: DomainRegistry,
    pub commands: CommandRegistry,
    pub entities: EntityIndex,
}

impl RegistryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unwinds a registration whose ledger write failed: unbinds the
    /// symbol, drops the entity descriptor and removes the commands this
    /// registration defined. A no-op for idempotent repeats.
    pub(crate) fn unregister(&mut self, registered: &RegisteredType) {
        if !registered.newly_registered {
            return;
        }
        if let Ok(domain) = self.domains.resolve(registered.domain_name()) {
            domain.unbind(&registered.symbol);
        }
        if let Some(entity) = &registered.entity {
            self.entities.remove(entity);
        }
        for name in &registered.synthesized {
            self.commands.remove(name);
        }
    }
}

/// The recommended entry point: owns the registry context and the storage
/// base, and fronts registration, installation and command execution.
#[derive(Default)]
pub struct CrudEngine {
    ctx: RegistryContext,
    base: Option<Box<dyn CrudBase>>,
}

impl CrudEngine {
    /// An engine with no storage base; persistence-requiring calls fail
    /// with a configuration error until one is set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl CrudBase + 'static) -> Self {
        Self {
            ctx: RegistryContext::new(),
            base: Some(Box::new(base)),
        }
    }

    pub fn set_base(&mut self, base: Box<dyn CrudBase>) {
        self.base = Some(base);
    }

    /// Releases the base, e.g. to hand it to a fresh engine.
    pub fn take_base(&mut self) -> Option<Box<dyn CrudBase>> {
        self.base.take()
    }

    pub fn has_base(&self) -> bool {
        self.base.is_some()
    }

    pub fn base(&self) -> Option<&dyn CrudBase> {
        self.base.as_deref()
    }

    pub fn context(&self) -> &RegistryContext {
        &self.ctx
    }

    // ==================== Registration ====================

    /// Registers a declaration without persisting it.
    pub fn build_type(
        &mut self,
        declaration: &Value,
        symbol: Option<&str>,
        domain: Option<&str>,
    ) -> Result<RegisteredType> {
        TypeRegistrar::new(&mut self.ctx).register(declaration, symbol, domain)
    }

    /// Registers a declaration and writes its ledger record.
    pub fn create_type(
        &mut self,
        declaration: &Value,
        symbol: Option<&str>,
        domain: Option<&str>,
    ) -> Result<RegisteredType> {
        let base = self.base.as_mut().ok_or(CrudError::NoBaseSet)?;
        TypeLedger::new(&mut self.ctx, base.as_mut()).persist_and_build(
            declaration,
            symbol,
            domain,
        )
    }

    /// The startup entrypoint: ensures the ledger's record table exists and
    /// replays the full ledger. Run once at process startup.
    pub fn install(&mut self) -> Result<ReplayStats> {
        let base = self.base.as_mut().ok_or(CrudError::NoBaseSet)?;
        TypeLedger::new(&mut self.ctx, base.as_mut()).install()
    }

    /// Replays the ledger without the install preamble.
    pub fn replay_all(&mut self) -> Result<ReplayStats> {
        let base = self.base.as_mut().ok_or(CrudError::NoBaseSet)?;
        TypeLedger::new(&mut self.ctx, base.as_mut()).replay_all()
    }

    // ==================== Commands ====================

    /// Runs a synthesized command by its generated name.
    pub fn run(&mut self, command: &str, payload: &Value) -> Result<Outcome> {
        let base = self.base.as_mut().ok_or(CrudError::NoBaseSet)?;
        let spec = self
            .ctx
            .commands
            .get(command)
            .ok_or_else(|| CrudError::UnknownCommand(command.to_string()))?;
        executor::execute(spec, payload, base.as_mut(), &self.ctx.entities)
    }

    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.ctx.commands.get(name)
    }

    /// Generated command names in lexical order.
    pub fn command_names(&self) -> Vec<&str> {
        self.ctx.commands.names().collect()
    }

    pub fn entity(&self, scoped_name: &str) -> Option<&Arc<EntityDescriptor>> {
        self.ctx.entities.get(scoped_name)
    }
}
