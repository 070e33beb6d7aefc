//! Type registration.
//!
//! Resolves the target domain, compiles the declaration and binds the
//! resulting type under a symbol, idempotently. Registering an entity-kind
//! type immediately synthesizes its full default command family as a side
//! effect. A symbol that disagrees with an existing binding aborts before
//! any state changes.

use crate::command::registry::CommandKind;
use crate::core::{CrudError, Result};
use crate::engine::RegistryContext;
use crate::schema::{CompiledType, EntityDescriptor};
use crate::synth;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// The result of a registration: the compiled type, its binding, and what
/// this particular call changed.
#[derive(Debug, Clone)]
pub struct RegisteredType {
    pub compiled: Arc<CompiledType>,
    /// Symbol the type is bound under.
    pub symbol: String,
    /// Scoped domain name; empty for the global domain.
    pub domain: String,
    /// Whether this call bound the symbol (false for idempotent repeats).
    pub newly_registered: bool,
    /// Scoped entity name, for entity-kind types.
    pub entity: Option<String>,
    /// Command names newly defined by this call.
    pub synthesized: Vec<String>,
}

impl RegisteredType {
    /// Domain name in ledger-record form: `None` means global.
    pub fn domain_name(&self) -> Option<&str> {
        if self.domain.is_empty() {
            None
        } else {
            Some(&self.domain)
        }
    }
}

/// Registers type declarations into a registry context.
pub struct TypeRegistrar<'a> {
    ctx: &'a mut RegistryContext,
}

impl<'a> TypeRegistrar<'a> {
    pub fn new(ctx: &'a mut RegistryContext) -> Self {
        Self { ctx }
    }

    /// Registers a declaration under `symbol` in `domain`.
    ///
    /// Plain dotted domain names are created on demand; a malformed name
    /// propagates as `NoSuchDomain`. Registering a structurally identical
    /// declaration again returns the existing binding; a conflicting symbol
    /// fails with `SymbolMismatch` and changes nothing.
    pub fn register(
        &mut self,
        declaration: &Value,
        symbol: Option<&str>,
        domain: Option<&str>,
    ) -> Result<RegisteredType> {
        let (compiled, domain_path, domain_scoped, existing_symbol) = {
            let target = self.ctx.domains.resolve_or_create(domain)?;
            let compiled = target.compile(declaration)?;
            let existing = target.symbol_for(compiled.id).map(str::to_string);
            (
                compiled,
                target.path().to_vec(),
                target.scoped_path(),
                existing,
            )
        };

        let (bound_symbol, newly_registered) = match existing_symbol {
            Some(bound) => {
                if let Some(requested) = symbol {
                    if requested != bound {
                        return Err(CrudError::SymbolMismatch {
                            requested: requested.to_string(),
                            registered: bound,
                        });
                    }
                }
                (bound, false)
            }
            None => {
                let symbol = symbol
                    .map(str::to_string)
                    .or_else(|| compiled.name.clone())
                    .ok_or_else(|| {
                        CrudError::Declaration(
                            "a type symbol is required for unnamed declarations".into(),
                        )
                    })?;
                self.ctx
                    .domains
                    .resolve(domain)?
                    .bind(&symbol, compiled.clone())?;
                (symbol, true)
            }
        };

        let mut registered = RegisteredType {
            compiled: compiled.clone(),
            symbol: bound_symbol.clone(),
            domain: domain_scoped,
            newly_registered,
            entity: None,
            synthesized: Vec::new(),
        };

        if compiled.kind.is_entity() {
            let descriptor = Arc::new(EntityDescriptor::derive(
                &compiled,
                &bound_symbol,
                &domain_path,
            )?);
            let scoped_entity = descriptor.scoped_name();
            let fresh_entity = !self.ctx.entities.contains_key(&scoped_entity);
            self.ctx
                .entities
                .insert(scoped_entity.clone(), descriptor.clone());

            match synth::synthesize(&descriptor, &CommandKind::ALL, &mut self.ctx.commands) {
                Ok(names) => registered.synthesized = names,
                Err(e) => {
                    // Nothing from this call may stick around.
                    if fresh_entity {
                        self.ctx.entities.remove(&scoped_entity);
                    }
                    if newly_registered {
                        if let Ok(target) = self.ctx.domains.resolve(domain) {
                            target.unbind(&bound_symbol);
                        }
                    }
                    return Err(e);
                }
            }
            registered.entity = Some(scoped_entity);
        }

        debug!(
            symbol = %registered.symbol,
            domain = %registered.domain,
            newly = registered.newly_registered,
            "registered type"
        );
        Ok(registered)
    }
}
