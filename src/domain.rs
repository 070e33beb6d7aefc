//! Domains: named scopes under which types and commands are registered.
//!
//! A domain name is a dotted path of identifier segments (`"crm.billing"`).
//! The global domain has the empty path and no command-name prefix. Each
//! domain owns its compile cache, so structural dedup of declarations is
//! scoped per namespace.

use crate::core::{CrudError, Result};
use crate::schema::compiler::{self, CompiledType, TypeId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Domain {
    path: Vec<String>,
    next_type_id: u32,
    /// Compile cache: canonical declaration -> compiled type. Guarantees
    /// structurally identical declarations share one type identity.
    compiled: HashMap<String, Arc<CompiledType>>,
    types_by_symbol: HashMap<String, Arc<CompiledType>>,
    symbols_by_type: HashMap<TypeId, String>,
}

impl Domain {
    fn new(path: Vec<String>) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    pub fn is_global(&self) -> bool {
        self.path.is_empty()
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Dotted scoped name; empty string for the global domain.
    pub fn scoped_path(&self) -> String {
        self.path.join(".")
    }

    /// Compiles a declaration, returning the cached type when a structurally
    /// identical declaration was compiled before in this domain.
    pub fn compile(&mut self, declaration: &Value) -> Result<Arc<CompiledType>> {
        let canonical = compiler::canonicalize(declaration)?;
        let key = canonical.to_string();
        if let Some(existing) = self.compiled.get(&key) {
            return Ok(existing.clone());
        }

        let id = TypeId(self.next_type_id);
        self.next_type_id += 1;
        let compiled = Arc::new(CompiledType {
            id,
            kind: compiler::kind_of(&canonical),
            name: compiler::name_of(&canonical),
            declaration: canonical,
        });
        debug!(
            domain = %self.scoped_path(),
            type_id = id.0,
            name = compiled.name.as_deref().unwrap_or("<unnamed>"),
            "compiled type declaration"
        );
        self.compiled.insert(key, compiled.clone());
        Ok(compiled)
    }

    /// Symbol a type is bound under, if it is registered here.
    pub fn symbol_for(&self, id: TypeId) -> Option<&str> {
        self.symbols_by_type.get(&id).map(String::as_str)
    }

    pub fn type_for_symbol(&self, symbol: &str) -> Option<&Arc<CompiledType>> {
        self.types_by_symbol.get(symbol)
    }

    /// Binds a compiled type under a symbol. Within one domain a symbol maps
    /// to exactly one type.
    pub fn bind(&mut self, symbol: &str, compiled: Arc<CompiledType>) -> Result<()> {
        if let Some(existing) = self.types_by_symbol.get(symbol) {
            if existing.id != compiled.id {
                return Err(CrudError::Declaration(format!(
                    "symbol '{symbol}' is already bound to a different type in domain '{}'",
                    self.scoped_path()
                )));
            }
            return Ok(());
        }
        self.symbols_by_type.insert(compiled.id, symbol.to_string());
        self.types_by_symbol.insert(symbol.to_string(), compiled);
        Ok(())
    }

    /// Removes a binding; used to unwind a registration whose ledger write
    /// failed.
    pub(crate) fn unbind(&mut self, symbol: &str) {
        if let Some(compiled) = self.types_by_symbol.remove(symbol) {
            self.symbols_by_type.remove(&compiled.id);
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.types_by_symbol.keys().map(String::as_str)
    }
}

/// Lookup and creation of domains by scoped name.
#[derive(Debug)]
pub struct DomainRegistry {
    global: Domain,
    domains: HashMap<String, Domain>,
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self {
            global: Domain::new(Vec::new()),
            domains: HashMap::new(),
        }
    }

    pub fn global(&self) -> &Domain {
        &self.global
    }

    /// Resolves a domain by scoped name; `None` and `""` mean global.
    pub fn resolve(&mut self, name: Option<&str>) -> Result<&mut Domain> {
        match name {
            None | Some("") => Ok(&mut self.global),
            Some(name) => {
                validate_name(name)?;
                self.domains
                    .get_mut(name)
                    .ok_or_else(|| CrudError::NoSuchDomain(name.to_string()))
            }
        }
    }

    /// Resolves a domain, creating it when the name is a well-formed plain
    /// dotted name. A malformed name propagates as `NoSuchDomain` unchanged.
    pub fn resolve_or_create(&mut self, name: Option<&str>) -> Result<&mut Domain> {
        match name {
            None | Some("") => Ok(&mut self.global),
            Some(name) => {
                validate_name(name)?;
                if !self.domains.contains_key(name) {
                    return self.create(name);
                }
                Ok(self.domains.get_mut(name).expect("checked above"))
            }
        }
    }

    pub fn create(&mut self, name: &str) -> Result<&mut Domain> {
        validate_name(name)?;
        if self.domains.contains_key(name) {
            return Err(CrudError::Declaration(format!(
                "domain '{name}' already exists"
            )));
        }
        let path: Vec<String> = name.split('.').map(str::to_string).collect();
        debug!(domain = name, "created domain");
        Ok(self
            .domains
            .entry(name.to_string())
            .or_insert_with(|| Domain::new(path)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.domains.contains_key(name)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(CrudError::NoSuchDomain(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_declaration() -> Value {
        json!({
            "kind": "entity",
            "name": "User",
            "primary_key": "id",
            "attributes": { "id": "integer", "first_name": "text" }
        })
    }

    #[test]
    fn structurally_equal_declarations_compile_to_one_type() {
        let mut registry = DomainRegistry::new();
        let domain = registry.resolve_or_create(Some("crm")).unwrap();

        let first = domain.compile(&user_declaration()).unwrap();
        let second = domain.compile(&user_declaration()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn compile_caches_are_scoped_per_domain() {
        let mut registry = DomainRegistry::new();
        let in_crm = registry
            .resolve_or_create(Some("crm"))
            .unwrap()
            .compile(&user_declaration())
            .unwrap();
        let in_global = registry
            .resolve_or_create(None)
            .unwrap()
            .compile(&user_declaration())
            .unwrap();
        assert!(!Arc::ptr_eq(&in_crm, &in_global));
    }

    #[test]
    fn resolve_or_create_creates_plain_names() {
        let mut registry = DomainRegistry::new();
        let domain = registry.resolve_or_create(Some("some_org.some_domain")).unwrap();
        assert_eq!(domain.scoped_path(), "some_org.some_domain");
        assert!(registry.contains("some_org.some_domain"));
    }

    #[test]
    fn malformed_names_propagate_as_no_such_domain() {
        let mut registry = DomainRegistry::new();
        let result = registry.resolve_or_create(Some("bad..name"));
        assert!(matches!(result, Err(CrudError::NoSuchDomain(_))));
        assert!(!registry.contains("bad..name"));
    }

    #[test]
    fn binding_a_symbol_to_a_second_type_fails() {
        let mut registry = DomainRegistry::new();
        let domain = registry.resolve_or_create(None).unwrap();
        let user = domain.compile(&user_declaration()).unwrap();
        let other = domain
            .compile(&json!({
                "kind": "entity",
                "name": "Review",
                "primary_key": "id",
                "attributes": { "id": "integer" }
            }))
            .unwrap();

        domain.bind("User", user.clone()).unwrap();
        domain.bind("User", user).unwrap();
        assert!(domain.bind("User", other).is_err());
    }
}
