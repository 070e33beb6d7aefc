//! The type compiler boundary.
//!
//! `canonicalize` turns a raw declaration into its canonical form; the
//! per-domain compile cache (see `Domain::compile`) guarantees that
//! structurally identical declarations resolve to one shared `CompiledType`.
//! Equality of canonical declarations therefore implies pointer identity of
//! the compiled type within a namespace; registration and dedup rely on
//! this identity rather than re-implementing structural comparison.

use crate::core::{CrudError, Result};
use crate::schema::declaration::{self, KIND_ATTRIBUTES, KIND_ENTITY};
use serde_json::Value;

/// Identity of a compiled type within its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

/// Coarse classification of a compiled type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Entity,
    Attributes,
    Other(String),
}

impl TypeKind {
    pub fn is_entity(&self) -> bool {
        matches!(self, Self::Entity)
    }
}

/// A type object produced by the compiler and shared via `Arc`.
#[derive(Debug)]
pub struct CompiledType {
    pub id: TypeId,
    pub kind: TypeKind,
    /// Declared type name, present for entity declarations.
    pub name: Option<String>,
    /// Canonical (normalized) declaration, the form the ledger persists.
    pub declaration: Value,
}

impl CompiledType {
    /// Canonical serialization; serde_json object keys are sorted, so this
    /// is the structural identity key used by the compile cache.
    pub fn canonical_key(&self) -> String {
        self.declaration.to_string()
    }
}

/// Validates a declaration and produces its canonical form.
pub fn canonicalize(declaration: &Value) -> Result<Value> {
    let map = declaration
        .as_object()
        .ok_or_else(|| CrudError::Declaration("declaration must be a JSON object".into()))?;

    let kind = map
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| CrudError::Declaration("declaration is missing 'kind'".into()))?;

    let mut canonical = map.clone();

    if let Some(attributes) = map.get("attributes") {
        let attributes = attributes.as_object().ok_or_else(|| {
            CrudError::Declaration("'attributes' must be a JSON object".into())
        })?;
        canonical.insert(
            "attributes".into(),
            Value::Object(declaration::normalize_attribute_map(attributes)?),
        );
    }

    if kind == KIND_ENTITY {
        validate_entity(&canonical)?;
    }

    Ok(Value::Object(canonical))
}

/// Extracts the kind marker of a canonical declaration.
pub fn kind_of(declaration: &Value) -> TypeKind {
    match declaration.get("kind").and_then(Value::as_str) {
        Some(KIND_ENTITY) => TypeKind::Entity,
        Some(KIND_ATTRIBUTES) => TypeKind::Attributes,
        Some(other) => TypeKind::Other(other.to_string()),
        None => TypeKind::Other(String::new()),
    }
}

/// Extracts the declared name, if any.
pub fn name_of(declaration: &Value) -> Option<String> {
    declaration
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn validate_entity(declaration: &serde_json::Map<String, Value>) -> Result<()> {
    let name = declaration
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| CrudError::Declaration("entity declaration is missing 'name'".into()))?;

    let attributes = declaration
        .get("attributes")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            CrudError::Declaration(format!("entity '{name}' is missing 'attributes'"))
        })?;
    if attributes.is_empty() {
        return Err(CrudError::Declaration(format!(
            "entity '{name}' declares no attributes"
        )));
    }

    let primary_key = declaration
        .get("primary_key")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            CrudError::Declaration(format!("entity '{name}' is missing 'primary_key'"))
        })?;

    let pk_decl = attributes.get(primary_key).ok_or_else(|| {
        CrudError::Declaration(format!(
            "entity '{name}' primary key '{primary_key}' is not a declared attribute"
        ))
    })?;
    let pk_type = pk_decl.get("type").and_then(Value::as_str).unwrap_or("");
    if !matches!(pk_type, "integer" | "text") {
        return Err(CrudError::Declaration(format!(
            "entity '{name}' primary key '{primary_key}' must be integer or text, got '{pk_type}'"
        )));
    }

    // Parsing doubles as deep validation of the attribute tree.
    declaration::parse_attribute_map(attributes)?;

    Ok(())
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
            "attributes": {
                "id": "integer",
                "first_name": "text"
            }
        })
    }

    #[test]
    fn canonicalize_normalizes_shorthand_attributes() {
        let canonical = canonicalize(&user_declaration()).unwrap();
        assert_eq!(
            canonical["attributes"]["first_name"],
            json!({"type": "text"})
        );
    }

    #[test]
    fn canonicalize_is_stable() {
        let first = canonicalize(&user_declaration()).unwrap();
        let second = canonicalize(&first).unwrap();
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn entity_requires_known_primary_key() {
        let declaration = json!({
            "kind": "entity",
            "name": "User",
            "primary_key": "missing",
            "attributes": { "id": "integer" }
        });
        assert!(matches!(
            canonicalize(&declaration),
            Err(CrudError::Declaration(_))
        ));
    }

    #[test]
    fn non_entity_kinds_pass_through() {
        let declaration = json!({
            "kind": "attributes",
            "attributes": { "street": "text" }
        });
        let canonical = canonicalize(&declaration).unwrap();
        assert_eq!(kind_of(&canonical), TypeKind::Attributes);
    }
}
