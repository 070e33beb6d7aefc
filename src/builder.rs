//! Ergonomic entity construction.
//!
//! `EntityBuilder` composes attribute declarations into an entity-kind
//! declaration and hands it to the ledger, returning the compiled type.
//! Attributes can be declared with the chained `AttrDecl` builders or as a
//! pre-structured JSON map (shorthand allowed in both forms).

use crate::core::{CrudError, Result};
use crate::engine::CrudEngine;
use crate::registrar::RegisteredType;
use crate::schema::declaration;
use serde_json::{Map, Value, json};

/// Builder for a single attribute declaration.
#[derive(Debug, Clone)]
pub struct AttrDecl {
    decl: Map<String, Value>,
}

impl AttrDecl {
    fn of_type(type_name: &str) -> Self {
        let mut decl = Map::new();
        decl.insert("type".into(), json!(type_name));
        Self { decl }
    }

    pub fn integer() -> Self {
        Self::of_type("integer")
    }

    pub fn float() -> Self {
        Self::of_type("float")
    }

    pub fn text() -> Self {
        Self::of_type("text")
    }

    pub fn boolean() -> Self {
        Self::of_type("boolean")
    }

    /// A single-valued association to `entity`.
    pub fn reference(entity: impl Into<String>) -> Self {
        let mut this = Self::of_type("ref");
        this.decl.insert("entity".into(), json!(entity.into()));
        this
    }

    /// A simple collection of `entity`, defaulting to empty.
    pub fn collection_of(entity: impl Into<String>) -> Self {
        Self::array_of(Self::reference(entity)).default_value(json!([]))
    }

    pub fn array_of(element: AttrDecl) -> Self {
        let mut this = Self::of_type("array");
        this.decl.insert("element".into(), element.into_value());
        this
    }

    /// A nested attribute map.
    pub fn object(attributes: Vec<(&str, AttrDecl)>) -> Self {
        let mut this = Self::of_type("object");
        let mut nested = Map::new();
        for (name, decl) in attributes {
            nested.insert(name.to_string(), decl.into_value());
        }
        this.decl.insert("attributes".into(), Value::Object(nested));
        this
    }

    pub fn required(mut self) -> Self {
        self.decl.insert("required".into(), json!(true));
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.decl.insert("default".into(), value);
        self
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.decl)
    }
}

/// Convenience front-end composing attribute declarations into ledger
/// registrations.
#[derive(Debug, Clone, Default)]
pub struct EntityBuilder {
    name: String,
    domain: Option<String>,
    attributes: Vec<(String, Value)>,
    primary_key: Option<String>,
    from_json: bool,
}

impl EntityBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn domain(mut self, name: impl Into<String>) -> Self {
        self.domain = Some(name.into());
        self
    }

    /// Declares an attribute. Declaration order matters: the first declared
    /// attribute becomes the primary key unless one is named explicitly.
    pub fn attribute(mut self, name: impl Into<String>, decl: AttrDecl) -> Self {
        self.attributes.push((name.into(), decl.into_value()));
        self
    }

    /// Declares attributes from a pre-structured JSON map (shorthand
    /// allowed). JSON maps carry no declaration order, so the primary key
    /// must either be named explicitly or be an attribute called `id`.
    pub fn attributes_json(mut self, attributes: Value) -> Self {
        if let Value::Object(map) = attributes {
            for (name, decl) in map {
                self.attributes.push((name, decl));
            }
            self.from_json = true;
        }
        self
    }

    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = Some(name.into());
        self
    }

    /// Normalizes the collected attributes into an entity-kind declaration.
    pub fn build_declaration(&self) -> Result<Value> {
        if self.name.is_empty() {
            return Err(CrudError::Declaration("entity name must not be empty".into()));
        }
        if self.attributes.is_empty() {
            return Err(CrudError::Declaration(format!(
                "entity '{}' declares no attributes",
                self.name
            )));
        }

        let mut attributes = Map::new();
        for (name, decl) in &self.attributes {
            attributes.insert(name.clone(), declaration::normalize_attribute(decl)?);
        }

        let primary_key = match &self.primary_key {
            Some(name) => name.clone(),
            None if !self.from_json => self.attributes[0].0.clone(),
            None if attributes.contains_key("id") => "id".to_string(),
            None => {
                return Err(CrudError::Declaration(format!(
                    "entity '{}' needs an explicit primary key when attributes are given as JSON",
                    self.name
                )));
            }
        };

        Ok(json!({
            "kind": "entity",
            "name": self.name,
            "primary_key": primary_key,
            "attributes": attributes,
        }))
    }

    /// Builds the declaration, persists it through the ledger and returns
    /// the registered entity type.
    pub fn create(self, engine: &mut CrudEngine) -> Result<RegisteredType> {
        let declaration = self.build_declaration()?;
        engine.create_type(&declaration, None, self.domain.as_deref())
    }
}
