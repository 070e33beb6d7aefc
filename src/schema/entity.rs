//! Entity descriptors derived from registered entity types.

use crate::core::{CrudError, Result};
use crate::schema::compiler::CompiledType;
use crate::schema::declaration::{self, AttrType, AttributeDef};
use convert_case::{Case, Casing};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Registered entity descriptors keyed by scoped entity name.
pub type EntityIndex = HashMap<String, Arc<EntityDescriptor>>;

/// Association cardinality. Only simple collections (an array whose element
/// is directly an entity reference) produce append/remove commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Collection,
}

/// A named relationship from an attribute path to another entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    /// Attribute path from the record root, one segment per nesting level.
    pub path: Vec<String>,
    /// Target entity name as declared.
    pub target: String,
    pub cardinality: Cardinality,
}

impl Association {
    pub fn path_string(&self) -> String {
        self.path.join(".")
    }
}

/// Everything command synthesis needs to know about one registered entity.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    /// Entity name, e.g. `User`.
    pub name: String,
    /// Symbol the type is bound under in its domain.
    pub symbol: String,
    /// Owning domain path; empty for the global domain.
    pub domain_path: Vec<String>,
    pub primary_key: String,
    pub primary_key_type: AttrType,
    pub attributes: Vec<AttributeDef>,
    pub associations: Vec<Association>,
}

impl EntityDescriptor {
    /// Derives a descriptor from a compiled entity type.
    pub fn derive(
        compiled: &CompiledType,
        symbol: &str,
        domain_path: &[String],
    ) -> Result<Self> {
        let name = compiled
            .name
            .clone()
            .ok_or_else(|| CrudError::Declaration("entity type has no name".into()))?;

        let attributes_decl = compiled
            .declaration
            .get("attributes")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                CrudError::Declaration(format!("entity '{name}' has no attributes"))
            })?;
        let attributes = declaration::parse_attribute_map(attributes_decl)?;

        let primary_key = compiled
            .declaration
            .get("primary_key")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CrudError::Declaration(format!("entity '{name}' has no primary key"))
            })?
            .to_string();
        let primary_key_type = attributes
            .iter()
            .find(|a| a.name == primary_key)
            .map(|a| a.ty.clone())
            .ok_or_else(|| {
                CrudError::Declaration(format!(
                    "entity '{name}' primary key '{primary_key}' is not declared"
                ))
            })?;

        let mut associations = Vec::new();
        collect_associations(&attributes, &mut Vec::new(), &mut associations);

        Ok(Self {
            name,
            symbol: symbol.to_string(),
            domain_path: domain_path.to_vec(),
            primary_key,
            primary_key_type,
            attributes,
            associations,
        })
    }

    /// Fully scoped entity name, e.g. `crm.billing.User`; bare name for the
    /// global domain. Also used as the storage table name.
    pub fn scoped_name(&self) -> String {
        self.scoped(&self.name)
    }

    pub fn table_name(&self) -> String {
        self.scoped_name()
    }

    /// Prefixes a command's local name with the domain's scoped path.
    pub fn scoped(&self, local: &str) -> String {
        if self.domain_path.is_empty() {
            local.to_string()
        } else {
            format!("{}.{}", self.domain_path.join("."), local)
        }
    }

    /// Input-field name used when a command takes the entity itself,
    /// e.g. `user` for `User`.
    pub fn local_input_name(&self) -> String {
        self.name.to_case(Case::Snake)
    }

    /// Integer primary keys are assigned by storage and omitted from the
    /// create schema; text keys must be supplied by the caller.
    pub fn storage_assigned_key(&self) -> bool {
        self.primary_key_type == AttrType::Integer
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn association_at(&self, path: &[String]) -> Option<&Association> {
        self.associations.iter().find(|a| a.path == path)
    }

    /// Associations eligible for append/remove generation.
    pub fn collection_associations(&self) -> impl Iterator<Item = &Association> {
        self.associations
            .iter()
            .filter(|a| a.cardinality == Cardinality::Collection)
    }
}

fn collect_associations(
    attributes: &[AttributeDef],
    prefix: &mut Vec<String>,
    out: &mut Vec<Association>,
) {
    for attribute in attributes {
        prefix.push(attribute.name.clone());
        match &attribute.ty {
            AttrType::Ref { entity } => out.push(Association {
                path: prefix.clone(),
                target: entity.clone(),
                cardinality: Cardinality::Single,
            }),
            AttrType::Array { element } => {
                if let AttrType::Ref { entity } = element.as_ref() {
                    out.push(Association {
                        path: prefix.clone(),
                        target: entity.clone(),
                        cardinality: Cardinality::Collection,
                    });
                }
            }
            AttrType::Object { attributes } => {
                collect_associations(attributes, prefix, out);
            }
            _ => {}
        }
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compiler::{self, TypeId, TypeKind};
    use serde_json::json;

    fn compiled(declaration: serde_json::Value) -> CompiledType {
        let canonical = compiler::canonicalize(&declaration).unwrap();
        CompiledType {
            id: TypeId(0),
            kind: TypeKind::Entity,
            name: compiler::name_of(&canonical),
            declaration: canonical,
        }
    }

    #[test]
    fn derives_associations_with_cardinality() {
        let ty = compiled(json!({
            "kind": "entity",
            "name": "User",
            "primary_key": "id",
            "attributes": {
                "id": "integer",
                "best_friend": {"type": "ref", "entity": "User"},
                "reviews": {"type": "array", "element": {"type": "ref", "entity": "Review"}}
            }
        }));
        let descriptor = EntityDescriptor::derive(&ty, "User", &[]).unwrap();

        let single = descriptor.association_at(&["best_friend".into()]).unwrap();
        assert_eq!(single.cardinality, Cardinality::Single);
        assert_eq!(single.target, "User");

        let collection = descriptor.association_at(&["reviews".into()]).unwrap();
        assert_eq!(collection.cardinality, Cardinality::Collection);
        assert_eq!(descriptor.collection_associations().count(), 1);
    }

    #[test]
    fn derives_nested_association_paths() {
        let ty = compiled(json!({
            "kind": "entity",
            "name": "User",
            "primary_key": "id",
            "attributes": {
                "id": "integer",
                "profile": {"type": "object", "attributes": {
                    "badges": {"type": "array", "element": {"type": "ref", "entity": "Badge"}}
                }}
            }
        }));
        let descriptor = EntityDescriptor::derive(&ty, "User", &[]).unwrap();
        let badge = descriptor
            .association_at(&["profile".into(), "badges".into()])
            .unwrap();
        assert_eq!(badge.cardinality, Cardinality::Collection);
        assert_eq!(badge.path_string(), "profile.badges");
    }

    #[test]
    fn scoped_names_respect_domain() {
        let ty = compiled(json!({
            "kind": "entity",
            "name": "User",
            "primary_key": "id",
            "attributes": { "id": "integer" }
        }));
        let global = EntityDescriptor::derive(&ty, "User", &[]).unwrap();
        assert_eq!(global.scoped_name(), "User");
        assert_eq!(global.scoped("CreateUser"), "CreateUser");

        let scoped =
            EntityDescriptor::derive(&ty, "User", &["crm".into(), "billing".into()]).unwrap();
        assert_eq!(scoped.scoped_name(), "crm.billing.User");
        assert_eq!(scoped.scoped("CreateUser"), "crm.billing.CreateUser");
        assert_eq!(scoped.local_input_name(), "user");
    }

    #[test]
    fn integer_keys_are_storage_assigned() {
        let ty = compiled(json!({
            "kind": "entity",
            "name": "Tag",
            "primary_key": "slug",
            "attributes": { "slug": "text" }
        }));
        let descriptor = EntityDescriptor::derive(&ty, "Tag", &[]).unwrap();
        assert!(!descriptor.storage_assigned_key());
    }
}
