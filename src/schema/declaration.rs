//! Declaration data model.
//!
//! A type declaration is plain JSON exchanged with, not owned by, the
//! registry. The canonical entity form is:
//!
//! ```json
//! {
//!   "kind": "entity",
//!   "name": "User",
//!   "primary_key": "id",
//!   "attributes": {
//!     "id": {"type": "integer"},
//!     "first_name": {"type": "text", "required": true},
//!     "reviews": {"type": "array", "element": {"type": "ref", "entity": "Review"}, "default": []}
//!   }
//! }
//! ```
//!
//! Attribute declarations also accept the shorthand `"first_name": "text"`,
//! which normalization expands before compilation.

use crate::core::{CrudError, Result};
use serde_json::{Map, Value, json};

/// Declaration kind markers understood by the registry.
pub const KIND_ENTITY: &str = "entity";
pub const KIND_ATTRIBUTES: &str = "attributes";

/// Parsed attribute type.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrType {
    Integer,
    Float,
    Text,
    Boolean,
    /// Reference to another entity, stored as that entity's primary key.
    Ref { entity: String },
    /// Homogeneous list of `element`.
    Array { element: Box<AttrType> },
    /// Nested attribute map.
    Object { attributes: Vec<AttributeDef> },
}

impl AttrType {
    /// True for integer/float/text/boolean.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Float | Self::Text | Self::Boolean
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Ref { .. } => "ref",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
        }
    }
}

/// One parsed attribute of an entity declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    pub name: String,
    pub ty: AttrType,
    pub required: bool,
    pub default: Option<Value>,
}

impl AttributeDef {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// Expands shorthand attribute declarations into the canonical object form.
///
/// `"text"` becomes `{"type": "text"}`; object forms are validated and
/// recursively normalized. Unknown attribute types are rejected here so the
/// compiler can assume a well-formed declaration.
pub fn normalize_attribute(decl: &Value) -> Result<Value> {
    match decl {
        Value::String(name) => {
            validate_type_name(name)?;
            Ok(json!({ "type": name }))
        }
        Value::Object(map) => {
            let type_name = map
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| CrudError::Declaration("attribute is missing 'type'".into()))?;
            validate_type_name(type_name)?;

            let mut normalized = map.clone();
            match type_name {
                "ref" => {
                    if map.get("entity").and_then(Value::as_str).is_none() {
                        return Err(CrudError::Declaration(
                            "'ref' attribute is missing 'entity'".into(),
                        ));
                    }
                }
                "array" => {
                    let element = map.get("element").ok_or_else(|| {
                        CrudError::Declaration("'array' attribute is missing 'element'".into())
                    })?;
                    normalized.insert("element".into(), normalize_attribute(element)?);
                }
                "object" => {
                    let attributes = map.get("attributes").and_then(Value::as_object).ok_or_else(
                        || CrudError::Declaration("'object' attribute is missing 'attributes'".into()),
                    )?;
                    normalized.insert(
                        "attributes".into(),
                        Value::Object(normalize_attribute_map(attributes)?),
                    );
                }
                _ => {}
            }
            Ok(Value::Object(normalized))
        }
        other => Err(CrudError::Declaration(format!(
            "attribute declaration must be a string or object, got {}",
            json_type_name(other)
        ))),
    }
}

/// Normalizes every attribute in a declaration map.
pub fn normalize_attribute_map(attributes: &Map<String, Value>) -> Result<Map<String, Value>> {
    let mut normalized = Map::new();
    for (name, decl) in attributes {
        normalized.insert(name.clone(), normalize_attribute(decl)?);
    }
    Ok(normalized)
}

/// Parses a normalized attribute map into attribute definitions.
pub fn parse_attribute_map(attributes: &Map<String, Value>) -> Result<Vec<AttributeDef>> {
    attributes
        .iter()
        .map(|(name, decl)| parse_attribute(name, decl))
        .collect()
}

fn parse_attribute(name: &str, decl: &Value) -> Result<AttributeDef> {
    let map = decl
        .as_object()
        .ok_or_else(|| CrudError::Declaration(format!("attribute '{name}' is not normalized")))?;
    let type_name = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CrudError::Declaration(format!("attribute '{name}' is missing 'type'")))?;

    let ty = match type_name {
        "integer" => AttrType::Integer,
        "float" => AttrType::Float,
        "text" => AttrType::Text,
        "boolean" => AttrType::Boolean,
        "ref" => AttrType::Ref {
            entity: map
                .get("entity")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    CrudError::Declaration(format!("attribute '{name}' is missing 'entity'"))
                })?
                .to_string(),
        },
        "array" => {
            let element = map.get("element").ok_or_else(|| {
                CrudError::Declaration(format!("attribute '{name}' is missing 'element'"))
            })?;
            AttrType::Array {
                element: Box::new(parse_attribute("element", element)?.ty),
            }
        }
        "object" => {
            let attributes = map.get("attributes").and_then(Value::as_object).ok_or_else(
                || CrudError::Declaration(format!("attribute '{name}' is missing 'attributes'")),
            )?;
            AttrType::Object {
                attributes: parse_attribute_map(attributes)?,
            }
        }
        other => {
            return Err(CrudError::Declaration(format!(
                "attribute '{name}' has unknown type '{other}'"
            )));
        }
    };

    Ok(AttributeDef {
        name: name.to_string(),
        ty,
        required: map.get("required").and_then(Value::as_bool).unwrap_or(false),
        default: map.get("default").cloned(),
    })
}

fn validate_type_name(name: &str) -> Result<()> {
    match name {
        "integer" | "float" | "text" | "boolean" | "ref" | "array" | "object" => Ok(()),
        other => Err(CrudError::Declaration(format!(
            "unknown attribute type '{other}'"
        ))),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_expands_shorthand() {
        let normalized = normalize_attribute(&json!("text")).unwrap();
        assert_eq!(normalized, json!({"type": "text"}));
    }

    #[test]
    fn normalize_rejects_unknown_type() {
        let result = normalize_attribute(&json!("varchar"));
        assert!(matches!(result, Err(CrudError::Declaration(_))));
    }

    #[test]
    fn normalize_recurses_into_array_elements() {
        let normalized =
            normalize_attribute(&json!({"type": "array", "element": "integer"})).unwrap();
        assert_eq!(
            normalized,
            json!({"type": "array", "element": {"type": "integer"}})
        );
    }

    #[test]
    fn parse_reads_ref_target_and_flags() {
        let mut attributes = Map::new();
        attributes.insert(
            "owner".into(),
            json!({"type": "ref", "entity": "User", "required": true}),
        );
        let defs = parse_attribute_map(&attributes).unwrap();
        assert_eq!(defs.len(), 1);
        assert!(defs[0].required);
        assert_eq!(defs[0].ty, AttrType::Ref { entity: "User".into() });
    }

    #[test]
    fn parse_rejects_ref_without_entity() {
        let mut attributes = Map::new();
        attributes.insert("owner".into(), json!({"type": "ref"}));
        assert!(parse_attribute_map(&attributes).is_err());
    }
}
