//! Input schemas for synthesized commands.
//!
//! Every command derives one `PayloadSchema` from its entity descriptor and
//! validates payloads against it before executing. Validation failures are
//! collected per field and reported on the command outcome.

use crate::command::outcome::Failure;
use crate::schema::declaration::json_type_name;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Supported payload field types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    Float,
    Text,
    Boolean,
    Object,
    Array,
    /// A primary key referencing `entity`; accepts integer or text keys.
    Ref { entity: String },
    /// A list of primary keys referencing `entity`.
    RefList { entity: String },
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Integer => value.as_i64().is_some(),
            Self::Float => value.is_number(),
            Self::Text => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Ref { .. } => value.as_i64().is_some() || value.is_string(),
            Self::RefList { .. } => value
                .as_array()
                .is_some_and(|items| {
                    items.iter().all(|v| v.as_i64().is_some() || v.is_string())
                }),
        }
    }

    fn expectation(&self) -> String {
        match self {
            Self::Integer => "an integer".into(),
            Self::Float => "a number".into(),
            Self::Text => "a text value".into(),
            Self::Boolean => "a boolean".into(),
            Self::Object => "an object".into(),
            Self::Array => "an array".into(),
            Self::Ref { entity } => format!("a {entity} primary key"),
            Self::RefList { entity } => format!("a list of {entity} primary keys"),
        }
    }
}

/// Contract for a single payload field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldContract {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// Schema definition for a command payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadSchema {
    pub fields: Vec<FieldContract>,
    /// Reject payload fields not declared in the schema.
    pub allow_extra_fields: bool,
    /// Require at least one declared field to be present and non-null
    /// (find_by/query style criteria schemas).
    pub require_some_field: bool,
}

impl Default for PayloadSchema {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            allow_extra_fields: false,
            require_some_field: false,
        }
    }
}

impl PayloadSchema {
    /// An empty object schema (query_all).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn require_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldContract {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    pub fn optional_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldContract {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    pub fn require_some_field(mut self, require: bool) -> Self {
        self.require_some_field = require;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldContract> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validates a payload, returning one failure per violation.
    pub fn validate(&self, payload: &Value) -> Vec<Failure> {
        let Some(object) = payload.as_object() else {
            return vec![Failure::InvalidInput {
                path: String::new(),
                message: format!("payload must be an object, got {}", json_type_name(payload)),
            }];
        };

        let mut failures = Vec::new();
        let mut declared = HashSet::new();
        let mut given = 0usize;

        for field in &self.fields {
            declared.insert(field.name.as_str());
            match object.get(&field.name) {
                Some(value) if !value.is_null() => {
                    given += 1;
                    if !field.kind.matches(value) {
                        failures.push(Failure::InvalidInput {
                            path: field.name.clone(),
                            message: format!(
                                "expected {}, got {}",
                                field.kind.expectation(),
                                json_type_name(value)
                            ),
                        });
                    }
                }
                _ if field.required => failures.push(Failure::InvalidInput {
                    path: field.name.clone(),
                    message: "is required".into(),
                }),
                _ => {}
            }
        }

        if !self.allow_extra_fields {
            for key in object.keys() {
                if !declared.contains(key.as_str()) {
                    failures.push(Failure::InvalidInput {
                        path: key.clone(),
                        message: "unexpected field".into(),
                    });
                }
            }
        }

        if self.require_some_field && given == 0 && failures.is_empty() {
            failures.push(Failure::InvalidInput {
                path: String::new(),
                message: "at least one attribute must be given".into(),
            });
        }

        failures
    }
}
