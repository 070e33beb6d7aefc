//! Command outcomes.
//!
//! Business failures are data, not panics: a command collects them on its
//! outcome and the surrounding registration or replay flow keeps going.
//! Fatal conditions (configuration, symbol conflicts) travel as
//! `Err(CrudError)` instead and never appear here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single command failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// The payload did not match the command's input schema.
    InvalidInput { path: String, message: String },
    /// No record matched the given criteria.
    NotFound { entity: String, criteria: Value },
    /// The element to remove was not present in the collection.
    ElementNotInCollection { entity: String, path: String },
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidInput { .. } => FailureKind::InvalidInput,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::ElementNotInCollection { .. } => FailureKind::ElementNotInCollection,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { path, message } if path.is_empty() => message.clone(),
            Self::InvalidInput { path, message } => format!("{path}: {message}"),
            Self::NotFound { entity, criteria } => {
                format!("no {entity} matching {criteria}")
            }
            Self::ElementNotInCollection { entity, path } => {
                format!("element not in {entity}.{path} so can't remove it")
            }
        }
    }
}

/// The statically declarable failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    NotFound,
    ElementNotInCollection,
}

/// Result of running a command: either a value or collected failures.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    result: Option<Value>,
    failures: Vec<Failure>,
}

impl Outcome {
    pub fn success(result: Value) -> Self {
        Self {
            result: Some(result),
            failures: Vec::new(),
        }
    }

    pub fn failure(failures: Vec<Failure>) -> Self {
        debug_assert!(!failures.is_empty());
        Self {
            result: None,
            failures,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> std::result::Result<Value, Vec<Failure>> {
        if self.failures.is_empty() {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(self.failures)
        }
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }
}
