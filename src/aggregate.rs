//! The aggregate-update routine.
//!
//! Deep-merges an update payload across an entity's association graph:
//! scalar fields overwrite, plain nested objects merge, and association
//! fields given as nested objects update the referenced records
//! recursively. Planning is separated from application so an update either
//! applies completely or reports failures without touching storage.

use crate::command::outcome::Failure;
use crate::core::{CrudError, Result};
use crate::schema::entity::{Cardinality, EntityDescriptor};
use crate::schema::EntityIndex;
use crate::storage::{CrudBase, Fields, RecordKey};
use serde_json::Value;
use std::sync::Arc;

/// One pending record write produced by planning.
#[derive(Debug)]
pub struct PlannedWrite {
    pub table: String,
    pub key: RecordKey,
    pub fields: Fields,
}

/// Plans the writes for one aggregate update. Returns the writes to apply
/// and any business failures discovered along the way; callers apply the
/// writes only when no failures were collected.
pub fn plan_update(
    base: &dyn CrudBase,
    entities: &EntityIndex,
    entity: &EntityDescriptor,
    key: &RecordKey,
    updates: &Fields,
) -> Result<(Vec<PlannedWrite>, Vec<Failure>)> {
    let mut writes = Vec::new();
    let mut failures = Vec::new();
    plan_entity(base, entities, entity, key, updates, &mut writes, &mut failures)?;
    Ok((writes, failures))
}

fn plan_entity(
    base: &dyn CrudBase,
    entities: &EntityIndex,
    entity: &EntityDescriptor,
    key: &RecordKey,
    updates: &Fields,
    writes: &mut Vec<PlannedWrite>,
    failures: &mut Vec<Failure>,
) -> Result<()> {
    let table = entity.table_name();

    // Build on a pending write when this record was already touched, so
    // two nested updates to one record compose instead of clobbering.
    let mut fields = match writes
        .iter()
        .position(|w| w.table == table && w.key == *key)
    {
        Some(index) => writes.remove(index).fields,
        None => match base.get(&table, key)? {
            Some(fields) => fields,
            None => {
                failures.push(Failure::NotFound {
                    entity: entity.name.clone(),
                    criteria: single_criteria(&entity.primary_key, key.to_value()),
                });
                return Ok(());
            }
        },
    };

    for (name, value) in updates {
        if *name == entity.primary_key || value.is_null() {
            continue;
        }

        let path = [name.clone()];
        match entity.association_at(&path) {
            Some(assoc) if assoc.cardinality == Cardinality::Single => {
                if let Value::Object(nested) = value {
                    plan_associated(base, entities, entity, &assoc.target, name, nested, writes, failures)?;
                } else {
                    // Re-point the reference.
                    fields.insert(name.clone(), value.clone());
                }
            }
            Some(assoc) if assoc.cardinality == Cardinality::Collection => {
                if let Value::Array(items) = value {
                    if items.iter().all(|v| !v.is_object()) {
                        // A plain key list replaces the collection.
                        fields.insert(name.clone(), value.clone());
                    } else {
                        for item in items {
                            match item {
                                Value::Object(nested) => plan_associated(
                                    base, entities, entity, &assoc.target, name, nested, writes,
                                    failures,
                                )?,
                                other => failures.push(Failure::InvalidInput {
                                    path: name.clone(),
                                    message: format!(
                                        "collection updates must be all keys or all objects, got {other}"
                                    ),
                                }),
                            }
                        }
                    }
                } else {
                    fields.insert(name.clone(), value.clone());
                }
            }
            _ => {
                merge_field(&mut fields, name, value);
            }
        }
    }

    writes.push(PlannedWrite {
        table,
        key: key.clone(),
        fields,
    });
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn plan_associated(
    base: &dyn CrudBase,
    entities: &EntityIndex,
    owner: &EntityDescriptor,
    target_name: &str,
    attribute: &str,
    nested: &Fields,
    writes: &mut Vec<PlannedWrite>,
    failures: &mut Vec<Failure>,
) -> Result<()> {
    let target = resolve_entity(entities, owner, target_name).ok_or_else(|| {
        CrudError::Declaration(format!(
            "association target '{target_name}' of '{}' is not registered",
            owner.name
        ))
    })?;

    let Some(key_value) = nested.get(&target.primary_key).filter(|v| !v.is_null()) else {
        failures.push(Failure::InvalidInput {
            path: attribute.to_string(),
            message: format!("nested update must include '{}'", target.primary_key),
        });
        return Ok(());
    };
    let key = RecordKey::from_value(key_value)?;
    plan_entity(base, entities, target.as_ref(), &key, nested, writes, failures)
}

/// Plain (non-association) fields: objects merge key-by-key, everything
/// else overwrites.
fn merge_field(fields: &mut Fields, name: &str, value: &Value) {
    match (fields.get_mut(name), value) {
        (Some(Value::Object(existing)), Value::Object(incoming)) => {
            for (k, v) in incoming {
                existing.insert(k.clone(), v.clone());
            }
        }
        _ => {
            fields.insert(name.to_string(), value.clone());
        }
    }
}

/// Association targets resolve inside the owner's domain first, then the
/// global domain.
pub(crate) fn resolve_entity(
    entities: &EntityIndex,
    owner: &EntityDescriptor,
    target: &str,
) -> Option<Arc<EntityDescriptor>> {
    entities
        .get(&owner.scoped(target))
        .or_else(|| entities.get(target))
        .cloned()
}

fn single_criteria(name: &str, value: Value) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(name.to_string(), value);
    Value::Object(map)
}
