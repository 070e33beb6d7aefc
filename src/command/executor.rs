//! Generic command execution.
//!
//! One executor implements every operation kind as a switch over the
//! command's kind tag, parameterized by its entity descriptor. Mutating
//! kinds run inside a storage transaction (joining the caller's if one is
//! open); business failures are collected before any write, so a failed
//! outcome leaves storage untouched.

use crate::aggregate;
use crate::command::outcome::{Failure, Outcome};
use crate::command::registry::{CommandKind, CommandSpec};
use crate::core::{CrudError, Result};
use crate::fieldpath;
use crate::schema::{EntityDescriptor, EntityIndex};
use crate::storage::{CrudBase, Fields, RecordKey};
use serde_json::{Map, Value};
use tracing::debug;

/// Validates the payload against the command's schema, then executes it.
pub fn execute(
    spec: &CommandSpec,
    payload: &Value,
    base: &mut dyn CrudBase,
    entities: &EntityIndex,
) -> Result<Outcome> {
    let failures = spec.input_schema.validate(payload);
    if !failures.is_empty() {
        return Ok(Outcome::failure(failures));
    }
    let payload = payload.as_object().expect("validated as an object");

    debug!(command = %spec.name, kind = ?spec.kind, "executing command");

    if is_mutating(spec.kind) {
        base.begin();
        match run(spec, payload, base, entities) {
            Ok(outcome) => {
                base.commit()?;
                Ok(outcome)
            }
            Err(e) => {
                base.rollback();
                Err(e)
            }
        }
    } else {
        run(spec, payload, base, entities)
    }
}

fn is_mutating(kind: CommandKind) -> bool {
    matches!(
        kind,
        CommandKind::Create
            | CommandKind::UpdateAtom
            | CommandKind::UpdateAggregate
            | CommandKind::HardDelete
            | CommandKind::Append
            | CommandKind::Remove
    )
}

fn run(
    spec: &CommandSpec,
    payload: &Map<String, Value>,
    base: &mut dyn CrudBase,
    entities: &EntityIndex,
) -> Result<Outcome> {
    let entity = spec.entity.as_ref();
    base.ensure_table(&entity.table_name(), &entity.primary_key)?;

    match spec.kind {
        CommandKind::Create => create(entity, payload, base),
        CommandKind::Find => find(entity, payload, base),
        CommandKind::FindBy => find_by(entity, payload, base),
        CommandKind::Query => query(entity, payload, base),
        CommandKind::QueryAll => query_all(entity, base),
        CommandKind::UpdateAtom => update_atom(entity, payload, base),
        CommandKind::UpdateAggregate => update_aggregate(entity, payload, base, entities),
        CommandKind::HardDelete => hard_delete(entity, payload, base),
        CommandKind::Append | CommandKind::Remove => {
            collection_mutation(spec, payload, base, entities)
        }
    }
}

// ==================== Record construction ====================

fn create(
    entity: &EntityDescriptor,
    payload: &Map<String, Value>,
    base: &mut dyn CrudBase,
) -> Result<Outcome> {
    let mut fields = Fields::new();
    for attribute in &entity.attributes {
        if attribute.name == entity.primary_key && entity.storage_assigned_key() {
            continue;
        }
        match payload.get(&attribute.name) {
            Some(value) if !value.is_null() => {
                fields.insert(attribute.name.clone(), value.clone());
            }
            _ => {
                if let Some(default) = &attribute.default {
                    fields.insert(attribute.name.clone(), default.clone());
                }
            }
        }
    }
    let stored = base.insert(&entity.table_name(), fields)?;
    Ok(Outcome::success(Value::Object(stored)))
}

// ==================== Lookups ====================

fn find(
    entity: &EntityDescriptor,
    payload: &Map<String, Value>,
    base: &mut dyn CrudBase,
) -> Result<Outcome> {
    let key_value = payload
        .get(&entity.primary_key)
        .expect("schema requires the primary key");
    let key = RecordKey::from_value(key_value)?;
    match base.get(&entity.table_name(), &key)? {
        Some(fields) => Ok(Outcome::success(Value::Object(fields))),
        None => Ok(Outcome::failure(vec![not_found(
            entity,
            criteria_one(&entity.primary_key, key_value),
        )])),
    }
}

fn find_by(
    entity: &EntityDescriptor,
    payload: &Map<String, Value>,
    base: &mut dyn CrudBase,
) -> Result<Outcome> {
    let criteria = given_criteria(payload);
    let mut matches = matching_records(entity, &criteria, base)?;
    if matches.is_empty() {
        Ok(Outcome::failure(vec![not_found(
            entity,
            Value::Object(criteria),
        )]))
    } else {
        Ok(Outcome::success(Value::Object(matches.remove(0))))
    }
}

fn query(
    entity: &EntityDescriptor,
    payload: &Map<String, Value>,
    base: &mut dyn CrudBase,
) -> Result<Outcome> {
    let criteria = given_criteria(payload);
    let matches = matching_records(entity, &criteria, base)?;
    Ok(Outcome::success(Value::Array(
        matches.into_iter().map(Value::Object).collect(),
    )))
}

fn query_all(entity: &EntityDescriptor, base: &mut dyn CrudBase) -> Result<Outcome> {
    let all = base.scan(&entity.table_name())?;
    Ok(Outcome::success(Value::Array(
        all.into_iter().map(Value::Object).collect(),
    )))
}

/// The present, non-null payload fields, i.e. the match criteria.
fn given_criteria(payload: &Map<String, Value>) -> Map<String, Value> {
    payload
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn matching_records(
    entity: &EntityDescriptor,
    criteria: &Map<String, Value>,
    base: &dyn CrudBase,
) -> Result<Vec<Fields>> {
    Ok(base
        .scan(&entity.table_name())?
        .into_iter()
        .filter(|fields| {
            criteria
                .iter()
                .all(|(name, expected)| fields.get(name) == Some(expected))
        })
        .collect())
}

// ==================== Updates ====================

fn update_atom(
    entity: &EntityDescriptor,
    payload: &Map<String, Value>,
    base: &mut dyn CrudBase,
) -> Result<Outcome> {
    let key_value = payload
        .get(&entity.primary_key)
        .expect("schema requires the primary key");
    let key = RecordKey::from_value(key_value)?;
    let table = entity.table_name();

    let Some(mut fields) = base.get(&table, &key)? else {
        return Ok(Outcome::failure(vec![not_found(
            entity,
            criteria_one(&entity.primary_key, key_value),
        )]));
    };

    // Overwrite only the attributes explicitly present; no defaults apply.
    for (name, value) in payload {
        if *name == entity.primary_key || value.is_null() {
            continue;
        }
        fields.insert(name.clone(), value.clone());
    }
    base.update(&table, &key, fields.clone())?;
    Ok(Outcome::success(Value::Object(fields)))
}

fn update_aggregate(
    entity: &EntityDescriptor,
    payload: &Map<String, Value>,
    base: &mut dyn CrudBase,
    entities: &EntityIndex,
) -> Result<Outcome> {
    let key_value = payload
        .get(&entity.primary_key)
        .expect("schema requires the primary key");
    let key = RecordKey::from_value(key_value)?;

    let (writes, failures) = aggregate::plan_update(base, entities, entity, &key, payload)?;
    if !failures.is_empty() {
        return Ok(Outcome::failure(failures));
    }
    for write in writes {
        base.update(&write.table, &write.key, write.fields)?;
    }

    let updated = base
        .get(&entity.table_name(), &key)?
        .ok_or_else(|| CrudError::Storage(format!("record '{key}' vanished during update")))?;
    Ok(Outcome::success(Value::Object(updated)))
}

// ==================== Removal ====================

fn hard_delete(
    entity: &EntityDescriptor,
    payload: &Map<String, Value>,
    base: &mut dyn CrudBase,
) -> Result<Outcome> {
    let key_value = payload
        .get(&entity.local_input_name())
        .expect("schema requires the entity input");
    let key = RecordKey::from_value(key_value)?;
    match base.delete(&entity.table_name(), &key)? {
        Some(fields) => Ok(Outcome::success(Value::Object(fields))),
        None => Ok(Outcome::failure(vec![not_found(
            entity,
            criteria_one(&entity.primary_key, key_value),
        )])),
    }
}

// ==================== Collection mutations ====================

fn collection_mutation(
    spec: &CommandSpec,
    payload: &Map<String, Value>,
    base: &mut dyn CrudBase,
    entities: &EntityIndex,
) -> Result<Outcome> {
    let entity = spec.entity.as_ref();
    let path = spec
        .collection_path
        .as_deref()
        .expect("append/remove commands carry a collection path");
    let association = entity
        .association_at(path)
        .ok_or_else(|| CrudError::Declaration(format!(
            "no association at '{}' on '{}'",
            path.join("."),
            entity.name
        )))?;
    let target = aggregate::resolve_entity(entities, entity, &association.target).ok_or_else(
        || {
            CrudError::Declaration(format!(
                "association target '{}' of '{}' is not registered",
                association.target, entity.name
            ))
        },
    )?;
    base.ensure_table(&target.table_name(), &target.primary_key)?;

    let element_input = match spec.kind {
        CommandKind::Append => "element_to_append",
        _ => "element_to_remove",
    };

    let record_key_value = payload
        .get(&entity.local_input_name())
        .expect("schema requires the entity input");
    let record_key = RecordKey::from_value(record_key_value)?;
    let Some(mut fields) = base.get(&entity.table_name(), &record_key)? else {
        return Ok(Outcome::failure(vec![not_found(
            entity,
            criteria_one(&entity.primary_key, record_key_value),
        )]));
    };

    let element_key_value = payload
        .get(element_input)
        .expect("schema requires the element input");
    let element_key = RecordKey::from_value(element_key_value)?;
    let Some(element) = base.get(&target.table_name(), &element_key)? else {
        return Ok(Outcome::failure(vec![not_found(
            &target,
            criteria_one(&target.primary_key, element_key_value),
        )]));
    };

    let collection: Vec<Value> = fieldpath::get_path(&fields, path)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let new_collection = match spec.kind {
        CommandKind::Append => {
            let mut extended = collection;
            extended.push(element_key.to_value());
            extended
        }
        _ => {
            let filtered: Vec<Value> = collection
                .iter()
                .filter(|stored| {
                    RecordKey::from_value(stored).map(|k| k != element_key).unwrap_or(true)
                })
                .cloned()
                .collect();
            if filtered.len() == collection.len() {
                // Nothing matched; the collection stays as it is.
                return Ok(Outcome::failure(vec![Failure::ElementNotInCollection {
                    entity: entity.name.clone(),
                    path: path.join("."),
                }]));
            }
            filtered
        }
    };

    fieldpath::set_path(&mut fields, path, Value::Array(new_collection));
    base.update(&entity.table_name(), &record_key, fields)?;
    Ok(Outcome::success(Value::Object(element)))
}

fn not_found(entity: &EntityDescriptor, criteria: Value) -> Failure {
    Failure::NotFound {
        entity: entity.name.clone(),
        criteria,
    }
}

/// Single-field criteria object for NotFound reporting.
fn criteria_one(name: &str, value: &Value) -> Value {
    let mut map = Map::new();
    map.insert(name.to_string(), value.clone());
    Value::Object(map)
}
