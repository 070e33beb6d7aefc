//! Command synthesis.
//!
//! Derives the full CRUD command family for one entity descriptor: one
//! generated name, input schema, result contract and declared failure set
//! per operation kind, registered into the command table. Append/remove
//! pairs exist only for simple-collection association paths.

use crate::command::outcome::FailureKind;
use crate::command::payload::{FieldKind, PayloadSchema};
use crate::command::registry::{CommandKind, CommandRegistry, CommandSpec, ResultContract};
use crate::core::Result;
use crate::schema::declaration::AttrType;
use crate::schema::entity::{Association, EntityDescriptor};
use convert_case::{Case, Casing};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Synthesizes commands for `entity` and registers them. Returns the names
/// that were newly defined; re-synthesis over an unchanged registry yields
/// an empty list. If any definition conflicts, the ones added by this call
/// are removed again before the error propagates.
pub fn synthesize(
    entity: &Arc<EntityDescriptor>,
    kinds: &[CommandKind],
    registry: &mut CommandRegistry,
) -> Result<Vec<String>> {
    let mut added = Vec::new();
    for kind in kinds {
        for spec in specs_for_kind(entity, *kind) {
            let name = spec.name.clone();
            match registry.define(spec) {
                Ok(true) => added.push(name),
                Ok(false) => {}
                Err(e) => {
                    for name in &added {
                        registry.remove(name);
                    }
                    return Err(e);
                }
            }
        }
    }
    if !added.is_empty() {
        info!(
            entity = %entity.scoped_name(),
            commands = added.len(),
            "synthesized entity commands"
        );
    }
    Ok(added)
}

fn specs_for_kind(entity: &Arc<EntityDescriptor>, kind: CommandKind) -> Vec<CommandSpec> {
    match kind {
        CommandKind::Create => vec![simple_spec(
            entity,
            kind,
            format!("Create{}", entity.name),
            create_schema(entity),
            ResultContract::Instance,
            vec![],
        )],
        CommandKind::Find => vec![simple_spec(
            entity,
            kind,
            format!("Find{}", entity.name),
            PayloadSchema::default()
                .require_field(entity.primary_key.clone(), key_field_kind(entity)),
            ResultContract::Instance,
            vec![FailureKind::NotFound],
        )],
        CommandKind::FindBy => vec![simple_spec(
            entity,
            kind,
            format!("Find{}By", entity.name),
            criteria_schema(entity),
            ResultContract::Instance,
            vec![FailureKind::NotFound],
        )],
        CommandKind::Query => vec![simple_spec(
            entity,
            kind,
            format!("Query{}", entity.name),
            criteria_schema(entity),
            ResultContract::InstanceList,
            vec![],
        )],
        CommandKind::QueryAll => vec![simple_spec(
            entity,
            kind,
            format!("QueryAll{}", entity.name),
            PayloadSchema::empty(),
            ResultContract::InstanceList,
            vec![],
        )],
        CommandKind::UpdateAtom => vec![simple_spec(
            entity,
            kind,
            format!("Update{}Atom", entity.name),
            update_schema(entity, false),
            ResultContract::Instance,
            vec![FailureKind::NotFound],
        )],
        CommandKind::UpdateAggregate => vec![simple_spec(
            entity,
            kind,
            format!("Update{}Aggregate", entity.name),
            update_schema(entity, true),
            ResultContract::Instance,
            vec![FailureKind::NotFound],
        )],
        CommandKind::HardDelete => vec![simple_spec(
            entity,
            kind,
            format!("HardDelete{}", entity.name),
            PayloadSchema::default().require_field(
                entity.local_input_name(),
                FieldKind::Ref {
                    entity: entity.name.clone(),
                },
            ),
            ResultContract::Instance,
            vec![FailureKind::NotFound],
        )],
        CommandKind::Append => collection_specs(entity, kind),
        CommandKind::Remove => collection_specs(entity, kind),
    }
}

fn simple_spec(
    entity: &Arc<EntityDescriptor>,
    kind: CommandKind,
    local_name: String,
    input_schema: PayloadSchema,
    result: ResultContract,
    possible_failures: Vec<FailureKind>,
) -> CommandSpec {
    CommandSpec {
        name: entity.scoped(&local_name),
        kind,
        entity: entity.clone(),
        input_schema,
        result,
        possible_failures,
        collection_path: None,
    }
}

// ==================== Schema derivation ====================

fn attr_field_kind(ty: &AttrType) -> FieldKind {
    match ty {
        AttrType::Integer => FieldKind::Integer,
        AttrType::Float => FieldKind::Float,
        AttrType::Text => FieldKind::Text,
        AttrType::Boolean => FieldKind::Boolean,
        AttrType::Ref { entity } => FieldKind::Ref {
            entity: entity.clone(),
        },
        AttrType::Array { element } => match element.as_ref() {
            AttrType::Ref { entity } => FieldKind::RefList {
                entity: entity.clone(),
            },
            _ => FieldKind::Array,
        },
        AttrType::Object { .. } => FieldKind::Object,
    }
}

/// Create schema: the full attribute schema, with the primary key omitted
/// when storage assigns it and required otherwise. A declared default makes
/// an otherwise-required attribute optional.
fn create_schema(entity: &EntityDescriptor) -> PayloadSchema {
    let mut schema = PayloadSchema::default();
    for attribute in &entity.attributes {
        let kind = attr_field_kind(&attribute.ty);
        if attribute.name == entity.primary_key {
            if !entity.storage_assigned_key() {
                schema = schema.require_field(attribute.name.clone(), kind);
            }
            continue;
        }
        if attribute.required && !attribute.has_default() {
            schema = schema.require_field(attribute.name.clone(), kind);
        } else {
            schema = schema.optional_field(attribute.name.clone(), kind);
        }
    }
    schema
}

/// find_by/query schema: every attribute optional, at least one expected.
fn criteria_schema(entity: &EntityDescriptor) -> PayloadSchema {
    let mut schema = PayloadSchema::default().require_some_field(true);
    for attribute in &entity.attributes {
        schema = schema.optional_field(attribute.name.clone(), attr_field_kind(&attribute.ty));
    }
    schema
}

/// Update schemas: primary key required, everything else optional and
/// applied without defaults. The aggregate variant accepts nested objects
/// (or object lists) for association attributes so they can be updated
/// recursively.
fn update_schema(entity: &EntityDescriptor, aggregate: bool) -> PayloadSchema {
    let mut schema =
        PayloadSchema::default().require_field(entity.primary_key.clone(), key_field_kind(entity));
    for attribute in &entity.attributes {
        if attribute.name == entity.primary_key {
            continue;
        }
        let path = [attribute.name.clone()];
        let kind = match (aggregate, entity.association_at(&path)) {
            (true, Some(assoc)) => match assoc.cardinality {
                crate::schema::Cardinality::Single => FieldKind::Object,
                crate::schema::Cardinality::Collection => FieldKind::Array,
            },
            _ => attr_field_kind(&attribute.ty),
        };
        schema = schema.optional_field(attribute.name.clone(), kind);
    }
    schema
}

fn key_field_kind(entity: &EntityDescriptor) -> FieldKind {
    attr_field_kind(&entity.primary_key_type)
}

// ==================== Collection commands ====================

fn collection_specs(entity: &Arc<EntityDescriptor>, kind: CommandKind) -> Vec<CommandSpec> {
    let labels = collection_labels(entity);
    entity
        .collection_associations()
        .map(|assoc| {
            let label = &labels[&assoc.path];
            let (verb, element_input) = match kind {
                CommandKind::Append => ("AppendTo", "element_to_append"),
                _ => ("RemoveFrom", "element_to_remove"),
            };
            let local_name = format!("{verb}{}{label}", entity.name);

            let mut possible_failures = vec![FailureKind::NotFound];
            if kind == CommandKind::Remove {
                possible_failures.push(FailureKind::ElementNotInCollection);
            }

            CommandSpec {
                name: entity.scoped(&local_name),
                kind,
                entity: entity.clone(),
                input_schema: PayloadSchema::default()
                    .require_field(
                        entity.local_input_name(),
                        FieldKind::Ref {
                            entity: entity.name.clone(),
                        },
                    )
                    .require_field(
                        element_input,
                        FieldKind::Ref {
                            entity: assoc.target.clone(),
                        },
                    ),
                result: ResultContract::Element {
                    entity: assoc.target.clone(),
                },
                possible_failures,
                collection_path: Some(assoc.path.clone()),
            }
        })
        .collect()
}

/// Deterministic qualifier per collection path: PascalCase of the last one
/// or two segments, falling back to the full path when two collections
/// would otherwise share a label.
fn collection_labels(entity: &EntityDescriptor) -> HashMap<Vec<String>, String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for assoc in entity.collection_associations() {
        *counts.entry(short_label(assoc)).or_insert(0) += 1;
    }

    entity
        .collection_associations()
        .map(|assoc| {
            let short = short_label(assoc);
            let label = if counts[&short] > 1 {
                pascal_join(&assoc.path)
            } else {
                short
            };
            (assoc.path.clone(), label)
        })
        .collect()
}

fn short_label(assoc: &Association) -> String {
    let start = assoc.path.len().saturating_sub(2);
    pascal_join(&assoc.path[start..])
}

fn pascal_join(segments: &[String]) -> String {
    segments
        .iter()
        .map(|segment| segment.to_case(Case::Pascal))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compiler::{self, CompiledType, TypeId, TypeKind};
    use serde_json::json;

    fn descriptor(declaration: serde_json::Value) -> Arc<EntityDescriptor> {
        let canonical = compiler::canonicalize(&declaration).unwrap();
        let compiled = CompiledType {
            id: TypeId(0),
            kind: TypeKind::Entity,
            name: compiler::name_of(&canonical),
            declaration: canonical,
        };
        let name = compiled.name.clone().unwrap();
        Arc::new(EntityDescriptor::derive(&compiled, &name, &[]).unwrap())
    }

    fn user_with_reviews() -> Arc<EntityDescriptor> {
        descriptor(json!({
            "kind": "entity",
            "name": "User",
            "primary_key": "id",
            "attributes": {
                "id": "integer",
                "first_name": "text",
                "manager": {"type": "ref", "entity": "User"},
                "reviews": {"type": "array", "element": {"type": "ref", "entity": "Review"}, "default": []}
            }
        }))
    }

    #[test]
    fn synthesizes_the_full_default_family() {
        let mut registry = CommandRegistry::new();
        let names = synthesize(&user_with_reviews(), &CommandKind::ALL, &mut registry).unwrap();

        for expected in [
            "CreateUser",
            "FindUser",
            "FindUserBy",
            "QueryUser",
            "QueryAllUser",
            "UpdateUserAtom",
            "UpdateUserAggregate",
            "HardDeleteUser",
            "AppendToUserReviews",
            "RemoveFromUserReviews",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn resynthesis_is_idempotent() {
        let mut registry = CommandRegistry::new();
        let entity = user_with_reviews();
        synthesize(&entity, &CommandKind::ALL, &mut registry).unwrap();
        let second = synthesize(&entity, &CommandKind::ALL, &mut registry).unwrap();
        assert!(second.is_empty());
        assert_eq!(registry.len(), 10);
    }

    #[test]
    fn single_valued_associations_get_no_collection_commands() {
        let mut registry = CommandRegistry::new();
        let entity = descriptor(json!({
            "kind": "entity",
            "name": "Task",
            "primary_key": "id",
            "attributes": {
                "id": "integer",
                "owner": {"type": "ref", "entity": "User"}
            }
        }));
        let names = synthesize(&entity, &CommandKind::ALL, &mut registry).unwrap();
        assert!(!names.iter().any(|n| n.starts_with("AppendTo")));
        assert!(!names.iter().any(|n| n.starts_with("RemoveFrom")));
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn nested_collection_labels_use_two_path_segments() {
        let mut registry = CommandRegistry::new();
        let entity = descriptor(json!({
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
        let names = synthesize(&entity, &CommandKind::ALL, &mut registry).unwrap();
        assert!(names.contains(&"AppendToUserProfileBadges".to_string()));
        assert!(names.contains(&"RemoveFromUserProfileBadges".to_string()));
    }

    #[test]
    fn create_schema_omits_storage_assigned_keys() {
        let entity = user_with_reviews();
        let schema = create_schema(&entity);
        assert!(schema.field("id").is_none());
        assert!(schema.field("first_name").is_some());

        // Declared defaults make the attribute optional.
        assert!(!schema.field("reviews").unwrap().required);
    }

    #[test]
    fn caller_supplied_keys_are_required_on_create() {
        let entity = descriptor(json!({
            "kind": "entity",
            "name": "Tag",
            "primary_key": "slug",
            "attributes": { "slug": "text", "label": "text" }
        }));
        let schema = create_schema(&entity);
        assert!(schema.field("slug").unwrap().required);
    }

    #[test]
    fn commands_are_scoped_under_the_entity_domain() {
        let mut registry = CommandRegistry::new();
        let canonical = compiler::canonicalize(&json!({
            "kind": "entity",
            "name": "User",
            "primary_key": "id",
            "attributes": { "id": "integer" }
        }))
        .unwrap();
        let compiled = CompiledType {
            id: TypeId(0),
            kind: TypeKind::Entity,
            name: compiler::name_of(&canonical),
            declaration: canonical,
        };
        let entity = Arc::new(
            EntityDescriptor::derive(&compiled, "User", &["some_org".into(), "crm".into()])
                .unwrap(),
        );
        let names = synthesize(&entity, &[CommandKind::Create], &mut registry).unwrap();
        assert_eq!(names, vec!["some_org.crm.CreateUser".to_string()]);
    }
}
