use crudforge::{AttrDecl, CrudEngine, EntityBuilder, Failure, FailureKind, InMemoryBase};
use serde_json::json;

fn engine() -> CrudEngine {
    let mut engine = CrudEngine::with_base(InMemoryBase::new());
    engine.install().unwrap();
    engine
}

/// `{a: text, b: text, id: integer (storage-assigned)}`
fn engine_with_user() -> CrudEngine {
    let mut engine = engine();
    EntityBuilder::new("User")
        .attribute("a", AttrDecl::text())
        .attribute("b", AttrDecl::text())
        .attribute("id", AttrDecl::integer())
        .primary_key("id")
        .create(&mut engine)
        .unwrap();
    engine
}

/// `User` with a `reviews` collection of `Review`.
fn engine_with_user_reviews() -> CrudEngine {
    let mut engine = engine();
    EntityBuilder::new("Review")
        .attribute("id", AttrDecl::integer())
        .attribute("rating", AttrDecl::integer().required())
        .attribute("thoughts", AttrDecl::text())
        .create(&mut engine)
        .unwrap();
    EntityBuilder::new("User")
        .attribute("id", AttrDecl::integer())
        .attribute("name", AttrDecl::text())
        .attribute("reviews", AttrDecl::collection_of("Review"))
        .create(&mut engine)
        .unwrap();
    engine
}

#[test]
fn create_then_find_round_trip() {
    let mut engine = engine_with_user();

    let created = engine
        .run("CreateUser", &json!({"a": "x", "b": "y"}))
        .unwrap();
    assert!(created.is_success());
    let id = created.result().unwrap()["id"].clone();
    assert!(id.is_i64());

    let found = engine.run("FindUser", &json!({"id": id})).unwrap();
    assert!(found.is_success());
    let user = found.result().unwrap();
    assert_eq!(user["a"], json!("x"));
    assert_eq!(user["b"], json!("y"));
}

#[test]
fn find_reports_not_found_for_missing_records() {
    let mut engine = engine_with_user();
    let outcome = engine.run("FindUser", &json!({"id": 99})).unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.failures().len(), 1);
    assert_eq!(outcome.failures()[0].kind(), FailureKind::NotFound);
}

#[test]
fn update_atom_overwrites_only_given_attributes() {
    let mut engine = engine_with_user();
    let created = engine
        .run("CreateUser", &json!({"a": "x", "b": "y"}))
        .unwrap();
    let id = created.result().unwrap()["id"].clone();

    let updated = engine
        .run("UpdateUserAtom", &json!({"id": id, "a": "xx"}))
        .unwrap();
    assert!(updated.is_success());

    let user = engine.run("FindUser", &json!({"id": id})).unwrap();
    let user = user.result().unwrap();
    assert_eq!(user["a"], json!("xx"));
    assert_eq!(user["b"], json!("y"));
}

#[test]
fn find_by_returns_one_match_or_not_found() {
    let mut engine = engine_with_user();
    engine
        .run("CreateUser", &json!({"a": "x", "b": "same"}))
        .unwrap();
    engine
        .run("CreateUser", &json!({"a": "y", "b": "same"}))
        .unwrap();

    let first = engine.run("FindUserBy", &json!({"b": "same"})).unwrap();
    assert!(first.is_success());
    assert_eq!(first.result().unwrap()["a"], json!("x"));

    let both = engine.run("FindUserBy", &json!({"a": "x", "b": "same"})).unwrap();
    assert!(both.is_success());

    let missing = engine.run("FindUserBy", &json!({"b": "other"})).unwrap();
    assert!(!missing.is_success());
    assert_eq!(missing.failures()[0].kind(), FailureKind::NotFound);
}

#[test]
fn query_returns_all_matches_and_never_not_found() {
    let mut engine = engine_with_user();
    engine
        .run("CreateUser", &json!({"a": "x", "b": "same"}))
        .unwrap();
    engine
        .run("CreateUser", &json!({"a": "y", "b": "same"}))
        .unwrap();

    let matches = engine.run("QueryUser", &json!({"b": "same"})).unwrap();
    assert!(matches.is_success());
    assert_eq!(matches.result().unwrap().as_array().unwrap().len(), 2);

    let none = engine.run("QueryUser", &json!({"b": "other"})).unwrap();
    assert!(none.is_success());
    assert_eq!(none.result().unwrap().as_array().unwrap().len(), 0);

    let all = engine.run("QueryAllUser", &json!({})).unwrap();
    assert_eq!(all.result().unwrap().as_array().unwrap().len(), 2);
}

#[test]
fn criteria_commands_require_at_least_one_attribute() {
    let mut engine = engine_with_user();
    let outcome = engine.run("FindUserBy", &json!({})).unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.failures()[0].kind(), FailureKind::InvalidInput);
}

#[test]
fn hard_delete_returns_the_deleted_instance() {
    let mut engine = engine_with_user();
    let created = engine
        .run("CreateUser", &json!({"a": "x", "b": "y"}))
        .unwrap();
    let id = created.result().unwrap()["id"].clone();

    let deleted = engine.run("HardDeleteUser", &json!({"user": id})).unwrap();
    assert!(deleted.is_success());
    assert_eq!(deleted.result().unwrap()["a"], json!("x"));

    let found = engine.run("FindUser", &json!({"id": id})).unwrap();
    assert!(!found.is_success());

    let again = engine.run("HardDeleteUser", &json!({"user": id})).unwrap();
    assert_eq!(again.failures()[0].kind(), FailureKind::NotFound);
}

#[test]
fn append_and_remove_mutate_the_collection() {
    let mut engine = engine_with_user_reviews();
    engine.run("CreateReview", &json!({"rating": 5})).unwrap();
    engine.run("CreateReview", &json!({"rating": 3})).unwrap();
    engine
        .run("CreateUser", &json!({"name": "u", "reviews": [1]}))
        .unwrap();

    let appended = engine
        .run(
            "AppendToUserReviews",
            &json!({"user": 1, "element_to_append": 2}),
        )
        .unwrap();
    assert!(appended.is_success());
    assert_eq!(appended.result().unwrap()["rating"], json!(3));

    let user = engine.run("FindUser", &json!({"id": 1})).unwrap();
    assert_eq!(user.result().unwrap()["reviews"], json!([1, 2]));

    let removed = engine
        .run(
            "RemoveFromUserReviews",
            &json!({"user": 1, "element_to_remove": 1}),
        )
        .unwrap();
    assert!(removed.is_success());
    assert_eq!(removed.result().unwrap()["rating"], json!(5));

    let user = engine.run("FindUser", &json!({"id": 1})).unwrap();
    assert_eq!(user.result().unwrap()["reviews"], json!([2]));
}

#[test]
fn removing_an_absent_element_leaves_the_collection_unmodified() {
    let mut engine = engine_with_user_reviews();
    engine.run("CreateReview", &json!({"rating": 5})).unwrap();
    engine.run("CreateReview", &json!({"rating": 3})).unwrap();
    engine
        .run("CreateUser", &json!({"name": "u", "reviews": [2]}))
        .unwrap();

    let outcome = engine
        .run(
            "RemoveFromUserReviews",
            &json!({"user": 1, "element_to_remove": 1}),
        )
        .unwrap();
    assert!(!outcome.is_success());
    assert!(matches!(
        outcome.failures()[0],
        Failure::ElementNotInCollection { .. }
    ));

    let user = engine.run("FindUser", &json!({"id": 1})).unwrap();
    assert_eq!(user.result().unwrap()["reviews"], json!([2]));
}

#[test]
fn single_valued_associations_get_no_collection_commands() {
    let mut engine = engine();
    EntityBuilder::new("User")
        .attribute("id", AttrDecl::integer())
        .create(&mut engine)
        .unwrap();
    EntityBuilder::new("Task")
        .attribute("id", AttrDecl::integer())
        .attribute("owner", AttrDecl::reference("User"))
        .create(&mut engine)
        .unwrap();

    let names = engine.command_names();
    assert!(!names.iter().any(|n| n.contains("AppendToTask")));
    assert!(!names.iter().any(|n| n.contains("RemoveFromTask")));
    assert!(names.contains(&"CreateTask"));
}

#[test]
fn update_aggregate_updates_associated_records_recursively() {
    let mut engine = engine_with_user_reviews();
    engine
        .run("CreateReview", &json!({"rating": 5, "thoughts": "t"}))
        .unwrap();
    engine
        .run("CreateUser", &json!({"name": "u", "reviews": [1]}))
        .unwrap();

    let outcome = engine
        .run(
            "UpdateUserAggregate",
            &json!({
                "id": 1,
                "name": "nn",
                "reviews": [{"id": 1, "rating": 9}]
            }),
        )
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.result().unwrap()["name"], json!("nn"));

    let review = engine.run("FindReview", &json!({"id": 1})).unwrap();
    let review = review.result().unwrap();
    assert_eq!(review["rating"], json!(9));
    assert_eq!(review["thoughts"], json!("t"));
}

#[test]
fn update_atom_does_not_recurse_into_associations() {
    let mut engine = engine_with_user_reviews();
    engine.run("CreateReview", &json!({"rating": 5})).unwrap();
    engine
        .run("CreateUser", &json!({"name": "u", "reviews": [1]}))
        .unwrap();

    // The atom schema types `reviews` as a key list, not nested objects.
    let outcome = engine
        .run(
            "UpdateUserAtom",
            &json!({"id": 1, "reviews": [{"id": 1, "rating": 9}]}),
        )
        .unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.failures()[0].kind(), FailureKind::InvalidInput);
}

#[test]
fn payloads_are_validated_before_execution() {
    let mut engine = engine_with_user();

    let unknown = engine
        .run("CreateUser", &json!({"a": "x", "nope": 1}))
        .unwrap();
    assert!(!unknown.is_success());
    assert_eq!(unknown.failures()[0].kind(), FailureKind::InvalidInput);

    let missing = engine.run("FindUser", &json!({})).unwrap();
    assert!(!missing.is_success());

    let mistyped = engine.run("FindUser", &json!({"id": "one"})).unwrap();
    assert!(!mistyped.is_success());
}

#[test]
fn required_create_attributes_are_enforced() {
    let mut engine = engine_with_user_reviews();
    let outcome = engine.run("CreateReview", &json!({"thoughts": "t"})).unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.failures()[0].kind(), FailureKind::InvalidInput);
}

#[test]
fn unknown_commands_are_a_fatal_error() {
    let mut engine = engine_with_user();
    assert!(engine.run("CreateGhost", &json!({})).is_err());
}
