#![allow(missing_docs)]

mod support;

use gql_cypher::{TranslateError, Value};
use serde_json::{json, Value as Json};
use support::{assert_contains, assert_lacks, translate, try_translate};

fn update_posts(input: Json) -> Result<gql_cypher::QueryPlan, TranslateError> {
    try_translate(json!({
        "entity": "Post",
        "operation": "UPDATE",
        "where": { "title": "old" },
        "mutationInput": input,
        "selection": [{ "name": "title" }]
    }))
}

#[test]
fn create_wraps_each_input_in_its_own_subquery() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "CREATE",
        "mutationInput": [{ "name": "Ann" }, { "name": "Bob", "age": 41 }],
        "selection": [{ "name": "name" }]
    }));
    assert_contains(
        &plan,
        &[
            "CALL {\n    CREATE (this0:User)",
            "this0.id = randomUUID()",
            "this0.name = $this0_name",
            "this0.createdAt = datetime()",
            "    RETURN this0\n}",
            "CREATE (this1:User)",
            "this1.age = $this1_age",
            "UNWIND [this0, this1] AS this",
            "RETURN collect(this { .name }) AS data",
        ],
    );
    assert_eq!(plan.parameters.get("this0_name"), Some(&Value::String("Ann".to_owned())));
    assert_eq!(plan.parameters.get("this1_age"), Some(&Value::Int(41)));
}

#[test]
fn create_accepts_a_single_object() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "CREATE",
        "mutationInput": { "name": "Ann" }
    }));
    assert_contains(&plan, &["UNWIND [this0] AS this"]);
}

#[test]
fn create_rejects_empty_and_generated_inputs() {
    let err = try_translate(json!({
        "entity": "User",
        "operation": "CREATE",
        "mutationInput": []
    }))
    .expect_err("empty create");
    assert!(matches!(err, TranslateError::InvalidValue { .. }), "{err:?}");

    let err = try_translate(json!({
        "entity": "User",
        "operation": "CREATE",
        "mutationInput": { "name": "Ann", "createdAt": "2024-01-01T00:00:00Z" }
    }))
    .expect_err("timestamp input");
    assert!(matches!(err, TranslateError::InvalidValue { .. }), "{err:?}");

    let err = try_translate(json!({
        "entity": "User",
        "operation": "CREATE",
        "mutationInput": { "nickname": "A" }
    }))
    .expect_err("unknown field");
    assert!(matches!(err, TranslateError::SchemaMismatch { .. }), "{err:?}");
}

#[test]
fn create_asserts_required_to_one_relationships() {
    let plan = translate(json!({
        "entity": "Post",
        "operation": "CREATE",
        "mutationInput": { "title": "Hello" }
    }));
    assert_contains(
        &plan,
        &[
            "= 1), \"RELATIONSHIP-REQUIRED: Post.author required exactly once\", [0])",
            "<= 1), \"RELATIONSHIP-REQUIRED: Post.editor must be less than or equal to one\", [0])",
        ],
    );
}

#[test]
fn nested_create_merges_the_relationship() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "CREATE",
        "mutationInput": {
            "name": "Ann",
            "posts": { "create": [{ "node": { "title": "First" } }] }
        }
    }));
    assert_contains(
        &plan,
        &[
            "CREATE (this1:Post)",
            "this1.title = $this0_posts_create0_node_title",
            "MERGE (this0)-[this2:AUTHORED]->(this1)",
            "RELATIONSHIP-REQUIRED: Post.author required exactly once",
        ],
    );
    assert_eq!(
        plan.parameters.get("this0_posts_create0_node_title"),
        Some(&Value::String("First".to_owned()))
    );
}

#[test]
fn nested_create_sets_edge_properties() {
    let plan = translate(json!({
        "entity": "Movie",
        "operation": "CREATE",
        "mutationInput": {
            "title": "Heat",
            "actors": { "create": [{ "node": { "name": "Al" }, "edge": { "role": "Hanna" } }] }
        }
    }));
    assert_contains(
        &plan,
        &[
            "CREATE (this1:Actor:Person)",
            "MERGE (this0)<-[this2:ACTED_IN]-(this1)",
            "this2.role = $this0_actors_create0_edge_role",
        ],
    );
}

#[test]
fn connect_matches_then_merges() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "CREATE",
        "mutationInput": {
            "name": "Ann",
            "posts": { "connect": [{ "where": { "node": { "title": "Draft" } } }] }
        }
    }));
    assert_contains(
        &plan,
        &[
            "OPTIONAL MATCH (this1:Post)",
            "this1.title = $this0_posts_connect0_where_node_title",
            "WITH this0, this1\n",
            "WHERE this1 IS NOT NULL",
            "MERGE (this0)-[this2:AUTHORED]->(this1)",
            "RELATIONSHIP-REQUIRED: User.posts required exactly once for a specific Post",
        ],
    );
}

#[test]
fn connect_without_overwrite_creates_a_new_relationship() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "CREATE",
        "mutationInput": {
            "name": "Ann",
            "posts": { "connect": [{ "where": { "node": { "title": "Draft" } }, "overwrite": false }] }
        }
    }));
    assert_contains(&plan, &["CREATE (this0)-[this2:AUTHORED]->(this1)"]);
    assert_lacks(&plan, &["MERGE (this0)-[this2:AUTHORED]->(this1)"]);
}

#[test]
fn abstract_entities_cannot_be_created() {
    let err = try_translate(json!({
        "entity": "Production",
        "operation": "CREATE",
        "mutationInput": { "title": "x" }
    }))
    .expect_err("abstract");
    assert!(matches!(err, TranslateError::SchemaMismatch { .. }), "{err:?}");
}

#[test]
fn update_sets_attributes_and_timestamps() {
    let plan = update_posts(json!({ "title": "new" })).expect("translate");
    assert_contains(
        &plan,
        &[
            "MATCH (this:Post)\nWHERE this.title = $this_where_title",
            "this.title = $this_update_title",
            "this.updatedAt = datetime()",
            "RETURN collect(DISTINCT this { .title }) AS data",
        ],
    );
    assert_eq!(plan.parameters.get("this_update_title"), Some(&Value::String("new".to_owned())));
}

#[test]
fn math_operators_guard_nulls_and_overflow() {
    let plan = update_posts(json!({ "views_INCREMENT": 3 })).expect("translate");
    assert_contains(
        &plan,
        &[
            "this.views = this.views + $this_update_views_INCREMENT",
            "\"Cannot %s %s to Nan\"",
            "\"Overflow: Value returned from operator %s is larger than %s bit\"",
        ],
    );

    let plan = update_posts(json!({ "rating_MULTIPLY": 1.5 })).expect("translate");
    assert_contains(
        &plan,
        &["this.rating = this.rating * $this_update_rating_MULTIPLY"],
    );
    assert_lacks(&plan, &["Overflow"]);
}

#[test]
fn math_operators_are_type_checked() {
    for input in [
        json!({ "views_ADD": 1 }),
        json!({ "rating_INCREMENT": 1 }),
        json!({ "rating_DIVIDE": 0 }),
        json!({ "title_INCREMENT": 1 }),
    ] {
        let err = update_posts(input.clone()).expect_err("rejected");
        assert!(matches!(err, TranslateError::InvalidValue { .. }), "{input}: {err:?}");
    }
}

#[test]
fn list_operators_append_and_slice() {
    let plan = update_posts(json!({ "tags_PUSH": ["a"] })).expect("translate");
    assert_contains(
        &plan,
        &[
            "this.tags = this.tags + $this_update_tags_PUSH",
            "\"Property %s cannot be NULL\"",
        ],
    );

    let plan = update_posts(json!({ "tags_POP": 2 })).expect("translate");
    assert_contains(
        &plan,
        &["this.tags = this.tags[0..size(this.tags) - $this_update_tags_POP]"],
    );
    assert_eq!(plan.parameters.get("this_update_tags_POP"), Some(&Value::Int(2)));
}

#[test]
fn same_field_cannot_be_written_twice() {
    let err = update_posts(json!({ "views": 1, "views_INCREMENT": 1 })).expect_err("twice");
    assert!(matches!(err, TranslateError::InvalidValue { .. }), "{err:?}");
}

#[test]
fn unknown_update_keys_are_schema_mismatches() {
    let err = update_posts(json!({ "likes_INCREMENT": 1 })).expect_err("unknown");
    assert!(matches!(err, TranslateError::SchemaMismatch { .. }), "{err:?}");
}

#[test]
fn disconnect_deletes_only_existing_edges() {
    let plan = update_posts(json!({
        "editor": [{ "disconnect": [{ "where": { "node": { "name": "Bob" } } }] }]
    }))
    .expect("translate");
    assert_contains(
        &plan,
        &[
            "OPTIONAL MATCH (this)<-[this1:EDITED]-(this0:User)",
            "this0.name = $this_update_editor0_disconnect0_where_node_name",
            "WHERE this1 IS NOT NULL",
            "DELETE this1",
        ],
    );
}

#[test]
fn nested_update_targets_matching_related_nodes() {
    let plan = try_translate(json!({
        "entity": "User",
        "operation": "UPDATE",
        "mutationInput": {
            "posts": [{
                "where": { "node": { "title": "Draft" } },
                "update": { "node": { "views_INCREMENT": 1 } }
            }]
        }
    }))
    .expect("translate");
    assert_contains(
        &plan,
        &[
            "MATCH (this)-[this1:AUTHORED]->(this0:Post)",
            "this0.title = $this_update_posts0_where_node_title",
            "this0.views = this0.views + $this_update_posts0_update_node_views_INCREMENT",
        ],
    );
}
