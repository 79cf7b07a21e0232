#![allow(missing_docs)]

mod support;

use gql_cypher::{SchemaModel, TranslateError, Translator, TranslatorOptions, Value};
use serde_json::{json, Value as Json};
use support::{
    anonymous, assert_contains, assert_lacks, request, translate, try_translate, try_translate_with, user,
};

fn delete_users(input: Json, track: bool) -> gql_cypher::QueryPlan {
    try_translate_with(
        json!({
            "entity": "User",
            "operation": "DELETE",
            "where": { "name": "Ann" },
            "mutationInput": input
        }),
        &anonymous(),
        TranslatorOptions::default().with_change_events(track),
    )
    .expect("translate")
}

#[test]
fn plain_delete_detaches_matched_nodes() {
    let plan = delete_users(Json::Null, false);
    assert_eq!(
        plan.cypher(),
        "MATCH (this:User)\nWHERE this.name = $this_where_name\nDETACH DELETE this"
    );
}

#[test]
fn nested_deletes_collect_then_detach() {
    let plan = delete_users(
        json!({ "posts": [{ "where": { "node": { "title": "spam" } } }] }),
        false,
    );
    assert_eq!(
        plan.cypher(),
        [
            "MATCH (this:User)",
            "WHERE this.name = $this_where_name",
            "CALL {",
            "    WITH this",
            "    OPTIONAL MATCH (this)-[this1:AUTHORED]->(this0:Post)",
            "    WHERE this0.title = $this_delete_posts0_where_node_title",
            "    WITH collect(DISTINCT this0) AS var2",
            "    CALL {",
            "        WITH var2",
            "        UNWIND var2 AS var4",
            "        DETACH DELETE var4",
            "        RETURN count(*) AS var5",
            "    }",
            "    RETURN count(*) AS var3",
            "}",
            "DETACH DELETE this",
        ]
        .join("\n")
    );
    assert_eq!(
        plan.parameters.get("this_delete_posts0_where_node_title"),
        Some(&Value::String("spam".to_owned()))
    );
}

#[test]
fn cascades_run_depth_first() {
    let plan = translate(json!({
        "entity": "Actor",
        "operation": "DELETE",
        "mutationInput": {
            "movies": [{
                "where": { "node": { "title": "Heat" } },
                "delete": { "actors": [{ "where": { "edge": { "role": "Extra" } } }] }
            }]
        }
    }));
    let cypher = plan.cypher();
    let outer = cypher.find("OPTIONAL MATCH (this)-[this1:ACTED_IN]->(this0:Movie)").expect("outer match");
    let inner = cypher
        .find("OPTIONAL MATCH (this0)<-[this3:ACTED_IN]-(this2:Actor:Person)")
        .expect("inner match");
    let outer_delete = cypher.rfind("DETACH DELETE this").expect("root delete");
    assert!(outer < inner && inner < outer_delete, "{cypher}");
    assert_contains(
        &plan,
        &[
            "this0.title = $this_delete_movies0_where_node_title",
            "this3.role = $this_delete_movies0_delete_actors0_where_edge_role",
        ],
    );
}

#[test]
fn tracked_deletes_return_change_events() {
    let plan = delete_users(Json::Null, true);
    assert_contains(
        &plan,
        &[
            "WITH *, [{ event: \"delete\", id: id(this)",
            "typename: \"User\"",
            "timestamp: timestamp()",
            "AS meta0",
            "DETACH DELETE this\nRETURN reduce(",
            "collect(meta0)",
            ") AS meta",
        ],
    );
}

#[test]
fn tracked_cascades_fold_nested_events() {
    let plan = delete_users(json!({ "posts": [{}] }), true);
    assert_contains(
        &plan,
        &["typename: \"Post\"", "typename: \"User\"", "RETURN reduce("],
    );
    let cypher = plan.cypher();
    assert!(cypher.matches("event: \"delete\"").count() >= 2, "{cypher}");
}

#[test]
fn untracked_deletes_return_nothing() {
    let plan = delete_users(json!({ "posts": [{}] }), false);
    assert_lacks(&plan, &["meta", "event:"]);
    assert!(plan.cypher().ends_with("DETACH DELETE this"));
}

#[test]
fn unknown_nested_relationships_are_rejected() {
    let err = try_translate(json!({
        "entity": "User",
        "operation": "DELETE",
        "mutationInput": { "friends": [{}] }
    }))
    .expect_err("unknown relationship");
    assert!(matches!(err, TranslateError::SchemaMismatch { .. }), "{err:?}");
}

#[test]
fn union_deletes_key_inputs_by_member() {
    let plan = delete_users(
        json!({ "likes": { "Movie": [{ "where": { "node": { "title": "Heat" } } }] } }),
        false,
    );
    assert_contains(
        &plan,
        &[
            "OPTIONAL MATCH (this)-[this1:LIKES]->(this0:Movie)",
            "this0.title = $this_delete_likes_Movie0_where_node_title",
        ],
    );
    assert_lacks(&plan, &[":Actor"]);
}

const GUARDED_SCHEMA: &str = r#"{
    "nodes": [
        {
            "name": "User",
            "authorization": {
                "validate": [{
                    "operations": ["DELETE"],
                    "when": ["BEFORE"],
                    "where": { "jwt": { "roles_INCLUDES": "super-admin" } }
                }]
            },
            "fields": [
                { "name": "name", "type": "String!" },
                {
                    "name": "posts",
                    "type": "[Post!]!",
                    "relationship": { "type": "AUTHORED", "direction": "OUT" }
                }
            ]
        },
        {
            "name": "Post",
            "authorization": {
                "validate": [{
                    "operations": ["DELETE"],
                    "when": ["BEFORE"],
                    "where": { "jwt": { "roles_INCLUDES": "super-admin" } }
                }]
            },
            "fields": [{ "name": "title", "type": "String!" }]
        }
    ]
}"#;

#[test]
fn cascade_validation_precedes_each_detach() {
    let schema = SchemaModel::from_json(GUARDED_SCHEMA).expect("schema builds");
    let plan = Translator::new(&schema, TranslatorOptions::default())
        .translate(
            &request(json!({
                "entity": "User",
                "operation": "DELETE",
                "mutationInput": { "posts": [{ "where": { "node": { "title": "spam" } } }] }
            })),
            &user("u1", &["admin"]),
        )
        .expect("translate");
    let cypher = plan.cypher();
    let position = |fragment: &str| {
        cypher
            .find(fragment)
            .unwrap_or_else(|| panic!("expected {fragment:?} in:\n{cypher}"))
    };

    let validations: Vec<usize> = cypher.match_indices("apoc.util.validate(").map(|(at, _)| at).collect();
    assert_eq!(validations.len(), 2, "{cypher}");
    let nested_match = position("OPTIONAL MATCH (this)-[this1:AUTHORED]->(this0:Post)");
    let nested_detach = position("DETACH DELETE var4");
    let root_detach = cypher.rfind("DETACH DELETE this").expect("root delete");
    assert!(nested_match < validations[0], "{cypher}");
    assert!(validations[0] < position("WITH collect(DISTINCT this0) AS var2"), "{cypher}");
    assert!(validations[0] < nested_detach, "{cypher}");
    assert!(nested_detach < validations[1], "{cypher}");
    assert!(validations[1] < root_detach, "{cypher}");
    assert!(cypher.ends_with("DETACH DELETE this"), "{cypher}");

    assert!(plan.parameters.get("jwt").is_some());
    let bound: Vec<&Value> = plan
        .parameters
        .iter()
        .filter(|(name, _)| name.ends_with("_jwt_roles_INCLUDES"))
        .map(|(_, value)| value)
        .collect();
    assert_eq!(bound.len(), 2);
    assert!(bound.iter().all(|v| **v == Value::String("super-admin".to_owned())));
}
