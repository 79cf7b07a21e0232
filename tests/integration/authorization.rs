#![allow(missing_docs)]

mod support;

use gql_cypher::config::AuthorizationSettings;
use gql_cypher::{AuthContext, TranslatorOptions, Value};
use serde_json::json;
use support::{anonymous, assert_contains, assert_lacks, claims, translate_as, try_translate_with, user};

fn read_documents() -> serde_json::Value {
    json!({
        "entity": "Document",
        "operation": "READ",
        "selection": [{ "name": "body" }]
    })
}

#[test]
fn anonymous_reads_are_filtered_out() {
    let plan = translate_as(read_documents(), &anonymous());
    assert_contains(&plan, &["MATCH (this:Document)\nWHERE false"]);
    assert!(plan.parameters.is_empty());
}

#[test]
fn claim_references_bind_the_claim_value() {
    let plan = translate_as(read_documents(), &user("u1", &[]));
    assert_contains(&plan, &["WHERE this.owner = $this_auth0_node_owner"]);
    assert_eq!(
        plan.parameters.get("this_auth0_node_owner"),
        Some(&Value::String("u1".to_owned()))
    );
    assert!(plan.parameters.get("jwt").is_none());
}

#[test]
fn missing_claims_deny_the_rule() {
    let auth = AuthContext::authenticated(claims(json!({ "roles": ["admin"] })));
    let plan = translate_as(read_documents(), &auth);
    assert_contains(&plan, &["WHERE false"]);
}

#[test]
fn request_filters_and_rules_are_conjoined() {
    let mut request = read_documents();
    request["where"] = json!({ "body_CONTAINS": "draft" });
    let plan = translate_as(request, &user("u1", &[]));
    assert_contains(
        &plan,
        &[
            "this.body CONTAINS $this_where_body_CONTAINS",
            "this.owner = $this_auth0_node_owner",
        ],
    );
}

#[test]
fn validate_rules_run_before_updates() {
    let plan = translate_as(
        json!({
            "entity": "Document",
            "operation": "UPDATE",
            "mutationInput": { "body": "new" },
            "selection": [{ "name": "body" }]
        }),
        &user("u1", &["editor"]),
    );
    assert_contains(
        &plan,
        &["CALL apoc.util.validate(NOT ($this_auth0_jwt_roles_INCLUDES IN $jwt.roles), \"FORBIDDEN\", [0])"],
    );
    assert_eq!(
        plan.parameters.get("this_auth0_jwt_roles_INCLUDES"),
        Some(&Value::String("editor".to_owned()))
    );
    assert!(plan.parameters.get("jwt").is_some());
}

#[test]
fn anonymous_validation_always_fails() {
    let plan = translate_as(
        json!({
            "entity": "Document",
            "operation": "DELETE"
        }),
        &anonymous(),
    );
    assert_contains(
        &plan,
        &["CALL apoc.util.validate(true, \"FORBIDDEN\", [0])", "DETACH DELETE this"],
    );
    assert!(plan.parameters.get("jwt").is_none());
}

#[test]
fn validate_rules_skip_other_operations() {
    let plan = translate_as(read_documents(), &user("u1", &["editor"]));
    assert_lacks(&plan, &["apoc.util.validate"]);
}

#[test]
fn field_rules_apply_only_when_selected() {
    let without = translate_as(
        json!({ "entity": "User", "operation": "READ", "selection": [{ "name": "name" }] }),
        &user("u1", &[]),
    );
    assert_lacks(&without, &["$this_auth0_node_id"]);

    let with = translate_as(
        json!({
            "entity": "User",
            "operation": "READ",
            "selection": [{ "name": "name" }, { "name": "email" }]
        }),
        &user("u1", &[]),
    );
    assert_contains(&with, &["this.id = $this_auth0_node_id"]);
    assert_eq!(
        with.parameters.get("this_auth0_node_id"),
        Some(&Value::String("u1".to_owned()))
    );
}

#[test]
fn sort_keys_apply_field_rules() {
    let plan = translate_as(
        json!({
            "entity": "User",
            "operation": "READ",
            "sort": [{ "email": "ASC" }],
            "selection": [{ "name": "name" }]
        }),
        &user("u1", &[]),
    );
    assert_contains(
        &plan,
        &[
            "this.id = $this_auth0_node_id",
            "ORDER BY this.email ASC",
            "RETURN this { .name } AS this",
        ],
    );
}

#[test]
fn nested_sort_keys_are_authorized_and_hidden() {
    let posts_sorted_by = |key: &str| {
        json!({
            "entity": "User",
            "operation": "READ",
            "selection": [{
                "name": "posts",
                "args": { "sort": [{ key: "DESC" }] },
                "selection": [{ "name": "title" }]
            }]
        })
    };
    let plan = translate_as(posts_sorted_by("notes"), &anonymous());
    assert_contains(
        &plan,
        &[
            "MATCH (this)-[:AUTHORED]->(this0:Post)\n    WHERE false",
            "WITH this0 { .title, .notes } AS this0",
            "ORDER BY this0.notes DESC",
        ],
    );
    let cypher = plan.cypher();
    let ordered = cypher.find("ORDER BY this0.notes DESC").expect("order by");
    let hidden = cypher.find("WITH this0 { .title } AS this0").expect("sort key dropped");
    assert!(ordered < hidden, "{cypher}");

    let plan = translate_as(posts_sorted_by("notes"), &user("u1", &["editor"]));
    assert_contains(&plan, &["IN $jwt.roles", "WITH this0 { .title } AS this0"]);
    assert_lacks(&plan, &["WHERE false"]);

    let plan = translate_as(posts_sorted_by("title"), &anonymous());
    assert_lacks(&plan, &["WHERE false"]);
    assert_eq!(plan.cypher().matches("WITH this0 { .title } AS this0").count(), 1);
}

#[test]
fn claim_paths_remap_token_fields() {
    let settings = AuthorizationSettings {
        claim_paths: [("sub".to_owned(), "identity.user".to_owned())].into_iter().collect(),
    };
    let auth = AuthContext::authenticated(claims(json!({ "identity": { "user": "u9" } })))
        .with_claim_paths(&settings);
    let plan = translate_as(read_documents(), &auth);
    assert_eq!(
        plan.parameters.get("this_auth0_node_owner"),
        Some(&Value::String("u9".to_owned()))
    );
}

#[test]
fn nested_reads_apply_target_rules() {
    let plan = try_translate_with(
        json!({
            "entity": "Post",
            "operation": "READ",
            "limit": 1,
            "selection": [{ "name": "author", "selection": [{ "name": "email" }] }]
        }),
        &anonymous(),
        TranslatorOptions::default(),
    )
    .expect("translate");
    assert_contains(&plan, &["WHERE false"]);
}
