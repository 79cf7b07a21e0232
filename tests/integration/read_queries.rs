#![allow(missing_docs)]

mod support;

use gql_cypher::translate::{decode_cursor, encode_cursor};
use gql_cypher::{TranslateError, TranslatorOptions, Value};
use serde_json::json;
use support::{anonymous, assert_contains, assert_lacks, translate, try_translate, try_translate_with};

#[test]
fn filtered_read_renders_match_where_return() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "READ",
        "where": { "name": "Ann" },
        "selection": [{ "name": "name" }]
    }));
    assert_eq!(
        plan.cypher(),
        "MATCH (this:User)\nWHERE this.name = $this_where_name\nRETURN this { .name } AS this"
    );
    assert_eq!(
        plan.parameters.get("this_where_name"),
        Some(&Value::String("Ann".to_owned()))
    );
    assert_eq!(plan.parameters.len(), 1);
}

#[test]
fn sort_and_pagination_follow_the_match() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "READ",
        "sort": [{ "name": "DESC" }],
        "limit": 5,
        "offset": 10,
        "selection": [{ "name": "name" }]
    }));
    assert_eq!(
        plan.cypher(),
        "MATCH (this:User)\nWITH *\nORDER BY this.name DESC\nSKIP $this_offset\nLIMIT $this_limit\nRETURN this { .name } AS this"
    );
    assert_eq!(plan.parameters.get("this_limit"), Some(&Value::Int(5)));
    assert_eq!(plan.parameters.get("this_offset"), Some(&Value::Int(10)));
}

#[test]
fn negative_limit_is_rejected() {
    let err = try_translate(json!({
        "entity": "User",
        "operation": "READ",
        "limit": -1,
        "selection": [{ "name": "name" }]
    }))
    .expect_err("negative limit");
    match err {
        TranslateError::InvalidPagination { argument, .. } => assert_eq!(argument, "limit"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unknown_sort_direction_is_rejected() {
    let err = try_translate(json!({
        "entity": "User",
        "operation": "READ",
        "sort": [{ "name": "UP" }],
        "selection": [{ "name": "name" }]
    }))
    .expect_err("bad direction");
    assert!(matches!(err, TranslateError::InvalidValue { .. }), "{err:?}");
}

#[test]
fn entity_limits_cap_requested_limits() {
    let plan = translate(json!({
        "entity": "Post",
        "operation": "READ",
        "limit": 500,
        "selection": [{ "name": "title" }]
    }));
    assert_eq!(plan.parameters.get("this_limit"), Some(&Value::Int(50)));

    let plan = translate(json!({
        "entity": "Post",
        "operation": "READ",
        "selection": [{ "name": "title" }]
    }));
    assert_eq!(plan.parameters.get("this_limit"), Some(&Value::Int(20)));
}

#[test]
fn global_limits_apply_at_the_root() {
    let options = TranslatorOptions::default().with_limits(Some(7), Some(30));
    let plan = try_translate_with(
        json!({
            "entity": "User",
            "operation": "READ",
            "selection": [{ "name": "name" }]
        }),
        &anonymous(),
        options.clone(),
    )
    .expect("translate");
    assert_eq!(plan.parameters.get("this_limit"), Some(&Value::Int(7)));

    let plan = try_translate_with(
        json!({
            "entity": "Post",
            "operation": "READ",
            "limit": 45,
            "selection": [{ "name": "title" }]
        }),
        &anonymous(),
        options,
    )
    .expect("translate");
    assert_eq!(plan.parameters.get("this_limit"), Some(&Value::Int(30)));
}

#[test]
fn nested_relationship_is_collected_in_a_subquery() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "READ",
        "selection": [
            { "name": "name" },
            {
                "name": "posts",
                "args": { "where": { "title_CONTAINS": "rust" }, "limit": 2 },
                "selection": [{ "name": "title" }]
            }
        ]
    }));
    assert_eq!(
        plan.cypher(),
        [
            "MATCH (this:User)",
            "CALL {",
            "    WITH this",
            "    MATCH (this)-[:AUTHORED]->(this0:Post)",
            "    WHERE this0.title CONTAINS $this_posts_where_title_CONTAINS",
            "    WITH this0 { .title } AS this0",
            "    WITH this0",
            "    LIMIT $this_posts_limit",
            "    RETURN collect(this0) AS var1",
            "}",
            "RETURN this { .name, posts: var1 } AS this",
        ]
        .join("\n")
    );
    assert_eq!(plan.parameters.get("this_posts_limit"), Some(&Value::Int(2)));
}

#[test]
fn to_one_relationship_takes_the_head() {
    let plan = translate(json!({
        "entity": "Post",
        "operation": "READ",
        "limit": 1,
        "selection": [
            { "name": "title" },
            { "name": "author", "selection": [{ "name": "name" }] }
        ]
    }));
    assert_contains(
        &plan,
        &["MATCH (this)<-[:AUTHORED]-(this0:User)", "head(collect(", "author: var1"],
    );
}

#[test]
fn aliases_become_response_keys() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "READ",
        "selection": [{ "name": "name", "alias": "displayName" }]
    }));
    assert_contains(&plan, &["RETURN this { displayName: this.name } AS this"]);
}

#[test]
fn interface_read_unions_every_member() {
    let plan = translate(json!({
        "entity": "Production",
        "operation": "READ",
        "selection": [{ "name": "title" }]
    }));
    assert_eq!(
        plan.cypher(),
        [
            "CALL {",
            "    MATCH (this0:Movie)",
            "    WITH this0 { __resolveType: \"Movie\", .title } AS this",
            "    RETURN this",
            "    UNION",
            "    MATCH (this1:Series)",
            "    WITH this1 { __resolveType: \"Series\", .title } AS this",
            "    RETURN this",
            "}",
            "RETURN this",
        ]
        .join("\n")
    );
}

#[test]
fn composite_sorts_drop_unselected_keys_per_member() {
    let plan = translate(json!({
        "entity": "Production",
        "operation": "READ",
        "sort": [{ "title": "DESC" }],
        "on": {
            "Movie": [{ "name": "released" }],
            "Series": [{ "name": "episodes" }]
        }
    }));
    assert_contains(
        &plan,
        &[
            "    WITH this0 { __resolveType: \"Movie\", .released, .title } AS this",
            "WITH this\nORDER BY this.title DESC",
            "WITH CASE WHEN this.__resolveType = \"Movie\" THEN this { .__resolveType, .released } \
             WHEN this.__resolveType = \"Series\" THEN this { .__resolveType, .episodes } END AS this\nRETURN this",
        ],
    );
}

#[test]
fn union_member_selections_stay_per_member() {
    let plan = translate(json!({
        "entity": "SearchResult",
        "operation": "READ",
        "on": {
            "Movie": [{ "name": "released" }],
            "Actor": [{ "name": "name" }]
        }
    }));
    assert_contains(
        &plan,
        &[
            "MATCH (this0:Movie)",
            "__resolveType: \"Movie\", .released",
            "MATCH (this1:Actor:Person)",
            "__resolveType: \"Actor\", .name",
        ],
    );
    assert_lacks(&plan, &[".released, .name", ".name, .released"]);
}

#[test]
fn unknown_entity_is_a_schema_mismatch() {
    let err = try_translate(json!({ "entity": "Nope", "operation": "READ" })).expect_err("unknown");
    assert!(matches!(err, TranslateError::SchemaMismatch { .. }), "{err:?}");
}

#[test]
fn unknown_field_is_a_schema_mismatch() {
    let err = try_translate(json!({
        "entity": "User",
        "operation": "READ",
        "selection": [{ "name": "shoeSize" }]
    }))
    .expect_err("unknown field");
    assert!(matches!(err, TranslateError::SchemaMismatch { .. }), "{err:?}");
}

#[test]
fn connection_pages_from_the_cursor() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "READ",
        "selection": [{
            "name": "postsConnection",
            "args": { "first": 3, "after": encode_cursor(1) },
            "selection": [
                { "name": "totalCount" },
                { "name": "edges", "selection": [
                    { "name": "cursor" },
                    { "name": "node", "selection": [{ "name": "title" }] }
                ] }
            ]
        }]
    }));
    assert_eq!(
        plan.parameters.get("this_postsConnection_offset"),
        Some(&Value::Int(2))
    );
    assert_eq!(
        plan.parameters.get("this_postsConnection_limit"),
        Some(&Value::Int(3))
    );
    assert_contains(
        &plan,
        &[
            ":AUTHORED]->(",
            ":Post)",
            "totalCount",
            "apoc.text.base64Encode(\"arrayconnection:\" + toString(",
        ],
    );
}

#[test]
fn connection_rejects_conflicting_cursor_and_offset() {
    let err = try_translate(json!({
        "entity": "User",
        "operation": "READ",
        "selection": [{
            "name": "postsConnection",
            "args": { "after": encode_cursor(4), "offset": 1 },
            "selection": [{ "name": "totalCount" }]
        }]
    }))
    .expect_err("conflict");
    assert!(matches!(err, TranslateError::InvalidPagination { .. }), "{err:?}");
}

#[test]
fn connection_rejects_cursors_past_the_last_row() {
    let err = try_translate(json!({
        "entity": "User",
        "operation": "READ",
        "selection": [{
            "name": "postsConnection",
            "args": { "first": 1, "after": encode_cursor(i64::MAX as usize) },
            "selection": [{ "name": "totalCount" }]
        }]
    }))
    .expect_err("cursor overflow");
    match err {
        TranslateError::InvalidPagination { argument, .. } => assert_eq!(argument, "after"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn cursors_are_base64_array_offsets() {
    assert_eq!(encode_cursor(0), "YXJyYXljb25uZWN0aW9uOjA=");
    assert_eq!(decode_cursor(&encode_cursor(42)).expect("decode"), 42);
    assert!(decode_cursor("not a cursor").is_err());
}

#[test]
fn required_authentication_rejects_anonymous_requests() {
    let options = TranslatorOptions {
        require_authentication: true,
        ..TranslatorOptions::default()
    };
    let err = try_translate_with(
        json!({ "entity": "User", "operation": "READ", "selection": [{ "name": "name" }] }),
        &anonymous(),
        options,
    )
    .expect_err("anonymous");
    assert!(matches!(err, TranslateError::Unauthenticated), "{err:?}");
}
