#![allow(missing_docs)]

mod support;

use gql_cypher::schema::TemporalKind;
use gql_cypher::{TranslateError, Value};
use serde_json::{json, Value as Json};
use support::{assert_contains, assert_lacks, translate, try_translate};

fn read_users(filter: Json) -> gql_cypher::QueryPlan {
    translate(json!({
        "entity": "User",
        "operation": "READ",
        "where": filter,
        "selection": [{ "name": "name" }]
    }))
}

#[test]
fn logical_operators_nest_with_indexed_parameters() {
    let plan = read_users(json!({ "OR": [{ "name": "a" }, { "age_GT": 30 }] }));
    assert_contains(
        &plan,
        &["WHERE this.name = $this_where_OR0_name OR this.age > $this_where_OR1_age_GT"],
    );
    assert_eq!(
        plan.parameters.get("this_where_OR1_age_GT"),
        Some(&Value::Int(30))
    );

    let plan = read_users(json!({ "NOT": { "name": "a" } }));
    assert_contains(&plan, &["WHERE NOT (this.name = $this_where_NOT_name)"]);
}

#[test]
fn sibling_keys_are_conjoined() {
    let plan = read_users(json!({ "name": "a", "age_LTE": 40 }));
    assert_contains(
        &plan,
        &["this.name = $this_where_name AND this.age <= $this_where_age_LTE"],
    );
}

#[test]
fn null_equality_tests_for_missing_properties() {
    let plan = read_users(json!({ "age": null }));
    assert_contains(&plan, &["WHERE this.age IS NULL"]);
    assert!(plan.parameters.is_empty());

    let plan = read_users(json!({ "age_NOT": null }));
    assert_contains(&plan, &["WHERE this.age IS NOT NULL"]);
}

#[test]
fn null_is_rejected_by_ordering_operators() {
    let err = try_translate(json!({
        "entity": "User",
        "operation": "READ",
        "where": { "age_GT": null }
    }))
    .expect_err("null ordering");
    assert!(matches!(err, TranslateError::InvalidValue { .. }), "{err:?}");
}

#[test]
fn membership_binds_a_list() {
    let plan = read_users(json!({ "name_IN": ["a", "b"] }));
    assert_contains(&plan, &["WHERE this.name IN $this_where_name_IN"]);
    assert_eq!(
        plan.parameters.get("this_where_name_IN"),
        Some(&Value::List(vec![
            Value::String("a".to_owned()),
            Value::String("b".to_owned()),
        ]))
    );
}

#[test]
fn temporal_parameters_are_wrapped_in_constructors() {
    let plan = read_users(json!({ "createdAt_GT": "2024-01-01T00:00:00Z" }));
    assert_contains(
        &plan,
        &["WHERE this.createdAt > datetime($this_where_createdAt_GT)"],
    );
    match plan.parameters.get("this_where_createdAt_GT") {
        Some(Value::Temporal { kind, iso }) => {
            assert_eq!(*kind, TemporalKind::DateTime);
            assert_eq!(iso, "2024-01-01T00:00:00Z");
        }
        other => panic!("unexpected parameter: {other:?}"),
    }
}

#[test]
fn string_operators_are_type_checked() {
    let plan = read_users(json!({ "name_STARTS_WITH": "A", "name_NOT_ENDS_WITH": "z" }));
    assert_contains(
        &plan,
        &[
            "this.name STARTS WITH $this_where_name_STARTS_WITH",
            "NOT (this.name ENDS WITH $this_where_name_NOT_ENDS_WITH)",
        ],
    );

    let err = try_translate(json!({
        "entity": "User",
        "operation": "READ",
        "where": { "age_CONTAINS": 3 }
    }))
    .expect_err("contains on int");
    match err {
        TranslateError::MalformedFilterKey { entity, key, .. } => {
            assert_eq!(entity, "User");
            assert_eq!(key, "age_CONTAINS");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unknown_keys_are_malformed() {
    let err = try_translate(json!({
        "entity": "User",
        "operation": "READ",
        "where": { "height_GT": 3 }
    }))
    .expect_err("unknown key");
    assert!(matches!(err, TranslateError::MalformedFilterKey { .. }), "{err:?}");
}

#[test]
fn values_are_coerced_to_the_attribute_type() {
    let err = try_translate(json!({
        "entity": "User",
        "operation": "READ",
        "where": { "age": "old" }
    }))
    .expect_err("string for int");
    assert!(matches!(err, TranslateError::InvalidValue { .. }), "{err:?}");
}

#[test]
fn some_counts_matching_related_nodes() {
    let plan = read_users(json!({ "posts_SOME": { "title": "x" } }));
    assert_contains(
        &plan,
        &[
            "MATCH (this:User)\nCALL {",
            "    WITH this",
            "    MATCH (this)-[:AUTHORED]->(this0:Post)",
            "    WHERE this0.title = $this_where_posts_SOME_title",
            "    RETURN count(this0) AS var1",
            "}\nWITH *\nWHERE var1 > 0",
        ],
    );
}

#[test]
fn quantifiers_compare_counts() {
    let none = read_users(json!({ "posts_NONE": { "title": "x" } }));
    assert_contains(&none, &["WHERE var1 = 0"]);

    let single = read_users(json!({ "posts_SINGLE": { "title": "x" } }));
    assert_contains(&single, &["WHERE var1 = 1"]);

    let all = read_users(json!({ "posts_ALL": { "title": "x" } }));
    assert_contains(
        &all,
        &[
            "WHERE NOT (this0.title = $this_where_posts_ALL_title)",
            "WHERE var1 = 0",
        ],
    );
}

#[test]
fn nullable_to_one_filters_use_a_single_pattern_comprehension() {
    let plan = translate(json!({
        "entity": "Post",
        "operation": "READ",
        "where": { "editor": { "name": "Ann" } },
        "selection": [{ "name": "title" }]
    }));
    assert_contains(
        &plan,
        &["single(var1 IN [(this)<-[:EDITED]-(this0:User) WHERE this0.name = $this_where_editor_name | 1] WHERE true)"],
    );
    assert_lacks(&plan, &["CALL {"]);
}

#[test]
fn required_to_one_filters_count_the_related_node() {
    let plan = translate(json!({
        "entity": "Post",
        "operation": "READ",
        "where": { "author": { "name": "Ann" } },
        "selection": [{ "name": "title" }]
    }));
    assert_contains(
        &plan,
        &[
            "    MATCH (this)<-[:AUTHORED]-(this0:User)",
            "    WHERE this0.name = $this_where_author_name",
            "    RETURN count(this0) AS var1",
            "WHERE var1 > 0",
        ],
    );
    assert_lacks(&plan, &["single("]);
}

#[test]
fn null_relationship_filter_checks_existence() {
    let plan = translate(json!({
        "entity": "Post",
        "operation": "READ",
        "where": { "editor": null },
        "selection": [{ "name": "title" }]
    }));
    assert_contains(&plan, &["NOT (EXISTS { MATCH (this)<-[:EDITED]-(:User) })"]);
}

#[test]
fn connection_filters_reach_edge_properties() {
    let plan = translate(json!({
        "entity": "Movie",
        "operation": "READ",
        "where": {
            "actorsConnection_SOME": {
                "node": { "name": "Keanu" },
                "edge": { "screenTime_GT": 10 }
            }
        },
        "selection": [{ "name": "title" }]
    }));
    assert_contains(
        &plan,
        &[
            ":ACTED_IN]-(this0:Actor:Person)",
            "this0.name = $this_where_actorsConnection_SOME_node_name",
            "this1.screenTime > $this_where_actorsConnection_SOME_edge_screenTime_GT",
        ],
    );
    assert_eq!(
        plan.parameters.get("this_where_actorsConnection_SOME_edge_screenTime_GT"),
        Some(&Value::Int(10))
    );
}

#[test]
fn connection_filters_reject_unknown_keys() {
    let err = try_translate(json!({
        "entity": "Movie",
        "operation": "READ",
        "where": { "actorsConnection_SOME": { "title": "x" } }
    }))
    .expect_err("bad connection key");
    assert!(matches!(err, TranslateError::MalformedFilterKey { .. }), "{err:?}");
}

#[test]
fn union_relationship_filters_name_their_members() {
    let plan = read_users(json!({ "likes_SOME": { "Movie": { "title": "Heat" } } }));
    assert_contains(
        &plan,
        &[
            "MATCH (this)-[:LIKES]->(this0:Movie)",
            "this0.title = $this_where_likes_SOME_Movie_title",
        ],
    );
    assert_lacks(&plan, &["(this0:Actor"]);
}

#[test]
fn aggregate_filters_compare_counts_in_a_subquery() {
    let plan = read_users(json!({ "postsAggregate": { "count_GT": 1 } }));
    assert_contains(
        &plan,
        &[
            "    MATCH (this)-[this1:AUTHORED]->(this0:Post)",
            "    RETURN count(this0) > $this_where_postsAggregate_count_GT AS var2",
            "WITH *\nWHERE var2 = true",
        ],
    );
    assert_eq!(
        plan.parameters.get("this_where_postsAggregate_count_GT"),
        Some(&Value::Int(1))
    );
}

#[test]
fn aggregate_node_filters_bind_big_integers() {
    let plan = read_users(json!({
        "postsAggregate": { "node": { "shares_GT": "9007199254740993" } }
    }));
    assert_contains(
        &plan,
        &[
            "    MATCH (this)-[this1:AUTHORED]->(this0:Post)",
            "any(var2 IN collect(this0.shares) WHERE var2 > $this_where_postsAggregate_node_shares_GT)",
            "AS var3",
            "WHERE var3 = true",
        ],
    );
    assert_eq!(
        plan.parameters.get("this_where_postsAggregate_node_shares_GT"),
        Some(&Value::BigInt(9_007_199_254_740_993))
    );
}

#[test]
fn aggregate_node_filters_apply_named_aggregations() {
    let plan = read_users(json!({
        "postsAggregate": {
            "node": { "views_AVERAGE_GTE": 2.5, "title_SHORTEST_LENGTH_LT": 5 }
        }
    }));
    assert_contains(
        &plan,
        &[
            "avg(this0.views) >= $this_where_postsAggregate_node_views_AVERAGE_GTE",
            "min(size(this0.title)) < $this_where_postsAggregate_node_title_SHORTEST_LENGTH_LT",
            "AS var2",
        ],
    );
    assert_eq!(
        plan.parameters.get("this_where_postsAggregate_node_views_AVERAGE_GTE"),
        Some(&Value::Float(2.5))
    );
    assert_eq!(
        plan.parameters.get("this_where_postsAggregate_node_title_SHORTEST_LENGTH_LT"),
        Some(&Value::Int(5))
    );

    let err = try_translate(json!({
        "entity": "User",
        "operation": "READ",
        "where": { "postsAggregate": { "node": { "title_SUM_GT": 1 } } },
        "selection": [{ "name": "name" }]
    }))
    .expect_err("sum over text");
    assert!(matches!(err, TranslateError::MalformedFilterKey { .. }), "{err:?}");
}

#[test]
fn aggregate_edge_filters_read_relationship_properties() {
    let plan = translate(json!({
        "entity": "Movie",
        "operation": "READ",
        "where": { "actorsAggregate": { "edge": { "screenTime_SUM_GT": 100 } } },
        "selection": [{ "name": "title" }]
    }));
    assert_contains(
        &plan,
        &[
            "    MATCH (this)<-[this1:ACTED_IN]-(this0:Actor:Person)",
            "sum(this1.screenTime) > $this_where_actorsAggregate_edge_screenTime_SUM_GT",
        ],
    );
    assert_eq!(
        plan.parameters.get("this_where_actorsAggregate_edge_screenTime_SUM_GT"),
        Some(&Value::Int(100))
    );
}

#[test]
fn malformed_times_are_invalid_values() {
    for raw in ["€00000", "25:00:00", "10:00:00+0200"] {
        let err = try_translate(json!({
            "entity": "Movie",
            "operation": "READ",
            "where": { "showtime": raw },
            "selection": [{ "name": "title" }]
        }))
        .expect_err("invalid time");
        assert!(matches!(err, TranslateError::InvalidValue { .. }), "{raw}: {err:?}");
    }
    let plan = translate(json!({
        "entity": "Movie",
        "operation": "READ",
        "where": { "showtime_GT": "20:30:00+01:00" },
        "selection": [{ "name": "title" }]
    }));
    assert_contains(&plan, &["this.showtime > time($this_where_showtime_GT)"]);
}

#[test]
fn typename_filters_fold_to_literals() {
    let plan = read_users(json!({ "typename_IN": ["Post"] }));
    assert_contains(&plan, &["WHERE false"]);
}
