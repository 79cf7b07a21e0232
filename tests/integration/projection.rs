#![allow(missing_docs)]

mod support;

use gql_cypher::TranslateError;
use serde_json::json;
use support::{assert_contains, assert_lacks, translate, try_translate};

#[test]
fn root_aggregate_returns_a_single_map() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "AGGREGATE",
        "selection": [
            { "name": "count" },
            { "name": "age", "selection": [{ "name": "min" }, { "name": "max" }] }
        ]
    }));
    assert_eq!(
        plan.cypher(),
        "MATCH (this:User)\nRETURN { count: count(this), age: { min: min(this.age), max: max(this.age) } } AS this"
    );
}

#[test]
fn textual_aggregates_compare_lengths() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "AGGREGATE",
        "selection": [{ "name": "name", "selection": [{ "name": "shortest" }] }]
    }));
    assert_contains(
        &plan,
        &["shortest: reduce(", "head(collect(this.name))", "size("],
    );

    let err = try_translate(json!({
        "entity": "User",
        "operation": "AGGREGATE",
        "selection": [{ "name": "name", "selection": [{ "name": "sum" }] }]
    }))
    .expect_err("sum of strings");
    assert!(matches!(err, TranslateError::SchemaMismatch { .. }), "{err:?}");
}

#[test]
fn composite_roots_cannot_be_aggregated() {
    let err = try_translate(json!({
        "entity": "Production",
        "operation": "AGGREGATE",
        "selection": [{ "name": "count" }]
    }))
    .expect_err("composite");
    assert!(matches!(err, TranslateError::SchemaMismatch { .. }), "{err:?}");
}

#[test]
fn relationship_aggregates_run_in_a_subquery() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "READ",
        "selection": [{
            "name": "postsAggregate",
            "selection": [
                { "name": "__typename" },
                { "name": "count" },
                { "name": "node", "selection": [{ "name": "views", "selection": [{ "name": "average" }] }] }
            ]
        }]
    }));
    assert_contains(
        &plan,
        &[
            "    MATCH (this)-[this1:AUTHORED]->(this0:Post)",
            "RETURN { __typename: \"UserPostPostsAggregationSelection\", count: count(this0), node: { views: { average: avg(this0.views) } } } AS var2",
            "RETURN this { postsAggregate: var2 } AS this",
        ],
    );
}

#[test]
fn edge_aggregates_read_relationship_properties() {
    let plan = translate(json!({
        "entity": "Movie",
        "operation": "READ",
        "selection": [{
            "name": "actorsAggregate",
            "selection": [{ "name": "edge", "selection": [{ "name": "screenTime", "selection": [{ "name": "sum" }] }] }]
        }]
    }));
    assert_contains(&plan, &["edge: { screenTime: { sum: sum(this1.screenTime) } }"]);
}

#[test]
fn connections_expose_edges_and_typename() {
    let plan = translate(json!({
        "entity": "Movie",
        "operation": "READ",
        "selection": [{
            "name": "actorsConnection",
            "selection": [
                { "name": "__typename" },
                { "name": "totalCount" },
                { "name": "edges", "selection": [
                    { "name": "properties", "selection": [{ "name": "role" }] },
                    { "name": "node", "selection": [{ "name": "name" }] }
                ] }
            ]
        }]
    }));
    assert_contains(
        &plan,
        &[
            "__typename: \"MovieActorsConnection\"",
            "collect(edge0) AS edges3",
            "size(edges3) AS totalCount4",
            ".role",
            ".name",
        ],
    );
}

#[test]
fn connections_reject_unknown_edge_fields() {
    let err = try_translate(json!({
        "entity": "Movie",
        "operation": "READ",
        "selection": [{
            "name": "actorsConnection",
            "selection": [{ "name": "edges", "selection": [{ "name": "weight" }] }]
        }]
    }))
    .expect_err("unknown edge field");
    assert!(matches!(err, TranslateError::SchemaMismatch { .. }), "{err:?}");
}

#[test]
fn points_project_requested_coordinates() {
    let plan = translate(json!({
        "entity": "Movie",
        "operation": "READ",
        "selection": [{ "name": "location", "selection": [{ "name": "latitude" }] }]
    }));
    assert_contains(
        &plan,
        &["location: CASE WHEN this.location IS NOT NULL THEN { latitude: this.location.latitude } ELSE NULL END"],
    );
}

#[test]
fn cypher_fields_run_their_statement() {
    let plan = translate(json!({
        "entity": "Movie",
        "operation": "READ",
        "selection": [
            { "name": "title" },
            { "name": "similar", "selection": [{ "name": "title" }] }
        ]
    }));
    assert_contains(
        &plan,
        &[
            "    CALL {\n        WITH this\n        WITH this\n        MATCH (this)-[:SIMILAR]->(m:Movie)",
            "        RETURN m",
            "    WITH m AS this0",
            "    WITH this0 { .title } AS this0",
            "    RETURN collect(this0) AS var1",
            "RETURN this { .title, similar: var1 } AS this",
        ],
    );
}

#[test]
fn custom_resolvers_project_their_requirements() {
    let plan = translate(json!({
        "entity": "Movie",
        "operation": "READ",
        "selection": [{ "name": "blurb" }]
    }));
    assert_contains(&plan, &["RETURN this { .title, .released } AS this"]);
    assert_lacks(&plan, &["blurb"]);
}

#[test]
fn union_relationships_tag_each_member() {
    let plan = translate(json!({
        "entity": "User",
        "operation": "READ",
        "selection": [{
            "name": "likes",
            "on": {
                "Movie": [{ "name": "title" }],
                "Actor": [{ "name": "name" }]
            }
        }]
    }));
    assert_contains(
        &plan,
        &[
            "__resolveType: \"Movie\", .title",
            "__resolveType: \"Actor\", .name",
            "    UNION",
        ],
    );
}
