#![allow(dead_code)]

use gql_cypher::{AuthContext, QueryPlan, Request, Result, SchemaModel, TranslatorOptions, Translator};
use serde_json::{json, Map, Value as Json};

/// Blog, film and document graph shared by the integration suites.
pub const SCHEMA: &str = r#"{
    "enums": ["Genre"],
    "nodes": [
        {
            "name": "User",
            "fields": [
                { "name": "id", "type": "ID!", "id": {} },
                { "name": "name", "type": "String!" },
                {
                    "name": "email",
                    "type": "String",
                    "authorization": { "filter": [{ "where": { "node": { "id": "$jwt.sub" } } }] }
                },
                { "name": "age", "type": "Int" },
                { "name": "createdAt", "type": "DateTime", "timestamp": { "onUpdate": false } },
                {
                    "name": "posts",
                    "type": "[Post!]!",
                    "relationship": { "type": "AUTHORED", "direction": "OUT" }
                },
                {
                    "name": "likes",
                    "type": "[SearchResult!]!",
                    "relationship": { "type": "LIKES", "direction": "OUT" }
                }
            ]
        },
        {
            "name": "Post",
            "limit": { "default": 20, "max": 50 },
            "fields": [
                { "name": "id", "type": "ID!", "id": {} },
                { "name": "title", "type": "String!" },
                { "name": "views", "type": "Int" },
                { "name": "rating", "type": "Float" },
                { "name": "shares", "type": "BigInt" },
                {
                    "name": "notes",
                    "type": "String",
                    "authorization": { "filter": [{ "where": { "jwt": { "roles_INCLUDES": "editor" } } }] }
                },
                { "name": "tags", "type": "[String!]" },
                { "name": "updatedAt", "type": "DateTime", "timestamp": {} },
                {
                    "name": "author",
                    "type": "User!",
                    "relationship": { "type": "AUTHORED", "direction": "IN" }
                },
                {
                    "name": "editor",
                    "type": "User",
                    "relationship": { "type": "EDITED", "direction": "IN" }
                }
            ]
        },
        {
            "name": "Movie",
            "implements": ["Production"],
            "fields": [
                { "name": "title", "type": "String!" },
                { "name": "released", "type": "Int" },
                { "name": "genre", "type": "Genre" },
                { "name": "location", "type": "Point" },
                { "name": "showtime", "type": "Time" },
                {
                    "name": "similar",
                    "type": "[Movie!]!",
                    "cypher": {
                        "statement": "MATCH (this)-[:SIMILAR]->(m:Movie)\nRETURN m",
                        "columnName": "m"
                    }
                },
                {
                    "name": "blurb",
                    "type": "String",
                    "customResolver": { "requires": ["title", "released"] }
                },
                {
                    "name": "actors",
                    "type": "[Actor!]!",
                    "relationship": { "type": "ACTED_IN", "direction": "IN", "properties": "ActedIn" }
                }
            ]
        },
        {
            "name": "Series",
            "implements": ["Production"],
            "fields": [
                { "name": "title", "type": "String!" },
                { "name": "episodes", "type": "Int" }
            ]
        },
        {
            "name": "Actor",
            "labels": ["Actor", "Person"],
            "fields": [
                { "name": "name", "type": "String!" },
                {
                    "name": "movies",
                    "type": "[Movie!]!",
                    "relationship": { "type": "ACTED_IN", "direction": "OUT", "properties": "ActedIn" }
                }
            ]
        },
        {
            "name": "Document",
            "authorization": {
                "filter": [{ "where": { "node": { "owner": "$jwt.sub" } } }],
                "validate": [
                    {
                        "operations": ["UPDATE", "DELETE"],
                        "when": ["BEFORE"],
                        "where": { "jwt": { "roles_INCLUDES": "editor" } }
                    }
                ]
            },
            "fields": [
                { "name": "id", "type": "ID!", "id": {} },
                { "name": "owner", "type": "String!" },
                { "name": "body", "type": "String" }
            ]
        }
    ],
    "interfaces": [
        { "name": "Production", "fields": [{ "name": "title", "type": "String!" }] }
    ],
    "unions": [{ "name": "SearchResult", "members": ["Movie", "Actor"] }],
    "relationshipProperties": [
        {
            "name": "ActedIn",
            "fields": [
                { "name": "role", "type": "String" },
                { "name": "screenTime", "type": "Int" }
            ]
        }
    ]
}"#;

pub fn schema() -> SchemaModel {
    SchemaModel::from_json(SCHEMA).expect("fixture schema builds")
}

pub fn request(raw: Json) -> Request {
    serde_json::from_value(raw).expect("request parses")
}

pub fn anonymous() -> AuthContext {
    AuthContext::anonymous()
}

/// Authenticated context with `sub` and `roles` claims.
pub fn user(sub: &str, roles: &[&str]) -> AuthContext {
    let claims = json!({ "sub": sub, "roles": roles });
    match claims {
        Json::Object(map) => AuthContext::authenticated(map),
        other => panic!("unexpected claims: {other:?}"),
    }
}

pub fn claims(raw: Json) -> Map<String, Json> {
    match raw {
        Json::Object(map) => map,
        other => panic!("unexpected claims: {other:?}"),
    }
}

pub fn try_translate_with(raw: Json, auth: &AuthContext, options: TranslatorOptions) -> Result<QueryPlan> {
    let schema = schema();
    Translator::new(&schema, options).translate(&request(raw), auth)
}

pub fn try_translate(raw: Json) -> Result<QueryPlan> {
    try_translate_with(raw, &anonymous(), TranslatorOptions::default())
}

pub fn translate(raw: Json) -> QueryPlan {
    try_translate(raw).expect("request translates")
}

pub fn translate_as(raw: Json, auth: &AuthContext) -> QueryPlan {
    try_translate_with(raw, auth, TranslatorOptions::default()).expect("request translates")
}

/// Asserts every fragment occurs in the rendered plan.
pub fn assert_contains(plan: &QueryPlan, fragments: &[&str]) {
    let cypher = plan.cypher();
    for fragment in fragments {
        assert!(
            cypher.contains(fragment),
            "expected {fragment:?} in:\n{cypher}"
        );
    }
}

pub fn assert_lacks(plan: &QueryPlan, fragments: &[&str]) {
    let cypher = plan.cypher();
    for fragment in fragments {
        assert!(
            !cypher.contains(fragment),
            "unexpected {fragment:?} in:\n{cypher}"
        );
    }
}
