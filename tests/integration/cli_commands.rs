#![allow(missing_docs)]

mod support;

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    schema: PathBuf,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let schema = dir.path().join("schema.json");
        fs::write(&schema, support::SCHEMA).expect("write schema");
        let config = dir.path().join("absent.toml");
        Self { dir, schema, config }
    }

    fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write file");
        path
    }

    fn json_file(&self, name: &str, value: Value) -> PathBuf {
        self.file(name, &value.to_string())
    }
}

fn user_read(ws: &Workspace) -> PathBuf {
    ws.json_file(
        "read.json",
        json!({
            "entity": "User",
            "operation": "READ",
            "where": { "name": "Ann" },
            "selection": [{ "name": "name" }]
        }),
    )
}

#[test]
fn translate_prints_cypher_parameters_and_hash() {
    let ws = Workspace::new();
    let request = user_read(&ws);
    let output = cargo_bin_cmd!("gqlcypher")
        .arg("--config")
        .arg(&ws.config)
        .arg("translate")
        .arg("--schema")
        .arg(&ws.schema)
        .arg(&request)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(
        text.starts_with("MATCH (this:User)\nWHERE this.name = $this_where_name\nRETURN this { .name } AS this\n\n-- parameters\n"),
        "{text}"
    );
    assert!(text.contains("\"this_where_name\""), "{text}");
    let hash_line = text.lines().last().expect("hash line");
    let hash = hash_line.strip_prefix("-- plan hash ").expect("hash prefix");
    assert_eq!(hash.len(), 16);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn translate_json_report_is_stable() {
    let ws = Workspace::new();
    let request = user_read(&ws);
    let run = || {
        let output = cargo_bin_cmd!("gqlcypher")
            .args(["--format", "json"])
            .arg("--config")
            .arg(&ws.config)
            .arg("translate")
            .arg("--schema")
            .arg(&ws.schema)
            .arg(&request)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice::<Value>(&output).expect("valid json")
    };
    let first = run();
    assert_eq!(
        first["cypher"],
        "MATCH (this:User)\nWHERE this.name = $this_where_name\nRETURN this { .name } AS this"
    );
    assert_eq!(first["params"]["this_where_name"]["v"], "Ann");
    assert_eq!(first["planHash"], run()["planHash"]);
}

#[test]
fn jwt_claims_feed_authorization_rules() {
    let ws = Workspace::new();
    let request = ws.json_file(
        "docs.json",
        json!({ "entity": "Document", "operation": "READ", "selection": [{ "name": "body" }] }),
    );
    let claims = ws.json_file("claims.json", json!({ "sub": "u1", "roles": [] }));
    let output = cargo_bin_cmd!("gqlcypher")
        .args(["--format", "json"])
        .arg("--config")
        .arg(&ws.config)
        .arg("translate")
        .arg("--schema")
        .arg(&ws.schema)
        .arg(&request)
        .arg("--jwt")
        .arg(&claims)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(report["params"]["this_auth0_node_owner"]["v"], "u1");
}

#[test]
fn track_changes_flag_enables_delete_events() {
    let ws = Workspace::new();
    let request = ws.json_file("delete.json", json!({ "entity": "User", "operation": "DELETE" }));
    let output = cargo_bin_cmd!("gqlcypher")
        .arg("--config")
        .arg(&ws.config)
        .arg("translate")
        .arg("--schema")
        .arg(&ws.schema)
        .arg(&request)
        .arg("--track-changes")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("AS meta"), "{text}");
    assert!(text.contains("-- no parameters"), "{text}");
}

#[test]
fn explain_prints_the_clause_tree() {
    let ws = Workspace::new();
    let request = user_read(&ws);
    let output = cargo_bin_cmd!("gqlcypher")
        .arg("--config")
        .arg(&ws.config)
        .arg("explain")
        .arg("--schema")
        .arg(&ws.schema)
        .arg(&request)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let plan: Value = serde_json::from_slice(&output).expect("valid json");
    assert!(plan["clauses"].is_array() || plan["clauses"].is_object(), "{plan}");
    assert_eq!(plan["parameters"]["this_where_name"]["v"], "Ann");
}

#[test]
fn schema_lists_entities() {
    let ws = Workspace::new();
    let output = cargo_bin_cmd!("gqlcypher")
        .arg("--config")
        .arg(&ws.config)
        .arg("schema")
        .arg("--schema")
        .arg(&ws.schema)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    for expected in [
        "User (node) :User",
        "  posts -[:AUTHORED]-> Post",
        "Actor (node) :Actor:Person",
        "Production (interface) = Movie | Series",
        "SearchResult (union) = Movie | Actor",
    ] {
        assert!(text.contains(expected), "missing {expected:?} in:\n{text}");
    }
}

#[test]
fn schema_json_reports_members() {
    let ws = Workspace::new();
    let output = cargo_bin_cmd!("gqlcypher")
        .args(["--format", "json"])
        .arg("--config")
        .arg(&ws.config)
        .arg("schema")
        .arg("--schema")
        .arg(&ws.schema)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let entities: Vec<Value> = serde_json::from_slice(&output).expect("valid json");
    let production = entities
        .iter()
        .find(|e| e["name"] == "Production")
        .expect("Production entry");
    assert_eq!(production["kind"], "interface");
    assert_eq!(production["members"], json!(["Movie", "Series"]));
}

#[test]
fn translation_errors_exit_with_code_two() {
    let ws = Workspace::new();
    let request = ws.json_file(
        "bad.json",
        json!({ "entity": "User", "operation": "READ", "where": { "age_CONTAINS": 1 } }),
    );
    let output = cargo_bin_cmd!("gqlcypher")
        .arg("--config")
        .arg(&ws.config)
        .arg("translate")
        .arg("--schema")
        .arg(&ws.schema)
        .arg(&request)
        .assert()
        .code(2)
        .get_output()
        .stderr
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.starts_with("error[MALFORMED_FILTER_KEY]"), "{text}");
}

#[test]
fn missing_schema_is_a_usage_error() {
    let ws = Workspace::new();
    let request = user_read(&ws);
    let output = cargo_bin_cmd!("gqlcypher")
        .arg("--config")
        .arg(&ws.config)
        .arg("translate")
        .arg(&request)
        .assert()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("no schema given"), "{text}");
}

#[test]
fn profiles_supply_schema_and_options() {
    let ws = Workspace::new();
    let config = ws.file(
        "cli.toml",
        &format!(
            "default_profile = \"strict\"\n\n[profiles.strict]\nschema = {:?}\n\n[profiles.strict.translator]\nrequire_authentication = true\n",
            ws.schema.display().to_string()
        ),
    );
    let request = user_read(&ws);
    let output = cargo_bin_cmd!("gqlcypher")
        .arg("--config")
        .arg(&config)
        .arg("translate")
        .arg(&request)
        .assert()
        .code(2)
        .get_output()
        .stderr
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.starts_with("error[UNAUTHENTICATED]"), "{text}");
}

#[test]
fn unknown_profiles_are_rejected() {
    let ws = Workspace::new();
    let request = user_read(&ws);
    cargo_bin_cmd!("gqlcypher")
        .arg("--config")
        .arg(&ws.config)
        .args(["--profile", "nope"])
        .arg("translate")
        .arg("--schema")
        .arg(&ws.schema)
        .arg(&request)
        .assert()
        .code(1);
}
