#![allow(missing_docs)]

mod support;

use std::collections::BTreeSet;

use gql_cypher::translate::{decode_cursor, encode_cursor};
use gql_cypher::{TranslateError, Value};
use proptest::prelude::*;
use serde_json::{json, Value as Json};
use support::{translate, try_translate};

fn arb_scalar_filter() -> impl Strategy<Value = (String, Json)> {
    prop_oneof![
        "[a-zA-Z ]{0,12}".prop_map(|s| ("name".to_owned(), json!(s))),
        "[a-z]{1,6}".prop_map(|s| ("name_CONTAINS".to_owned(), json!(s))),
        any::<i32>().prop_map(|n| ("age_GT".to_owned(), json!(n))),
        any::<i32>().prop_map(|n| ("age_LTE".to_owned(), json!(n))),
        prop::collection::vec(any::<i32>(), 0..4).prop_map(|v| ("age_IN".to_owned(), json!(v))),
    ]
}

fn arb_quantifier() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("SOME"), Just("NONE"), Just("ALL"), Just("SINGLE")]
}

proptest! {
    #[test]
    fn prop_translation_is_deterministic(filters in prop::collection::vec(arb_scalar_filter(), 1..5)) {
        let branches: Vec<Json> = filters.iter().map(|(k, v)| json!({ k: v })).collect();
        let request = json!({
            "entity": "User",
            "operation": "READ",
            "where": { "OR": branches },
            "selection": [{ "name": "name" }]
        });
        let first = translate(request.clone());
        let second = translate(request);
        prop_assert_eq!(first.cypher(), second.cypher());
        prop_assert_eq!(first.plan_hash(), second.plan_hash());
        prop_assert_eq!(&first.parameters, &second.parameters);
    }

    #[test]
    fn prop_repeated_filters_get_distinct_parameters(count in 1usize..8, title in "[a-z]{1,8}") {
        let branches: Vec<Json> = (0..count).map(|_| json!({ "name": title })).collect();
        let plan = translate(json!({
            "entity": "User",
            "operation": "READ",
            "where": { "OR": branches },
            "selection": [{ "name": "name" }]
        }));
        let names: BTreeSet<&String> = plan.parameters.iter().map(|(name, _)| name).collect();
        prop_assert_eq!(names.len(), count);
        for (_, value) in plan.parameters.iter() {
            prop_assert_eq!(value, &Value::String(title.clone()));
        }
    }

    #[test]
    fn prop_cursors_round_trip(offset in 0usize..1_000_000) {
        prop_assert_eq!(decode_cursor(&encode_cursor(offset)).expect("decode"), offset);
    }

    #[test]
    fn prop_cursor_and_matching_offset_agree(offset in 0i64..10_000, first in 1i64..40) {
        let cursor = encode_cursor(usize::try_from(offset).expect("non-negative"));
        let request = |args: Json| json!({
            "entity": "User",
            "operation": "READ",
            "selection": [{
                "name": "postsConnection",
                "args": args,
                "selection": [{ "name": "totalCount" }]
            }]
        });
        let plan = translate(request(json!({ "first": first, "after": cursor, "offset": offset + 1 })));
        prop_assert_eq!(
            plan.parameters.get("this_postsConnection_offset"),
            Some(&Value::Int(offset + 1))
        );
        match try_translate(request(json!({ "first": first, "after": cursor, "offset": offset }))) {
            Err(TranslateError::InvalidPagination { .. }) => {}
            other => prop_assert!(false, "unexpected result: {other:?}"),
        }
    }

    #[test]
    fn prop_quantifiers_compare_the_expected_count(quantifier in arb_quantifier(), title in "[a-z]{1,8}") {
        let key = format!("posts_{quantifier}");
        let plan = translate(json!({
            "entity": "User",
            "operation": "READ",
            "where": { key.clone(): { "title": title } },
            "selection": [{ "name": "name" }]
        }));
        let comparison = match quantifier {
            "SOME" => "WHERE var1 > 0",
            "SINGLE" => "WHERE var1 = 1",
            _ => "WHERE var1 = 0",
        };
        let cypher = plan.cypher();
        prop_assert!(cypher.contains(comparison), "{}", cypher);
        prop_assert_eq!(cypher.contains("WHERE NOT (this0.title"), quantifier == "ALL");
        let param = format!("this_where_{key}_title");
        prop_assert_eq!(plan.parameters.get(&param), Some(&Value::String(title)));
    }
}
