//! Property-based tests using proptest
//!
//! These tests verify scope and identifier parsing, wildcard matching and
//! attribute mapping using randomized inputs.

use blastscan::discovery::attributes::to_attributes;
use blastscan::discovery::identifier::Identifier;
use blastscan::discovery::scope::{format_scope, parse_scope, scope_accepts};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn arb_account() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,20}"
}

fn arb_region() -> impl Strategy<Value = String> {
    "[a-z0-9-]{0,12}"
}

/// Concrete identifiers with a `type/id` resource part. Ids may contain
/// separators and glob metacharacters, which must stay literal.
fn arb_identifier() -> impl Strategy<Value = Identifier> {
    (
        "[a-z]{1,6}",
        "[a-z]{1,10}",
        arb_region(),
        prop_oneof![Just(String::new()), arb_account()],
        "[a-z][a-z-]{0,10}",
        "[a-zA-Z0-9_./:\\[\\]-]{1,24}",
    )
        .prop_map(|(partition, service, region, account, resource_type, id)| {
            Identifier::new(&partition, &service, &region, &account, &resource_type, &id)
        })
}

proptest! {
    /// Formatting then parsing a scope gives back its parts
    #[test]
    fn scope_round_trips(account in arb_account(), region in arb_region()) {
        let scope = format_scope(&account, &region);
        prop_assert_eq!(parse_scope(&scope).unwrap(), (account, region));
    }

    /// Account-only scopes are accepted for any region of the same account
    #[test]
    fn account_scope_accepted_in_every_region(account in arb_account(), region in "[a-z0-9-]{1,12}") {
        let requested = format_scope(&account, &region);
        prop_assert!(scope_accepts(&requested, &account));
        prop_assert!(!scope_accepts(&account, &requested));
    }

    /// Display and parse are inverse
    #[test]
    fn identifier_round_trips(id in arb_identifier()) {
        let rendered = id.to_string();
        let parsed = Identifier::parse(&rendered).unwrap();
        prop_assert_eq!(parsed.to_string(), rendered);
        prop_assert_eq!(parsed, id);
    }

    /// A concrete identifier matches exactly itself
    #[test]
    fn concrete_identifier_matches_itself(id in arb_identifier(), other in arb_identifier()) {
        let rendered = id.to_string();
        prop_assume!(!id.has_wildcards());
        prop_assert!(id.wildcard_matches(&rendered));
        if other.to_string() != rendered {
            prop_assert!(!id.wildcard_matches(&other.to_string()));
        }
    }

    /// Replacing the resource id with `*` matches every id of that type
    #[test]
    fn star_matches_any_resource_id(id in arb_identifier(), replacement in "[a-z0-9/:]{0,16}") {
        let pattern = Identifier::new(&id.partition, &id.service, &id.region, &id.account, id.resource_type(), "*");
        let candidate = Identifier::new(&id.partition, &id.service, &id.region, &id.account, id.resource_type(), &replacement);
        prop_assert!(pattern.wildcard_matches(&candidate.to_string()));
    }

    /// Attribute maps drop nulls and excluded fields and keep everything else
    #[test]
    fn attributes_keep_non_null_fields(
        fields in prop::collection::btree_map("[a-z]{1,8}", prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z ]{0,10}".prop_map(Value::String),
        ], 0..12),
        exclude in prop::collection::vec("[a-z]{1,8}", 0..3),
    ) {
        let record: Map<String, Value> = fields.clone().into_iter().collect();
        let exclude_refs: Vec<&str> = exclude.iter().map(String::as_str).collect();
        let attrs = to_attributes(&Value::Object(record), &exclude_refs).unwrap();

        let expected: Vec<&String> = fields
            .iter()
            .filter(|(key, value)| !value.is_null() && !exclude.contains(key))
            .map(|(key, _)| key)
            .collect();
        let keys: Vec<&String> = attrs.keys().collect();
        prop_assert_eq!(keys, expected);
    }
}
