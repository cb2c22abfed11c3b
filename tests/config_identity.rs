//! Identity and validation of classifier configurations.

use proptest::prelude::*;
use rstest::{fixture, rstest};
use sdg_benchmark::{Config, ConfigError, ConfigSet, Parameters};
use serde_json::json;

#[fixture]
fn params() -> Parameters {
    Parameters::new([("model", "Chat model"), ("temperature", "Sampling temperature")])
        .unwrap_or_else(|e| panic!("declare parameters: {e}"))
}

#[rstest]
#[case(Config::new([("model", json!("small")), ("temperature", json!(0))]), true)]
#[case(Config::new([("temperature", json!(0)), ("model", json!("small"))]), true)]
#[case(Config::new([("model", json!("small"))]), false)]
#[case(
    Config::new([("model", json!("small")), ("temperature", json!(0)), ("seed", json!(1))]),
    false
)]
#[case(Config::default(), false)]
fn validate_requires_exact_key_set(params: Parameters, #[case] config: Config, #[case] ok: bool) {
    assert_eq!(params.validate(&config).is_ok(), ok);
}

#[rstest]
fn invalid_member_names_both_key_sets(params: Parameters) {
    let err = ConfigSet::new(params, [Config::new([("model", "small")])]);
    match err {
        Err(ConfigError::Invalid { expected, actual, .. }) => {
            assert_eq!(expected, vec!["model".to_owned(), "temperature".to_owned()]);
            assert_eq!(actual, vec!["model".to_owned()]);
        }
        other => panic!("expected invalid config, got {other:?}"),
    }
}

#[rstest]
fn duplicate_members_are_rejected(params: Parameters) {
    let a = Config::new([("model", json!("small")), ("temperature", json!(0))]);
    let b = Config::new([("temperature", json!(0)), ("model", json!("small"))]);
    assert!(matches!(
        ConfigSet::new(params, [a, b]),
        Err(ConfigError::Duplicate { .. })
    ));
}

#[rstest]
fn distinct_members_keep_insertion_order(params: Parameters) {
    let configs: Vec<Config> = ["large", "small", "medium"]
        .into_iter()
        .map(|model| Config::new([("model", json!(model)), ("temperature", json!(0))]))
        .collect();
    let set = ConfigSet::new(params, configs.clone())
        .unwrap_or_else(|e| panic!("build set: {e}"));
    assert_eq!(set.iter().cloned().collect::<Vec<_>>(), configs);
    assert_eq!(
        set.identifiers(),
        configs.iter().map(Config::identifier).collect::<Vec<_>>()
    );
}

#[rstest]
fn identifier_survives_serialisation() {
    let config = Config::new([
        ("model", json!("small")),
        ("options", json!({"b": 1, "a": [1, 2]})),
    ]);
    let text = serde_json::to_string(&config).unwrap_or_else(|e| panic!("serialise: {e}"));
    let back: Config = serde_json::from_str(&text).unwrap_or_else(|e| panic!("parse: {e}"));
    assert_eq!(back.identifier(), config.identifier());
}

fn config_strategy() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..6)
}

proptest! {
    #[test]
    fn identifier_ignores_pair_order(pairs in config_strategy()) {
        let forward = Config::new(pairs.iter().map(|(k, v)| (k.clone(), *v)));
        let backward = Config::new(pairs.iter().rev().map(|(k, v)| (k.clone(), *v)));
        // Later duplicates win in a map, so only compare when keys are unique.
        let mut keys: Vec<&String> = pairs.iter().map(|(k, _)| k).collect();
        keys.sort();
        keys.dedup();
        prop_assume!(keys.len() == pairs.len());
        prop_assert_eq!(forward.identifier(), backward.identifier());
        prop_assert_eq!(forward.identifier(), forward.clone().identifier());
    }

    #[test]
    fn different_values_give_different_identifiers(
        key in "[a-z]{1,8}",
        a in any::<i64>(),
        b in any::<i64>(),
    ) {
        prop_assume!(a != b);
        let first = Config::new([(key.clone(), a)]);
        let second = Config::new([(key, b)]);
        prop_assert_ne!(first.identifier(), second.identifier());
    }
}
