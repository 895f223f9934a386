// Configuration integration tests
//
// 옵션 목록 → TableConfig, JSON 로딩, 조직 방식 배타성

use proptest::prelude::*;
use redis_fdw_core::shape::PlanEstimate;
use redis_fdw_core::{
    FdwError, InMemoryRedis, KeyLayout, ModifyOperation, ModifyPlan, OptionContext, TableConfig,
    TableKind, TableOptions,
};

const MODIFIERS: [&str; 3] = ["singleton_key", "tablekeyprefix", "tablekeyset"];

#[test]
fn catalog_options_build_config() {
    let mut options = TableOptions::from_pairs(
        OptionContext::Table,
        [("tabletype", "hash"), ("tablekeyset", "users"), ("scan_count", "50")],
    )
    .unwrap();
    options
        .extend(OptionContext::Server, [("address", "10.0.0.5"), ("port", "6380")])
        .unwrap();
    options
        .extend(OptionContext::UserMapping, [("password", "secret")])
        .unwrap();

    let config = options.build().unwrap();
    assert_eq!(config.kind, TableKind::Hash);
    assert_eq!(config.layout, KeyLayout::KeySet("users".into()));
    assert_eq!(config.address, "10.0.0.5");
    assert_eq!(config.port, 6380);
    assert_eq!(config.scan_count, 50);
    assert_eq!(config.password.as_deref(), Some("secret"));
    assert!(!format!("{config:?}").contains("secret"));
}

#[test]
fn option_in_wrong_context_is_rejected() {
    let err = TableOptions::from_pairs(OptionContext::Table, [("password", "x")]).unwrap_err();
    match err {
        FdwError::Config(message) => assert!(message.contains("tabletype"), "{message}"),
        other => panic!("expected Config, got {other:?}"),
    }
}

#[test]
fn invalid_table_type_is_rejected() {
    assert!(TableOptions::from_pairs(OptionContext::Table, [("tabletype", "stream")]).is_err());
}

#[test]
fn json_config_rejects_conflicting_modifiers() {
    let err = TableConfig::from_json(r#"{"singleton_key":"a","tablekeyset":"b"}"#).unwrap_err();
    assert!(matches!(err, FdwError::Config(_)));

    let ok = TableConfig::from_json(r#"{"tabletype":"zset","singleton_key":"board"}"#).unwrap();
    assert_eq!(ok.kind, TableKind::ZSet);
    assert!(ok.layout.is_singleton());
}

#[test]
fn wrong_column_count_fails_before_connecting() {
    let config = TableConfig::new(TableKind::ZSet, KeyLayout::Singleton("board".into()));
    let err = ModifyPlan::new(&config, ModifyOperation::Insert, 1).unwrap_err();
    assert!(matches!(err, FdwError::Config(_)));
}

#[test]
fn plan_estimate_for_prefix_table() {
    let mut store = InMemoryRedis::new();
    for i in 0..100 {
        store.seed_string(&format!("k{i}"), "v");
    }
    let config = TableConfig::new(TableKind::Scalar, KeyLayout::Prefix("k".into()))
        .with_address("redis.internal");
    let estimate = PlanEstimate::estimate(&config, &mut store).unwrap();
    assert_eq!(estimate.rows, 5);
    assert_eq!(estimate.startup_cost, 25.0);
    assert_eq!(estimate.total_cost, 30.0);
}

proptest! {
    #[test]
    fn two_or_more_modifiers_always_conflict(
        picks in proptest::sample::subsequence(MODIFIERS.to_vec(), 2..=3),
        kind in proptest::sample::select(vec![None, Some("hash"), Some("list"), Some("set"), Some("zset")]),
    ) {
        let mut pairs: Vec<(&str, &str)> = picks.iter().map(|m| (*m, "v")).collect();
        if let Some(kind) = kind {
            pairs.push(("tabletype", kind));
        }
        let result = TableOptions::from_pairs(OptionContext::Table, pairs.iter().copied());
        prop_assert!(matches!(result, Err(FdwError::Config(_))));

        let get = |name: &str| picks.iter().any(|p| *p == name).then_some("v");
        let layout = KeyLayout::from_modifiers(get("singleton_key"), get("tablekeyprefix"), get("tablekeyset"));
        prop_assert!(matches!(layout, Err(FdwError::Config(_))));
    }

    #[test]
    fn single_modifier_always_builds(index in 0usize..3) {
        let options = TableOptions::from_pairs(OptionContext::Table, [(MODIFIERS[index], "v")]).unwrap();
        prop_assert!(options.build().is_ok());
    }
}
