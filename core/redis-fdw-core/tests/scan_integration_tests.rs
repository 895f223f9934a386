// Scan integration tests
//
// 종단 간 스캔 검증: TableConfig → ScanSession → Row, 인메모리 Redis 에뮬레이터 사용

use proptest::prelude::*;
use redis_fdw_core::scan::{ScanCursor, START_TOKEN};
use redis_fdw_core::shape::ScanSource;
use redis_fdw_core::{
    Command, FdwError, FdwResult, InMemoryRedis, KeyLayout, Reply, Row, RowCursor, ScanSession,
    SqlParser, TableConfig, TableKind, Transport,
};
use sqlparser::ast::Expr;

// ─── Helpers ────────────────────────────────────────────

fn quals(sql: &[&str]) -> Vec<Expr> {
    SqlParser::new().parse_restrictions(sql).unwrap()
}

fn drain<T: Transport>(session: &mut ScanSession<T>) -> Vec<Row> {
    std::iter::from_fn(|| session.next_row().unwrap()).collect()
}

fn scan_all(store: &mut InMemoryRedis, config: &TableConfig) -> Vec<Row> {
    let mut session = ScanSession::begin(config, store, &[]).unwrap();
    let rows = drain(&mut session);
    session.end();
    rows
}

/// Records every reply the inner transport returns.
struct Recording<'a> {
    inner: &'a mut InMemoryRedis,
    replies: Vec<(String, Reply)>,
}

impl Transport for Recording<'_> {
    fn execute(&mut self, cmd: &Command) -> FdwResult<Reply> {
        let reply = self.inner.execute(cmd)?;
        self.replies.push((cmd.name().to_string(), reply.clone()));
        Ok(reply)
    }
}

// ═══════════════════════════════════════════════════════════
// 테이블 종류별 스캔
// ═══════════════════════════════════════════════════════════

#[test]
fn singleton_collections_emit_one_row_per_member() {
    let mut store = InMemoryRedis::new();
    store
        .seed_list("queue", &["j1", "j2", "j1"])
        .seed_set("tags", &["b", "a"])
        .seed_zset("board", &[("ann", 2.0), ("bob", 1.5)]);

    let list = TableConfig::new(TableKind::List, KeyLayout::Singleton("queue".into()));
    assert_eq!(
        scan_all(&mut store, &list),
        vec![Row::new("j1", None), Row::new("j2", None), Row::new("j1", None)]
    );

    let set = TableConfig::new(TableKind::Set, KeyLayout::Singleton("tags".into()));
    assert_eq!(
        scan_all(&mut store, &set),
        vec![Row::new("a", None), Row::new("b", None)]
    );

    // ZRANGE WITHSCORES: ascending score
    let zset = TableConfig::new(TableKind::ZSet, KeyLayout::Singleton("board".into()));
    assert_eq!(
        scan_all(&mut store, &zset),
        vec![Row::new("bob", Some("1.5")), Row::new("ann", Some("2"))]
    );
}

#[test]
fn singleton_scalar_row_has_null_value() {
    let mut store = InMemoryRedis::new();
    store.seed_string("greeting", "hello");
    let config = TableConfig::new(TableKind::Scalar, KeyLayout::Singleton("greeting".into()));
    assert_eq!(scan_all(&mut store, &config), vec![Row::new("hello", None)]);

    let missing = TableConfig::new(TableKind::Scalar, KeyLayout::Singleton("nope".into()));
    assert!(scan_all(&mut store, &missing).is_empty());
}

#[test]
fn key_per_row_collections_use_composite_values() {
    let mut store = InMemoryRedis::new();
    store
        .seed_list("l:1", &["a", "b\"c"])
        .seed_zset("z:1", &[("m", 3.0)])
        .seed_string("s:1", "plain");

    let lists = TableConfig::new(TableKind::List, KeyLayout::Prefix("l:".into()));
    assert_eq!(
        scan_all(&mut store, &lists),
        vec![Row::new("l:1", Some(r#"{"a","b\"c"}"#))]
    );

    // per-key zset fetch carries no scores
    let zsets = TableConfig::new(TableKind::ZSet, KeyLayout::Prefix("z:".into()));
    assert_eq!(scan_all(&mut store, &zsets), vec![Row::new("z:1", Some(r#"{"m"}"#))]);
}

#[test]
fn prefix_scan_treats_glob_characters_literally() {
    let mut store = InMemoryRedis::new();
    store
        .seed_string("a*1", "star")
        .seed_string("ab1", "plain")
        .seed_string("a?x", "question");

    let config = TableConfig::new(TableKind::Scalar, KeyLayout::Prefix("a*".into()));
    assert_eq!(scan_all(&mut store, &config), vec![Row::new("a*1", Some("star"))]);
}

#[test]
fn keyset_scan_skips_missing_and_foreign_keys() {
    let mut store = InMemoryRedis::new();
    store
        .seed_set("ids", &["k1", "k2", "k3"])
        .seed_string("k1", "v1")
        .seed_hash("k3", &[("f", "v")])
        .seed_string("k4", "unlisted");

    let config = TableConfig::new(TableKind::Scalar, KeyLayout::KeySet("ids".into()));
    // k2 is nil, k3 is WRONGTYPE: both skipped
    assert_eq!(scan_all(&mut store, &config), vec![Row::new("k1", Some("v1"))]);
}

// ═══════════════════════════════════════════════════════════
// 반복 프로토콜: 소진, rescan, push-down
// ═══════════════════════════════════════════════════════════

#[test]
fn exhaustion_is_idempotent_until_rescan() {
    let mut store = InMemoryRedis::new();
    store.seed_set("tags", &["x", "y"]);
    let config = TableConfig::new(TableKind::Set, KeyLayout::Singleton("tags".into()));

    let mut session = ScanSession::begin(&config, &mut store, &[]).unwrap();
    assert_eq!(drain(&mut session).len(), 2);
    for _ in 0..5 {
        assert_eq!(session.next_row().unwrap(), None);
    }

    session.rescan().unwrap();
    assert!(session.cursor().is_start());
    assert_eq!(drain(&mut session).len(), 2);
    session.end();

    // singleton reply is reused on rescan
    assert_eq!(store.count_of("SMEMBERS"), 1);
}

#[test]
fn rescan_restarts_cursor_from_zero() {
    let mut store = InMemoryRedis::new();
    for i in 0..5 {
        store.seed_string(&format!("k{i}"), "v");
    }
    let config = TableConfig::new(TableKind::Scalar, KeyLayout::Unrestricted).with_scan_count(2);

    let mut session = ScanSession::begin(&config, &mut store, &[]).unwrap();
    assert_eq!(drain(&mut session).len(), 5);
    session.rescan().unwrap();
    assert_eq!(drain(&mut session).len(), 5);
    session.end();

    let scans: Vec<_> = store
        .commands()
        .iter()
        .filter(|c| c.name() == "SCAN")
        .map(|c| c.args()[0].clone())
        .collect();
    assert_eq!(scans, vec!["0", "2", "4", "0", "2", "4"]);
}

#[test]
fn rejected_predicate_is_sticky_until_cleared() {
    let mut store = InMemoryRedis::new();
    store
        .seed_set("ids", &["k1"])
        .seed_string("k1", "v1")
        .seed_string("X", "outside");
    let config = TableConfig::new(TableKind::Scalar, KeyLayout::KeySet("ids".into()));

    let mut session = ScanSession::begin(&config, &mut store, &quals(&["key = 'X'"])).unwrap();
    assert_eq!(session.pushdown(), Some("X"));
    assert!(drain(&mut session).is_empty());
    assert_eq!(session.cursor(), RowCursor::PredicateRejected);

    session.rescan().unwrap();
    assert_eq!(session.cursor(), RowCursor::PredicateRejected);
    assert!(drain(&mut session).is_empty());

    session.rescan_with(&[]).unwrap();
    assert_eq!(session.cursor(), RowCursor::Positioned(0));
    assert_eq!(drain(&mut session), vec![Row::new("k1", Some("v1"))]);
    session.end();
}

#[test]
fn pushdown_pins_scan_to_one_key() {
    let mut store = InMemoryRedis::new();
    store.seed_string("a", "1").seed_string("b", "2");
    let config = TableConfig::new(TableKind::Scalar, KeyLayout::Unrestricted);

    let mut session =
        ScanSession::begin(&config, &mut store, &quals(&["value = '1'", "key = 'b'"])).unwrap();
    assert_eq!(drain(&mut session), vec![Row::new("b", Some("2"))]);
    session.end();

    assert_eq!(store.count_of("SCAN"), 0);
    assert_eq!(store.command_names(), vec!["EXISTS", "GET"]);
}

#[test]
fn non_pushable_restrictions_fall_back_to_full_scan() {
    let mut store = InMemoryRedis::new();
    store.seed_string("a", "1").seed_string("b", "2");
    let config = TableConfig::new(TableKind::Scalar, KeyLayout::Unrestricted);

    let mut session = ScanSession::begin(
        &config,
        &mut store,
        &quals(&["key = 'a' OR key = 'b'", "key > 'a'", "value = 'x'"]),
    )
    .unwrap();
    assert_eq!(session.pushdown(), None);
    assert_eq!(drain(&mut session).len(), 2);
}

#[test]
fn singleton_scalar_array_reply_is_unsupported() {
    struct ArrayStore;
    impl Transport for ArrayStore {
        fn execute(&mut self, _cmd: &Command) -> FdwResult<Reply> {
            Ok(Reply::Array(vec![Reply::bulk("a")]))
        }
    }

    let config = TableConfig::new(TableKind::Scalar, KeyLayout::Singleton("k".into()));
    let mut session = ScanSession::begin(&config, ArrayStore, &[]).unwrap();
    assert!(matches!(
        session.next_row().unwrap_err(),
        FdwError::Unsupported { .. }
    ));
    assert!(!session.is_open());
}

#[test]
fn transport_failure_mid_scan_closes_session() {
    let mut store = InMemoryRedis::new();
    store.seed_string("a", "1").drop_on("GET");
    let config = TableConfig::new(TableKind::Scalar, KeyLayout::Unrestricted);

    let mut session = ScanSession::begin(&config, &mut store, &[]).unwrap();
    assert!(matches!(session.next_row().unwrap_err(), FdwError::Protocol(_)));
    assert!(matches!(session.next_row().unwrap_err(), FdwError::SessionClosed));
}

// ═══════════════════════════════════════════════════════════
// 커서 페이지네이션
// ═══════════════════════════════════════════════════════════

#[test]
fn cursor_follows_tokens_until_zero() {
    let mut store = InMemoryRedis::new();
    for i in 0..25 {
        store.seed_string(&format!("key:{i:02}"), "v");
    }
    let mut recording = Recording {
        inner: &mut store,
        replies: Vec::new(),
    };
    let mut cursor = ScanCursor::new(ScanSource::Prefix("key:".into()), 10);

    let mut keys = Vec::new();
    while let Some(page) = cursor.next_page(&mut recording).unwrap() {
        keys.extend(page);
    }
    assert_eq!(keys.len(), 25);

    let tokens: Vec<String> = recording
        .replies
        .iter()
        .map(|(_, reply)| match reply {
            Reply::Array(items) => redis_fdw_core::protocol::reply_text(&items[0]).unwrap(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(tokens, vec!["10", "20", START_TOKEN]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pagination_visits_every_key_once(n in 0usize..120, count in 1usize..16) {
        let mut store = InMemoryRedis::new();
        for i in 0..n {
            store.seed_string(&format!("k{i:03}"), &i.to_string());
        }
        let config = TableConfig::new(TableKind::Scalar, KeyLayout::Unrestricted)
            .with_scan_count(count);

        let rows = scan_all(&mut store, &config);
        let mut keys: Vec<_> = rows.iter().map(|r| r.key.clone()).collect();
        keys.dedup();
        prop_assert_eq!(keys.len(), n);
        prop_assert_eq!(rows.len(), n);

        let expected_pages = n.div_ceil(count).max(1);
        prop_assert_eq!(store.count_of("SCAN"), expected_pages);
    }

    #[test]
    fn prefix_scan_returns_exactly_prefixed_keys(
        keys in proptest::collection::btree_set("[a-c*?]{1,4}", 0..30),
        prefix in "[a-c*?]{1,2}",
    ) {
        let mut store = InMemoryRedis::new();
        for key in &keys {
            store.seed_string(key, "v");
        }
        let config = TableConfig::new(TableKind::Scalar, KeyLayout::Prefix(prefix.clone()))
            .with_scan_count(7);

        let got: Vec<String> = scan_all(&mut store, &config).into_iter().map(|r| r.key).collect();
        let expected: Vec<String> = keys.iter().filter(|k| k.starts_with(&prefix)).cloned().collect();
        prop_assert_eq!(got, expected);
    }
}
