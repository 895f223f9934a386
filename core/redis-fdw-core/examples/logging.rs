//! 로깅 시스템 사용 예제
//!
//! 실행: RUST_LOG=trace cargo run --example logging --features logging

use redis_fdw_core::{InMemoryRedis, KeyLayout, ScanSession, SqlParser, TableConfig, TableKind};

fn main() -> redis_fdw_core::FdwResult<()> {
    // 로깅 초기화 (feature 비활성 시 no-op)
    redis_fdw_core::logging::init();

    println!("=== redis-fdw 로깅 예제 ===\n");
    println!("환경 변수 RUST_LOG로 로그 레벨 조정 가능:");
    println!("  RUST_LOG=trace  - Redis 로 보내는 모든 명령");
    println!("  RUST_LOG=debug  - 세션 시작/종료, push-down 판단");
    println!("  RUST_LOG=warn   - 연결 해제를 일으킨 오류만\n");

    let mut store = InMemoryRedis::new();
    store
        .seed_string("user:1", "Alice")
        .seed_string("user:2", "Bob")
        .seed_string("order:1", "ignored");

    let config = TableConfig::new(TableKind::Scalar, KeyLayout::Prefix("user:".into()));

    println!("전체 스캔 중...");
    let mut scan = ScanSession::begin(&config, &mut store, &[])?;
    while let Some(row) = scan.next_row()? {
        println!("   {} = {:?}", row.key, row.value);
    }
    scan.end();

    println!("\npush-down 스캔 중...");
    let quals = SqlParser::new().parse_restrictions(&["key = 'user:2'"])?;
    let mut scan = ScanSession::begin(&config, &mut store, &quals)?;
    println!("   {}", scan.explain()?);
    while let Some(row) = scan.next_row()? {
        println!("   {} = {:?}", row.key, row.value);
    }
    scan.end();

    println!("\n=== 예제 완료 ===");
    println!("주의: logging feature가 활성화되어야 로그가 출력됩니다.");

    Ok(())
}
