//! key-set 테이블 CRUD 예제
//!
//! 실행: cargo run --example table_crud
//!
//! 실제 서버에 연결하려면 `ScanSession::open` / `ModifySession::open` 을
//! 사용합니다. 여기서는 인메모리 에뮬레이터로 동일한 명령 흐름을 보여줍니다.

use redis_fdw_core::{
    InMemoryRedis, ModifyOperation, ModifyPlan, ModifyRow, ModifySession, OptionContext,
    ScanSession, TableConfig, TableOptions, Transport,
};

fn dump<T: Transport>(config: &TableConfig, transport: T) -> redis_fdw_core::FdwResult<()> {
    let mut scan = ScanSession::begin(config, transport, &[])?;
    while let Some(row) = scan.next_row()? {
        println!("   {} = {}", row.key, row.value.as_deref().unwrap_or("NULL"));
    }
    scan.end();
    Ok(())
}

fn main() -> redis_fdw_core::FdwResult<()> {
    println!("=== redis-fdw key-set CRUD 예제 ===\n");

    // 1. 카탈로그 옵션 → TableConfig
    println!("1. 테이블 옵션 검증...");
    let config = TableOptions::from_pairs(
        OptionContext::Table,
        [("tabletype", "hash"), ("tablekeyset", "users")],
    )?
    .build()?;
    println!("   ✓ {} 테이블, key-set = users\n", config.kind.as_str());

    let mut store = InMemoryRedis::new();

    // 2. Insert
    println!("2. 데이터 삽입...");
    let plan = ModifyPlan::new(&config, ModifyOperation::Insert, config.data_columns())?;
    let mut writer = ModifySession::begin(plan, &mut store);
    writer.insert(&ModifyRow::new([Some("user:1"), Some(r#"{"name","Alice"}"#)]))?;
    writer.insert(&ModifyRow::new([Some("user:2"), Some(r#"{"name","Bob"}"#)]))?;
    if let Err(err) = writer.insert(&ModifyRow::new([Some("user:1"), Some(r#"{"name","Eve"}"#)])) {
        println!("   ✗ 중복 키 거부: {err}");
    }
    println!("   ✓ {}개 행 삽입 완료\n", writer.end());
    dump(&config, &mut store)?;

    // 3. Update (key rename + value rewrite)
    println!("\n3. 데이터 수정...");
    let plan = ModifyPlan::new(&config, ModifyOperation::Update, config.data_columns())?;
    let mut writer = ModifySession::begin(plan, &mut store);
    writer.update(
        &ModifyRow::new([Some("user:3"), Some(r#"{"name","Bobby"}"#)]).with_old_key("user:2"),
    )?;
    writer.end();
    dump(&config, &mut store)?;

    // 4. Delete
    println!("\n4. 데이터 삭제...");
    let plan = ModifyPlan::new(&config, ModifyOperation::Delete, 0)?;
    let mut writer = ModifySession::begin(plan, &mut store);
    writer.delete(&ModifyRow::default().with_old_key("user:1"))?;
    writer.end();
    dump(&config, &mut store)?;

    println!("\n   key-set 멤버: {:?}", store.set_members("users"));
    println!("\n=== 예제 완료 ===");
    Ok(())
}
