//! Table Shape Resolver
//!
//! (테이블 종류 × 키 구성 방식) → 실제 Redis 명령 템플릿
//!
//! | kind   | singleton               | key-per-row fetch |
//! |--------|-------------------------|-------------------|
//! | scalar | `GET key`               | `GET key`         |
//! | hash   | `HGETALL` / `HGET`      | `HGETALL key`     |
//! | list   | `LRANGE key 0 -1`       | `LRANGE key 0 -1` |
//! | set    | `SMEMBERS key`          | `SMEMBERS key`    |
//! | zset   | `ZRANGE … WITHSCORES`   | `ZRANGE key 0 -1` |
//!
//! 키 열거는 prefix → `SCAN … MATCH`, key-set → `SSCAN`, 제한 없음 → `SCAN`.

use crate::config::{KeyLayout, TableConfig, TableKind};
use crate::error::FdwResult;
use crate::protocol::Command;
use crate::transport::{Transport, execute_integer};
use tracing::debug;

/// `DBSIZE` 를 나누는 상수, Redis 에는 prefix 개수를 세는 명령이 없으므로
/// 단순 추정치입니다 (플래너 힌트 전용, 불변식 아님).
pub const PREFIX_ESTIMATE_DIVISOR: u64 = 20;

/// 로컬 서버 startup cost
pub const LOCAL_STARTUP_COST: f64 = 10.0;
/// 원격 서버 startup cost
pub const REMOTE_STARTUP_COST: f64 = 25.0;

/// 키 열거 방식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enumeration {
    /// 단일 구조체 하나를 한 번에 읽음
    Singleton { key: String },
    /// cursor 기반 페이지 스캔
    Cursor(ScanSource),
}

/// cursor 스캔 대상
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanSource {
    /// 전체 key-space (`SCAN`)
    Keyspace,
    /// prefix 로 시작하는 키 (`SCAN … MATCH prefix*`)
    Prefix(String),
    /// key-set 멤버 (`SSCAN set`)
    KeySet(String),
}

impl ScanSource {
    /// 한 페이지를 요청하는 명령 생성
    pub fn page_command(&self, cursor: &str, count: usize) -> Command {
        let cmd = match self {
            ScanSource::Keyspace => Command::new("SCAN").arg(cursor),
            ScanSource::Prefix(prefix) => Command::new("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(match_pattern(prefix)),
            ScanSource::KeySet(set) => Command::new("SSCAN").arg(set.as_str()).arg(cursor),
        };
        cmd.arg("COUNT").arg(count.to_string())
    }
}

/// 테이블 구성에 맞는 키 열거 방식
pub fn enumeration(layout: &KeyLayout) -> Enumeration {
    match layout {
        KeyLayout::Singleton(key) => Enumeration::Singleton { key: key.clone() },
        KeyLayout::Prefix(prefix) => Enumeration::Cursor(ScanSource::Prefix(prefix.clone())),
        KeyLayout::KeySet(set) => Enumeration::Cursor(ScanSource::KeySet(set.clone())),
        KeyLayout::Unrestricted => Enumeration::Cursor(ScanSource::Keyspace),
    }
}

/// singleton 테이블 전체를 읽는 명령
///
/// hash 테이블에 push-down 된 필드가 있으면 `HGET` 으로 한 필드만 읽습니다.
pub fn singleton_fetch(kind: TableKind, key: &str, pushdown: Option<&str>) -> Command {
    match (kind, pushdown) {
        (TableKind::Scalar, _) => Command::new("GET").arg(key),
        (TableKind::Hash, Some(field)) => Command::new("HGET").arg(key).arg(field),
        (TableKind::Hash, None) => Command::new("HGETALL").arg(key),
        (TableKind::List, _) => Command::new("LRANGE").arg(key).arg("0").arg("-1"),
        (TableKind::Set, _) => Command::new("SMEMBERS").arg(key),
        (TableKind::ZSet, _) => Command::new("ZRANGE")
            .arg(key)
            .arg("0")
            .arg("-1")
            .arg("WITHSCORES"),
    }
}

/// key-per-row 테이블에서 키 하나의 값을 읽는 명령 (zset 은 score 없이)
pub fn member_fetch(kind: TableKind, key: &str) -> Command {
    match kind {
        TableKind::Scalar => Command::new("GET").arg(key),
        TableKind::Hash => Command::new("HGETALL").arg(key),
        TableKind::List => Command::new("LRANGE").arg(key).arg("0").arg("-1"),
        TableKind::Set => Command::new("SMEMBERS").arg(key),
        TableKind::ZSet => Command::new("ZRANGE").arg(key).arg("0").arg("-1"),
    }
}

/// prefix 를 glob 패턴으로 변환, 메타문자는 이스케이프하여 문자 그대로 비교
pub fn match_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// 테이블 크기 추정에 쓰는 명령. singleton scalar 는 명령 없이 1행.
pub fn size_command(config: &TableConfig) -> Option<Command> {
    match &config.layout {
        KeyLayout::Singleton(key) => match config.kind {
            TableKind::Scalar => None,
            TableKind::Hash => Some(Command::new("HLEN").arg(key.as_str())),
            TableKind::List => Some(Command::new("LLEN").arg(key.as_str())),
            TableKind::Set => Some(Command::new("SCARD").arg(key.as_str())),
            TableKind::ZSet => Some(Command::new("ZCARD").arg(key.as_str())),
        },
        KeyLayout::KeySet(set) => Some(Command::new("SCARD").arg(set.as_str())),
        KeyLayout::Prefix(_) | KeyLayout::Unrestricted => Some(Command::new("DBSIZE")),
    }
}

/// 예상 행 수
///
/// prefix 테이블은 `DBSIZE / 20`, 근사치일 뿐입니다.
pub fn estimate_rows<T: Transport + ?Sized>(
    config: &TableConfig,
    transport: &mut T,
) -> FdwResult<u64> {
    let Some(cmd) = size_command(config) else {
        return Ok(1);
    };
    let count = execute_integer(transport, &cmd)?.max(0) as u64;
    let rows = match config.layout {
        KeyLayout::Prefix(_) => count / PREFIX_ESTIMATE_DIVISOR,
        _ => count,
    };
    debug!(kind = %config.kind, command = %cmd, rows, "estimated table size");
    Ok(rows)
}

/// 플래너에 넘기는 비용 추정
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanEstimate {
    pub rows: u64,
    pub startup_cost: f64,
    pub total_cost: f64,
}

impl PlanEstimate {
    /// 로컬 서버는 startup 10, 원격은 25; total = startup + rows
    pub fn new(config: &TableConfig, rows: u64) -> Self {
        let startup_cost = if config.is_local() {
            LOCAL_STARTUP_COST
        } else {
            REMOTE_STARTUP_COST
        };
        Self {
            rows,
            startup_cost,
            total_cost: startup_cost + rows as f64,
        }
    }

    /// 연결을 받아 행 수까지 추정
    pub fn estimate<T: Transport + ?Sized>(
        config: &TableConfig,
        transport: &mut T,
    ) -> FdwResult<Self> {
        let rows = estimate_rows(config, transport)?;
        Ok(Self::new(config, rows))
    }
}
