//! # redis-fdw-core: Redis key-space as a virtual table
//!
//! Redis 의 key-space(문자열, hash, list, set, sorted set)를 두 컬럼
//! `(key, value)` 가상 테이블로 노출하는 변환 계층입니다. 호스트 쿼리 엔진의
//! 플러그인 접착 코드는 범위 밖이며, 이 크레이트는 그 아래의 명령 변환,
//! 커서 페이지네이션, 등호 조건 push-down, 응답 디코딩, 쓰기 경로를 담당합니다.
//!
//! ## 주요 특징
//!
//! - **Table shape**: scalar / hash / list / set / zset × singleton / prefix / key-set
//! - **Cursor scan**: `SCAN`/`SSCAN` 페이지 단위 열거, 토큰 `"0"` 에서 종료
//! - **Pushdown**: `key = '…'` 조건은 Redis 에서 직접 평가
//! - **Composite value**: 배열 응답은 `{"a","b\"c",3,NULL}` 형태로 인코딩
//! - **Write path**: 존재/중복 검사 후 변경, key-set 동기화
//!
//! ## 빠른 시작
//!
//! ### 스캔
//!
//! ```rust
//! use redis_fdw_core::{InMemoryRedis, KeyLayout, Row, ScanSession, TableConfig, TableKind};
//!
//! # fn main() -> redis_fdw_core::FdwResult<()> {
//! let mut store = InMemoryRedis::new();
//! store.seed_hash("settings", &[("color", "blue"), ("size", "9")]);
//!
//! let config = TableConfig::new(TableKind::Hash, KeyLayout::Singleton("settings".into()));
//! let mut scan = ScanSession::begin(&config, &mut store, &[])?;
//!
//! assert_eq!(scan.next_row()?, Some(Row::new("color", Some("blue"))));
//! assert_eq!(scan.next_row()?, Some(Row::new("size", Some("9"))));
//! assert_eq!(scan.next_row()?, None);
//! scan.end();
//! # Ok(())
//! # }
//! ```
//!
//! ### 쓰기
//!
//! ```rust
//! use redis_fdw_core::{
//!     InMemoryRedis, KeyLayout, ModifyOperation, ModifyPlan, ModifyRow, ModifySession,
//!     TableConfig, TableKind,
//! };
//!
//! # fn main() -> redis_fdw_core::FdwResult<()> {
//! let mut store = InMemoryRedis::new();
//! let config = TableConfig::new(TableKind::Set, KeyLayout::Singleton("colors".into()));
//!
//! let plan = ModifyPlan::new(&config, ModifyOperation::Insert, 1)?;
//! let mut session = ModifySession::begin(plan, &mut store);
//! session.insert(&ModifyRow::new([Some("red")]))?;
//! assert!(session.insert(&ModifyRow::new([Some("red")])).is_err());
//! assert_eq!(session.end(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## 실행 흐름
//!
//! ```text
//! scan:  TableConfig → shape → (pushdown) → ScanCursor → decoder → Row
//! write: ModifyPlan → ModifySession → 존재 검사 → 변경 명령 → key-set 갱신
//! ```
//!
//! ## 모듈 구조
//!
//! - [`config`]: 테이블 옵션, 검증, JSON 로딩
//! - [`protocol`]: 명령/응답 모델과 Reply Decoder
//! - [`transport`]: `Transport` 트레이트, redis 연결, 인메모리 에뮬레이터
//! - [`shape`]: 명령 템플릿, 크기 추정, 비용
//! - [`sql`]: 제한 조건 파싱, push-down 분석
//! - [`scan`]: 커서 엔진, 행 반복자, [`ScanSession`]
//! - [`modify`]: [`ModifyPlan`], [`ModifySession`]

pub mod config;
pub mod error;
pub mod modify;
pub mod protocol;
pub mod scan;
pub mod shape;
pub mod sql;
pub mod transport;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use config::{KeyLayout, OptionContext, TableConfig, TableKind, TableOptions};
pub use error::{FdwError, FdwResult};
pub use modify::{JUNK_KEY_COLUMN, ModifyOperation, ModifyPlan, ModifyRow, ModifySession, UpdateTarget};
pub use protocol::{Command, Reply};
pub use scan::{Row, RowCursor, ScanExplain, ScanSession};
pub use shape::PlanEstimate;
pub use sql::SqlParser;
pub use transport::{InMemoryRedis, RedisConnection, Transport};
