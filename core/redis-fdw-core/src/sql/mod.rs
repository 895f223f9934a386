// SQL 모듈 진입점: 제한 조건 파싱과 push-down 분석
pub mod parser;
pub mod pushdown;

pub use parser::SqlParser;
pub use pushdown::{KEY_COLUMN, Restriction, analyze, find_pushdown};
