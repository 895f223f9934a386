//! Redis 요청/응답 모델
//!
//! 요청은 명령어 이름과 인자 목록, 응답은 RESP 타입
//! (integer / bulk string / status / error / nil / array) 그대로입니다.

pub mod decoder;

pub use decoder::{decode_value, encode_composite, parse_composite, reply_text};

use smallvec::SmallVec;
use std::fmt;

/// Redis 명령 (이름 + 인자)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    args: SmallVec<[String; 4]>,
}

impl Command {
    /// 인자 없는 명령 생성
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: SmallVec::new(),
        }
    }

    /// 인자 추가
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// 명령어 이름 (대문자)
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 인자 목록
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// RESP 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Integer(i64),
    Bulk(Vec<u8>),
    Status(String),
    Error(String),
    Nil,
    Array(Vec<Reply>),
}

impl Reply {
    /// bulk string 응답 생성 (테스트/에뮬레이터용)
    pub fn bulk(text: impl Into<String>) -> Self {
        Reply::Bulk(text.into().into_bytes())
    }

    /// 정수 응답이면 값을 반환
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// 로그/에러 메시지용 타입 이름
    pub fn type_name(&self) -> &'static str {
        match self {
            Reply::Integer(_) => "integer",
            Reply::Bulk(_) => "bulk string",
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Nil => "nil",
            Reply::Array(_) => "array",
        }
    }
}
