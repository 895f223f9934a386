//! 종류별 쓰기 명령 시퀀스
//!
//! | kind   | singleton insert                 | key-per-row insert        |
//! |--------|----------------------------------|---------------------------|
//! | scalar | `EXISTS` → `SET`                 | `EXISTS` → `SET`          |
//! | hash   | `HEXISTS` → `HSET`               | `EXISTS` → `HSET f v ..`  |
//! | list   | `RPUSH` (중복 허용)              | `EXISTS` → `RPUSH e ..`   |
//! | set    | `SISMEMBER` → `SADD`             | `EXISTS` → `SADD m ..`    |
//! | zset   | `ZRANK` → `ZADD`                 | 미지원                    |
//!
//! key-set 테이블은 주 명령이 성공한 뒤에만 key-set 을 갱신합니다.

use super::{ModifyRow, zset_per_key_unsupported};
use crate::config::{KeyLayout, TableConfig, TableKind};
use crate::error::{FdwError, FdwResult};
use crate::protocol::{Command, Reply, parse_composite};
use crate::transport::{Transport, execute_checked, execute_integer};
use tracing::debug;

pub(super) fn insert(
    config: &TableConfig,
    transport: &mut dyn Transport,
    row: &ModifyRow,
) -> FdwResult<()> {
    let member = row.member()?;
    match &config.layout {
        KeyLayout::Singleton(key) => insert_member(config.kind, transport, key, member, row.column(1)),
        layout => {
            check_prefix(layout, member)?;
            let write = value_command(config.kind, member, row.column(1))?;
            ensure_key_absent(transport, member)?;
            execute_checked(transport, &write)?;
            if let KeyLayout::KeySet(set) = layout {
                execute_checked(transport, &Command::new("SADD").arg(set.as_str()).arg(member))?;
            }
            Ok(())
        }
    }
}

pub(super) fn update(
    config: &TableConfig,
    transport: &mut dyn Transport,
    row: &ModifyRow,
) -> FdwResult<()> {
    let new = row.member()?;
    let key = match &config.layout {
        KeyLayout::Singleton(key) => key,
        layout => return update_key(config.kind, layout, transport, row.old_key()?, new, row.column(1)),
    };

    match config.kind {
        TableKind::Scalar => {
            execute_checked(transport, &Command::new("SET").arg(key.as_str()).arg(new))?;
        }
        TableKind::List => {
            let old = row.old_key()?;
            let cmd = Command::new("LPOS").arg(key.as_str()).arg(old);
            match execute_checked(transport, &cmd)? {
                Reply::Integer(index) => {
                    let cmd = Command::new("LSET")
                        .arg(key.as_str())
                        .arg(index.to_string())
                        .arg(new);
                    execute_checked(transport, &cmd)?;
                }
                Reply::Nil => debug!(key = %key, element = old, "list element gone, nothing to update"),
                other => return Err(unexpected(&cmd, &other)),
            }
        }
        TableKind::Hash | TableKind::Set | TableKind::ZSet => {
            let old = row.old_key()?;
            // 값/score 검증은 기존 멤버를 지우기 전에
            let add = add_command(config.kind, key, new, row.column(1))?;
            if old != new {
                ensure_member_absent(config.kind, transport, key, new)?;
                remove_member(config.kind, transport, key, old)?;
            }
            execute_checked(transport, &add)?;
        }
    }
    Ok(())
}

pub(super) fn delete(
    config: &TableConfig,
    transport: &mut dyn Transport,
    row: &ModifyRow,
) -> FdwResult<()> {
    match &config.layout {
        KeyLayout::Singleton(key) if config.kind == TableKind::Scalar => {
            execute_checked(transport, &Command::new("DEL").arg(key.as_str()))?;
        }
        KeyLayout::Singleton(key) => {
            remove_member(config.kind, transport, key, row.old_key()?)?;
        }
        layout => {
            let old = row.old_key()?;
            execute_checked(transport, &Command::new("DEL").arg(old))?;
            if let KeyLayout::KeySet(set) = layout {
                execute_checked(transport, &Command::new("SREM").arg(set.as_str()).arg(old))?;
            }
        }
    }
    Ok(())
}

fn insert_member(
    kind: TableKind,
    transport: &mut dyn Transport,
    key: &str,
    member: &str,
    second: Option<&str>,
) -> FdwResult<()> {
    let add = add_command(kind, key, member, second)?;
    match kind {
        TableKind::Scalar => ensure_key_absent(transport, key)?,
        // 리스트는 중복 허용
        TableKind::List => {}
        TableKind::Hash | TableKind::Set | TableKind::ZSet => {
            ensure_member_absent(kind, transport, key, member)?
        }
    }
    execute_checked(transport, &add)?;
    Ok(())
}

/// 단일 구조체에 멤버를 추가하는 명령 (hash/zset 은 값 또는 score 필요)
///
/// 명령을 만들면서 입력을 모두 검증하므로, 실행 전에 호출하면 실패 시
/// 저장소는 그대로입니다.
fn add_command(
    kind: TableKind,
    key: &str,
    member: &str,
    second: Option<&str>,
) -> FdwResult<Command> {
    Ok(match kind {
        TableKind::Scalar => Command::new("SET").arg(key).arg(member),
        TableKind::Hash => Command::new("HSET")
            .arg(key)
            .arg(member)
            .arg(required(second, "hash value")?),
        TableKind::List => Command::new("RPUSH").arg(key).arg(member),
        TableKind::Set => Command::new("SADD").arg(key).arg(member),
        TableKind::ZSet => Command::new("ZADD")
            .arg(key)
            .arg(score(required(second, "zset score")?)?)
            .arg(member),
    })
}

fn remove_member(
    kind: TableKind,
    transport: &mut dyn Transport,
    key: &str,
    member: &str,
) -> FdwResult<()> {
    let cmd = match kind {
        TableKind::Scalar => Command::new("DEL").arg(key),
        TableKind::Hash => Command::new("HDEL").arg(key).arg(member),
        TableKind::List => Command::new("LREM").arg(key).arg("1").arg(member),
        TableKind::Set => Command::new("SREM").arg(key).arg(member),
        TableKind::ZSet => Command::new("ZREM").arg(key).arg(member),
    };
    execute_checked(transport, &cmd)?;
    Ok(())
}

/// key-per-row 업데이트: 키 변경 시 RENAME + key-set 갱신, 값이 있으면 재작성
fn update_key(
    kind: TableKind,
    layout: &KeyLayout,
    transport: &mut dyn Transport,
    old: &str,
    new: &str,
    value: Option<&str>,
) -> FdwResult<()> {
    if value.is_some() && kind == TableKind::ZSet {
        return Err(zset_per_key_unsupported());
    }
    if old != new {
        check_prefix(layout, new)?;
    }
    // 새 값은 RENAME/DEL 전에 파싱
    let write = value.map(|v| value_command(kind, new, Some(v))).transpose()?;
    if old != new {
        ensure_key_absent(transport, new)?;
        execute_checked(transport, &Command::new("RENAME").arg(old).arg(new))?;
        if let KeyLayout::KeySet(set) = layout {
            execute_checked(transport, &Command::new("SREM").arg(set.as_str()).arg(old))?;
            execute_checked(transport, &Command::new("SADD").arg(set.as_str()).arg(new))?;
        }
    }
    if let Some(write) = write {
        if kind != TableKind::Scalar {
            execute_checked(transport, &Command::new("DEL").arg(new))?;
        }
        execute_checked(transport, &write)?;
    }
    Ok(())
}

/// key 하나에 값 전체를 기록하는 명령, 컬렉션은 composite 표현을 파싱
fn value_command(kind: TableKind, key: &str, value: Option<&str>) -> FdwResult<Command> {
    let value = required(value, "value")?;
    Ok(match kind {
        TableKind::Scalar => Command::new("SET").arg(key).arg(value),
        TableKind::ZSet => return Err(zset_per_key_unsupported()),
        TableKind::Hash => {
            let elements = collection_elements(value)?;
            if elements.len() % 2 != 0 {
                return Err(FdwError::Config(format!(
                    "hash value {value:?} must hold field/value pairs"
                )));
            }
            with_args(Command::new("HSET").arg(key), elements)
        }
        TableKind::List => with_args(Command::new("RPUSH").arg(key), collection_elements(value)?),
        TableKind::Set => with_args(Command::new("SADD").arg(key), collection_elements(value)?),
    })
}

fn with_args(mut cmd: Command, args: Vec<String>) -> Command {
    for arg in args {
        cmd = cmd.arg(arg);
    }
    cmd
}

/// composite 값 → 원소 목록 (NULL, 빈 컬렉션 거부)
fn collection_elements(value: &str) -> FdwResult<Vec<String>> {
    let elements = parse_composite(value)?
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| FdwError::Config(format!("NULL element in collection value {value:?}")))?;
    if elements.is_empty() {
        return Err(FdwError::Config(
            "an empty collection cannot be stored in Redis".to_string(),
        ));
    }
    Ok(elements)
}

fn check_prefix(layout: &KeyLayout, key: &str) -> FdwResult<()> {
    match layout {
        KeyLayout::Prefix(prefix) if !key.starts_with(prefix.as_str()) => Err(FdwError::Config(
            format!("key {key:?} does not start with tablekeyprefix {prefix:?}"),
        )),
        _ => Ok(()),
    }
}

fn ensure_key_absent(transport: &mut dyn Transport, key: &str) -> FdwResult<()> {
    if execute_integer(transport, &Command::new("EXISTS").arg(key))? > 0 {
        return Err(FdwError::UniqueViolation {
            key: key.to_string(),
            member: key.to_string(),
        });
    }
    Ok(())
}

/// hash 필드 / set 멤버 / zset 멤버 중복 검사
fn ensure_member_absent(
    kind: TableKind,
    transport: &mut dyn Transport,
    key: &str,
    member: &str,
) -> FdwResult<()> {
    let present = match kind {
        TableKind::Hash => {
            execute_integer(transport, &Command::new("HEXISTS").arg(key).arg(member))? == 1
        }
        TableKind::Set => {
            execute_integer(transport, &Command::new("SISMEMBER").arg(key).arg(member))? == 1
        }
        TableKind::ZSet => {
            let cmd = Command::new("ZRANK").arg(key).arg(member);
            match execute_checked(transport, &cmd)? {
                Reply::Integer(_) => true,
                Reply::Nil => false,
                other => return Err(unexpected(&cmd, &other)),
            }
        }
        TableKind::Scalar | TableKind::List => false,
    };
    if present {
        return Err(FdwError::UniqueViolation {
            key: key.to_string(),
            member: member.to_string(),
        });
    }
    Ok(())
}

fn required<'a>(value: Option<&'a str>, what: &str) -> FdwResult<&'a str> {
    value.ok_or_else(|| FdwError::Config(format!("{what} cannot be NULL")))
}

fn score(text: &str) -> FdwResult<&str> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| FdwError::Config(format!("zset score {text:?} is not a number")))?;
    Ok(text.trim())
}

fn unexpected(cmd: &Command, reply: &Reply) -> FdwError {
    FdwError::Protocol(format!(
        "unexpected {} reply to {}",
        reply.type_name(),
        cmd.name()
    ))
}
