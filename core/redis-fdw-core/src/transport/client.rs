//! `redis`-crate backed transport.
//!
//! Connects with a fixed timeout, authenticates when a password is
//! configured and pins the connection to the configured logical database.

use super::Transport;
use crate::config::TableConfig;
use crate::error::{FdwError, FdwResult};
use crate::protocol::{Command, Reply};
use redis::{
    ConnectionAddr, ConnectionInfo, ConnectionLike, RedisConnectionInfo, RedisError, Value,
};
use std::time::Duration;
use tracing::{debug, instrument};

/// Connect timeout applied once at session start. Individual commands have
/// no timeout of their own.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Exclusively-owned connection to one Redis endpoint.
pub struct RedisConnection {
    conn: redis::Connection,
    endpoint: String,
}

impl RedisConnection {
    /// Open, authenticate and `SELECT` the configured database.
    ///
    /// Any failure is a [`FdwError::Connection`]; nothing is retried.
    #[instrument(skip(config), fields(address = %config.address, port = config.port, database = config.database))]
    pub fn connect(config: &TableConfig) -> FdwResult<Self> {
        let endpoint = format!("{}:{}", config.address, config.port);
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.address.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.database,
                password: config.password.clone(),
                ..Default::default()
            },
        };

        let client = redis::Client::open(info).map_err(|e| {
            FdwError::Connection(format!("failed to connect to Redis at {endpoint}: {e}"))
        })?;
        let conn = client
            .get_connection_with_timeout(CONNECT_TIMEOUT)
            .map_err(|e| {
                FdwError::Connection(format!(
                    "failed to connect to Redis at {endpoint} (database {}): {e}",
                    config.database
                ))
            })?;

        debug!(%endpoint, "connected");
        Ok(Self { conn, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for RedisConnection {
    fn execute(&mut self, cmd: &Command) -> FdwResult<Reply> {
        let mut request = redis::cmd(cmd.name());
        for arg in cmd.args() {
            request.arg(arg.as_str());
        }

        match self.conn.req_command(&request) {
            Ok(value) => Ok(from_value(value)),
            Err(err) => classify_error(err, &self.endpoint, cmd.name()),
        }
    }
}

/// Split client errors into server error replies and lost replies.
///
/// Only an error carrying a server error code (`ERR`, `WRONGTYPE`, ...) is a
/// reply. Everything else, a lost connection or a response the client could
/// not parse, is [`FdwError::Protocol`].
fn classify_error(err: RedisError, endpoint: &str, command: &str) -> FdwResult<Reply> {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        return Err(FdwError::Protocol(format!(
            "no reply from {endpoint} to {command}: {err}"
        )));
    }
    match (err.code(), err.detail()) {
        (Some(code), Some(detail)) => Ok(Reply::Error(format!("{code} {detail}"))),
        (Some(_), None) => Ok(Reply::Error(err.to_string())),
        (None, _) => Err(FdwError::Protocol(format!(
            "unusable reply from {endpoint} to {command}: {err}"
        ))),
    }
}

/// Map a client-side value onto the RESP2 reply model.
fn from_value(value: Value) -> Reply {
    match value {
        Value::Nil => Reply::Nil,
        Value::Int(n) => Reply::Integer(n),
        Value::BulkString(bytes) => Reply::Bulk(bytes),
        Value::SimpleString(text) => Reply::Status(text),
        Value::Okay => Reply::Status("OK".to_string()),
        Value::Array(items) | Value::Set(items) => {
            Reply::Array(items.into_iter().map(from_value).collect())
        }
        Value::Map(pairs) => Reply::Array(
            pairs
                .into_iter()
                .flat_map(|(k, v)| [from_value(k), from_value(v)])
                .collect(),
        ),
        Value::Double(d) => Reply::Bulk(d.to_string().into_bytes()),
        Value::Boolean(b) => Reply::Integer(i64::from(b)),
        Value::VerbatimString { text, .. } => Reply::Bulk(text.into_bytes()),
        other => Reply::Error(format!("unsupported reply type: {other:?}")),
    }
}
