//! Transport module: one blocking request/response per call.
//!
//! Every session owns exactly one [`Transport`]. The scan and write paths
//! depend only on this trait, never on a concrete client.
//!
//! # Contract
//!
//! - `execute`: sends one command and waits for its reply.
//! - An `Err` means the round trip itself failed (no reply at all); the
//!   session must release the connection and propagate.
//! - Error replies from the store come back as `Ok(Reply::Error(..))` so the
//!   caller decides whether they are skippable or fatal.

pub mod client;
pub mod memory;

pub use self::client::RedisConnection;
pub use self::memory::InMemoryRedis;

use crate::error::{FdwError, FdwResult};
use crate::protocol::{Command, Reply};

/// Blocking request/response channel to one Redis endpoint.
pub trait Transport {
    /// Send `cmd` and return its reply.
    fn execute(&mut self, cmd: &Command) -> FdwResult<Reply>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn execute(&mut self, cmd: &Command) -> FdwResult<Reply> {
        (**self).execute(cmd)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&mut self, cmd: &Command) -> FdwResult<Reply> {
        (**self).execute(cmd)
    }
}

/// Execute `cmd`, turning an error-typed reply into [`FdwError::Store`].
pub(crate) fn execute_checked<T: Transport + ?Sized>(
    transport: &mut T,
    cmd: &Command,
) -> FdwResult<Reply> {
    tracing::trace!(command = %cmd, "redis request");
    match transport.execute(cmd)? {
        Reply::Error(message) => Err(FdwError::store(message, cmd.to_string())),
        reply => Ok(reply),
    }
}

/// Execute `cmd` and require an integer reply.
pub(crate) fn execute_integer<T: Transport + ?Sized>(
    transport: &mut T,
    cmd: &Command,
) -> FdwResult<i64> {
    let reply = execute_checked(transport, cmd)?;
    reply.as_integer().ok_or_else(|| {
        FdwError::Protocol(format!(
            "expected integer reply to {}, got {}",
            cmd.name(),
            reply.type_name()
        ))
    })
}
