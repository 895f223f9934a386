//! Scan Cursor Engine
//!
//! `SCAN`/`SSCAN` continuation protocol: the first request uses token `"0"`,
//! each reply carries the next token and a page of keys, and a returned token
//! of exactly `"0"` ends the enumeration. Pages may legitimately be empty while
//! the token is still live, so the engine keeps asking until it has keys or
//! the store reports completion.

use crate::error::{FdwError, FdwResult};
use crate::protocol::{Command, Reply, reply_text};
use crate::shape::ScanSource;
use crate::transport::{Transport, execute_checked};
use tracing::trace;

/// Token that both starts and ends a cursor walk.
pub const START_TOKEN: &str = "0";

/// Cursor state for one paginated enumeration.
#[derive(Debug, Clone)]
pub struct ScanCursor {
    source: ScanSource,
    count: usize,
    /// `None` once the store has returned the terminal token.
    token: Option<String>,
    pages: u64,
}

impl ScanCursor {
    pub fn new(source: ScanSource, count: usize) -> Self {
        Self {
            source,
            count,
            token: Some(START_TOKEN.to_string()),
            pages: 0,
        }
    }

    pub fn source(&self) -> &ScanSource {
        &self.source
    }

    /// Whether the terminal token has been seen.
    pub fn is_complete(&self) -> bool {
        self.token.is_none()
    }

    /// Number of page requests issued since the last reset.
    pub fn pages_fetched(&self) -> u64 {
        self.pages
    }

    /// Start over from token `"0"`.
    pub fn reset(&mut self) {
        self.token = Some(START_TOKEN.to_string());
        self.pages = 0;
    }

    /// Fetch the next non-empty page, or `None` when the enumeration is done.
    pub fn next_page<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> FdwResult<Option<Vec<String>>> {
        while let Some(token) = self.token.as_deref() {
            let cmd = self.source.page_command(token, self.count);
            let reply = execute_checked(transport, &cmd)?;
            let (next, keys) = parse_page(reply, &cmd)?;
            self.pages += 1;
            trace!(
                command = %cmd,
                next = %next,
                keys = keys.len(),
                "scan page"
            );
            self.token = (next != START_TOKEN).then_some(next);
            if !keys.is_empty() {
                return Ok(Some(keys));
            }
        }
        Ok(None)
    }
}

/// Split a cursor reply into (next token, keys).
fn parse_page(reply: Reply, cmd: &Command) -> FdwResult<(String, Vec<String>)> {
    let malformed = |detail: &str| {
        FdwError::Protocol(format!("malformed cursor reply to {}: {detail}", cmd.name()))
    };

    let mut items = match reply {
        Reply::Array(items) => items,
        other => {
            return Err(malformed(&format!("expected array, got {}", other.type_name())));
        }
    };
    if items.len() != 2 {
        return Err(malformed(&format!(
            "expected 2 elements, got {}",
            items.len()
        )));
    }
    let page = items.pop().unwrap_or(Reply::Nil);
    let token = items.pop().unwrap_or(Reply::Nil);

    let token = match &token {
        Reply::Bulk(_) | Reply::Status(_) => reply_text(&token)?,
        other => {
            return Err(malformed(&format!(
                "cursor token is {}, not a string",
                other.type_name()
            )));
        }
    };
    let keys = match page {
        Reply::Array(keys) => keys.iter().map(reply_text).collect::<FdwResult<Vec<_>>>()?,
        other => {
            return Err(malformed(&format!(
                "page is {}, not an array",
                other.type_name()
            )));
        }
    };
    Ok((token, keys))
}
