//! Scan path: pull-based row stream over one Redis table.
//!
//! ```text
//! begin ──► next_row* ──► (rescan | rescan_with ──► next_row*)* ──► end
//! ```
//!
//! A [`ScanSession`] owns its transport for its whole lifetime. Any fatal
//! error releases the transport; later calls report
//! [`FdwError::SessionClosed`].

pub mod cursor;
pub mod rows;

pub use cursor::{START_TOKEN, ScanCursor};
pub use rows::{MultiKeyRows, SingletonRows};

use crate::config::{KeyLayout, TableConfig, TableKind};
use crate::error::{FdwError, FdwResult};
use crate::protocol::Command;
use crate::shape::{Enumeration, PREFIX_ESTIMATE_DIVISOR, enumeration, singleton_fetch};
use crate::sql::find_pushdown;
use crate::transport::{RedisConnection, Transport, execute_checked, execute_integer};
use serde::Serialize;
use sqlparser::ast::Expr;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// One synthesized row: `(key, value)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub key: String,
    /// `None` is SQL NULL (singleton scalar/list/set rows carry no value).
    pub value: Option<String>,
}

impl Row {
    pub fn new(key: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            key: key.into(),
            value: value.map(str::to_string),
        }
    }
}

/// Row cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCursor {
    /// Next element of the current batch to visit.
    Positioned(usize),
    /// Enumeration finished; sticky until a rescan.
    Exhausted,
    /// Pushed-down key failed validation; sticky for the same predicate.
    PredicateRejected,
}

impl RowCursor {
    pub fn is_start(&self) -> bool {
        *self == RowCursor::Positioned(0)
    }
}

/// EXPLAIN output for a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanExplain {
    pub table_size: u64,
    pub pushdown: Option<String>,
}

impl fmt::Display for ScanExplain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Foreign Redis Table Size: {}", self.table_size)?;
        if let Some(key) = &self.pushdown {
            write!(f, "\nRedis Key: {key}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
enum RowSource {
    Singleton(SingletonRows),
    MultiKey(MultiKeyRows),
}

/// One table scan bound to one connection.
pub struct ScanSession<T: Transport> {
    config: TableConfig,
    transport: Option<T>,
    pushdown: Option<String>,
    rows: RowSource,
    emitted: u64,
}

impl ScanSession<RedisConnection> {
    /// Connect using `config` and begin the scan.
    pub fn open(config: &TableConfig, quals: &[Expr]) -> FdwResult<Self> {
        let conn = RedisConnection::connect(config)?;
        Self::begin(config, conn, quals)
    }
}

impl<T: Transport> ScanSession<T> {
    /// Begin a scan over `transport`.
    ///
    /// The first restriction in `quals` that is a pushable `key = '…'`
    /// comparison pins the scan. Singleton tables fetch their whole reply
    /// here; key-per-row tables validate a pushed-down key here and page
    /// lazily otherwise.
    #[instrument(skip_all, fields(kind = %config.kind, layout = ?config.layout))]
    pub fn begin(config: &TableConfig, mut transport: T, quals: &[Expr]) -> FdwResult<Self> {
        let pushdown = effective_pushdown(config, quals);
        let rows = prepare(config, &mut transport, pushdown.as_deref())?;
        info!(pushdown = ?pushdown, "scan started");
        Ok(Self {
            config: config.clone(),
            transport: Some(transport),
            pushdown,
            rows,
            emitted: 0,
        })
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Key pinned by predicate push-down, if any.
    pub fn pushdown(&self) -> Option<&str> {
        self.pushdown.as_deref()
    }

    pub fn cursor(&self) -> RowCursor {
        match &self.rows {
            RowSource::Singleton(rows) => rows.cursor(),
            RowSource::MultiKey(rows) => rows.cursor(),
        }
    }

    /// Whether the session still holds its connection.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Rows returned since `begin`, across rescans.
    pub fn rows_emitted(&self) -> u64 {
        self.emitted
    }

    /// Next row, or `None` once the scan is exhausted.
    pub fn next_row(&mut self) -> FdwResult<Option<Row>> {
        let transport = self.transport.as_mut().ok_or(FdwError::SessionClosed)?;
        let result = match &mut self.rows {
            RowSource::Singleton(rows) => rows.next_row(),
            RowSource::MultiKey(rows) => rows.next_row(transport),
        };
        let row = self.track(result)?;
        if row.is_some() {
            self.emitted += 1;
        }
        Ok(row)
    }

    /// Restart from the first row with the same predicate.
    pub fn rescan(&mut self) -> FdwResult<()> {
        if self.transport.is_none() {
            return Err(FdwError::SessionClosed);
        }
        match &mut self.rows {
            RowSource::Singleton(rows) => rows.restart(),
            RowSource::MultiKey(rows) => rows.restart(),
        }
        debug!(cursor = ?self.cursor(), "rescan");
        Ok(())
    }

    /// Restart with a new set of restrictions.
    ///
    /// Same pushed-down key as before behaves like [`rescan`](Self::rescan);
    /// otherwise the begin-phase fetch and validation are redone.
    pub fn rescan_with(&mut self, quals: &[Expr]) -> FdwResult<()> {
        let pushdown = effective_pushdown(&self.config, quals);
        if pushdown == self.pushdown {
            return self.rescan();
        }
        let transport = self.transport.as_mut().ok_or(FdwError::SessionClosed)?;
        let result = prepare(&self.config, transport, pushdown.as_deref());
        self.rows = self.track(result)?;
        debug!(old = ?self.pushdown, new = ?pushdown, "rescan with new predicate");
        self.pushdown = pushdown;
        Ok(())
    }

    /// Table size for EXPLAIN: `SCARD` of the key-set, otherwise `DBSIZE`
    /// (divided by 20 for prefix tables).
    pub fn explain(&mut self) -> FdwResult<ScanExplain> {
        let transport = self.transport.as_mut().ok_or(FdwError::SessionClosed)?;
        let cmd = match self.config.layout.key_set() {
            Some(set) => Command::new("SCARD").arg(set),
            None => Command::new("DBSIZE"),
        };
        let result = execute_integer(transport, &cmd);
        let size = self.track(result)?.max(0) as u64;
        let table_size = match self.config.layout {
            KeyLayout::Prefix(_) => size / PREFIX_ESTIMATE_DIVISOR,
            _ => size,
        };
        Ok(ScanExplain {
            table_size,
            pushdown: self.pushdown.clone(),
        })
    }

    /// Release the connection.
    pub fn end(mut self) {
        if self.transport.take().is_some() {
            debug!(rows = self.emitted, "scan ended");
        }
    }

    fn track<R>(&mut self, result: FdwResult<R>) -> FdwResult<R> {
        if let Err(err) = &result {
            if err.is_fatal() && self.transport.take().is_some() {
                warn!(error = %err, "scan aborted, connection released");
            }
        }
        result
    }
}

/// Pushed-down key that actually narrows the fetch. Singleton tables other
/// than hash always fetch the whole structure, so they report none.
fn effective_pushdown(config: &TableConfig, quals: &[Expr]) -> Option<String> {
    let pushdown = find_pushdown(quals)?;
    match &config.layout {
        KeyLayout::Singleton(_) if config.kind != TableKind::Hash => None,
        _ => Some(pushdown),
    }
}

fn prepare<T: Transport + ?Sized>(
    config: &TableConfig,
    transport: &mut T,
    pushdown: Option<&str>,
) -> FdwResult<RowSource> {
    match enumeration(&config.layout) {
        Enumeration::Singleton { key } => {
            let field = pushdown;
            let cmd = singleton_fetch(config.kind, &key, field);
            let reply = execute_checked(transport, &cmd)?;
            Ok(RowSource::Singleton(SingletonRows::new(
                config.kind,
                reply,
                field.map(str::to_string),
            )))
        }
        Enumeration::Cursor(source) => Ok(RowSource::MultiKey(match pushdown {
            Some(key) => {
                let accepted = validate_pushdown(config, transport, key)?;
                MultiKeyRows::pinned(config.kind, key.to_string(), accepted)
            }
            None => MultiKeyRows::paged(config.kind, ScanCursor::new(source, config.scan_count)),
        })),
    }
}

/// Key-set membership or prefix match, then `EXISTS`.
fn validate_pushdown<T: Transport + ?Sized>(
    config: &TableConfig,
    transport: &mut T,
    key: &str,
) -> FdwResult<bool> {
    let member = match &config.layout {
        KeyLayout::KeySet(set) => {
            let cmd = Command::new("SISMEMBER").arg(set.as_str()).arg(key);
            execute_integer(transport, &cmd)? == 1
        }
        KeyLayout::Prefix(prefix) => key.starts_with(prefix.as_str()),
        KeyLayout::Singleton(_) | KeyLayout::Unrestricted => true,
    };
    if !member {
        debug!(key, "pushed-down key outside table");
        return Ok(false);
    }
    let exists = execute_integer(transport, &Command::new("EXISTS").arg(key))? > 0;
    if !exists {
        debug!(key, "pushed-down key does not exist");
    }
    Ok(exists)
}
