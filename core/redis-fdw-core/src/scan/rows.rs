//! Row Iterator: multi-key and singleton variants.
//!
//! Both walk a [`RowCursor`] forward and never revisit a member; once the
//! cursor leaves `Positioned` every further call yields `None` until
//! [`restart`](MultiKeyRows::restart) is invoked.

use super::cursor::ScanCursor;
use super::{Row, RowCursor};
use crate::config::TableKind;
use crate::error::{FdwError, FdwResult};
use crate::protocol::{Reply, decode_value, reply_text};
use crate::shape::member_fetch;
use crate::transport::Transport;
use tracing::{debug, trace};

/// Key-per-row iterator: one fetch command per enumerated key.
#[derive(Debug)]
pub struct MultiKeyRows {
    kind: TableKind,
    batch: Vec<String>,
    /// `None` when a pushed-down key pins the scan to `batch`.
    pages: Option<ScanCursor>,
    cursor: RowCursor,
}

impl MultiKeyRows {
    /// Paginated walk over the key-space, a prefix or a key-set.
    pub fn paged(kind: TableKind, pages: ScanCursor) -> Self {
        Self {
            kind,
            batch: Vec::new(),
            pages: Some(pages),
            cursor: RowCursor::Positioned(0),
        }
    }

    /// Scan pinned to a single pushed-down key.
    ///
    /// `accepted == false` means the key failed validation: the iterator is
    /// created in the rejected state and yields nothing.
    pub fn pinned(kind: TableKind, key: String, accepted: bool) -> Self {
        Self {
            kind,
            batch: vec![key],
            pages: None,
            cursor: if accepted {
                RowCursor::Positioned(0)
            } else {
                RowCursor::PredicateRejected
            },
        }
    }

    pub fn cursor(&self) -> RowCursor {
        self.cursor
    }

    /// Page requests issued so far (0 for a pinned scan).
    pub fn pages_fetched(&self) -> u64 {
        self.pages.as_ref().map_or(0, ScanCursor::pages_fetched)
    }

    pub fn next_row<T: Transport + ?Sized>(&mut self, transport: &mut T) -> FdwResult<Option<Row>> {
        loop {
            let RowCursor::Positioned(pos) = self.cursor else {
                return Ok(None);
            };

            if pos >= self.batch.len() {
                let next = match self.pages.as_mut() {
                    Some(pages) => pages.next_page(transport)?,
                    None => None,
                };
                match next {
                    Some(keys) => {
                        self.batch = keys;
                        self.cursor = RowCursor::Positioned(0);
                        continue;
                    }
                    None => {
                        self.cursor = RowCursor::Exhausted;
                        return Ok(None);
                    }
                }
            }

            self.cursor = RowCursor::Positioned(pos + 1);
            let key = &self.batch[pos];
            let cmd = member_fetch(self.kind, key);
            trace!(command = %cmd, "fetch row");
            let reply = transport.execute(&cmd)?;
            match decode_value(&reply)? {
                Some(value) => {
                    return Ok(Some(Row {
                        key: key.clone(),
                        value: Some(value),
                    }));
                }
                None => debug!(key = %key, reply = reply.type_name(), "skipping key without value"),
            }
        }
    }

    /// Back to the first row. A rejected predicate stays rejected.
    pub fn restart(&mut self) {
        if self.cursor == RowCursor::PredicateRejected {
            return;
        }
        if let Some(pages) = self.pages.as_mut() {
            pages.reset();
            self.batch.clear();
        }
        self.cursor = RowCursor::Positioned(0);
    }
}

/// Singleton iterator: walks the one reply fetched when the scan began.
#[derive(Debug)]
pub struct SingletonRows {
    kind: TableKind,
    reply: Reply,
    /// Field named by a pushed-down `HGET`.
    field: Option<String>,
    cursor: RowCursor,
}

impl SingletonRows {
    pub fn new(kind: TableKind, reply: Reply, field: Option<String>) -> Self {
        Self {
            kind,
            reply,
            field,
            cursor: RowCursor::Positioned(0),
        }
    }

    pub fn cursor(&self) -> RowCursor {
        self.cursor
    }

    pub fn next_row(&mut self) -> FdwResult<Option<Row>> {
        let RowCursor::Positioned(pos) = self.cursor else {
            return Ok(None);
        };

        // scalar and HGET: one row at most
        if self.kind == TableKind::Scalar || self.field.is_some() {
            self.cursor = RowCursor::Exhausted;
            if let Reply::Array(_) = self.reply {
                return Err(single_value_array(self.field.as_deref()));
            }
            let Some(text) = decode_value(&self.reply)? else {
                return Ok(None);
            };
            let row = match &self.field {
                Some(field) => Row {
                    key: field.clone(),
                    value: Some(text),
                },
                None => Row {
                    key: text,
                    value: None,
                },
            };
            return Ok(Some(row));
        }

        let items: &[Reply] = match &self.reply {
            Reply::Array(items) => items.as_slice(),
            Reply::Nil => &[],
            other => {
                self.cursor = RowCursor::Exhausted;
                return Err(FdwError::Protocol(format!(
                    "expected array reply for {} table, got {}",
                    self.kind,
                    other.type_name()
                )));
            }
        };

        if pos >= items.len() {
            self.cursor = RowCursor::Exhausted;
            return Ok(None);
        }

        let key = element_text(&items[pos])?;
        if !matches!(self.kind, TableKind::Hash | TableKind::ZSet) {
            self.cursor = RowCursor::Positioned(pos + 1);
            return Ok(Some(Row { key, value: None }));
        }

        // field/value or member/score pairs
        let Some(second) = items.get(pos + 1) else {
            self.cursor = RowCursor::Exhausted;
            return Err(FdwError::Protocol(format!(
                "odd element count in {} reply",
                self.kind
            )));
        };
        if let Reply::Array(_) = second {
            self.cursor = RowCursor::Exhausted;
            return Err(FdwError::Unsupported {
                feature: "array as a hash value or zset score".to_string(),
                hint: "singleton collections must hold flat values".to_string(),
            });
        }
        self.cursor = RowCursor::Positioned(pos + 2);
        Ok(Some(Row {
            key,
            value: decode_value(second)?,
        }))
    }

    /// The fetched reply is reused, so this never touches the store.
    pub fn restart(&mut self) {
        if self.cursor != RowCursor::PredicateRejected {
            self.cursor = RowCursor::Positioned(0);
        }
    }
}

fn element_text(reply: &Reply) -> FdwResult<String> {
    if let Reply::Array(_) = reply {
        return Err(FdwError::Unsupported {
            feature: "nested array returns".to_string(),
            hint: "only flat collection replies can be mapped to rows".to_string(),
        });
    }
    reply_text(reply)
}

fn single_value_array(field: Option<&str>) -> FdwError {
    let feature = match field {
        Some(field) => format!("array reply for single hash property '{field}'"),
        None => "array reply for a singleton scalar table".to_string(),
    };
    FdwError::Unsupported {
        feature,
        hint: "check that the table type matches the Redis value".to_string(),
    }
}
