//! Write-Path Coordinator
//!
//! `ModifyPlan` is built at planning time and checks the column count
//! before any connection exists. `ModifySession` then runs the
//! check-then-act sequences for insert, update and delete over one
//! connection.
//!
//! The checks and the mutations are separate round trips, so a concurrent
//! client can slip in between them; nothing here is atomic.

mod write;

use crate::config::{KeyLayout, TableConfig, TableKind};
use crate::error::{FdwError, FdwResult};
use crate::sql::KEY_COLUMN;
use crate::transport::{RedisConnection, Transport};
use smallvec::SmallVec;
use std::fmt;
use tracing::{debug, instrument, warn};

/// Hidden column carrying the pre-mutation key for update and delete.
pub const JUNK_KEY_COLUMN: &str = "__redis_key";

/// Statement kind a plan was prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ModifyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModifyOperation::Insert => "insert",
            ModifyOperation::Update => "update",
            ModifyOperation::Delete => "delete",
        })
    }
}

/// Hidden column the planner must add to update/delete plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateTarget {
    /// Name the value is looked up by in [`ModifyRow::junk`].
    pub junk_name: &'static str,
    /// Visible column whose pre-mutation value fills it.
    pub source_column: &'static str,
}

/// Planning-time description of a write.
#[derive(Debug, Clone)]
pub struct ModifyPlan {
    config: TableConfig,
    operation: ModifyOperation,
}

impl ModifyPlan {
    /// Validate a write of `columns` visible columns against `config`.
    ///
    /// Inserts and updates must supply exactly the columns the table kind
    /// stores; key-per-row zset inserts have no value format and are
    /// rejected here.
    pub fn new(config: &TableConfig, operation: ModifyOperation, columns: usize) -> FdwResult<Self> {
        let expected = config.data_columns();
        if operation != ModifyOperation::Delete && columns != expected {
            return Err(FdwError::Config(format!(
                "{} table {} needs {expected} column(s), got {columns}",
                config.kind,
                layout_name(&config.layout),
            )));
        }
        if operation == ModifyOperation::Insert
            && config.kind == TableKind::ZSet
            && !config.layout.is_singleton()
        {
            return Err(zset_per_key_unsupported());
        }
        Ok(Self {
            config: config.clone(),
            operation,
        })
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn operation(&self) -> ModifyOperation {
        self.operation
    }

    /// Hidden columns to add to the plan (none for inserts).
    pub fn update_targets(&self) -> Vec<UpdateTarget> {
        match self.operation {
            ModifyOperation::Insert => Vec::new(),
            ModifyOperation::Update | ModifyOperation::Delete => vec![UpdateTarget {
                junk_name: JUNK_KEY_COLUMN,
                source_column: KEY_COLUMN,
            }],
        }
    }
}

/// A row handed to the write path: visible columns plus named junk columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyRow {
    columns: SmallVec<[Option<String>; 2]>,
    junk: SmallVec<[(String, Option<String>); 1]>,
}

impl ModifyRow {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(|c| c.map(Into::into)).collect(),
            junk: SmallVec::new(),
        }
    }

    /// Attach a junk column value.
    pub fn with_junk(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.junk.push((name.into(), value.map(str::to_string)));
        self
    }

    /// Shorthand for attaching the pre-mutation key.
    pub fn with_old_key(self, key: &str) -> Self {
        self.with_junk(JUNK_KEY_COLUMN, Some(key))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&str> {
        self.columns.get(index).and_then(|c| c.as_deref())
    }

    pub fn junk(&self, name: &str) -> Option<&str> {
        self.junk
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Non-NULL first column: the key or member the row addresses.
    pub(crate) fn member(&self) -> FdwResult<&str> {
        self.column(0)
            .ok_or_else(|| FdwError::Config(format!("column {KEY_COLUMN} cannot be NULL")))
    }

    /// Pre-mutation key from the junk column.
    pub(crate) fn old_key(&self) -> FdwResult<&str> {
        self.junk(JUNK_KEY_COLUMN)
            .ok_or_else(|| FdwError::Config(format!("missing junk column {JUNK_KEY_COLUMN}")))
    }
}

/// Write session bound to one connection.
pub struct ModifySession<T: Transport> {
    plan: ModifyPlan,
    transport: Option<T>,
    affected: u64,
}

impl ModifySession<RedisConnection> {
    pub fn open(plan: ModifyPlan) -> FdwResult<Self> {
        let conn = RedisConnection::connect(&plan.config)?;
        Ok(Self::begin(plan, conn))
    }
}

impl<T: Transport> ModifySession<T> {
    pub fn begin(plan: ModifyPlan, transport: T) -> Self {
        debug!(operation = %plan.operation, kind = %plan.config.kind, "modify started");
        Self {
            plan,
            transport: Some(transport),
            affected: 0,
        }
    }

    pub fn plan(&self) -> &ModifyPlan {
        &self.plan
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Rows inserted, updated or deleted so far.
    pub fn affected(&self) -> u64 {
        self.affected
    }

    #[instrument(skip_all, fields(kind = %self.plan.config.kind))]
    pub fn insert(&mut self, row: &ModifyRow) -> FdwResult<()> {
        self.run(ModifyOperation::Insert, row, write::insert)
    }

    #[instrument(skip_all, fields(kind = %self.plan.config.kind))]
    pub fn update(&mut self, row: &ModifyRow) -> FdwResult<()> {
        self.run(ModifyOperation::Update, row, write::update)
    }

    #[instrument(skip_all, fields(kind = %self.plan.config.kind))]
    pub fn delete(&mut self, row: &ModifyRow) -> FdwResult<()> {
        self.run(ModifyOperation::Delete, row, write::delete)
    }

    /// Release the connection and report the affected row count.
    pub fn end(mut self) -> u64 {
        if self.transport.take().is_some() {
            debug!(affected = self.affected, "modify ended");
        }
        self.affected
    }

    fn run(
        &mut self,
        operation: ModifyOperation,
        row: &ModifyRow,
        apply: fn(&TableConfig, &mut dyn Transport, &ModifyRow) -> FdwResult<()>,
    ) -> FdwResult<()> {
        if operation != self.plan.operation {
            return Err(FdwError::Config(format!(
                "plan was prepared for {}, not {operation}",
                self.plan.operation
            )));
        }
        if operation != ModifyOperation::Delete && row.len() != self.plan.config.data_columns() {
            return Err(FdwError::Config(format!(
                "expected {} column(s), got {}",
                self.plan.config.data_columns(),
                row.len()
            )));
        }
        let transport = self.transport.as_mut().ok_or(FdwError::SessionClosed)?;
        match apply(&self.plan.config, transport, row) {
            Ok(()) => {
                self.affected += 1;
                Ok(())
            }
            Err(err) => {
                if err.is_fatal() && self.transport.take().is_some() {
                    warn!(error = %err, %operation, "write aborted, connection released");
                }
                Err(err)
            }
        }
    }
}

fn layout_name(layout: &KeyLayout) -> &'static str {
    match layout {
        KeyLayout::Singleton(_) => "with singleton_key",
        KeyLayout::Prefix(_) => "with tablekeyprefix",
        KeyLayout::KeySet(_) => "with tablekeyset",
        KeyLayout::Unrestricted => "without key modifiers",
    }
}

fn zset_per_key_unsupported() -> FdwError {
    FdwError::Unsupported {
        feature: "writing zset values to a key-per-row table".to_string(),
        hint: "declare the zset with singleton_key to write members and scores".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryRedis;

    fn singleton(kind: TableKind) -> TableConfig {
        TableConfig::new(kind, KeyLayout::Singleton("s".into()))
    }

    #[test]
    fn test_plan_column_counts() {
        assert!(ModifyPlan::new(&singleton(TableKind::Set), ModifyOperation::Insert, 1).is_ok());
        assert!(ModifyPlan::new(&singleton(TableKind::Hash), ModifyOperation::Insert, 2).is_ok());

        let err = ModifyPlan::new(&singleton(TableKind::Hash), ModifyOperation::Insert, 1).unwrap_err();
        assert!(matches!(err, FdwError::Config(_)));

        let per_key = TableConfig::new(TableKind::Scalar, KeyLayout::Unrestricted);
        assert!(ModifyPlan::new(&per_key, ModifyOperation::Update, 1).is_err());
        // delete only needs the junk column
        assert!(ModifyPlan::new(&per_key, ModifyOperation::Delete, 0).is_ok());
    }

    #[test]
    fn test_plan_rejects_per_key_zset_insert() {
        let config = TableConfig::new(TableKind::ZSet, KeyLayout::Prefix("z:".into()));
        let err = ModifyPlan::new(&config, ModifyOperation::Insert, 2).unwrap_err();
        assert!(matches!(err, FdwError::Unsupported { .. }));
    }

    #[test]
    fn test_update_targets() {
        let config = singleton(TableKind::Set);
        let insert = ModifyPlan::new(&config, ModifyOperation::Insert, 1).unwrap();
        assert!(insert.update_targets().is_empty());

        let delete = ModifyPlan::new(&config, ModifyOperation::Delete, 1).unwrap();
        assert_eq!(
            delete.update_targets(),
            vec![UpdateTarget {
                junk_name: "__redis_key",
                source_column: "key",
            }]
        );
    }

    #[test]
    fn test_modify_row_accessors() {
        let row = ModifyRow::new([Some("f"), None]).with_old_key("old");
        assert_eq!(row.len(), 2);
        assert_eq!(row.column(0), Some("f"));
        assert_eq!(row.column(1), None);
        assert_eq!(row.junk(JUNK_KEY_COLUMN), Some("old"));
        assert_eq!(row.junk("other"), None);
        assert!(matches!(
            ModifyRow::new([None::<&str>]).member().unwrap_err(),
            FdwError::Config(_)
        ));
    }

    #[test]
    fn test_operation_mismatch() {
        let mut store = InMemoryRedis::new();
        let plan = ModifyPlan::new(&singleton(TableKind::Set), ModifyOperation::Delete, 1).unwrap();
        let mut session = ModifySession::begin(plan, &mut store);
        let err = session.insert(&ModifyRow::new([Some("m")])).unwrap_err();
        assert!(matches!(err, FdwError::Config(_)));
        assert!(session.is_open());
        session.end();
        assert!(store.commands().is_empty());
    }

    #[test]
    fn test_unique_violation_keeps_session_open() {
        let mut store = InMemoryRedis::new();
        store.seed_set("s", &["red"]);
        let plan = ModifyPlan::new(&singleton(TableKind::Set), ModifyOperation::Insert, 1).unwrap();
        let mut session = ModifySession::begin(plan, &mut store);

        let err = session.insert(&ModifyRow::new([Some("red")])).unwrap_err();
        assert!(matches!(err, FdwError::UniqueViolation { .. }));
        assert!(session.is_open());

        session.insert(&ModifyRow::new([Some("blue")])).unwrap();
        assert_eq!(session.end(), 1);
        assert_eq!(store.set_members("s"), vec!["blue", "red"]);
    }

    #[test]
    fn test_store_error_closes_session() {
        let mut store = InMemoryRedis::new();
        store.fail_with("SADD", "OOM command not allowed");
        let plan = ModifyPlan::new(&singleton(TableKind::Set), ModifyOperation::Insert, 1).unwrap();
        let mut session = ModifySession::begin(plan, &mut store);

        let err = session.insert(&ModifyRow::new([Some("x")])).unwrap_err();
        assert!(matches!(err, FdwError::Store { .. }));
        assert!(!session.is_open());
        assert!(matches!(
            session.insert(&ModifyRow::new([Some("y")])).unwrap_err(),
            FdwError::SessionClosed
        ));
    }
}
