//! Table configuration: one immutable record per scan or modify session.
//!
//! A [`TableConfig`] names the endpoint, the Redis type that backs each row
//! ([`TableKind`]) and how rows map onto keys ([`KeyLayout`]). It is built
//! once, either from catalog option lists ([`TableOptions`]) or from JSON,
//! and passed by reference to every component afterwards.

mod options;

pub use options::{OptionContext, TableOptions, VALID_OPTIONS};

use crate::error::{FdwError, FdwResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default server address
pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
/// Default server port
pub const DEFAULT_PORT: u16 = 6379;
/// Keys requested per `SCAN`/`SSCAN` round trip (Redis itself defaults to 10)
pub const DEFAULT_SCAN_COUNT: usize = 1000;

/// Redis value type backing each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Scalar,
    Hash,
    List,
    Set,
    ZSet,
}

impl TableKind {
    /// Parse a `tabletype` token. An absent token means a scalar table.
    pub fn from_token(token: Option<&str>) -> FdwResult<Self> {
        match token {
            None => Ok(TableKind::Scalar),
            Some("hash") => Ok(TableKind::Hash),
            Some("list") => Ok(TableKind::List),
            Some("set") => Ok(TableKind::Set),
            Some("zset") => Ok(TableKind::ZSet),
            Some(other) => Err(FdwError::Config(format!(
                "invalid tabletype ({other}) - must be hash, list, set or zset"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Scalar => "scalar",
            TableKind::Hash => "hash",
            TableKind::List => "list",
            TableKind::Set => "set",
            TableKind::ZSet => "zset",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How rows are organized across the key-space.
///
/// At most one organizational modifier exists per table; the enum makes a
/// second one unrepresentable once the configuration is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyLayout {
    /// Every row lives inside one Redis structure.
    Singleton(String),
    /// One row per key starting with the prefix.
    Prefix(String),
    /// One row per member of the named Redis set.
    KeySet(String),
    /// One row per key in the logical database.
    Unrestricted,
}

impl KeyLayout {
    /// Resolve the three optional modifiers into a layout.
    ///
    /// Fails when more than one modifier is given, never picking one silently.
    pub fn from_modifiers(
        singleton_key: Option<&str>,
        key_prefix: Option<&str>,
        key_set: Option<&str>,
    ) -> FdwResult<Self> {
        match (singleton_key, key_prefix, key_set) {
            (None, None, None) => Ok(KeyLayout::Unrestricted),
            (Some(key), None, None) => Ok(KeyLayout::Singleton(key.to_string())),
            (None, Some(prefix), None) => Ok(KeyLayout::Prefix(prefix.to_string())),
            (None, None, Some(set)) => Ok(KeyLayout::KeySet(set.to_string())),
            (singleton, prefix, set) => {
                let given: Vec<String> = [
                    ("singleton_key", singleton),
                    ("tablekeyprefix", prefix),
                    ("tablekeyset", set),
                ]
                .into_iter()
                .filter_map(|(name, value)| value.map(|v| format!("{name} ({v})")))
                .collect();
                Err(FdwError::Config(format!(
                    "conflicting options: {}",
                    given.join(" and ")
                )))
            }
        }
    }

    pub fn singleton_key(&self) -> Option<&str> {
        match self {
            KeyLayout::Singleton(key) => Some(key),
            _ => None,
        }
    }

    pub fn key_set(&self) -> Option<&str> {
        match self {
            KeyLayout::KeySet(set) => Some(set),
            _ => None,
        }
    }

    pub fn key_prefix(&self) -> Option<&str> {
        match self {
            KeyLayout::Prefix(prefix) => Some(prefix),
            _ => None,
        }
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, KeyLayout::Singleton(_))
    }
}

/// Immutable per-session table configuration.
#[derive(Clone, PartialEq, Serialize)]
pub struct TableConfig {
    pub address: String,
    pub port: u16,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub database: i64,
    pub kind: TableKind,
    pub layout: KeyLayout,
    pub scan_count: usize,
}

impl TableConfig {
    /// Configuration for a local server, database 0.
    pub fn new(kind: TableKind, layout: KeyLayout) -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            password: None,
            database: 0,
            kind,
            layout,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    /// Override the `SCAN` page size. Zero falls back to the default.
    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = if count == 0 { DEFAULT_SCAN_COUNT } else { count };
        self
    }

    /// Load a configuration from a flat JSON object using the option names
    /// (`address`, `port`, `password`, `database`, `tabletype`,
    /// `singleton_key`, `tablekeyprefix`, `tablekeyset`, `scan_count`).
    pub fn from_json(json: &str) -> FdwResult<Self> {
        let raw: RawTableConfig = serde_json::from_str(json)?;
        let kind = TableKind::from_token(raw.tabletype.as_deref())?;
        let layout = KeyLayout::from_modifiers(
            raw.singleton_key.as_deref(),
            raw.tablekeyprefix.as_deref(),
            raw.tablekeyset.as_deref(),
        )?;

        let mut config = TableConfig::new(kind, layout)
            .with_port(raw.port.unwrap_or(DEFAULT_PORT))
            .with_database(raw.database.unwrap_or(0))
            .with_scan_count(raw.scan_count.unwrap_or(DEFAULT_SCAN_COUNT));
        if let Some(address) = raw.address {
            config = config.with_address(address);
        }
        if let Some(password) = raw.password {
            config = config.with_password(password);
        }
        Ok(config)
    }

    /// Whether the server is on this host (cheaper startup in plan costing).
    pub fn is_local(&self) -> bool {
        self.address == "127.0.0.1" || self.address == "localhost"
    }

    /// Number of visible columns a row written to this table must carry.
    ///
    /// Singleton scalar/list/set rows carry the member only; singleton
    /// hash/zset rows carry member plus value or score. Key-per-row tables
    /// always carry (key, value).
    pub fn data_columns(&self) -> usize {
        match (&self.layout, self.kind) {
            (KeyLayout::Singleton(_), TableKind::Scalar | TableKind::List | TableKind::Set) => 1,
            _ => 2,
        }
    }
}

impl fmt::Debug for TableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("kind", &self.kind)
            .field("layout", &self.layout)
            .field("scan_count", &self.scan_count)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTableConfig {
    address: Option<String>,
    port: Option<u16>,
    password: Option<String>,
    database: Option<i64>,
    tabletype: Option<String>,
    singleton_key: Option<String>,
    tablekeyprefix: Option<String>,
    tablekeyset: Option<String>,
    scan_count: Option<usize>,
}
