//! Catalog option lists → [`TableConfig`].
//!
//! Options arrive as name/value pairs attached to one of three catalog
//! objects. Each name is only valid on one of them; repeats and
//! conflicting organizational modifiers are rejected here, before any
//! connection is attempted.

use super::{DEFAULT_ADDRESS, DEFAULT_PORT, DEFAULT_SCAN_COUNT, KeyLayout, TableConfig, TableKind};
use crate::error::{FdwError, FdwResult};
use std::collections::BTreeMap;

/// Catalog object an option was attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionContext {
    Server,
    UserMapping,
    Table,
}

/// Valid option names and the context each may appear in.
pub const VALID_OPTIONS: &[(&str, OptionContext)] = &[
    // Connection options
    ("address", OptionContext::Server),
    ("port", OptionContext::Server),
    ("password", OptionContext::UserMapping),
    ("database", OptionContext::Table),
    // Table options
    ("singleton_key", OptionContext::Table),
    ("tablekeyprefix", OptionContext::Table),
    ("tablekeyset", OptionContext::Table),
    ("tabletype", OptionContext::Table),
    ("scan_count", OptionContext::Table),
];

const MODIFIERS: [&str; 3] = ["singleton_key", "tablekeyprefix", "tablekeyset"];

/// Accumulated options for one foreign table.
#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    values: BTreeMap<&'static str, String>,
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect a whole option list attached to one catalog object.
    pub fn from_pairs<'a, I>(context: OptionContext, pairs: I) -> FdwResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut options = Self::new();
        options.extend(context, pairs)?;
        Ok(options)
    }

    /// Add further pairs, e.g. the server's list after the table's.
    pub fn extend<'a, I>(&mut self, context: OptionContext, pairs: I) -> FdwResult<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (name, value) in pairs {
            self.set(context, name, value)?;
        }
        Ok(())
    }

    /// Validate and record a single option.
    pub fn set(&mut self, context: OptionContext, name: &str, value: &str) -> FdwResult<()> {
        let canonical = VALID_OPTIONS
            .iter()
            .find(|(opt, ctx)| *ctx == context && *opt == name)
            .map(|(opt, _)| *opt)
            .ok_or_else(|| invalid_option(context, name))?;

        if self.values.contains_key(canonical) {
            return Err(FdwError::Config(format!(
                "conflicting or redundant options: {canonical} ({value})"
            )));
        }

        if let Some((other, existing)) = MODIFIERS
            .iter()
            .filter(|m| **m != canonical && MODIFIERS.contains(&canonical))
            .find_map(|m| self.values.get(m).map(|v| (*m, v)))
        {
            return Err(FdwError::Config(format!(
                "conflicting options: {other} ({existing}) and {canonical} ({value})"
            )));
        }

        if canonical == "tabletype" {
            TableKind::from_token(Some(value))?;
        }

        self.values.insert(canonical, value.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Build the session configuration, applying defaults.
    pub fn build(&self) -> FdwResult<TableConfig> {
        let kind = TableKind::from_token(self.get("tabletype"))?;
        let layout = KeyLayout::from_modifiers(
            self.get("singleton_key"),
            self.get("tablekeyprefix"),
            self.get("tablekeyset"),
        )?;

        let mut config = TableConfig::new(kind, layout)
            .with_address(self.get("address").unwrap_or(DEFAULT_ADDRESS))
            .with_port(self.parse_number("port")?.unwrap_or(DEFAULT_PORT))
            .with_database(self.parse_number("database")?.unwrap_or(0))
            .with_scan_count(self.parse_number("scan_count")?.unwrap_or(DEFAULT_SCAN_COUNT));
        if let Some(password) = self.get("password") {
            config = config.with_password(password);
        }
        Ok(config)
    }

    fn parse_number<T: std::str::FromStr>(&self, name: &str) -> FdwResult<Option<T>> {
        self.get(name)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|_| {
                    FdwError::Config(format!("invalid value for option {name}: {raw}"))
                })
            })
            .transpose()
    }
}

fn invalid_option(context: OptionContext, name: &str) -> FdwError {
    let valid: Vec<&str> = VALID_OPTIONS
        .iter()
        .filter(|(_, ctx)| *ctx == context)
        .map(|(opt, _)| *opt)
        .collect();
    let hint = if valid.is_empty() {
        "<none>".to_string()
    } else {
        valid.join(", ")
    };
    FdwError::Config(format!(
        "invalid option \"{name}\"\nHint: Valid options in this context are: {hint}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TableOptions::new().build().unwrap();
        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 6379);
        assert_eq!(config.database, 0);
        assert_eq!(config.kind, TableKind::Scalar);
        assert_eq!(config.layout, KeyLayout::Unrestricted);
        assert!(config.password.is_none());
        assert!(config.is_local());
    }

    #[test]
    fn test_full_option_set() {
        let mut options =
            TableOptions::from_pairs(OptionContext::Server, [("address", "redis.internal"), ("port", "7000")])
                .unwrap();
        options
            .extend(OptionContext::UserMapping, [("password", "s3cret")])
            .unwrap();
        options
            .extend(
                OptionContext::Table,
                [("database", "3"), ("tabletype", "set"), ("tablekeyset", "members")],
            )
            .unwrap();

        let config = options.build().unwrap();
        assert_eq!(config.address, "redis.internal");
        assert_eq!(config.port, 7000);
        assert_eq!(config.password.as_deref(), Some("s3cret"));
        assert_eq!(config.database, 3);
        assert_eq!(config.kind, TableKind::Set);
        assert_eq!(config.layout, KeyLayout::KeySet("members".to_string()));
    }

    #[test]
    fn test_option_in_wrong_context() {
        let err = TableOptions::from_pairs(OptionContext::Table, [("address", "x")]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid option \"address\""));
        assert!(msg.contains("tabletype"));
    }

    #[test]
    fn test_redundant_option() {
        let err = TableOptions::from_pairs(OptionContext::Server, [("port", "1"), ("port", "2")])
            .unwrap_err();
        assert!(err.to_string().contains("conflicting or redundant options: port"));
    }

    #[test]
    fn test_conflicting_modifiers() {
        let err = TableOptions::from_pairs(
            OptionContext::Table,
            [("tablekeyprefix", "user:"), ("singleton_key", "one")],
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("conflicting options"));
        assert!(msg.contains("tablekeyprefix (user:)"));
        assert!(msg.contains("singleton_key (one)"));
    }

    #[test]
    fn test_invalid_tabletype() {
        let err =
            TableOptions::from_pairs(OptionContext::Table, [("tabletype", "stream")]).unwrap_err();
        assert!(err.to_string().contains("must be hash, list, set or zset"));
    }

    #[test]
    fn test_invalid_port() {
        let options = TableOptions::from_pairs(OptionContext::Server, [("port", "sixty")]).unwrap();
        let err = options.build().unwrap_err();
        assert!(err.to_string().contains("invalid value for option port"));
    }

    #[test]
    fn test_scan_count_override() {
        let options =
            TableOptions::from_pairs(OptionContext::Table, [("scan_count", "50")]).unwrap();
        assert_eq!(options.build().unwrap().scan_count, 50);
    }
}
