//! In-memory Redis key-space using BTreeMap
//!
//! Implements the subset of commands the scan and write paths issue, with
//! Redis' reply shapes: `WRONGTYPE` errors, empty collections removing their
//! key, and index-based `SCAN`/`SSCAN` cursors whose pages can legitimately
//! come back empty after `MATCH` filtering. Every executed command is
//! recorded so callers can assert on the exact round trips.

use super::Transport;
use crate::error::{FdwError, FdwResult};
use crate::protocol::{Command, Reply};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const DEFAULT_SCAN_PAGE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Str(String),
    Hash(BTreeMap<String, String>),
    List(Vec<String>),
    Set(BTreeSet<String>),
    ZSet(Vec<(String, f64)>),
}

impl Entry {
    fn is_empty(&self) -> bool {
        match self {
            Entry::Str(_) => false,
            Entry::Hash(h) => h.is_empty(),
            Entry::List(l) => l.is_empty(),
            Entry::Set(s) => s.is_empty(),
            Entry::ZSet(z) => z.is_empty(),
        }
    }
}

/// In-memory stand-in for one Redis logical database.
#[derive(Debug, Default)]
pub struct InMemoryRedis {
    keys: BTreeMap<String, Entry>,
    log: Vec<Command>,
    error_replies: HashMap<&'static str, String>,
    dropped: BTreeSet<&'static str>,
}

impl InMemoryRedis {
    /// Create an empty key-space
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Seeding (not recorded in the command log) =====

    pub fn seed_string(&mut self, key: &str, value: &str) -> &mut Self {
        self.keys.insert(key.to_string(), Entry::Str(value.to_string()));
        self
    }

    pub fn seed_hash(&mut self, key: &str, pairs: &[(&str, &str)]) -> &mut Self {
        let hash = pairs
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();
        self.keys.insert(key.to_string(), Entry::Hash(hash));
        self
    }

    pub fn seed_list(&mut self, key: &str, items: &[&str]) -> &mut Self {
        let list = items.iter().map(|s| s.to_string()).collect();
        self.keys.insert(key.to_string(), Entry::List(list));
        self
    }

    pub fn seed_set(&mut self, key: &str, members: &[&str]) -> &mut Self {
        let set = members.iter().map(|s| s.to_string()).collect();
        self.keys.insert(key.to_string(), Entry::Set(set));
        self
    }

    pub fn seed_zset(&mut self, key: &str, members: &[(&str, f64)]) -> &mut Self {
        let mut zset: Vec<(String, f64)> =
            members.iter().map(|(m, s)| (m.to_string(), *s)).collect();
        sort_zset(&mut zset);
        self.keys.insert(key.to_string(), Entry::ZSet(zset));
        self
    }

    // ===== Fault injection =====

    /// Answer every `name` command with an error reply carrying `message`.
    pub fn fail_with(&mut self, name: &'static str, message: &str) -> &mut Self {
        self.error_replies.insert(name, message.to_string());
        self
    }

    /// Treat every `name` command as a lost connection (no reply at all).
    pub fn drop_on(&mut self, name: &'static str) -> &mut Self {
        self.dropped.insert(name);
        self
    }

    // ===== Inspection =====

    /// Every command executed so far, in order.
    pub fn commands(&self) -> &[Command] {
        &self.log
    }

    /// Names of the executed commands, in order.
    pub fn command_names(&self) -> Vec<&'static str> {
        self.log.iter().map(Command::name).collect()
    }

    /// How many times `name` was executed.
    pub fn count_of(&self, name: &str) -> usize {
        self.log.iter().filter(|c| c.name() == name).count()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.keys.get(key) {
            Some(Entry::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn hash_field(&self, key: &str, field: &str) -> Option<&str> {
        match self.keys.get(key) {
            Some(Entry::Hash(h)) => h.get(field).map(String::as_str),
            _ => None,
        }
    }

    pub fn list_items(&self, key: &str) -> Vec<String> {
        match self.keys.get(key) {
            Some(Entry::List(l)) => l.clone(),
            _ => Vec::new(),
        }
    }

    pub fn set_members(&self, key: &str) -> Vec<String> {
        match self.keys.get(key) {
            Some(Entry::Set(s)) => s.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn zset_score(&self, key: &str, member: &str) -> Option<f64> {
        match self.keys.get(key) {
            Some(Entry::ZSet(z)) => z.iter().find(|(m, _)| m == member).map(|(_, s)| *s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    // ===== Command dispatch =====

    fn dispatch(&mut self, name: &str, args: &[String]) -> Reply {
        match name {
            "AUTH" | "SELECT" | "PING" => Reply::Status("OK".to_string()),
            "DBSIZE" => Reply::Integer(self.keys.len() as i64),
            "EXISTS" => Reply::Integer(args.iter().filter(|k| self.keys.contains_key(*k)).count() as i64),
            "DEL" => {
                let removed = args.iter().filter(|k| self.keys.remove(*k).is_some()).count();
                Reply::Integer(removed as i64)
            }
            "RENAME" => self.rename(args),
            "SCAN" => self.scan(args),
            "GET" | "SET" => self.string_cmd(name, args),
            "HGET" | "HGETALL" | "HSET" | "HEXISTS" | "HDEL" | "HLEN" => self.hash_cmd(name, args),
            "LRANGE" | "RPUSH" | "LLEN" | "LREM" | "LPOS" | "LSET" => self.list_cmd(name, args),
            "SMEMBERS" | "SADD" | "SREM" | "SISMEMBER" | "SCARD" | "SSCAN" => {
                self.set_cmd(name, args)
            }
            "ZRANGE" | "ZADD" | "ZRANK" | "ZREM" | "ZCARD" => self.zset_cmd(name, args),
            other => Reply::Error(format!("ERR unknown command '{other}'")),
        }
    }

    fn rename(&mut self, args: &[String]) -> Reply {
        let [from, to] = args else {
            return arity("rename");
        };
        match self.keys.remove(from) {
            Some(entry) => {
                self.keys.insert(to.clone(), entry);
                Reply::Status("OK".to_string())
            }
            None => Reply::Error("ERR no such key".to_string()),
        }
    }

    fn scan(&self, args: &[String]) -> Reply {
        let Some((cursor, rest)) = args.split_first() else {
            return arity("scan");
        };
        let keys: Vec<&String> = self.keys.keys().collect();
        page_reply(&keys, cursor, rest)
    }

    fn string_cmd(&mut self, name: &str, args: &[String]) -> Reply {
        match (name, args) {
            ("GET", [key]) => match self.keys.get(key) {
                None => Reply::Nil,
                Some(Entry::Str(s)) => Reply::bulk(s.clone()),
                Some(_) => Reply::Error(WRONGTYPE.to_string()),
            },
            ("SET", [key, value]) => {
                self.keys.insert(key.clone(), Entry::Str(value.clone()));
                Reply::Status("OK".to_string())
            }
            _ => arity(name),
        }
    }

    fn hash_cmd(&mut self, name: &str, args: &[String]) -> Reply {
        let Some((key, rest)) = args.split_first() else {
            return arity(name);
        };
        if name == "HSET" {
            if rest.is_empty() || rest.len() % 2 != 0 {
                return arity(name);
            }
            let entry = self
                .keys
                .entry(key.clone())
                .or_insert_with(|| Entry::Hash(BTreeMap::new()));
            let Entry::Hash(hash) = entry else {
                return Reply::Error(WRONGTYPE.to_string());
            };
            let added = rest
                .chunks(2)
                .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                .count();
            return Reply::Integer(added as i64);
        }

        let empty: BTreeMap<String, String> = BTreeMap::new();
        let hash = match self.keys.get_mut(key) {
            None => None,
            Some(Entry::Hash(h)) => Some(h),
            Some(_) => return Reply::Error(WRONGTYPE.to_string()),
        };
        match (name, rest) {
            ("HGET", [field]) => hash
                .and_then(|h| h.get(field))
                .map_or(Reply::Nil, |v| Reply::bulk(v.clone())),
            ("HGETALL", []) => Reply::Array(
                hash.map(|h| &*h)
                    .unwrap_or(&empty)
                    .iter()
                    .flat_map(|(f, v)| [Reply::bulk(f.clone()), Reply::bulk(v.clone())])
                    .collect(),
            ),
            ("HEXISTS", [field]) => {
                Reply::Integer(i64::from(hash.is_some_and(|h| h.contains_key(field))))
            }
            ("HLEN", []) => Reply::Integer(hash.map_or(0, |h| h.len()) as i64),
            ("HDEL", fields) if !fields.is_empty() => {
                let removed = hash.map_or(0, |h| fields.iter().filter(|f| h.remove(*f).is_some()).count());
                self.drop_if_empty(key);
                Reply::Integer(removed as i64)
            }
            _ => arity(name),
        }
    }

    fn list_cmd(&mut self, name: &str, args: &[String]) -> Reply {
        let Some((key, rest)) = args.split_first() else {
            return arity(name);
        };
        if name == "RPUSH" {
            if rest.is_empty() {
                return arity(name);
            }
            let entry = self
                .keys
                .entry(key.clone())
                .or_insert_with(|| Entry::List(Vec::new()));
            let Entry::List(list) = entry else {
                return Reply::Error(WRONGTYPE.to_string());
            };
            list.extend(rest.iter().cloned());
            return Reply::Integer(list.len() as i64);
        }

        let list = match self.keys.get_mut(key) {
            None => None,
            Some(Entry::List(l)) => Some(l),
            Some(_) => return Reply::Error(WRONGTYPE.to_string()),
        };
        match (name, rest) {
            ("LRANGE", [start, stop]) => {
                let (Ok(start), Ok(stop)) = (start.parse::<i64>(), stop.parse::<i64>()) else {
                    return not_integer();
                };
                let items = list.map(|l| l.as_slice()).unwrap_or_default();
                Reply::Array(
                    index_range(items.len(), start, stop)
                        .map(|r| items[r].iter().map(|s| Reply::bulk(s.clone())).collect())
                        .unwrap_or_default(),
                )
            }
            ("LLEN", []) => Reply::Integer(list.map_or(0, |l| l.len()) as i64),
            ("LPOS", [element]) => list
                .and_then(|l| l.iter().position(|s| s == element))
                .map_or(Reply::Nil, |i| Reply::Integer(i as i64)),
            ("LSET", [index, element]) => {
                let Ok(index) = index.parse::<i64>() else {
                    return not_integer();
                };
                let Some(list) = list else {
                    return Reply::Error("ERR no such key".to_string());
                };
                let len = list.len() as i64;
                let resolved = if index < 0 { len + index } else { index };
                if resolved < 0 || resolved >= len {
                    return Reply::Error("ERR index out of range".to_string());
                }
                list[resolved as usize] = element.clone();
                Reply::Status("OK".to_string())
            }
            ("LREM", [count, element]) => {
                let Ok(count) = count.parse::<i64>() else {
                    return not_integer();
                };
                let removed = list.map_or(0, |l| remove_occurrences(l, element, count));
                self.drop_if_empty(key);
                Reply::Integer(removed as i64)
            }
            _ => arity(name),
        }
    }

    fn set_cmd(&mut self, name: &str, args: &[String]) -> Reply {
        let Some((key, rest)) = args.split_first() else {
            return arity(name);
        };
        if name == "SADD" {
            if rest.is_empty() {
                return arity(name);
            }
            let entry = self
                .keys
                .entry(key.clone())
                .or_insert_with(|| Entry::Set(BTreeSet::new()));
            let Entry::Set(set) = entry else {
                return Reply::Error(WRONGTYPE.to_string());
            };
            let added = rest.iter().filter(|m| set.insert((*m).clone())).count();
            return Reply::Integer(added as i64);
        }

        let set = match self.keys.get_mut(key) {
            None => None,
            Some(Entry::Set(s)) => Some(s),
            Some(_) => return Reply::Error(WRONGTYPE.to_string()),
        };
        match (name, rest) {
            ("SMEMBERS", []) => Reply::Array(
                set.map(|s| s.iter().map(|m| Reply::bulk(m.clone())).collect())
                    .unwrap_or_default(),
            ),
            ("SISMEMBER", [member]) => {
                Reply::Integer(i64::from(set.is_some_and(|s| s.contains(member))))
            }
            ("SCARD", []) => Reply::Integer(set.map_or(0, |s| s.len()) as i64),
            ("SREM", members) if !members.is_empty() => {
                let removed = set.map_or(0, |s| members.iter().filter(|m| s.remove(*m)).count());
                self.drop_if_empty(key);
                Reply::Integer(removed as i64)
            }
            ("SSCAN", [cursor, options @ ..]) => {
                let members: Vec<&String> = set.map(|s| s.iter().collect()).unwrap_or_default();
                page_reply(&members, cursor, options)
            }
            _ => arity(name),
        }
    }

    fn zset_cmd(&mut self, name: &str, args: &[String]) -> Reply {
        let Some((key, rest)) = args.split_first() else {
            return arity(name);
        };
        if name == "ZADD" {
            if rest.is_empty() || rest.len() % 2 != 0 {
                return arity(name);
            }
            let mut pairs = Vec::with_capacity(rest.len() / 2);
            for pair in rest.chunks(2) {
                let Ok(score) = pair[0].parse::<f64>() else {
                    return Reply::Error("ERR value is not a valid float".to_string());
                };
                pairs.push((pair[1].clone(), score));
            }
            let entry = self
                .keys
                .entry(key.clone())
                .or_insert_with(|| Entry::ZSet(Vec::new()));
            let Entry::ZSet(zset) = entry else {
                return Reply::Error(WRONGTYPE.to_string());
            };
            let mut added = 0;
            for (member, score) in pairs {
                match zset.iter_mut().find(|(m, _)| *m == member) {
                    Some(existing) => existing.1 = score,
                    None => {
                        zset.push((member, score));
                        added += 1;
                    }
                }
            }
            sort_zset(zset);
            return Reply::Integer(added);
        }

        let zset = match self.keys.get_mut(key) {
            None => None,
            Some(Entry::ZSet(z)) => Some(z),
            Some(_) => return Reply::Error(WRONGTYPE.to_string()),
        };
        match (name, rest) {
            ("ZRANGE", [start, stop, options @ ..]) => {
                let with_scores = match options {
                    [] => false,
                    [flag] if flag.eq_ignore_ascii_case("WITHSCORES") => true,
                    _ => return Reply::Error("ERR syntax error".to_string()),
                };
                let (Ok(start), Ok(stop)) = (start.parse::<i64>(), stop.parse::<i64>()) else {
                    return not_integer();
                };
                let items = zset.map(|z| z.as_slice()).unwrap_or_default();
                let mut out = Vec::new();
                if let Some(range) = index_range(items.len(), start, stop) {
                    for (member, score) in &items[range] {
                        out.push(Reply::bulk(member.clone()));
                        if with_scores {
                            out.push(Reply::bulk(format_score(*score)));
                        }
                    }
                }
                Reply::Array(out)
            }
            ("ZRANK", [member]) => zset
                .and_then(|z| z.iter().position(|(m, _)| m == member))
                .map_or(Reply::Nil, |i| Reply::Integer(i as i64)),
            ("ZCARD", []) => Reply::Integer(zset.map_or(0, |z| z.len()) as i64),
            ("ZREM", members) if !members.is_empty() => {
                let removed = zset.map_or(0, |z| {
                    let before = z.len();
                    z.retain(|(m, _)| !members.contains(m));
                    before - z.len()
                });
                self.drop_if_empty(key);
                Reply::Integer(removed as i64)
            }
            _ => arity(name),
        }
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self.keys.get(key).is_some_and(Entry::is_empty) {
            self.keys.remove(key);
        }
    }
}

impl Transport for InMemoryRedis {
    fn execute(&mut self, cmd: &Command) -> FdwResult<Reply> {
        self.log.push(cmd.clone());
        if self.dropped.contains(cmd.name()) {
            return Err(FdwError::Protocol(format!(
                "connection lost while sending {}",
                cmd.name()
            )));
        }
        if let Some(message) = self.error_replies.get(cmd.name()) {
            return Ok(Reply::Error(message.clone()));
        }
        Ok(self.dispatch(cmd.name(), cmd.args()))
    }
}

/// One `SCAN`-style page: `[next cursor, [items...]]`.
///
/// The cursor is an index into the ordered item list; `MATCH` filters after
/// the page is cut, so a page may be empty while the cursor is not "0".
fn page_reply(items: &[&String], cursor: &str, options: &[String]) -> Reply {
    let Ok(start) = cursor.parse::<usize>() else {
        return Reply::Error("ERR invalid cursor".to_string());
    };
    let mut pattern: Option<&str> = None;
    let mut count = DEFAULT_SCAN_PAGE;
    let mut opts = options.iter();
    while let Some(opt) = opts.next() {
        match (opt.to_ascii_uppercase().as_str(), opts.next()) {
            ("MATCH", Some(p)) => pattern = Some(p),
            ("COUNT", Some(n)) => match n.parse::<usize>() {
                Ok(n) if n > 0 => count = n,
                _ => return Reply::Error("ERR syntax error".to_string()),
            },
            _ => return Reply::Error("ERR syntax error".to_string()),
        }
    }

    let end = start.saturating_add(count).min(items.len());
    let page: Vec<Reply> = items
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .filter(|item| pattern.is_none_or(|p| glob_match(p, item)))
        .map(|item| Reply::bulk((*item).clone()))
        .collect();
    let next = if end >= items.len() { 0 } else { end };
    Reply::Array(vec![Reply::bulk(next.to_string()), Reply::Array(page)])
}

/// Resolve Redis-style inclusive `start..=stop` (negative = from the end).
fn index_range(len: usize, start: i64, stop: i64) -> Option<std::ops::Range<usize>> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some(start as usize..stop as usize + 1)
}

fn remove_occurrences(list: &mut Vec<String>, element: &str, count: i64) -> usize {
    let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
    let mut removed = 0;
    if count >= 0 {
        let mut i = 0;
        while i < list.len() && removed < limit {
            if list[i] == element {
                list.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
    } else {
        let mut i = list.len();
        while i > 0 && removed < limit {
            i -= 1;
            if list[i] == element {
                list.remove(i);
                removed += 1;
            }
        }
    }
    removed
}

fn sort_zset(zset: &mut [(String, f64)]) {
    zset.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
}

/// Redis renders integral scores without a fractional part.
fn format_score(score: f64) -> String {
    if score.is_infinite() {
        return if score > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if score.fract() == 0.0 && score.abs() < 1e17 {
        format!("{}", score as i64)
    } else {
        score.to_string()
    }
}

/// Glob matching as used by `SCAN ... MATCH`: `*`, `?`, `[...]`, `\x`.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_at(&p, &t)
}

fn glob_at(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => (0..=t.len()).any(|skip| glob_at(&p[1..], &t[skip..])),
        Some('?') => !t.is_empty() && glob_at(&p[1..], &t[1..]),
        Some('[') => {
            let Some(close) = p.iter().skip(1).position(|c| *c == ']').map(|i| i + 1) else {
                return !t.is_empty() && t[0] == '[' && glob_at(&p[1..], &t[1..]);
            };
            let Some(&c) = t.first() else {
                return false;
            };
            let class = &p[1..close];
            let (negated, class) = match class.first() {
                Some('^') => (true, &class[1..]),
                _ => (false, class),
            };
            let mut hit = false;
            let mut i = 0;
            while i < class.len() {
                if i + 2 < class.len() && class[i + 1] == '-' {
                    hit |= class[i] <= c && c <= class[i + 2];
                    i += 3;
                } else {
                    hit |= class[i] == c;
                    i += 1;
                }
            }
            hit != negated && glob_at(&p[close + 1..], &t[1..])
        }
        Some('\\') if p.len() > 1 => !t.is_empty() && t[0] == p[1] && glob_at(&p[2..], &t[1..]),
        Some(c) => !t.is_empty() && t[0] == *c && glob_at(&p[1..], &t[1..]),
    }
}

fn arity(name: &str) -> Reply {
    Reply::Error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

fn not_integer() -> Reply {
    Reply::Error("ERR value is not an integer or out of range".to_string())
}
