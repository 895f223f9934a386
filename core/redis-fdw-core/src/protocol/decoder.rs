//! Reply Decoder: RESP replies to row values.
//!
//! Scalars become plain text, "no value" replies (nil, status, error) are
//! reported as `None` so the scan can skip them, and array replies are
//! rendered in the brace-delimited composite form
//! `{"a","b\"c",3,NULL}`.

use super::Reply;
use crate::error::{FdwError, FdwResult};

/// Decode a per-key fetch reply into a row value.
///
/// Returns `Ok(None)` for nil, status and error replies; those keys are
/// skipped during scanning rather than surfaced as rows.
pub fn decode_value(reply: &Reply) -> FdwResult<Option<String>> {
    match reply {
        Reply::Integer(n) => Ok(Some(n.to_string())),
        Reply::Bulk(bytes) => utf8(bytes).map(|s| Some(s.to_string())),
        Reply::Array(items) => encode_composite(items).map(Some),
        Reply::Nil | Reply::Status(_) | Reply::Error(_) => Ok(None),
    }
}

/// Render the elements of an array reply as a composite value.
///
/// Strings are double-quoted with `"` and `\` backslash-escaped, integers
/// are bare decimal text, nil is the bare token `NULL`. An error element
/// inside the array also renders as `NULL`, its message is dropped. A
/// nested array fails the whole row.
pub fn encode_composite(items: &[Reply]) -> FdwResult<String> {
    let mut out = String::with_capacity(2 + items.len() * 8);
    out.push('{');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match item {
            Reply::Bulk(bytes) => push_quoted(&mut out, utf8(bytes)?),
            Reply::Status(text) => push_quoted(&mut out, text),
            Reply::Integer(n) => out.push_str(&n.to_string()),
            Reply::Nil | Reply::Error(_) => out.push_str("NULL"),
            Reply::Array(_) => {
                return Err(FdwError::Unsupported {
                    feature: "nested array returns".to_string(),
                    hint: "only flat collection replies can be mapped to a row value".to_string(),
                });
            }
        }
    }
    out.push('}');
    Ok(out)
}

/// Text of a single array element: a key from a scan page, a member or a
/// field of a singleton collection.
pub fn reply_text(reply: &Reply) -> FdwResult<String> {
    match reply {
        Reply::Bulk(bytes) => utf8(bytes).map(str::to_string),
        Reply::Status(text) => Ok(text.clone()),
        Reply::Integer(n) => Ok(n.to_string()),
        other => Err(FdwError::Protocol(format!(
            "expected a string element, got {}",
            other.type_name()
        ))),
    }
}

/// Parse a composite value back into its elements (`NULL` → `None`).
///
/// Accepts exactly what [`encode_composite`] produces; bare tokens other
/// than `NULL` are returned verbatim.
pub fn parse_composite(text: &str) -> FdwResult<Vec<Option<String>>> {
    let malformed = |why: &str| FdwError::Config(format!("malformed composite value {text:?}: {why}"));

    let inner = text
        .trim()
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| malformed("expected braces"))?;

    let mut elements = Vec::new();
    if inner.trim().is_empty() {
        return Ok(elements);
    }

    let mut chars = inner.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        if chars.next_if_eq(&'"').is_some() {
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => return Err(malformed("dangling escape")),
                    },
                    Some('"') => break,
                    Some(c) => value.push(c),
                    None => return Err(malformed("unterminated quote")),
                }
            }
            elements.push(Some(value));
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
        } else {
            let mut token = String::new();
            while let Some(c) = chars.next_if(|c| *c != ',') {
                token.push(c);
            }
            let token = token.trim();
            if token.is_empty() {
                return Err(malformed("empty element"));
            }
            if token.eq_ignore_ascii_case("NULL") {
                elements.push(None);
            } else {
                elements.push(Some(token.to_string()));
            }
        }

        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(_) => return Err(malformed("expected ',' between elements")),
        }
    }
    Ok(elements)
}

fn push_quoted(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn utf8(bytes: &[u8]) -> FdwResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| FdwError::InvalidEncoding(e.to_string()))
}
