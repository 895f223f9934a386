//! Predicate Pushdown Analyzer
//!
//! `key = '<literal>'` 형태의 단일 등호 비교만 Redis 로 내려보냅니다.
//! 그 밖의 모든 조건(AND/OR, 다른 연산자, 비-리터럴 우변, key 이외의 컬럼)은
//! pushable = false 이며 호스트 엔진이 행 단위로 다시 평가합니다.

use sqlparser::ast::{BinaryOperator, Expr, Ident, Value};

/// 등호 push-down 이 허용되는 유일한 컬럼
pub const KEY_COLUMN: &str = "key";

/// 분석 결과: (컬럼, 리터럴 값, push-down 가능 여부)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
    pub column: String,
    pub value: String,
    pub pushable: bool,
}

/// 표현식 하나를 분석
///
/// `column = literal` 모양이 아니면 `None`. 모양은 맞지만 push-down 할 수
/// 없는 경우(숫자 비교, key 이외 컬럼)에는 `pushable == false` 로 돌려줍니다.
pub fn analyze(expr: &Expr) -> Option<Restriction> {
    let Expr::BinaryOp { left, op, right } = strip_nesting(expr) else {
        return None;
    };
    if *op != BinaryOperator::Eq {
        return None;
    }
    let column = column_name(strip_nesting(left))?;
    let (value, textual) = literal(strip_nesting(right))?;
    let pushable = textual && column == KEY_COLUMN;
    Some(Restriction {
        column,
        value,
        pushable,
    })
}

/// 제한 조건 목록에서 첫 번째 push-down 가능한 key 값을 찾음
pub fn find_pushdown<'a, I>(quals: I) -> Option<String>
where
    I: IntoIterator<Item = &'a Expr>,
{
    quals
        .into_iter()
        .filter_map(analyze)
        .find(|r| r.pushable)
        .map(|r| r.value)
}

fn strip_nesting(mut expr: &Expr) -> &Expr {
    while let Expr::Nested(inner) = expr {
        expr = inner.as_ref();
    }
    expr
}

// 따옴표 없는 식별자는 소문자로 접음
fn column_name(expr: &Expr) -> Option<String> {
    let ident = match expr {
        Expr::Identifier(ident) => ident,
        Expr::CompoundIdentifier(parts) => parts.last()?,
        _ => return None,
    };
    Some(fold_ident(ident))
}

fn fold_ident(ident: &Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_lowercase()
    }
}

// (값, 텍스트 비교 여부)
fn literal(expr: &Expr) -> Option<(String, bool)> {
    let Expr::Value(value) = expr else {
        return None;
    };
    match value {
        Value::SingleQuotedString(s)
        | Value::EscapedStringLiteral(s)
        | Value::NationalStringLiteral(s) => Some((s.clone(), true)),
        Value::DollarQuotedString(s) => Some((s.value.clone(), true)),
        Value::Number(n, _) => Some((n.to_string(), false)),
        Value::Boolean(b) => Some((b.to_string(), false)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlParser;

    fn expr(sql: &str) -> Expr {
        SqlParser::new().parse_expr(sql).unwrap()
    }

    #[test]
    fn test_key_equality_is_pushable() {
        let r = analyze(&expr("key = 'user:42'")).unwrap();
        assert_eq!(r.column, "key");
        assert_eq!(r.value, "user:42");
        assert!(r.pushable);
    }

    #[test]
    fn test_qualified_and_parenthesized() {
        assert!(analyze(&expr("t.key = 'a'")).unwrap().pushable);
        assert!(analyze(&expr("(key = 'a')")).unwrap().pushable);
        assert!(analyze(&expr("KEY = 'a'")).unwrap().pushable);
    }

    #[test]
    fn test_quoted_identifier_is_case_sensitive() {
        let r = analyze(&expr("\"KEY\" = 'a'")).unwrap();
        assert_eq!(r.column, "KEY");
        assert!(!r.pushable);
    }

    #[test]
    fn test_non_key_column_not_pushable() {
        let r = analyze(&expr("value = 'x'")).unwrap();
        assert_eq!(r.column, "value");
        assert!(!r.pushable);
    }

    #[test]
    fn test_numeric_literal_not_textual() {
        let r = analyze(&expr("key = 42")).unwrap();
        assert_eq!(r.value, "42");
        assert!(!r.pushable);
    }

    #[test]
    fn test_unrecognized_shapes() {
        for sql in [
            "key = 'a' AND value = 'b'",
            "key <> 'a'",
            "key LIKE 'a%'",
            "key = value",
            "'a' = key",
            "key IN ('a', 'b')",
        ] {
            assert_eq!(analyze(&expr(sql)), None, "{sql}");
        }
    }

    #[test]
    fn test_find_pushdown_takes_first_pushable() {
        let quals = vec![expr("value = 'v'"), expr("key = 'k1'"), expr("key = 'k2'")];
        assert_eq!(find_pushdown(&quals), Some("k1".to_string()));
        assert_eq!(find_pushdown(&quals[..1]), None);
        assert_eq!(find_pushdown(std::iter::empty()), None);
    }
}
