use crate::error::{FdwError, FdwResult};
use sqlparser::ast::Expr;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// 제한 조건(WHERE 절 조각) 파서 (sqlparser-rs)
pub struct SqlParser {
    dialect: GenericDialect,
}

impl SqlParser {
    /// 새 파서 생성
    pub fn new() -> Self {
        Self {
            dialect: GenericDialect {},
        }
    }

    /// 하나의 boolean 표현식을 AST 로 파싱
    pub fn parse_expr(&self, sql: &str) -> FdwResult<Expr> {
        let sql_error = |e: sqlparser::parser::ParserError| FdwError::SqlParse {
            message: e.to_string(),
            sql: sql.to_string(),
        };
        Parser::new(&self.dialect)
            .try_with_sql(sql)
            .map_err(sql_error)?
            .parse_expr()
            .map_err(sql_error)
    }

    /// 제한 조건 목록을 순서대로 파싱
    pub fn parse_restrictions<S: AsRef<str>>(&self, clauses: &[S]) -> FdwResult<Vec<Expr>> {
        clauses
            .iter()
            .map(|clause| self.parse_expr(clause.as_ref()))
            .collect()
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}
