use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Query, Select, SelectItem,
    SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::config::SecurityConfig;
use crate::error::EngineError;

/// Tree-walking SQL security gate. Parses with a real Postgres-grammar
/// parser and rejects anything that isn't a single read-only `SELECT`
/// (optionally wrapped in `EXPLAIN`), rather than pattern-matching the raw
/// query text.
pub struct SqlValidator {
    config: SecurityConfig,
    blocked_tables: Vec<String>,
    blocked_columns: Vec<String>,
    allow_explain: bool,
}

impl SqlValidator {
    pub fn new(config: SecurityConfig) -> Self {
        SqlValidator {
            config,
            blocked_tables: Vec::new(),
            blocked_columns: Vec::new(),
            allow_explain: false,
        }
    }

    pub fn with_blocked_tables(mut self, tables: Vec<String>) -> Self {
        self.blocked_tables = tables.into_iter().map(|t| t.to_lowercase()).collect();
        self
    }

    pub fn with_blocked_columns(mut self, columns: Vec<String>) -> Self {
        self.blocked_columns = columns.into_iter().map(|c| c.to_lowercase()).collect();
        self
    }

    pub fn allow_explain(mut self, allow: bool) -> Self {
        self.allow_explain = allow;
        self
    }

    /// Parses and walks `sql`, returning `Ok(())` only for an allowed
    /// single read-only statement.
    pub fn validate(&self, sql: &str) -> Result<(), EngineError> {
        let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
            .map_err(|e| EngineError::SqlParseError(e.to_string()))?;

        match statements.len() {
            0 => Err(EngineError::SqlParseError(
                "no SQL statement found".to_string(),
            )),
            1 => self.validate_statement(&statements[0], false),
            _ => Err(EngineError::SecurityViolation(
                "multiple statements are not allowed".to_string(),
            )),
        }
    }

    fn validate_statement(&self, stmt: &Statement, inside_explain: bool) -> Result<(), EngineError> {
        match stmt {
            Statement::Query(query) => self.walk_query(query),
            Statement::Explain { statement, .. } => {
                if inside_explain {
                    return Err(EngineError::SecurityViolation(
                        "nested EXPLAIN is not allowed".to_string(),
                    ));
                }
                if !self.allow_explain {
                    return Err(EngineError::SecurityViolation(
                        "EXPLAIN is not allowed".to_string(),
                    ));
                }
                self.validate_statement(statement, true)
            }
            Statement::Drop { .. } => Err(keyword_violation("DROP")),
            Statement::CreateTable(_) => Err(keyword_violation("CREATE")),
            Statement::CreateIndex(_) => Err(keyword_violation("CREATE")),
            Statement::CreateView { .. } => Err(keyword_violation("CREATE")),
            Statement::CreateSchema { .. } => Err(keyword_violation("CREATE")),
            Statement::AlterTable { .. } => Err(keyword_violation("ALTER")),
            Statement::Truncate { .. } => Err(keyword_violation("TRUNCATE")),
            Statement::Insert { .. } => Err(keyword_violation("INSERT")),
            Statement::Update { .. } => Err(keyword_violation("UPDATE")),
            Statement::Delete { .. } => Err(keyword_violation("DELETE")),
            Statement::Grant { .. } => Err(keyword_violation("GRANT")),
            Statement::Revoke { .. } => Err(keyword_violation("REVOKE")),
            other => Err(EngineError::SecurityViolation(format!(
                "statement type '{}' is not allowed",
                statement_label(other)
            ))),
        }
    }

    fn walk_query(&self, query: &Query) -> Result<(), EngineError> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.walk_query(&cte.query)?;
            }
        }
        self.walk_set_expr(&query.body)
    }

    fn walk_set_expr(&self, expr: &SetExpr) -> Result<(), EngineError> {
        match expr {
            SetExpr::Select(select) => self.walk_select(select),
            SetExpr::Query(query) => self.walk_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.walk_set_expr(left)?;
                self.walk_set_expr(right)
            }
            SetExpr::Values(values) => {
                for row in &values.rows {
                    for expr in row {
                        self.walk_expr(expr)?;
                    }
                }
                Ok(())
            }
            SetExpr::Table(_) => Ok(()),
            SetExpr::Insert(_) => Err(keyword_violation("INSERT")),
            SetExpr::Update(_) => Err(keyword_violation("UPDATE")),
        }
    }

    fn walk_select(&self, select: &Select) -> Result<(), EngineError> {
        for item in &select.projection {
            self.walk_select_item(item)?;
        }
        for twj in &select.from {
            self.walk_table_with_joins(twj)?;
        }
        if let Some(selection) = &select.selection {
            self.walk_expr(selection)?;
        }
        if let Some(having) = &select.having {
            self.walk_expr(having)?;
        }
        Ok(())
    }

    fn walk_select_item(&self, item: &SelectItem) -> Result<(), EngineError> {
        match item {
            SelectItem::UnnamedExpr(expr) => self.walk_expr(expr),
            SelectItem::ExprWithAlias { expr, .. } => self.walk_expr(expr),
            SelectItem::QualifiedWildcard(..) | SelectItem::Wildcard(..) => Ok(()),
        }
    }

    fn walk_table_with_joins(&self, twj: &TableWithJoins) -> Result<(), EngineError> {
        self.walk_table_factor(&twj.relation)?;
        for join in &twj.joins {
            self.walk_table_factor(&join.relation)?;
        }
        Ok(())
    }

    fn walk_table_factor(&self, factor: &TableFactor) -> Result<(), EngineError> {
        match factor {
            TableFactor::Table { name, args, .. } => {
                let table_name = name.to_string().to_lowercase();
                let bare = table_name.rsplit('.').next().unwrap_or(&table_name);
                if self.blocked_tables.iter().any(|t| t == bare || t == &table_name) {
                    return Err(EngineError::SecurityViolation(format!(
                        "access to table '{bare}' is blocked"
                    )));
                }
                if let Some(args) = args {
                    self.check_function_name(&table_name)?;
                    for arg in &args.args {
                        self.walk_function_arg(arg)?;
                    }
                }
                Ok(())
            }
            TableFactor::Derived { subquery, .. } => self.walk_query(subquery),
            TableFactor::TableFunction { expr, .. } => self.walk_expr(expr),
            TableFactor::Function { name, args, .. } => {
                self.check_function_name(&name.to_string().to_lowercase())?;
                for arg in args {
                    self.walk_function_arg(arg)?;
                }
                Ok(())
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.walk_table_with_joins(table_with_joins),
            TableFactor::UNNEST { array_exprs, .. } => {
                for expr in array_exprs {
                    self.walk_expr(expr)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn check_function_name(&self, name: &str) -> Result<(), EngineError> {
        let bare = name.rsplit('.').next().unwrap_or(name);
        if self
            .config
            .blocked_functions
            .iter()
            .any(|f| f.to_lowercase() == bare)
        {
            return Err(EngineError::SecurityViolation(format!(
                "function '{bare}' is not allowed"
            )));
        }
        Ok(())
    }

    fn walk_function(&self, function: &Function) -> Result<(), EngineError> {
        self.check_function_name(&function.name.to_string().to_lowercase())?;
        match &function.args {
            FunctionArguments::None => {}
            FunctionArguments::Subquery(query) => self.walk_query(query)?,
            FunctionArguments::List(list) => {
                for arg in &list.args {
                    self.walk_function_arg(arg)?;
                }
            }
        }
        Ok(())
    }

    fn walk_function_arg(&self, arg: &FunctionArg) -> Result<(), EngineError> {
        let expr = match arg {
            FunctionArg::Named { arg, .. } => arg,
            FunctionArg::Unnamed(arg) => arg,
            #[allow(unreachable_patterns)]
            _ => return Ok(()),
        };
        match expr {
            FunctionArgExpr::Expr(expr) => self.walk_expr(expr),
            #[allow(unreachable_patterns)]
            _ => Ok(()),
        }
    }

    fn check_column_name(&self, name: &str) -> Result<(), EngineError> {
        let bare = name.rsplit('.').next().unwrap_or(name).to_lowercase();
        if self.blocked_columns.iter().any(|c| c == &bare) {
            return Err(EngineError::SecurityViolation(format!(
                "access to column '{bare}' is blocked"
            )));
        }
        Ok(())
    }

    fn walk_expr(&self, expr: &Expr) -> Result<(), EngineError> {
        match expr {
            Expr::Identifier(ident) => self.check_column_name(&ident.value),
            Expr::CompoundIdentifier(idents) => {
                let joined = idents
                    .iter()
                    .map(|i| i.value.clone())
                    .collect::<Vec<_>>()
                    .join(".");
                self.check_column_name(&joined)
            }
            Expr::Function(function) => self.walk_function(function),
            Expr::BinaryOp { left, right, .. } => {
                self.walk_expr(left)?;
                self.walk_expr(right)
            }
            Expr::UnaryOp { expr, .. } => self.walk_expr(expr),
            Expr::Nested(expr) => self.walk_expr(expr),
            Expr::Subquery(query) | Expr::Exists { subquery: query, .. } => self.walk_query(query),
            Expr::InSubquery { expr, subquery, .. } => {
                self.walk_expr(expr)?;
                self.walk_query(subquery)
            }
            Expr::InList { expr, list, .. } => {
                self.walk_expr(expr)?;
                for item in list {
                    self.walk_expr(item)?;
                }
                Ok(())
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.walk_expr(expr)?;
                self.walk_expr(low)?;
                self.walk_expr(high)
            }
            Expr::Cast { expr, .. } => self.walk_expr(expr),
            Expr::Case {
                operand,
                conditions,
                results,
                else_result,
                ..
            } => {
                if let Some(operand) = operand {
                    self.walk_expr(operand)?;
                }
                for cond in conditions {
                    self.walk_expr(cond)?;
                }
                for res in results {
                    self.walk_expr(res)?;
                }
                if let Some(else_result) = else_result {
                    self.walk_expr(else_result)?;
                }
                Ok(())
            }
            Expr::IsNull(expr) | Expr::IsNotNull(expr) | Expr::IsTrue(expr) | Expr::IsFalse(expr) => {
                self.walk_expr(expr)
            }
            Expr::Tuple(exprs) => {
                for expr in exprs {
                    self.walk_expr(expr)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn keyword_violation(keyword: &str) -> EngineError {
    EngineError::SecurityViolation(format!("{keyword} statements are not allowed"))
}

fn statement_label(stmt: &Statement) -> String {
    stmt.to_string()
        .split_whitespace()
        .next()
        .unwrap_or("UNKNOWN")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SqlValidator {
        SqlValidator::new(SecurityConfig::default())
    }

    #[test]
    fn allows_union_of_selects() {
        assert!(validator()
            .validate("SELECT * FROM users UNION SELECT * FROM passwords")
            .is_ok());
    }

    #[test]
    fn rejects_comment_truncation_as_multiple_statements() {
        let err = validator()
            .validate("SELECT * FROM users; DROP TABLE users;--")
            .unwrap_err();
        assert!(err.to_string().to_lowercase().contains("multiple"));
    }

    #[test]
    fn rejects_multi_statement_injection() {
        for sql in [
            "SELECT 1; DELETE FROM users",
            "SELECT 1; INSERT INTO logs VALUES(1)",
            "SELECT 1; UPDATE users SET admin=true",
            "SELECT 1; DROP TABLE users",
        ] {
            let err = validator().validate(sql).unwrap_err();
            assert!(err.to_string().to_lowercase().contains("multiple"));
        }
    }

    #[test]
    fn rejects_dangerous_functions() {
        let cases = [
            ("SELECT pg_sleep(100)", "pg_sleep"),
            ("SELECT pg_read_file('/etc/passwd')", "pg_read_file"),
            (
                "SELECT * FROM dblink('host=evil', 'SELECT 1') AS t(id int)",
                "dblink",
            ),
        ];
        for (sql, func) in cases {
            let err = validator().validate(sql).unwrap_err();
            assert!(err.to_string().to_lowercase().contains(func));
        }
    }

    #[test]
    fn allows_valid_select_queries() {
        for sql in [
            "SELECT * FROM users",
            "SELECT COUNT(*) FROM orders WHERE date > '2024-01-01'",
            "WITH cte AS (SELECT 1) SELECT * FROM cte",
            "SELECT a.id, b.name FROM a JOIN b ON a.id = b.id",
        ] {
            assert!(validator().validate(sql).is_ok(), "expected {sql} to pass");
        }
    }

    #[test]
    fn rejects_ddl_and_dml() {
        let cases = [
            ("DROP TABLE users", "DROP"),
            ("CREATE TABLE evil(id int)", "CREATE"),
            ("ALTER TABLE users ADD COLUMN hack text", "ALTER"),
            ("INSERT INTO users VALUES(1, 'hack')", "INSERT"),
            ("UPDATE users SET name='hack'", "UPDATE"),
            ("DELETE FROM users", "DELETE"),
        ];
        for (sql, keyword) in cases {
            let err = validator().validate(sql).unwrap_err();
            assert!(err.to_string().to_uppercase().contains(keyword));
        }
    }

    #[test]
    fn rejects_empty_and_comment_only_sql() {
        for sql in ["", "   ", "-- just a comment"] {
            assert!(matches!(
                validator().validate(sql),
                Err(EngineError::SqlParseError(_))
            ));
        }
    }

    #[test]
    fn blocks_tables_case_insensitively_and_in_joins() {
        let v = validator().with_blocked_tables(vec!["secrets".to_string()]);
        assert!(v.validate("SELECT * FROM secrets").is_err());
        assert!(v.validate("SELECT * FROM SECRETS").is_err());
        assert!(v
            .validate("SELECT * FROM users JOIN secrets ON users.id = secrets.user_id")
            .is_err());
        assert!(v.validate("SELECT * FROM users").is_ok());
    }

    #[test]
    fn blocks_columns_including_qualified() {
        let v = validator().with_blocked_columns(vec!["password".to_string()]);
        assert!(v.validate("SELECT password FROM users").is_err());
        assert!(v.validate("SELECT users.password FROM users").is_err());
        assert!(v.validate("SELECT id FROM users").is_ok());
    }

    #[test]
    fn explain_policy() {
        let allowed = validator().allow_explain(true);
        assert!(allowed.validate("EXPLAIN SELECT * FROM users").is_ok());

        let denied = validator();
        let err = denied.validate("EXPLAIN SELECT * FROM users").unwrap_err();
        assert!(err.to_string().to_lowercase().contains("explain"));
    }
}
