//! A minimal SELECT builder.
//!
//! `SelectQuery` composes a single-table SELECT with joins, filters,
//! ordering and a limit, and compiles to a [`SqlStatement`] with positional
//! `?` binds. It is what [`ResultMapper::to_structs`](crate::ResultMapper::to_structs)
//! loads.

use crate::db::{SqlStatement, Value};

/// A composable SELECT over one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    table: String,
    selects: Vec<String>,
    joins: Vec<String>,
    filters: Vec<String>,
    binds: Vec<Value>,
    order: Vec<String>,
    limit: Option<u64>,
}

impl SelectQuery {
    /// Starts a query over `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Appends select expressions.
    pub fn select<I, S>(mut self, exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selects.extend(exprs.into_iter().map(Into::into));
        self
    }

    /// Appends a join clause, e.g. `INNER JOIN schools ON ...`.
    pub fn join(mut self, clause: impl Into<String>) -> Self {
        self.joins.push(clause.into());
        self
    }

    /// Appends a filter condition with its `?` binds. Filters are ANDed.
    pub fn filter<V: Into<Value>>(mut self, condition: impl Into<String>, binds: Vec<V>) -> Self {
        self.filters.push(condition.into());
        self.binds.extend(binds.into_iter().map(Into::into));
        self
    }

    /// Appends an equality filter on `column`.
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(format!("{column} = ?"), vec![value.into()])
    }

    /// Appends an ordering expression.
    pub fn order_by(mut self, expr: impl Into<String>) -> Self {
        self.order.push(expr.into());
        self
    }

    /// Limits the number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The explicit select list; empty means `SELECT *`.
    pub fn select_values(&self) -> &[String] {
        &self.selects
    }

    /// Compiles the query.
    pub fn to_statement(&self) -> SqlStatement {
        let selects = if self.selects.is_empty() {
            "*".to_string()
        } else {
            self.selects.join(", ")
        };

        let mut sql = format!("SELECT {selects} FROM {}", self.table);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.filters.is_empty() {
            let conditions: Vec<String> = self.filters.iter().map(|f| format!("({f})")).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        SqlStatement {
            sql,
            binds: self.binds.clone(),
        }
    }
}
