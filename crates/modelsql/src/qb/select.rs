//! SELECT statement builder.
//!
//! Assembles clauses in a fixed order: `SELECT [DISTINCT] columns FROM table
//! [INNER JOIN ...] [WHERE ...] [GROUP BY ...] [ORDER BY ...] [LIMIT $n]
//! [OFFSET $n]`. LIMIT and OFFSET bind through placeholders like every other
//! value; a builder may itself be used as a comparison operand or an inlined
//! subquery inside another builder.

use crate::error::{ModelError, ModelResult};
use crate::qb::conditions::{ConditionsBuilder, Operand};
use crate::qb::param::ParamsBuilder;
use crate::qb::{EscapeFn, QueryBuilder, escape_identifier, escape_key};
use crate::value::SqlValue;

/// Sort direction for ORDER BY.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
}

impl OrderDir {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug)]
enum SelectColumn {
    Field(String),
    FieldAs(String, String),
    Aggregate {
        func: &'static str,
        field: String,
        alias: Option<String>,
    },
}

#[derive(Clone, Debug)]
struct Join {
    table: String,
    left_key: String,
    right_key: String,
}

#[derive(Clone, Debug)]
enum LimitPart {
    Count(i64),
    Query(Box<SelectBuilder>),
}

/// Fluent SELECT builder.
///
/// ```ignore
/// use modelsql::qb::SelectBuilder;
///
/// let query = SelectBuilder::new()
///     .from("city")
///     .select(&["name", "population"])
///     .where_("population", ">", 100_000)?
///     .order_by("name")
///     .limit(10);
/// let (sql, args) = query.to_sql()?;
/// ```
#[derive(Clone, Debug)]
pub struct SelectBuilder {
    table: Option<String>,
    columns: Vec<SelectColumn>,
    joins: Vec<Join>,
    distinct: bool,
    conditions: ConditionsBuilder,
    order: Vec<(String, OrderDir)>,
    group: Vec<String>,
    limit: Option<LimitPart>,
    offset: Option<LimitPart>,
    escape: EscapeFn,
}

impl Default for SelectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectBuilder {
    /// Create a builder using double-quote identifier escaping.
    pub fn new() -> Self {
        Self::with_escape(escape_identifier)
    }

    /// Create a builder with a custom identifier escape hook.
    pub fn with_escape(escape: EscapeFn) -> Self {
        Self {
            table: None,
            columns: Vec::new(),
            joins: Vec::new(),
            distinct: false,
            conditions: ConditionsBuilder::with_escape(escape),
            order: Vec::new(),
            group: Vec::new(),
            limit: None,
            offset: None,
            escape,
        }
    }

    /// Set the table to select from. Required before building.
    pub fn from(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    // ==================== SELECT columns ====================

    /// Append projection fields. With no fields selected, `*` is emitted.
    pub fn select(mut self, fields: &[&str]) -> Self {
        for field in fields {
            self.columns.push(SelectColumn::Field(field.to_string()));
        }
        self
    }

    /// Append one aliased field: `"field" AS "alias"`.
    pub fn select_as(mut self, field: &str, alias: &str) -> Self {
        self.columns
            .push(SelectColumn::FieldAs(field.to_string(), alias.to_string()));
        self
    }

    fn aggregate(mut self, func: &'static str, field: &str, alias: Option<&str>) -> Self {
        self.columns.push(SelectColumn::Aggregate {
            func,
            field: field.to_string(),
            alias: alias.map(str::to_string),
        });
        self
    }

    /// Append `count(field)`.
    pub fn count(self, field: &str) -> Self {
        self.aggregate("count", field, None)
    }

    /// Append `count(field) AS "alias"`.
    pub fn count_as(self, field: &str, alias: &str) -> Self {
        self.aggregate("count", field, Some(alias))
    }

    /// Append `avg(field)`.
    pub fn avg(self, field: &str) -> Self {
        self.aggregate("avg", field, None)
    }

    /// Append `avg(field) AS "alias"`.
    pub fn avg_as(self, field: &str, alias: &str) -> Self {
        self.aggregate("avg", field, Some(alias))
    }

    /// Append `min(field)`.
    pub fn min(self, field: &str) -> Self {
        self.aggregate("min", field, None)
    }

    /// Append `min(field) AS "alias"`.
    pub fn min_as(self, field: &str, alias: &str) -> Self {
        self.aggregate("min", field, Some(alias))
    }

    /// Append `max(field)`.
    pub fn max(self, field: &str) -> Self {
        self.aggregate("max", field, None)
    }

    /// Append `max(field) AS "alias"`.
    pub fn max_as(self, field: &str, alias: &str) -> Self {
        self.aggregate("max", field, Some(alias))
    }

    /// Append `sum(field)`.
    pub fn sum(self, field: &str) -> Self {
        self.aggregate("sum", field, None)
    }

    /// Append `sum(field) AS "alias"`.
    pub fn sum_as(self, field: &str, alias: &str) -> Self {
        self.aggregate("sum", field, Some(alias))
    }

    // ==================== JOIN / DISTINCT ====================

    /// Add `INNER JOIN table ON left_key = right_key`. Keys may be dotted.
    pub fn inner_join(mut self, table: &str, left_key: &str, right_key: &str) -> Self {
        self.joins.push(Join {
            table: table.to_string(),
            left_key: left_key.to_string(),
            right_key: right_key.to_string(),
        });
        self
    }

    /// Emit `SELECT DISTINCT`.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ==================== WHERE conditions ====================

    /// Add WHERE clause: `key op value` (AND-joined).
    pub fn where_(mut self, key: &str, op: &str, value: impl Into<Operand>) -> ModelResult<Self> {
        self.conditions = self.conditions.and(key, op, value)?;
        Ok(self)
    }

    /// Add WHERE clause joined with OR.
    pub fn or_where(mut self, key: &str, op: &str, value: impl Into<Operand>) -> ModelResult<Self> {
        self.conditions = self.conditions.or(key, op, value)?;
        Ok(self)
    }

    /// Add negated WHERE clause: `NOT key op value`.
    pub fn where_not(
        mut self,
        key: &str,
        op: &str,
        value: impl Into<Operand>,
    ) -> ModelResult<Self> {
        self.conditions = self.conditions.and_not(key, op, value)?;
        Ok(self)
    }

    /// Add negated WHERE clause joined with OR.
    pub fn or_where_not(
        mut self,
        key: &str,
        op: &str,
        value: impl Into<Operand>,
    ) -> ModelResult<Self> {
        self.conditions = self.conditions.or_not(key, op, value)?;
        Ok(self)
    }

    /// Add WHERE `key IS NULL`.
    pub fn where_null(mut self, key: &str) -> Self {
        self.conditions = self.conditions.null(key);
        self
    }

    /// Add WHERE `key IS NOT NULL`.
    pub fn where_not_null(mut self, key: &str) -> Self {
        self.conditions = self.conditions.not_null(key);
        self
    }

    /// Add WHERE `key IN (values...)`.
    pub fn where_in<T: Into<SqlValue>>(mut self, key: &str, values: Vec<T>) -> Self {
        self.conditions = self.conditions.in_list(key, values);
        self
    }

    /// Add WHERE `key NOT IN (values...)`.
    pub fn where_not_in<T: Into<SqlValue>>(mut self, key: &str, values: Vec<T>) -> Self {
        self.conditions = self.conditions.not_in(key, values);
        self
    }

    /// Add WHERE `key IN (SELECT ...)`.
    pub fn where_in_query(mut self, key: &str, query: SelectBuilder) -> Self {
        self.conditions = self.conditions.in_query(key, query);
        self
    }

    /// Add WHERE `key = ANY ($n)`.
    pub fn where_any(mut self, key: &str, value: impl Into<SqlValue>) -> Self {
        self.conditions = self.conditions.any(key, value);
        self
    }

    /// Add WHERE `EXISTS (SELECT ...)`.
    pub fn where_exists(mut self, query: SelectBuilder) -> Self {
        self.conditions = self.conditions.exists(query);
        self
    }

    /// Add WHERE `key BETWEEN from AND to`.
    pub fn where_between(
        mut self,
        key: &str,
        from: impl Into<Operand>,
        to: impl Into<Operand>,
    ) -> Self {
        self.conditions = self.conditions.between(key, from, to, false);
        self
    }

    /// Add WHERE `key BETWEEN SYMMETRIC from AND to`.
    pub fn where_between_symmetric(
        mut self,
        key: &str,
        from: impl Into<Operand>,
        to: impl Into<Operand>,
    ) -> Self {
        self.conditions = self.conditions.between(key, from, to, true);
        self
    }

    /// Add WHERE `key NOT BETWEEN from AND to`.
    pub fn where_not_between(
        mut self,
        key: &str,
        from: impl Into<Operand>,
        to: impl Into<Operand>,
    ) -> Self {
        self.conditions = self.conditions.not_between(key, from, to, false);
        self
    }

    /// Add a parenthesized WHERE sub-expression (AND-joined).
    pub fn where_group<F>(mut self, f: F) -> ModelResult<Self>
    where
        F: FnOnce(ConditionsBuilder) -> ModelResult<ConditionsBuilder>,
    {
        self.conditions = self.conditions.and_group(f)?;
        Ok(self)
    }

    /// Add a parenthesized WHERE sub-expression joined with OR.
    pub fn or_where_group<F>(mut self, f: F) -> ModelResult<Self>
    where
        F: FnOnce(ConditionsBuilder) -> ModelResult<ConditionsBuilder>,
    {
        self.conditions = self.conditions.or_group(f)?;
        Ok(self)
    }

    // ==================== Ordering / Grouping / Pagination ====================

    /// Add `ORDER BY key ASC`.
    pub fn order_by(mut self, key: &str) -> Self {
        self.order.push((key.to_string(), OrderDir::Asc));
        self
    }

    /// Add `ORDER BY key DESC`.
    pub fn order_by_desc(mut self, key: &str) -> Self {
        self.order.push((key.to_string(), OrderDir::Desc));
        self
    }

    /// Append GROUP BY fields.
    pub fn group_by(mut self, fields: &[&str]) -> Self {
        for field in fields {
            self.group.push(field.to_string());
        }
        self
    }

    /// Set LIMIT; the count binds as a placeholder.
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(LimitPart::Count(n));
        self
    }

    /// Set LIMIT from a subquery.
    pub fn limit_query(mut self, query: SelectBuilder) -> Self {
        self.limit = Some(LimitPart::Query(Box::new(query)));
        self
    }

    /// Set OFFSET; the count binds as a placeholder.
    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(LimitPart::Count(n));
        self
    }

    /// Set OFFSET from a subquery.
    pub fn offset_query(mut self, query: SelectBuilder) -> Self {
        self.offset = Some(LimitPart::Query(Box::new(query)));
        self
    }

    // ==================== Build ====================

    fn column_sql(&self, column: &SelectColumn) -> String {
        match column {
            SelectColumn::Field(field) => escape_key(field, self.escape),
            SelectColumn::FieldAs(field, alias) => format!(
                "{} AS {}",
                escape_key(field, self.escape),
                (self.escape)(alias)
            ),
            SelectColumn::Aggregate { func, field, alias } => {
                let call = format!("{}({})", func, escape_key(field, self.escape));
                match alias {
                    Some(alias) => format!("{} AS {}", call, (self.escape)(alias)),
                    None => call,
                }
            }
        }
    }

    fn limit_sql(
        &self,
        keyword: &str,
        part: &LimitPart,
        params: &mut ParamsBuilder,
    ) -> ModelResult<String> {
        match part {
            LimitPart::Count(n) => Ok(format!(" {} {}", keyword, params.add(*n))),
            LimitPart::Query(query) => Ok(format!(" {} ({})", keyword, query.build(params)?)),
        }
    }

    /// Build into `(sql, args)` with a fresh parameter list.
    pub fn to_sql(&self) -> ModelResult<(String, Vec<SqlValue>)> {
        let mut params = ParamsBuilder::new();
        let sql = self.build(&mut params)?;
        Ok((sql, params.build()))
    }
}

impl QueryBuilder for SelectBuilder {
    fn build(&self, params: &mut ParamsBuilder) -> ModelResult<String> {
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| ModelError::builder("tableName is not defined"))?;

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<String> = self.columns.iter().map(|c| self.column_sql(c)).collect();
            sql.push_str(&cols.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&escape_key(table, self.escape));

        for join in &self.joins {
            sql.push_str(" INNER JOIN ");
            sql.push_str(&escape_key(&join.table, self.escape));
            sql.push_str(" ON ");
            sql.push_str(&escape_key(&join.left_key, self.escape));
            sql.push_str(" = ");
            sql.push_str(&escape_key(&join.right_key, self.escape));
        }

        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.build(params)?);
        }

        if !self.group.is_empty() {
            let fields: Vec<String> = self
                .group
                .iter()
                .map(|f| escape_key(f, self.escape))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&fields.join(", "));
        }

        if !self.order.is_empty() {
            let fields: Vec<String> = self
                .order
                .iter()
                .map(|(f, dir)| format!("{} {}", escape_key(f, self.escape), dir.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&fields.join(", "));
        }

        if let Some(limit) = &self.limit {
            sql.push_str(&self.limit_sql("LIMIT", limit, params)?);
        }
        if let Some(offset) = &self.offset {
            sql.push_str(&self.limit_sql("OFFSET", offset, params)?);
        }

        Ok(sql)
    }
}
