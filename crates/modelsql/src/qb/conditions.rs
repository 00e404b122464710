//! Boolean condition list builder for WHERE fragments.
//!
//! Conditions are kept as an ordered clause list and rendered left to right,
//! joined with ` AND `/` OR ` by each clause's own flag. There is no implicit
//! precedence grouping; nested groups and subqueries render parenthesized.

use crate::error::{ModelError, ModelResult};
use crate::qb::param::ParamsBuilder;
use crate::qb::select::SelectBuilder;
use crate::qb::{EscapeFn, QueryBuilder, escape_identifier, escape_key};
use crate::value::SqlValue;

/// Allowed comparison operators.
///
/// Parsed from the user-facing operator string; anything outside the
/// allowlist is rejected with [`ModelError::Operator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CondOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    Is,
    IsNot,
    IsDistinct,
    In,
    NotIn,
    Any,
    Between,
    BetweenSymmetric,
    NotBetween,
    NotBetweenSymmetric,
    Exists,
}

impl CondOperator {
    /// Parse an operator string, uppercasing word operators.
    ///
    /// `!=` normalizes to `<>`. `ANY` and `IS NOT` are reachable only
    /// through their dedicated builder methods, never from user strings.
    pub fn parse(op: &str) -> ModelResult<Self> {
        match op.trim().to_uppercase().as_str() {
            "=" => Ok(Self::Eq),
            "<>" | "!=" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "LIKE" => Ok(Self::Like),
            "IS" => Ok(Self::Is),
            "IS DISTINCT" => Ok(Self::IsDistinct),
            "IN" => Ok(Self::In),
            "NOT IN" => Ok(Self::NotIn),
            "BETWEEN" => Ok(Self::Between),
            "BETWEEN SYMMETRIC" => Ok(Self::BetweenSymmetric),
            "NOT BETWEEN" => Ok(Self::NotBetween),
            "NOT BETWEEN SYMMETRIC" => Ok(Self::NotBetweenSymmetric),
            "EXISTS" => Ok(Self::Exists),
            _ => Err(ModelError::operator(op)),
        }
    }

    /// The SQL token for this operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
            Self::IsDistinct => "IS DISTINCT",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Any => "= ANY",
            Self::Between => "BETWEEN",
            Self::BetweenSymmetric => "BETWEEN SYMMETRIC",
            Self::NotBetween => "NOT BETWEEN",
            Self::NotBetweenSymmetric => "NOT BETWEEN SYMMETRIC",
            Self::Exists => "EXISTS",
        }
    }
}

/// A comparison operand: a plain value or an inlined sub-select.
#[derive(Clone, Debug)]
pub enum Operand {
    Value(SqlValue),
    Query(SelectBuilder),
}

macro_rules! operand_from_value {
    ($($t:ty),+ $(,)?) => {$(
        impl From<$t> for Operand {
            fn from(v: $t) -> Self {
                Operand::Value(v.into())
            }
        }
    )+};
}

operand_from_value!(
    bool,
    i16,
    i32,
    i64,
    u32,
    f32,
    f64,
    &str,
    String,
    SqlValue,
    chrono::DateTime<chrono::Utc>,
    uuid::Uuid,
);

impl From<SelectBuilder> for Operand {
    fn from(query: SelectBuilder) -> Self {
        Operand::Query(query)
    }
}

#[derive(Clone, Debug)]
enum ClauseValue {
    Value(SqlValue),
    List(Vec<SqlValue>),
    Range(Operand, Operand),
    Query(SelectBuilder),
    Group(ConditionsBuilder),
}

#[derive(Clone, Debug)]
struct Clause {
    key: Option<String>,
    op: Option<CondOperator>,
    value: ClauseValue,
    not: bool,
    or: bool,
}

/// Ordered boolean condition list.
///
/// ```ignore
/// use modelsql::qb::ConditionsBuilder;
///
/// let cond = ConditionsBuilder::new()
///     .and("city", "=", "Rome")?
///     .or("city", "=", "Berlin")?;
/// ```
#[derive(Clone, Debug)]
pub struct ConditionsBuilder {
    clauses: Vec<Clause>,
    escape: EscapeFn,
}

impl Default for ConditionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionsBuilder {
    /// Create a builder using double-quote identifier escaping.
    pub fn new() -> Self {
        Self::with_escape(escape_identifier)
    }

    /// Create a builder with a custom identifier escape hook.
    pub fn with_escape(escape: EscapeFn) -> Self {
        Self {
            clauses: Vec::new(),
            escape,
        }
    }

    /// Check if no clauses were added.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Number of clauses.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    fn push(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    fn compare(
        self,
        key: &str,
        op: &str,
        operand: Operand,
        not: bool,
        or: bool,
    ) -> ModelResult<Self> {
        let op = CondOperator::parse(op)?;
        let value = match operand {
            Operand::Value(v) => ClauseValue::Value(v),
            Operand::Query(q) => ClauseValue::Query(q),
        };
        Ok(self.push(Clause {
            key: Some(key.to_string()),
            op: Some(op),
            value,
            not,
            or,
        }))
    }

    /// Add an AND clause: `key op value`.
    pub fn and(self, key: &str, op: &str, value: impl Into<Operand>) -> ModelResult<Self> {
        self.compare(key, op, value.into(), false, false)
    }

    /// Add an OR clause: `key op value`.
    pub fn or(self, key: &str, op: &str, value: impl Into<Operand>) -> ModelResult<Self> {
        self.compare(key, op, value.into(), false, true)
    }

    /// Add a negated AND clause: `NOT key op value`.
    pub fn and_not(self, key: &str, op: &str, value: impl Into<Operand>) -> ModelResult<Self> {
        self.compare(key, op, value.into(), true, false)
    }

    /// Add a negated OR clause: `NOT key op value`.
    pub fn or_not(self, key: &str, op: &str, value: impl Into<Operand>) -> ModelResult<Self> {
        self.compare(key, op, value.into(), true, true)
    }

    fn null_check(self, key: &str, op: CondOperator, or: bool) -> Self {
        self.push(Clause {
            key: Some(key.to_string()),
            op: Some(op),
            value: ClauseValue::Value(SqlValue::Null),
            not: false,
            or,
        })
    }

    /// `key IS NULL`
    pub fn null(self, key: &str) -> Self {
        self.null_check(key, CondOperator::Is, false)
    }

    /// `OR key IS NULL`
    pub fn or_null(self, key: &str) -> Self {
        self.null_check(key, CondOperator::Is, true)
    }

    /// `key IS NOT NULL`
    pub fn not_null(self, key: &str) -> Self {
        self.null_check(key, CondOperator::IsNot, false)
    }

    /// `OR key IS NOT NULL`
    pub fn or_not_null(self, key: &str) -> Self {
        self.null_check(key, CondOperator::IsNot, true)
    }

    fn range(
        self,
        key: &str,
        from: Operand,
        to: Operand,
        symmetric: bool,
        not: bool,
        or: bool,
    ) -> Self {
        let op = match (not, symmetric) {
            (false, false) => CondOperator::Between,
            (false, true) => CondOperator::BetweenSymmetric,
            (true, false) => CondOperator::NotBetween,
            (true, true) => CondOperator::NotBetweenSymmetric,
        };
        self.push(Clause {
            key: Some(key.to_string()),
            op: Some(op),
            value: ClauseValue::Range(from, to),
            not: false,
            or,
        })
    }

    /// `key BETWEEN from AND to` (`BETWEEN SYMMETRIC` when `symmetric`).
    pub fn between(
        self,
        key: &str,
        from: impl Into<Operand>,
        to: impl Into<Operand>,
        symmetric: bool,
    ) -> Self {
        self.range(key, from.into(), to.into(), symmetric, false, false)
    }

    /// `OR key BETWEEN from AND to`
    pub fn or_between(
        self,
        key: &str,
        from: impl Into<Operand>,
        to: impl Into<Operand>,
        symmetric: bool,
    ) -> Self {
        self.range(key, from.into(), to.into(), symmetric, false, true)
    }

    /// `key NOT BETWEEN from AND to`
    pub fn not_between(
        self,
        key: &str,
        from: impl Into<Operand>,
        to: impl Into<Operand>,
        symmetric: bool,
    ) -> Self {
        self.range(key, from.into(), to.into(), symmetric, true, false)
    }

    /// `OR key NOT BETWEEN from AND to`
    pub fn or_not_between(
        self,
        key: &str,
        from: impl Into<Operand>,
        to: impl Into<Operand>,
        symmetric: bool,
    ) -> Self {
        self.range(key, from.into(), to.into(), symmetric, true, true)
    }

    fn list(self, key: &str, op: CondOperator, values: Vec<SqlValue>, or: bool) -> Self {
        self.push(Clause {
            key: Some(key.to_string()),
            op: Some(op),
            value: ClauseValue::List(values),
            not: false,
            or,
        })
    }

    /// `key IN ($1, $2, ...)`; an empty list renders `IN ()`.
    pub fn in_list<T: Into<SqlValue>>(self, key: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.list(key, CondOperator::In, values, false)
    }

    /// `OR key IN ($1, $2, ...)`
    pub fn or_in<T: Into<SqlValue>>(self, key: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.list(key, CondOperator::In, values, true)
    }

    /// `key NOT IN ($1, $2, ...)`
    pub fn not_in<T: Into<SqlValue>>(self, key: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.list(key, CondOperator::NotIn, values, false)
    }

    /// `OR key NOT IN ($1, $2, ...)`
    pub fn or_not_in<T: Into<SqlValue>>(self, key: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.list(key, CondOperator::NotIn, values, true)
    }

    fn sub_query(self, key: Option<&str>, op: CondOperator, query: SelectBuilder, or: bool) -> Self {
        self.push(Clause {
            key: key.map(str::to_string),
            op: Some(op),
            value: ClauseValue::Query(query),
            not: false,
            or,
        })
    }

    /// `key IN (SELECT ...)`
    pub fn in_query(self, key: &str, query: SelectBuilder) -> Self {
        self.sub_query(Some(key), CondOperator::In, query, false)
    }

    /// `key NOT IN (SELECT ...)`
    pub fn not_in_query(self, key: &str, query: SelectBuilder) -> Self {
        self.sub_query(Some(key), CondOperator::NotIn, query, false)
    }

    /// `key = ANY ($1)`; the value binds as a single array parameter.
    pub fn any(self, key: &str, value: impl Into<SqlValue>) -> Self {
        self.push(Clause {
            key: Some(key.to_string()),
            op: Some(CondOperator::Any),
            value: ClauseValue::Value(value.into()),
            not: false,
            or: false,
        })
    }

    /// `OR key = ANY ($1)`
    pub fn or_any(self, key: &str, value: impl Into<SqlValue>) -> Self {
        self.push(Clause {
            key: Some(key.to_string()),
            op: Some(CondOperator::Any),
            value: ClauseValue::Value(value.into()),
            not: false,
            or: true,
        })
    }

    /// `EXISTS (SELECT ...)`
    pub fn exists(self, query: SelectBuilder) -> Self {
        self.sub_query(None, CondOperator::Exists, query, false)
    }

    /// `OR EXISTS (SELECT ...)`
    pub fn or_exists(self, query: SelectBuilder) -> Self {
        self.sub_query(None, CondOperator::Exists, query, true)
    }

    fn group<F>(self, f: F, or: bool) -> ModelResult<Self>
    where
        F: FnOnce(ConditionsBuilder) -> ModelResult<ConditionsBuilder>,
    {
        let inner = f(ConditionsBuilder::with_escape(self.escape))?;
        Ok(self.push(Clause {
            key: None,
            op: None,
            value: ClauseValue::Group(inner),
            not: false,
            or,
        }))
    }

    /// Add a parenthesized sub-expression joined with AND.
    pub fn and_group<F>(self, f: F) -> ModelResult<Self>
    where
        F: FnOnce(ConditionsBuilder) -> ModelResult<ConditionsBuilder>,
    {
        self.group(f, false)
    }

    /// Add a parenthesized sub-expression joined with OR.
    pub fn or_group<F>(self, f: F) -> ModelResult<Self>
    where
        F: FnOnce(ConditionsBuilder) -> ModelResult<ConditionsBuilder>,
    {
        self.group(f, true)
    }

    fn operand_sql(operand: &Operand, params: &mut ParamsBuilder) -> ModelResult<String> {
        match operand {
            Operand::Value(v) => Ok(params.add(v.clone())),
            Operand::Query(q) => Ok(format!("({})", q.build(params)?)),
        }
    }
}

impl QueryBuilder for ConditionsBuilder {
    fn build(&self, params: &mut ParamsBuilder) -> ModelResult<String> {
        let mut sql = String::new();
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                sql.push_str(if clause.or { " OR " } else { " AND " });
            }
            if clause.not {
                sql.push_str("NOT ");
            }
            if let Some(key) = &clause.key {
                sql.push_str(&escape_key(key, self.escape));
                sql.push(' ');
            }
            match (&clause.op, &clause.value) {
                (None, ClauseValue::Group(group)) => {
                    sql.push('(');
                    sql.push_str(&group.build(params)?);
                    sql.push(')');
                }
                (
                    Some(op @ (CondOperator::Is | CondOperator::IsNot)),
                    ClauseValue::Value(SqlValue::Null),
                ) => {
                    sql.push_str(op.as_sql());
                    sql.push_str(" NULL");
                }
                (Some(CondOperator::Any), ClauseValue::Value(v)) => {
                    sql.push_str("= ANY (");
                    sql.push_str(&params.add(v.clone()));
                    sql.push(')');
                }
                (Some(op @ (CondOperator::In | CondOperator::NotIn)), ClauseValue::List(items)) => {
                    let placeholders: Vec<String> =
                        items.iter().map(|v| params.add(v.clone())).collect();
                    sql.push_str(op.as_sql());
                    sql.push_str(" (");
                    sql.push_str(&placeholders.join(", "));
                    sql.push(')');
                }
                (Some(op), ClauseValue::Range(from, to)) => {
                    let from_sql = Self::operand_sql(from, params)?;
                    let to_sql = Self::operand_sql(to, params)?;
                    sql.push_str(op.as_sql());
                    sql.push(' ');
                    sql.push_str(&from_sql);
                    sql.push_str(" AND ");
                    sql.push_str(&to_sql);
                }
                (Some(op), ClauseValue::Query(query)) => {
                    sql.push_str(op.as_sql());
                    sql.push_str(" (");
                    sql.push_str(&query.build(params)?);
                    sql.push(')');
                }
                (Some(op), ClauseValue::Value(v)) => {
                    sql.push_str(op.as_sql());
                    sql.push(' ');
                    sql.push_str(&params.add(v.clone()));
                }
                _ => return Err(ModelError::builder("malformed condition clause")),
            }
        }
        Ok(sql)
    }
}
