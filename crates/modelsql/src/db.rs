//! Runtime façade over an execution channel.
//!
//! Queries are two-phase: [`Query::prepare`]/[`Modify::prepare`] are pure and
//! return the final `(sql, args)` pair; `execute` sends a prepared statement
//! through an [`ExecutionChannel`]. The channel is injected, so the whole
//! façade can be exercised against a mock without a server.

use crate::error::{ModelError, ModelResult};
use crate::qb::conditions::ConditionsBuilder;
use crate::qb::param::ParamsBuilder;
use crate::qb::select::SelectBuilder;
use crate::qb::{QueryBuilder, escape_identifier};
use crate::value::SqlValue;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::debug;

/// One result row, keyed by column name.
pub type RowData = BTreeMap<String, SqlValue>;

/// A record of named values: insert payloads, update deltas, condition sets,
/// statement parameters.
pub type Record = BTreeMap<String, SqlValue>;

/// Transport abstraction for statement execution.
pub trait ExecutionChannel: Send + Sync {
    /// Run one parameterized statement and return its rows.
    fn execute(
        &self,
        sql: &str,
        args: &[SqlValue],
    ) -> impl Future<Output = ModelResult<Vec<RowData>>> + Send;

    /// Run a multi-statement script without parameters.
    fn run_script(&self, sql: &str) -> impl Future<Output = ModelResult<()>> + Send;
}

/// A fully built statement: final SQL and bound values.
#[derive(Clone, Debug, PartialEq)]
pub struct Prepared {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

/// Interpret a record condition value: string values may carry an operator
/// prefix (`">=10"`) or wildcards (`*` → `%`, `?` → `_`, compared with LIKE);
/// everything else compares with `=`.
fn parse_record_value(value: &SqlValue) -> (&'static str, SqlValue) {
    if let SqlValue::Str(s) = value {
        for op in [">=", "<=", "<>", "!=", ">", "<", "="] {
            if let Some(rest) = s.strip_prefix(op) {
                return (op, SqlValue::Str(rest.trim().to_string()));
            }
        }
        if s.contains('*') || s.contains('?') {
            let pattern = s.replace('*', "%").replace('?', "_");
            return ("LIKE", SqlValue::Str(pattern));
        }
    }
    ("=", value.clone())
}

fn record_conditions(conditions: &Record) -> ModelResult<ConditionsBuilder> {
    let mut cb = ConditionsBuilder::new();
    for (key, value) in conditions {
        let (op, value) = parse_record_value(value);
        cb = cb.and(key, op, value)?;
    }
    Ok(cb)
}

/// A prepared SELECT over one table.
#[derive(Clone, Debug)]
pub struct Query {
    select: SelectBuilder,
}

impl Query {
    /// Build a query from a field list and a condition record. Pass an empty
    /// field list (or `["*"]`) to select everything.
    pub fn new(table: &str, fields: &[&str], conditions: &Record) -> ModelResult<Self> {
        let mut select = SelectBuilder::new().from(table).select(fields);
        for (key, value) in conditions {
            let (op, value) = parse_record_value(value);
            select = select.where_(key, op, value)?;
        }
        Ok(Self { select })
    }

    /// Add `ORDER BY key ASC`.
    pub fn order(mut self, key: &str) -> Self {
        self.select = self.select.order_by(key);
        self
    }

    /// Add `ORDER BY key DESC`.
    pub fn desc(mut self, key: &str) -> Self {
        self.select = self.select.order_by_desc(key);
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: i64) -> Self {
        self.select = self.select.limit(n);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: i64) -> Self {
        self.select = self.select.offset(n);
        self
    }

    /// Build the final SQL and arguments without executing.
    pub fn prepare(&self) -> ModelResult<Prepared> {
        let (sql, args) = self.select.to_sql()?;
        Ok(Prepared { sql, args })
    }

    /// Execute through a channel and return the rows.
    pub async fn execute<C: ExecutionChannel>(&self, channel: &C) -> ModelResult<Vec<RowData>> {
        let prepared = self.prepare()?;
        debug!(sql = %prepared.sql, "execute query");
        channel.execute(&prepared.sql, &prepared.args).await
    }
}

#[derive(Clone, Debug)]
enum ModifyOp {
    Insert { record: Record },
    Update { delta: Record, conditions: ConditionsBuilder },
    Delete { conditions: ConditionsBuilder },
}

/// A prepared INSERT, UPDATE, or DELETE. Always returns the affected rows
/// (`RETURNING *`).
#[derive(Clone, Debug)]
pub struct Modify {
    table: String,
    op: ModifyOp,
}

impl Modify {
    /// `INSERT INTO table (...) VALUES (...)`.
    pub fn insert(table: &str, record: Record) -> Self {
        Self {
            table: table.to_string(),
            op: ModifyOp::Insert { record },
        }
    }

    /// `UPDATE table SET ... WHERE ...`. The condition record is required.
    pub fn update(table: &str, delta: Record, conditions: &Record) -> ModelResult<Self> {
        Ok(Self {
            table: table.to_string(),
            op: ModifyOp::Update {
                delta,
                conditions: record_conditions(conditions)?,
            },
        })
    }

    /// `DELETE FROM table WHERE ...`. The condition record is required.
    pub fn delete(table: &str, conditions: &Record) -> ModelResult<Self> {
        Ok(Self {
            table: table.to_string(),
            op: ModifyOp::Delete {
                conditions: record_conditions(conditions)?,
            },
        })
    }

    /// Build the final SQL and arguments without executing.
    pub fn prepare(&self) -> ModelResult<Prepared> {
        let table = escape_identifier(&self.table);
        let mut params = ParamsBuilder::new();
        let sql = match &self.op {
            ModifyOp::Insert { record } => {
                if record.is_empty() {
                    return Err(ModelError::builder("insert requires at least one field"));
                }
                let mut columns = Vec::with_capacity(record.len());
                let mut placeholders = Vec::with_capacity(record.len());
                for (key, value) in record {
                    columns.push(escape_identifier(key));
                    placeholders.push(params.add(value.clone()));
                }
                format!(
                    "INSERT INTO {table} ({}) VALUES ({}) RETURNING *",
                    columns.join(", "),
                    placeholders.join(", ")
                )
            }
            ModifyOp::Update { delta, conditions } => {
                if delta.is_empty() {
                    return Err(ModelError::builder("update requires at least one field"));
                }
                if conditions.is_empty() {
                    return Err(ModelError::builder("update requires conditions"));
                }
                let sets: Vec<String> = delta
                    .iter()
                    .map(|(key, value)| {
                        format!("{} = {}", escape_identifier(key), params.add(value.clone()))
                    })
                    .collect();
                let where_sql = conditions.build(&mut params)?;
                format!(
                    "UPDATE {table} SET {} WHERE {} RETURNING *",
                    sets.join(", "),
                    where_sql
                )
            }
            ModifyOp::Delete { conditions } => {
                if conditions.is_empty() {
                    return Err(ModelError::builder("delete requires conditions"));
                }
                let where_sql = conditions.build(&mut params)?;
                format!("DELETE FROM {table} WHERE {} RETURNING *", where_sql)
            }
        };
        Ok(Prepared {
            sql,
            args: params.build(),
        })
    }

    /// Execute through a channel and return the affected rows.
    pub async fn execute<C: ExecutionChannel>(&self, channel: &C) -> ModelResult<Vec<RowData>> {
        let prepared = self.prepare()?;
        debug!(sql = %prepared.sql, "execute modify");
        channel.execute(&prepared.sql, &prepared.args).await
    }
}

/// Raw SQL with `:name` placeholders, resolved against a parameter record
/// into positional binds at call time. `::` (a cast) is left untouched;
/// a repeated name reuses its placeholder.
#[derive(Clone, Debug)]
pub struct Statement {
    sql: String,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    /// Resolve named placeholders into a positional [`Prepared`] statement.
    pub fn prepare(&self, params: &Record) -> ModelResult<Prepared> {
        let mut out = String::with_capacity(self.sql.len());
        let mut args: Vec<SqlValue> = Vec::new();
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        let mut it = self.sql.chars().peekable();
        while let Some(c) = it.next() {
            if c != ':' {
                out.push(c);
                continue;
            }
            if it.peek() == Some(&':') {
                it.next();
                out.push_str("::");
                continue;
            }
            let mut name = String::new();
            while let Some(&next) = it.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    name.push(next);
                    it.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push(':');
                continue;
            }
            let index = match seen.get(&name) {
                Some(index) => *index,
                None => {
                    let value = params.get(&name).ok_or_else(|| {
                        ModelError::builder(format!("parameter \"{name}\" is not provided"))
                    })?;
                    args.push(value.clone());
                    seen.insert(name, args.len());
                    args.len()
                }
            };
            out.push('$');
            out.push_str(&index.to_string());
        }
        Ok(Prepared { sql: out, args })
    }

    /// Execute through a channel and return the rows.
    pub async fn execute<C: ExecutionChannel>(
        &self,
        channel: &C,
        params: &Record,
    ) -> ModelResult<Vec<RowData>> {
        let prepared = self.prepare(params)?;
        debug!(sql = %prepared.sql, "execute statement");
        channel.execute(&prepared.sql, &prepared.args).await
    }

    /// First row, if any.
    pub async fn row<C: ExecutionChannel>(
        &self,
        channel: &C,
        params: &Record,
    ) -> ModelResult<Option<RowData>> {
        let mut rows = self.execute(channel, params).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Named column of the first row, if any.
    pub async fn scalar<C: ExecutionChannel>(
        &self,
        channel: &C,
        params: &Record,
        column: &str,
    ) -> ModelResult<Option<SqlValue>> {
        let row = self.row(channel, params).await?;
        Ok(row.and_then(|mut r| r.remove(column)))
    }

    /// Named column of every row.
    pub async fn col<C: ExecutionChannel>(
        &self,
        channel: &C,
        params: &Record,
        column: &str,
    ) -> ModelResult<Vec<SqlValue>> {
        let rows = self.execute(channel, params).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut r| r.remove(column))
            .collect())
    }

    /// Key/value map over two columns of the result rows.
    pub async fn dict<C: ExecutionChannel>(
        &self,
        channel: &C,
        params: &Record,
        key_column: &str,
        value_column: &str,
    ) -> ModelResult<BTreeMap<String, SqlValue>> {
        let rows = self.execute(channel, params).await?;
        let mut dict = BTreeMap::new();
        for mut row in rows {
            let Some(key) = row.remove(key_column) else {
                continue;
            };
            let value = row.remove(value_column).unwrap_or(SqlValue::Null);
            dict.insert(value_key(&key), value);
        }
        Ok(dict)
    }

    /// Number of result rows.
    pub async fn count<C: ExecutionChannel>(
        &self,
        channel: &C,
        params: &Record,
    ) -> ModelResult<i64> {
        let rows = self.execute(channel, params).await?;
        Ok(rows.len() as i64)
    }
}

fn value_key(value: &SqlValue) -> String {
    match value {
        SqlValue::Str(s) => s.clone(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Bool(b) => b.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Uuid(u) => u.to_string(),
        other => format!("{other:?}"),
    }
}

/// High-level entry point owning an execution channel.
pub struct Database<C: ExecutionChannel> {
    channel: C,
}

impl<C: ExecutionChannel> Database<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Borrow the underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Run raw parameterized SQL.
    pub async fn query(&self, sql: &str, args: &[SqlValue]) -> ModelResult<Vec<RowData>> {
        debug!(sql, "execute raw");
        self.channel.execute(sql, args).await
    }

    /// Build a [`Query`] for chaining order/limit/offset.
    pub fn select(&self, table: &str, fields: &[&str], conditions: &Record) -> ModelResult<Query> {
        Query::new(table, fields, conditions)
    }

    /// All matching rows.
    pub async fn rows(
        &self,
        table: &str,
        fields: &[&str],
        conditions: &Record,
    ) -> ModelResult<Vec<RowData>> {
        Query::new(table, fields, conditions)?
            .execute(&self.channel)
            .await
    }

    /// First matching row, if any.
    pub async fn row(
        &self,
        table: &str,
        fields: &[&str],
        conditions: &Record,
    ) -> ModelResult<Option<RowData>> {
        let mut rows = self.rows(table, fields, conditions).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Single field of the first matching row, if any.
    pub async fn scalar(
        &self,
        table: &str,
        field: &str,
        conditions: &Record,
    ) -> ModelResult<Option<SqlValue>> {
        let row = self.row(table, &[field], conditions).await?;
        Ok(row.and_then(|mut r| r.remove(field)))
    }

    /// Single field of every matching row.
    pub async fn col(
        &self,
        table: &str,
        field: &str,
        conditions: &Record,
    ) -> ModelResult<Vec<SqlValue>> {
        let rows = self.rows(table, &[field], conditions).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut r| r.remove(field))
            .collect())
    }

    /// Key/value map over two fields of the matching rows.
    pub async fn dict(
        &self,
        table: &str,
        key_field: &str,
        value_field: &str,
        conditions: &Record,
    ) -> ModelResult<BTreeMap<String, SqlValue>> {
        let rows = self.rows(table, &[key_field, value_field], conditions).await?;
        let mut dict = BTreeMap::new();
        for mut row in rows {
            let Some(key) = row.remove(key_field) else {
                continue;
            };
            let value = row.remove(value_field).unwrap_or(SqlValue::Null);
            dict.insert(value_key(&key), value);
        }
        Ok(dict)
    }

    /// `SELECT count(*)` over the matching rows.
    pub async fn count(&self, table: &str, conditions: &Record) -> ModelResult<i64> {
        let mut select = SelectBuilder::new().from(table).count("*");
        for (key, value) in conditions {
            let (op, value) = parse_record_value(value);
            select = select.where_(key, op, value)?;
        }
        let (sql, args) = select.to_sql()?;
        let rows = self.channel.execute(&sql, &args).await?;
        let count = rows
            .first()
            .and_then(|r| r.get("count"))
            .and_then(SqlValue::as_int)
            .unwrap_or(0);
        Ok(count)
    }

    /// Insert one record, returning the inserted rows.
    pub async fn insert(&self, table: &str, record: Record) -> ModelResult<Vec<RowData>> {
        Modify::insert(table, record).execute(&self.channel).await
    }

    /// Update matching rows, returning the updated rows.
    pub async fn update(
        &self,
        table: &str,
        delta: Record,
        conditions: &Record,
    ) -> ModelResult<Vec<RowData>> {
        Modify::update(table, delta, conditions)?
            .execute(&self.channel)
            .await
    }

    /// Delete matching rows, returning the deleted rows.
    pub async fn delete(&self, table: &str, conditions: &Record) -> ModelResult<Vec<RowData>> {
        Modify::delete(table, conditions)?
            .execute(&self.channel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Database, ExecutionChannel, Modify, Prepared, Query, Record, RowData, Statement,
        parse_record_value,
    };
    use crate::error::{ModelError, ModelResult};
    use crate::value::SqlValue;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockChannel {
        log: Mutex<Vec<(String, Vec<SqlValue>)>>,
        rows: Mutex<Vec<RowData>>,
    }

    impl MockChannel {
        fn with_rows(rows: Vec<RowData>) -> Self {
            Self {
                log: Mutex::new(Vec::new()),
                rows: Mutex::new(rows),
            }
        }

        fn last_sql(&self) -> String {
            self.log.lock().expect("lock").last().expect("logged").0.clone()
        }
    }

    impl ExecutionChannel for MockChannel {
        async fn execute(&self, sql: &str, args: &[SqlValue]) -> ModelResult<Vec<RowData>> {
            self.log
                .lock()
                .expect("lock")
                .push((sql.to_string(), args.to_vec()));
            Ok(self.rows.lock().expect("lock").clone())
        }

        async fn run_script(&self, sql: &str) -> ModelResult<()> {
            self.log
                .lock()
                .expect("lock")
                .push((sql.to_string(), Vec::new()));
            Ok(())
        }
    }

    fn record(pairs: &[(&str, SqlValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn record_operator_prefixes() {
        let (op, value) = parse_record_value(&SqlValue::Str(">=10".to_string()));
        assert_eq!(op, ">=");
        assert_eq!(value, SqlValue::Str("10".to_string()));

        let (op, value) = parse_record_value(&SqlValue::Str("*ova".to_string()));
        assert_eq!(op, "LIKE");
        assert_eq!(value, SqlValue::Str("%ova".to_string()));

        let (op, value) = parse_record_value(&SqlValue::Int(5));
        assert_eq!(op, "=");
        assert_eq!(value, SqlValue::Int(5));
    }

    #[test]
    fn query_prepare_is_pure() {
        let conditions = record(&[("population", SqlValue::Str(">100000".to_string()))]);
        let query = Query::new("city", &["name"], &conditions)
            .expect("query")
            .order("name")
            .limit(5);
        let prepared = query.prepare().expect("prepare");
        assert_eq!(
            prepared.sql,
            "SELECT \"name\" FROM \"city\" WHERE \"population\" > $1 \
             ORDER BY \"name\" ASC LIMIT $2"
        );
        assert_eq!(
            prepared.args,
            vec![SqlValue::Str("100000".to_string()), SqlValue::Int(5)]
        );
        // preparing twice yields the same statement
        assert_eq!(query.prepare().expect("prepare"), prepared);
    }

    #[test]
    fn insert_prepare() {
        let modify = Modify::insert(
            "city",
            record(&[
                ("name", SqlValue::Str("Rome".to_string())),
                ("population", SqlValue::Int(2_761_632)),
            ]),
        );
        let Prepared { sql, args } = modify.prepare().expect("prepare");
        assert_eq!(
            sql,
            "INSERT INTO \"city\" (\"name\", \"population\") VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(
            args,
            vec![
                SqlValue::Str("Rome".to_string()),
                SqlValue::Int(2_761_632)
            ]
        );
    }

    #[test]
    fn update_requires_conditions() {
        let err = Modify::update(
            "city",
            record(&[("name", SqlValue::Str("Rome".to_string()))]),
            &Record::new(),
        )
        .expect("build")
        .prepare()
        .expect_err("must fail");
        assert!(matches!(err, ModelError::Builder(_)));
    }

    #[test]
    fn delete_prepare() {
        let modify =
            Modify::delete("city", &record(&[("cityId", SqlValue::Int(7))])).expect("build");
        let Prepared { sql, args } = modify.prepare().expect("prepare");
        assert_eq!(
            sql,
            "DELETE FROM \"city\" WHERE \"cityId\" = $1 RETURNING *"
        );
        assert_eq!(args, vec![SqlValue::Int(7)]);
    }

    #[test]
    fn statement_named_placeholders() {
        let stmt = Statement::new(
            "SELECT * FROM \"city\" WHERE \"cityId\" = :id OR \"parentId\" = :id AND \"name\" <> :name",
        );
        let params = record(&[
            ("id", SqlValue::Int(7)),
            ("name", SqlValue::Str("Rome".to_string())),
        ]);
        let Prepared { sql, args } = stmt.prepare(&params).expect("prepare");
        assert_eq!(
            sql,
            "SELECT * FROM \"city\" WHERE \"cityId\" = $1 OR \"parentId\" = $1 AND \"name\" <> $2"
        );
        assert_eq!(
            args,
            vec![SqlValue::Int(7), SqlValue::Str("Rome".to_string())]
        );
    }

    #[test]
    fn statement_keeps_casts_and_rejects_missing() {
        let stmt = Statement::new("SELECT \"name\"::text FROM \"city\" WHERE \"cityId\" = :id");
        let prepared = stmt
            .prepare(&record(&[("id", SqlValue::Int(1))]))
            .expect("prepare");
        assert_eq!(
            prepared.sql,
            "SELECT \"name\"::text FROM \"city\" WHERE \"cityId\" = $1"
        );

        let err = stmt.prepare(&Record::new()).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Cannot generate SQL, parameter \"id\" is not provided"
        );
    }

    #[tokio::test]
    async fn database_helpers_go_through_the_channel() {
        let row: RowData = BTreeMap::from([
            ("name".to_string(), SqlValue::Str("Rome".to_string())),
            ("cityId".to_string(), SqlValue::Int(1)),
        ]);
        let db = Database::new(MockChannel::with_rows(vec![row]));

        let found = db
            .row("city", &["name"], &record(&[("cityId", SqlValue::Int(1))]))
            .await
            .expect("row")
            .expect("some");
        assert_eq!(found["name"], SqlValue::Str("Rome".to_string()));
        assert_eq!(
            db.channel().last_sql(),
            "SELECT \"name\" FROM \"city\" WHERE \"cityId\" = $1"
        );

        db.insert(
            "city",
            record(&[("name", SqlValue::Str("Rome".to_string()))]),
        )
        .await
        .expect("insert");
        assert!(db.channel().last_sql().starts_with("INSERT INTO \"city\""));
    }

    #[tokio::test]
    async fn count_reads_count_column() {
        let row: RowData = BTreeMap::from([("count".to_string(), SqlValue::Int(42))]);
        let db = Database::new(MockChannel::with_rows(vec![row]));
        let n = db.count("city", &Record::new()).await.expect("count");
        assert_eq!(n, 42);
        assert_eq!(db.channel().last_sql(), "SELECT count(*) FROM \"city\"");
    }
}
