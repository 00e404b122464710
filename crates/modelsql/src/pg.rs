//! Postgres driver: the schema type map, the [`SqlValue`] wire bridge,
//! and an [`ExecutionChannel`] over a single `tokio-postgres` client.

use crate::db::{ExecutionChannel, RowData};
use crate::error::ModelResult;
use crate::value::SqlValue;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::collections::BTreeMap;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, NoTls, Row};
use tracing::error;
use uuid::Uuid;

/// Abstract schema types mapped to Postgres column types.
pub fn pg_types() -> BTreeMap<String, String> {
    [
        ("string", "varchar"),
        ("number", "integer"),
        ("boolean", "boolean"),
        ("bigint", "bigint"),
        ("real", "real"),
        ("double", "double precision"),
        ("money", "numeric(12, 2)"),
        ("date", "date"),
        ("time", "time"),
        ("datetime", "timestamp with time zone"),
        ("uuid", "uuid"),
        ("url", "varchar"),
        ("inet", "inet"),
        ("text", "text"),
        ("json", "jsonb"),
        ("blob", "bytea"),
        ("point", "point"),
        ("enum", "varchar"),
    ]
    .into_iter()
    .map(|(name, column)| (name.to_string(), column.to_string()))
    .collect()
}

/// Per-driver type maps, keyed by driver name. `"pg"` is built in.
pub struct DriverRegistry {
    drivers: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut drivers = BTreeMap::new();
        drivers.insert("pg".to_string(), pg_types());
        Self { drivers }
    }
}

impl DriverRegistry {
    pub fn register(&mut self, driver: &str, types: BTreeMap<String, String>) {
        self.drivers.insert(driver.to_string(), types);
    }

    pub fn types(&self, driver: &str) -> Option<&BTreeMap<String, String>> {
        self.drivers.get(driver)
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(value) => value.to_sql(ty, out),
            SqlValue::Int(value) => match *ty {
                Type::INT2 => (*value as i16).to_sql(ty, out),
                Type::INT4 => (*value as i32).to_sql(ty, out),
                _ => value.to_sql(ty, out),
            },
            SqlValue::Float(value) => match *ty {
                Type::FLOAT4 => (*value as f32).to_sql(ty, out),
                _ => value.to_sql(ty, out),
            },
            SqlValue::Str(value) => value.to_sql(ty, out),
            SqlValue::Timestamp(value) => value.to_sql(ty, out),
            SqlValue::Uuid(value) => value.to_sql(ty, out),
            SqlValue::Json(value) => value.to_sql(ty, out),
            SqlValue::Array(values) => match ty.kind() {
                Kind::Array(_) => values.to_sql(ty, out),
                _ => Err(format!("array value bound to non-array column type {ty}").into()),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // the server-side type drives serialization above
        true
    }

    to_sql_checked!();
}

fn column_value(row: &Row, index: usize, ty: &Type) -> ModelResult<SqlValue> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(index)?.map(SqlValue::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)?
            .map(|v| SqlValue::Int(v as i64)),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(index)?
            .map(|v| SqlValue::Int(v as i64)),
        Type::INT8 => row.try_get::<_, Option<i64>>(index)?.map(SqlValue::Int),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)?
            .map(|v| SqlValue::Float(v as f64)),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index)?.map(SqlValue::Float),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(SqlValue::Timestamp),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)?
            .map(|v| SqlValue::Timestamp(v.and_utc())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(index)?
            .map(|v| SqlValue::Str(v.to_string())),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(index)?
            .map(|v| SqlValue::Str(v.to_string())),
        Type::UUID => row.try_get::<_, Option<Uuid>>(index)?.map(SqlValue::Uuid),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(index)?
            .map(SqlValue::Json),
        _ => row.try_get::<_, Option<String>>(index)?.map(SqlValue::Str),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Convert one wire row into a [`RowData`] map keyed by column name.
pub fn row_data(row: &Row) -> ModelResult<RowData> {
    let mut data = RowData::new();
    for (index, column) in row.columns().iter().enumerate() {
        data.insert(
            column.name().to_string(),
            column_value(row, index, column.type_())?,
        );
    }
    Ok(data)
}

/// An execution channel over one `tokio-postgres` connection.
pub struct PgChannel {
    client: Client,
}

impl PgChannel {
    /// Connect with a libpq-style connection string and drive the
    /// connection on a background task.
    pub async fn connect(config: &str) -> ModelResult<Self> {
        let (client, connection) = tokio_postgres::connect(config, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection failed");
            }
        });
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl ExecutionChannel for PgChannel {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> ModelResult<Vec<RowData>> {
        let params: Vec<&(dyn ToSql + Sync)> =
            args.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        let rows = self.client.query(sql, &params).await?;
        rows.iter().map(row_data).collect()
    }

    async fn run_script(&self, sql: &str) -> ModelResult<()> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DriverRegistry, pg_types};
    use crate::value::SqlValue;
    use bytes::BytesMut;
    use tokio_postgres::types::{IsNull, ToSql, Type};

    #[test]
    fn type_map_covers_core_scalars() {
        let types = pg_types();
        assert_eq!(types["string"], "varchar");
        assert_eq!(types["datetime"], "timestamp with time zone");
        assert_eq!(types["json"], "jsonb");
        assert_eq!(types["money"], "numeric(12, 2)");
    }

    #[test]
    fn registry_resolves_custom_drivers() {
        let mut registry = DriverRegistry::default();
        assert!(registry.types("pg").is_some());
        assert!(registry.types("mysql").is_none());
        registry.register("mysql", pg_types());
        assert!(registry.types("mysql").is_some());
    }

    #[test]
    fn null_serializes_as_is_null() {
        let mut out = BytesMut::new();
        let result = SqlValue::Null.to_sql(&Type::INT8, &mut out).expect("to_sql");
        assert!(matches!(result, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn int_narrows_to_wire_type() {
        let mut out = BytesMut::new();
        SqlValue::Int(7).to_sql(&Type::INT4, &mut out).expect("to_sql");
        assert_eq!(out.len(), 4);
        out.clear();
        SqlValue::Int(7).to_sql(&Type::INT8, &mut out).expect("to_sql");
        assert_eq!(out.len(), 8);
    }
}
