//! Bulk insertion of one chunk of records inside a single transaction.

use anyhow::{Context, Result, anyhow, bail};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use tracing::debug;

use crate::config::PREVIEW_CELL_WIDTH;
use crate::db::schema::{Schema, SqlType, parse_timestamp, quote_ident};
use crate::db::{Pool, PoolTransaction};
use crate::formats::Record;

type PgQuery<'q> = Query<'q, sqlx::Postgres, PgArguments>;

const SAMPLE_FIELDS: usize = 3;

/// Appends chunks of records to an existing table
///
/// A chunk is written with as few multi-row INSERT statements as the
/// backend's bind-parameter limit allows, all inside one transaction, so a
/// chunk is either fully loaded or not at all.
pub struct ChunkLoader {
    pool: Pool,
    table_name: String,
    schema: Schema,
    rows_per_statement: usize,
}

impl ChunkLoader {
    pub fn new(pool: Pool, table_name: impl Into<String>, schema: Schema) -> Result<Self> {
        let num_columns = schema.columns.len();
        if num_columns == 0 {
            bail!("Cannot load rows into a table without columns");
        }

        let rows_per_statement = (pool.max_bind_params() / num_columns).max(1);

        Ok(Self {
            pool,
            table_name: table_name.into(),
            schema,
            rows_per_statement,
        })
    }

    /// Insert every record of a chunk, returning the number of rows written
    pub async fn load(&self, records: &[Record]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;

        for batch in records.chunks(self.rows_per_statement) {
            let insert_sql = self.insert_sql(batch.len());
            debug!(
                table = self.table_name.as_str(),
                rows = batch.len(),
                "executing batch insert"
            );

            let result = match &mut tx {
                PoolTransaction::Postgres(tx) => {
                    let mut query = sqlx::query(&insert_sql);
                    for record in batch {
                        query = bind_record_fields(query, record, &self.schema)
                            .map_err(|e| self.batch_error(e, batch))?;
                    }
                    query.execute(&mut **tx).await.map(|_| ())
                }
                #[cfg(test)]
                PoolTransaction::Sqlite(tx) => {
                    let mut query = sqlx::query(&insert_sql);
                    for record in batch {
                        check_width(record, &self.schema).map_err(|e| self.batch_error(e, batch))?;
                        for field in &record.fields {
                            query = query.bind(field.as_deref());
                        }
                    }
                    query.execute(&mut **tx).await.map(|_| ())
                }
            };

            result.map_err(|e| self.batch_error(anyhow::Error::new(e), batch))?;
        }

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit chunk into '{}'", self.table_name))?;

        Ok(records.len() as u64)
    }

    /// Build `INSERT INTO t (cols) VALUES (..), (..)` for `rows` rows
    ///
    /// Postgres gets numbered placeholders, with CAST() around the types that
    /// are bound as text; SQLite gets plain `?` placeholders.
    fn insert_sql(&self, rows: usize) -> String {
        let use_pg = self.pool.is_postgres();

        let column_list: Vec<String> = self
            .schema
            .column_names()
            .iter()
            .map(|name| quote_ident(name))
            .collect();

        let mut value_groups = Vec::with_capacity(rows);
        let mut param_idx = 1;
        for _ in 0..rows {
            let placeholders: Vec<String> = self
                .schema
                .columns
                .iter()
                .map(|col| {
                    if !use_pg {
                        return "?".to_string();
                    }

                    let placeholder = format!("${}", param_idx);
                    param_idx += 1;
                    if col.sql_type.needs_cast() {
                        format!("CAST({} AS {})", placeholder, col.sql_type.to_postgres())
                    } else {
                        placeholder
                    }
                })
                .collect();
            value_groups.push(format!("({})", placeholders.join(", ")));
        }

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(&self.table_name),
            column_list.join(", "),
            value_groups.join(", ")
        )
    }

    /// Wrap a failed batch with the table name and a sample of its first record
    fn batch_error(&self, error: anyhow::Error, batch: &[Record]) -> anyhow::Error {
        let first_record_sample = batch
            .first()
            .map(|r| {
                let preview: Vec<String> = r
                    .fields
                    .iter()
                    .take(SAMPLE_FIELDS)
                    .map(|f| match f.as_deref() {
                        None => "NULL".to_string(),
                        Some(f) if f.chars().count() > PREVIEW_CELL_WIDTH => {
                            format!("{}...", f.chars().take(PREVIEW_CELL_WIDTH).collect::<String>())
                        }
                        Some(f) => f.to_string(),
                    })
                    .collect();
                format!(
                    "[{}{}]",
                    preview.join(", "),
                    if r.fields.len() > SAMPLE_FIELDS { ", ..." } else { "" }
                )
            })
            .unwrap_or_else(|| "<empty>".to_string());

        error.context(format!(
            "Failed to insert {} rows into '{}' (first record: {})",
            batch.len(),
            self.table_name,
            first_record_sample
        ))
    }
}

fn check_width(record: &Record, schema: &Schema) -> Result<()> {
    if record.fields.len() != schema.columns.len() {
        bail!(
            "Record has {} fields but the table has {} columns",
            record.fields.len(),
            schema.columns.len()
        );
    }
    Ok(())
}

/// Bind record fields to query with proper types based on schema
fn bind_record_fields<'q>(
    mut query: PgQuery<'q>,
    record: &'q Record,
    schema: &Schema,
) -> Result<PgQuery<'q>> {
    check_width(record, schema)?;

    for (field, column) in record.fields.iter().zip(&schema.columns) {
        query = bind_typed_value(query, field.as_deref(), column.sql_type)
            .with_context(|| format!("Column '{}'", column.name))?;
    }

    Ok(query)
}

/// Bind a single value with proper type conversion
///
/// TEXT and BYTEA keep empty values; for other types a blank value is NULL.
fn bind_typed_value<'q>(
    query: PgQuery<'q>,
    value: Option<&'q str>,
    sql_type: SqlType,
) -> Result<PgQuery<'q>> {
    let Some(value) = value else {
        return Ok(bind_null(query, sql_type));
    };

    match sql_type {
        SqlType::Text => return Ok(query.bind(value)),
        SqlType::Bytea => {
            let bytes = hex::decode(value.trim())
                .with_context(|| format!("Type mismatch: '{}' is not hex-encoded binary", value))?;
            return Ok(query.bind(bytes));
        }
        _ => {}
    }

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(bind_null(query, sql_type));
    }

    Ok(match sql_type {
        SqlType::Boolean => query.bind(parse_bool(trimmed)?),
        SqlType::SmallInt => query.bind(parse::<i16>(trimmed, sql_type)?),
        SqlType::Integer => query.bind(parse::<i32>(trimmed, sql_type)?),
        SqlType::BigInt => query.bind(parse::<i64>(trimmed, sql_type)?),
        SqlType::Real => query.bind(parse::<f32>(trimmed, sql_type)?),
        SqlType::DoublePrecision => query.bind(parse::<f64>(trimmed, sql_type)?),
        SqlType::Timestamp => {
            let timestamp = parse_timestamp(trimmed).ok_or_else(|| {
                anyhow!(
                    "Type mismatch: Cannot convert '{}' to TIMESTAMP (expected e.g. '2024-01-15 14:30:00')",
                    trimmed
                )
            })?;
            query.bind(timestamp)
        }
        // NUMERIC, DATE, TIME and TIMESTAMPTZ go over as text and are CAST on the server
        _ => query.bind(trimmed),
    })
}

/// Bind NULL value for the appropriate type
fn bind_null<'q>(query: PgQuery<'q>, sql_type: SqlType) -> PgQuery<'q> {
    match sql_type {
        SqlType::Boolean => query.bind(None::<bool>),
        SqlType::SmallInt => query.bind(None::<i16>),
        SqlType::Integer => query.bind(None::<i32>),
        SqlType::BigInt => query.bind(None::<i64>),
        SqlType::Real => query.bind(None::<f32>),
        SqlType::DoublePrecision => query.bind(None::<f64>),
        SqlType::Timestamp => query.bind(None::<chrono::NaiveDateTime>),
        SqlType::Bytea => query.bind(None::<Vec<u8>>),
        _ => query.bind(None::<String>),
    }
}

/// Parse a value from string
fn parse<T: std::str::FromStr>(value: &str, sql_type: SqlType) -> Result<T>
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    value.parse().map_err(|e| {
        anyhow!(
            "Type mismatch: Cannot convert '{}' to {}: {}",
            value,
            sql_type.to_postgres(),
            e
        )
    })
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(anyhow!(
            "Type mismatch: Cannot convert '{}' to BOOLEAN",
            value
        )),
    }
}
