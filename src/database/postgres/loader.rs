use std::collections::HashSet;

use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::{
    database::{
        postgres::{
            generate::{generate_column_names_sql, quote_identifier},
            session::{Session, TransactionError},
        },
        sql_value::{Record, SqlValue},
    },
    schema::{Column, TableSchema},
};

/// Matches the original loader's per-statement row cap.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

const NULL_VALUE: SqlValue = SqlValue::Null;

#[derive(thiserror::Error, Debug)]
#[error("Row batch contains columns not present in scratch table '{table}': {columns:?}")]
pub struct SchemaMismatchError {
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("{0}")]
    SchemaMismatch(#[from] SchemaMismatchError),

    #[error("{0}")]
    Transaction(#[from] TransactionError),
}

/// Validates the batch against the scratch schema and returns the columns to
/// insert: every non-key schema column that appears in at least one record,
/// in declaration order.
///
/// Any field outside the scratch table's non-key columns fails the whole
/// batch up front - no chunk is written for a batch that cannot fully load.
/// Fields naming the surrogate key count as unknown, since the key is never
/// populated with caller data. Columns absent from the entire batch are left
/// out of the insert list so the schema default applies.
pub fn batch_columns<'a>(
    schema: &'a TableSchema,
    batch: &[Record],
) -> Result<Vec<&'a Column>, SchemaMismatchError> {
    let mut present: HashSet<&str> = HashSet::new();
    let mut unknown: Vec<String> = Vec::new();

    for record in batch {
        for field in record.keys() {
            match schema.column(field) {
                Some(column) if !column.primary_key => {
                    present.insert(column.name.as_str());
                }
                _ => {
                    if !unknown.contains(field) {
                        unknown.push(field.clone());
                    }
                }
            }
        }
    }

    if !unknown.is_empty() {
        unknown.sort();
        return Err(SchemaMismatchError { table: schema.name.clone(), columns: unknown });
    }

    Ok(schema
        .columns
        .iter()
        .filter(|column| !column.primary_key && present.contains(column.name.as_str()))
        .collect())
}

/// Number of insert statements a batch of `rows` needs at `chunk_size`.
pub fn chunk_count(rows: usize, chunk_size: usize) -> usize {
    rows.div_ceil(chunk_size)
}

fn generate_insert_chunk_sql(table: &str, columns: &[&Column], rows: usize) -> String {
    let total_columns = columns.len();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_identifier(table),
        generate_column_names_sql(columns),
    );

    for row in 0..rows {
        if row > 0 {
            sql.push(',');
        }
        let placeholders = (0..total_columns)
            .map(|column| format!("${}", row * total_columns + column + 1))
            .collect::<Vec<_>>()
            .join(",");
        sql.push_str(&format!("({})", placeholders));
    }

    sql
}

/// Streams the batch into the scratch table in fixed-size chunks.
///
/// Only touches the scratch table; the merge into the target happens
/// afterwards in the same transaction. Returns the number of rows written.
pub async fn load(
    session: &Session,
    schema: &TableSchema,
    batch: &[Record],
    chunk_size: usize,
) -> Result<u64, LoadError> {
    let columns = batch_columns(schema, batch)?;
    if batch.is_empty() || columns.is_empty() {
        return Ok(0);
    }

    let chunk_size = chunk_size.max(1);
    let mut loaded = 0u64;

    for chunk in batch.chunks(chunk_size) {
        let sql = generate_insert_chunk_sql(&schema.name, &columns, chunk.len());

        let mut params: Vec<&(dyn ToSql + Sync)> =
            Vec::with_capacity(chunk.len() * columns.len());
        for record in chunk {
            for column in &columns {
                let value = record.get(column.name.as_str()).unwrap_or(&NULL_VALUE);
                params.push(value as &(dyn ToSql + Sync));
            }
        }

        loaded += session.execute(&sql, &params).await?;
        debug!("Loaded chunk of {} rows into {}", chunk.len(), schema.name);
    }

    Ok(loaded)
}
