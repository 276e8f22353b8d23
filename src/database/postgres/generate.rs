use crate::schema::{Column, TableSchema};

/// Reserved SQL keywords that need quoting.
pub const RESERVED_KEYWORDS: &[&str] =
    &["group", "user", "order", "table", "index", "primary", "key", "select", "where"];

/// Quotes an identifier if it's a reserved keyword.
#[inline]
pub fn quote_identifier(name: &str) -> String {
    if RESERVED_KEYWORDS.contains(&name) {
        format!("\"{}\"", name)
    } else {
        name.to_string()
    }
}

pub fn generate_column_names_sql(columns: &[&Column]) -> String {
    columns.iter().map(|column| quote_identifier(&column.name)).collect::<Vec<_>>().join(", ")
}

fn generate_column_sql(column: &Column) -> String {
    let mut sql = format!("{} {}", quote_identifier(&column.name), column.sql_type.sql());
    if column.primary_key {
        sql.push_str(" PRIMARY KEY");
    } else if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(&format!(" DEFAULT {}", default));
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    sql
}

/// Renders the CREATE statement for a scratch table.
///
/// The table is temporary with `ON COMMIT DROP`, which binds its lifetime to
/// the operation's transaction instead of relying on connection teardown.
/// There is deliberately no `IF NOT EXISTS`: a scratch table that already
/// exists on the connection means two operations are sharing a session, and
/// the engine error is surfaced as a schema error.
pub fn generate_scratch_table_sql(schema: &TableSchema) -> String {
    let columns =
        schema.columns.iter().map(generate_column_sql).collect::<Vec<_>>().join(", ");

    format!(
        "CREATE TEMPORARY TABLE {} ({}) ON COMMIT DROP",
        quote_identifier(&schema.name),
        columns
    )
}
