use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("Table '{table}' declares no primary key column - a single auto-increment surrogate key is required")]
    NoPrimaryKey { table: String },

    #[error("Table '{table}' declares {count} primary key columns - composite primary keys are not supported")]
    CompositePrimaryKey { table: String, count: usize },

    #[error("Scratch table '{table}' already exists on this connection")]
    ScratchTableExists { table: String },
}

/// SQL types the engine knows how to render and bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    /// Auto-incrementing 64-bit surrogate key type.
    BigSerial,
    DoublePrecision,
    Numeric,
    Text,
    VarChar(u32),
    TimestampTz,
    Date,
    Jsonb,
}

impl SqlType {
    pub fn sql(&self) -> String {
        match self {
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::BigSerial => "BIGSERIAL".to_string(),
            SqlType::DoublePrecision => "DOUBLE PRECISION".to_string(),
            SqlType::Numeric => "NUMERIC".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::VarChar(len) => format!("VARCHAR({})", len),
            SqlType::TimestampTz => "TIMESTAMPTZ".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Jsonb => "JSONB".to_string(),
        }
    }
}

/// A single column of a table descriptor.
///
/// Descriptors are supplied by the caller up front; the engine never reads
/// them back from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
    pub unique: bool,
}

impl Column {
    pub fn new(name: &str, sql_type: SqlType) -> Self {
        Column {
            name: name.to_string(),
            sql_type,
            nullable: true,
            default: None,
            primary_key: false,
            unique: false,
        }
    }

    pub fn primary_key(name: &str) -> Self {
        Column {
            name: name.to_string(),
            sql_type: SqlType::BigSerial,
            nullable: false,
            default: None,
            primary_key: true,
            unique: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_sql(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }
}

/// The result of introspecting a table descriptor: the non-key columns in
/// declaration order plus the single surrogate-key column.
#[derive(Debug)]
pub struct TableColumns<'a> {
    pub mergeable: Vec<&'a Column>,
    pub primary_key: &'a Column,
}

/// An ordered table descriptor for the target or a scratch table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: &str, columns: Vec<Column>) -> Self {
        TableSchema { name: name.to_string(), columns }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Splits the descriptor into its mergeable columns and its primary key.
    ///
    /// The primary key is excluded from the mergeable set because it is an
    /// engine-assigned surrogate and never carries caller data. Declaration
    /// order is preserved so insert and select lists derived from the result
    /// always line up.
    pub fn mergeable_columns(&self) -> Result<TableColumns<'_>, SchemaError> {
        let primary_keys: Vec<&Column> =
            self.columns.iter().filter(|column| column.primary_key).collect();

        match primary_keys.as_slice() {
            [] => Err(SchemaError::NoPrimaryKey { table: self.name.clone() }),
            &[primary_key] => Ok(TableColumns {
                mergeable: self.columns.iter().filter(|column| !column.primary_key).collect(),
                primary_key,
            }),
            _ => Err(SchemaError::CompositePrimaryKey {
                table: self.name.clone(),
                count: primary_keys.len(),
            }),
        }
    }

    /// Columns carrying a unique index, which define "duplicate" for merges.
    pub fn unique_columns(&self) -> Vec<&Column> {
        self.columns.iter().filter(|column| column.unique).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                Column::primary_key("id"),
                Column::new("email", SqlType::Text).not_null().unique(),
                Column::new("name", SqlType::Text),
            ],
        )
    }

    #[test]
    fn test_mergeable_columns_excludes_primary_key() {
        let schema = users_schema();
        let columns = schema.mergeable_columns().unwrap();

        assert_eq!(columns.primary_key.name, "id");
        let names: Vec<&str> =
            columns.mergeable.iter().map(|column| column.name.as_str()).collect();
        assert_eq!(names, vec!["email", "name"]);
    }

    #[test]
    fn test_mergeable_columns_preserves_declaration_order() {
        let schema = TableSchema::new(
            "events",
            vec![
                Column::new("zulu", SqlType::Text),
                Column::primary_key("id"),
                Column::new("alpha", SqlType::Integer),
                Column::new("mike", SqlType::Boolean),
            ],
        );

        let columns = schema.mergeable_columns().unwrap();
        let names: Vec<&str> =
            columns.mergeable.iter().map(|column| column.name.as_str()).collect();
        assert_eq!(names, vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn test_no_primary_key_is_schema_error() {
        let schema = TableSchema::new(
            "logs",
            vec![Column::new("message", SqlType::Text)],
        );

        let err = schema.mergeable_columns().unwrap_err();
        assert!(matches!(err, SchemaError::NoPrimaryKey { ref table } if table == "logs"));
    }

    #[test]
    fn test_composite_primary_key_is_schema_error() {
        let schema = TableSchema::new(
            "pairs",
            vec![Column::primary_key("left_id"), Column::primary_key("right_id")],
        );

        let err = schema.mergeable_columns().unwrap_err();
        assert!(
            matches!(err, SchemaError::CompositePrimaryKey { count: 2, ref table } if table == "pairs")
        );
    }

    #[test]
    fn test_unique_columns() {
        let schema = users_schema();
        let unique: Vec<&str> =
            schema.unique_columns().iter().map(|column| column.name.as_str()).collect();
        assert_eq!(unique, vec!["email"]);
    }
}
