mod database;
pub use database::{
    operation::{Operation, OperationError},
    postgres::{
        client::{connection_string, ConnectionError, SessionProvider},
        generate::generate_scratch_table_sql,
        loader::{batch_columns, chunk_count, load, LoadError, SchemaMismatchError, DEFAULT_CHUNK_SIZE},
        merge::{build_merge_sql, MergePolicy, PolicyError},
        session::{with_session, Session, TransactionError},
    },
    sql_value::{record_from_json, Record, SqlValue},
};

mod schema;
pub use schema::{Column, SchemaError, SqlType, TableColumns, TableSchema};

mod logger;
pub use logger::{setup_info_logger, setup_logger};

// export 3rd party dependencies
pub use tokio_postgres::types::ToSql;
pub use tracing::level_filters::LevelFilter;
