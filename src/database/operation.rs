use tokio_postgres::error::SqlState;
use tracing::{debug, info};

use crate::{
    database::{
        postgres::{
            client::{ConnectionError, SessionProvider},
            generate::generate_scratch_table_sql,
            loader::{load, LoadError, SchemaMismatchError, DEFAULT_CHUNK_SIZE},
            merge::{build_merge_sql, MergePolicy, PolicyError},
            session::{with_session, TransactionError},
        },
        sql_value::Record,
    },
    schema::{SchemaError, TableSchema},
};

#[derive(thiserror::Error, Debug)]
pub enum OperationError {
    #[error("{0}")]
    Schema(#[from] SchemaError),

    #[error("{0}")]
    SchemaMismatch(#[from] SchemaMismatchError),

    #[error("{0}")]
    Policy(#[from] PolicyError),

    #[error("{0}")]
    Transaction(#[from] TransactionError),
}

impl From<LoadError> for OperationError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::SchemaMismatch(err) => OperationError::SchemaMismatch(err),
            LoadError::Transaction(err) => OperationError::Transaction(err),
        }
    }
}

/// Bulk-load-and-merge operations against one named database.
///
/// Each `run` is one atomic unit of work: create the scratch table, load the
/// batch into it, merge into the target, commit. Any failure rolls the whole
/// unit back, so a partially loaded scratch table never reaches the target.
/// Nothing is retried internally; resubmitting the operation is the caller's
/// call.
pub struct Operation {
    provider: SessionProvider,
    chunk_size: usize,
    scoped: bool,
}

impl Operation {
    pub fn new(db: &str) -> Result<Self, ConnectionError> {
        Ok(Operation {
            provider: SessionProvider::new(db)?,
            chunk_size: DEFAULT_CHUNK_SIZE,
            scoped: true,
        })
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Turns off per-thread session reuse; every run then opens and closes
    /// its own connection.
    pub fn scoped(mut self, scoped: bool) -> Self {
        self.scoped = scoped;
        self
    }

    pub async fn run(
        &self,
        target: &TableSchema,
        scratch: &TableSchema,
        batch: &[Record],
        policy: MergePolicy,
    ) -> Result<(), OperationError> {
        // Both descriptors must carry a single surrogate key, checked before
        // anything touches the database
        let scratch_columns = scratch.mergeable_columns()?;
        target.mergeable_columns()?;

        with_session(&self.provider, self.scoped, |session| async move {
            let create_sql = generate_scratch_table_sql(scratch);
            debug!("{}", create_sql);
            session
                .batch_execute(&create_sql)
                .await
                .map_err(|err| scratch_create_error(&scratch.name, err))?;

            let loaded = load(&session, scratch, batch, self.chunk_size).await?;
            debug!("Loaded {} rows into scratch table {}", loaded, scratch.name);

            let merge_sql =
                build_merge_sql(target, &scratch.name, &scratch_columns.mergeable, policy);
            debug!("{}", merge_sql);
            let merged = session.execute(&merge_sql, &[]).await?;
            info!("Merged {} rows into {}", merged, target.name);

            Ok(())
        })
        .await
    }

    /// Same as [`run`](Operation::run) with the policy supplied as a string
    /// (`'overwrite'`/`'update'` or `'ignore'`).
    pub async fn run_with_policy(
        &self,
        target: &TableSchema,
        scratch: &TableSchema,
        batch: &[Record],
        policy: &str,
    ) -> Result<(), OperationError> {
        let policy = policy.parse::<MergePolicy>()?;
        self.run(target, scratch, batch, policy).await
    }
}

fn scratch_create_error(table: &str, err: TransactionError) -> OperationError {
    if let TransactionError::Statement { ref source, .. } = err {
        let code = source.downcast_ref::<tokio_postgres::Error>().and_then(|e| e.code());
        if code == Some(&SqlState::DUPLICATE_TABLE) {
            return OperationError::Schema(SchemaError::ScratchTableExists {
                table: table.to_string(),
            });
        }
    }
    OperationError::Transaction(err)
}
