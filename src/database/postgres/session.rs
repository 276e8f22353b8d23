use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use tokio_postgres::{types::ToSql, Client};
use tracing::error;

use crate::database::postgres::client::{ConnectionError, SessionProvider};

#[derive(thiserror::Error, Debug)]
pub enum TransactionError {
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    #[error("Engine error running `{sql}`: {source}")]
    Statement {
        sql: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Statement execution seam between the session and the engine, so the
/// transaction scope can be driven without a live database.
#[async_trait]
pub(crate) trait Executor: Send + Sync {
    async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, TransactionError>;

    async fn batch_execute(&self, sql: &str) -> Result<(), TransactionError>;

    fn is_closed(&self) -> bool;
}

#[async_trait]
impl Executor for Client {
    async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, TransactionError> {
        Client::execute(self, sql, params)
            .await
            .map_err(|source| TransactionError::Statement {
                sql: sql.to_string(),
                source: source.into(),
            })
    }

    async fn batch_execute(&self, sql: &str) -> Result<(), TransactionError> {
        Client::batch_execute(self, sql)
            .await
            .map_err(|source| TransactionError::Statement {
                sql: sql.to_string(),
                source: source.into(),
            })
    }

    fn is_closed(&self) -> bool {
        Client::is_closed(self)
    }
}

/// One unit-of-work boundary: a dedicated connection owning at most one
/// active transaction at a time.
pub struct Session {
    executor: Box<dyn Executor>,
}

impl Session {
    pub(crate) fn new(client: Client) -> Self {
        Session { executor: Box::new(client) }
    }

    #[cfg(test)]
    pub(crate) fn with_executor(executor: Box<dyn Executor>) -> Self {
        Session { executor }
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }

    pub async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, TransactionError> {
        self.executor.execute(sql, params).await
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), TransactionError> {
        self.executor.batch_execute(sql).await
    }
}

/// Provides a transactional scope around a series of statements.
///
/// Checks a session out of the provider, runs `body` inside a transaction,
/// commits on success and rolls back on any error before handing that error
/// back to the caller. The session is released on every exit path: scoped
/// sessions go back to their thread's cache for the next operation, per-call
/// sessions are dropped and their connection closed.
pub async fn with_session<F, Fut, T, E>(
    provider: &SessionProvider,
    scoped: bool,
    body: F,
) -> Result<T, E>
where
    F: FnOnce(Arc<Session>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TransactionError>,
{
    let session = provider
        .session(scoped)
        .await
        .map_err(|e| E::from(TransactionError::from(e)))?;

    let result = run_in_transaction(&session, body).await;
    provider.release(session, scoped);
    result
}

async fn run_in_transaction<F, Fut, T, E>(session: &Arc<Session>, body: F) -> Result<T, E>
where
    F: FnOnce(Arc<Session>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TransactionError>,
{
    session.batch_execute("BEGIN").await.map_err(E::from)?;

    match body(Arc::clone(session)).await {
        Ok(value) => {
            session.batch_execute("COMMIT").await.map_err(E::from)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = session.batch_execute("ROLLBACK").await {
                error!("Rollback failed after operation error: {}", rollback_err);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io, sync::Mutex};

    struct RecordingExecutor {
        statements: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        async fn execute(
            &self,
            sql: &str,
            _params: &[&(dyn ToSql + Sync)],
        ) -> Result<u64, TransactionError> {
            self.batch_execute(sql).await?;
            Ok(1)
        }

        async fn batch_execute(&self, sql: &str) -> Result<(), TransactionError> {
            self.statements.lock().unwrap().push(sql.to_string());
            if self.fail_on == Some(sql) {
                return Err(TransactionError::Statement {
                    sql: sql.to_string(),
                    source: io::Error::other("engine rejected statement").into(),
                });
            }
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    fn recording_session(
        fail_on: Option<&'static str>,
    ) -> (Arc<Session>, Arc<Mutex<Vec<String>>>) {
        let statements = Arc::new(Mutex::new(Vec::new()));
        let executor =
            RecordingExecutor { statements: Arc::clone(&statements), fail_on };
        (Arc::new(Session::with_executor(Box::new(executor))), statements)
    }

    const LOAD_SQL: &str = "INSERT INTO users_scratch (email) VALUES ($1)";

    #[tokio::test]
    async fn test_transaction_commits_after_body_succeeds() {
        let (session, statements) = recording_session(None);

        let result: Result<(), TransactionError> =
            run_in_transaction(&session, |session| async move {
                session.execute(LOAD_SQL, &[]).await?;
                Ok(())
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(*statements.lock().unwrap(), vec!["BEGIN", LOAD_SQL, "COMMIT"]);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_and_reraises_on_statement_failure() {
        let (session, statements) = recording_session(Some(LOAD_SQL));

        let result: Result<(), TransactionError> =
            run_in_transaction(&session, |session| async move {
                session.execute(LOAD_SQL, &[]).await?;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, TransactionError::Statement { ref sql, .. } if sql == LOAD_SQL));
        assert_eq!(*statements.lock().unwrap(), vec!["BEGIN", LOAD_SQL, "ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_body_error() {
        let (session, statements) = recording_session(None);

        let result: Result<(), TransactionError> =
            run_in_transaction(&session, |_session| async move {
                Err(TransactionError::Connection(
                    ConnectionError::CanNotConnectToDatabase,
                ))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*statements.lock().unwrap(), vec!["BEGIN", "ROLLBACK"]);
    }
}
