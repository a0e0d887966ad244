//! In-process connections with scripted answers.
//!
//! Queries are accepted when issued, answered after a configurable latency by a
//! [`Responder`], and follow the usual lifecycle: `close` lets accepted work
//! finish, `destroy` fails it at once.

mod connection;

use std::sync::Arc;
use std::time::Duration;

use crate::error::DbError;
use crate::options::ConnectionOptions;
use crate::udbc::connection::{Connection, QueryResult};
use crate::udbc::driver::Driver;
use crate::udbc::value::Value;

pub use connection::MemoryConnection;

const MEMORY_DRIVER: &str = "memory";
const DEFAULT_LATENCY: Duration = Duration::from_millis(5);

/// Answers one statement with its positional parameters.
pub type Responder = Arc<dyn Fn(&str, &[Value]) -> Result<QueryResult, DbError> + Send + Sync>;

#[derive(Clone)]
pub struct MemoryDriver {
    latency: Duration,
    responder: Responder,
    connect_error: Option<String>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
            responder: Arc::new(|_, _| Ok(QueryResult::default())),
            connect_error: None,
        }
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<QueryResult, DbError> + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    /// Makes every `connect` fail with `msg`.
    pub fn fail_connect(mut self, msg: impl Into<String>) -> Self {
        self.connect_error = Some(msg.into());
        self
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        MEMORY_DRIVER
    }

    fn open(&self, options: &ConnectionOptions) -> Result<Arc<dyn Connection>, DbError> {
        let database = options
            .database
            .clone()
            .or_else(|| options.url.clone())
            .ok_or_else(|| DbError::Config("memory connection needs a database name".into()))?;
        Ok(Arc::new(MemoryConnection::new(
            database,
            self.latency,
            Arc::clone(&self.responder),
            self.connect_error.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udbc::connection::ConnectionState;
    use futures_util::StreamExt;
    use std::collections::HashMap;

    fn echo(_: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        let rows = params
            .iter()
            .enumerate()
            .map(|(i, v)| HashMap::from([(format!("c{i}"), v.clone())]))
            .collect();
        Ok(QueryResult {
            columns: Vec::new(),
            rows,
            affected_rows: 0,
        })
    }

    fn open(driver: &MemoryDriver) -> Arc<dyn Connection> {
        driver
            .open(&ConnectionOptions::new().database("test"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_query_and_prepare() {
        let conn = open(&MemoryDriver::new().responder(echo));
        conn.connect().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);

        let result = conn.query("SELECT ?", vec![Value::I64(1)]).await.unwrap();
        assert_eq!(result.row_count(), 1);

        let stmt = conn.prepare("SELECT ?, ?").await.unwrap();
        assert_eq!(stmt.sql(), "SELECT ?, ?");
        let result = stmt.exec(vec![1.into(), 2.into()]).await.unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[tokio::test]
    async fn test_stream_emits_rows_then_ends() {
        let conn = open(&MemoryDriver::new().responder(echo));
        conn.connect().await.unwrap();
        let rows: Vec<_> = conn
            .query_stream("SELECT", vec![1.into(), 2.into(), 3.into()])
            .collect()
            .await;
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_close_drains_accepted_work() {
        let conn = open(&MemoryDriver::new().latency(Duration::from_millis(20)));
        conn.connect().await.unwrap();
        let pending = tokio::spawn(conn.query("SELECT 1", Vec::new()));
        conn.close().await.unwrap();
        assert!(pending.await.unwrap().is_ok());
        assert_eq!(conn.state(), ConnectionState::Destroyed);
        assert!(conn.query("SELECT 1", Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_destroy_fails_accepted_work() {
        let conn = open(&MemoryDriver::new().latency(Duration::from_secs(60)));
        conn.connect().await.unwrap();
        let pending = tokio::spawn(conn.query("SELECT 1", Vec::new()));
        tokio::task::yield_now().await;
        conn.destroy(Some("shutting down"));
        match pending.await.unwrap() {
            Err(DbError::Connection(msg)) => assert_eq!(msg, "shutting down"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(conn.state(), ConnectionState::Destroyed);
    }

    #[test]
    fn test_open_requires_database() {
        assert!(matches!(
            MemoryDriver::new().open(&ConnectionOptions::new()),
            Err(DbError::Config(_))
        ));
    }
}
