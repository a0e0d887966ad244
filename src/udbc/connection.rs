use crate::error::DbError;
use crate::udbc::deserializer::RowDeserializer;
use crate::udbc::value::Value;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type Row = HashMap<String, Value>;

/// Rows emitted one by one by a streaming query; the stream ending is the end signal.
pub type RowEvents = BoxStream<'static, Result<Row, DbError>>;

/// Lifecycle state reported by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Closing,
    Destroyed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub affected_rows: u64,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// 将行数据映射为目标类型
    pub fn map<R>(&self) -> Result<Vec<R>, DbError>
    where
        R: serde::de::DeserializeOwned,
    {
        self.rows
            .iter()
            .map(|r| R::deserialize(RowDeserializer::new(r)))
            .collect()
    }
}

/// A statement prepared on one connection, executable any number of times.
pub trait PreparedStatement: Send + Sync {
    fn sql(&self) -> &str;

    fn exec(&self, params: Vec<Value>) -> BoxFuture<'static, Result<QueryResult, DbError>>;
}

/// One external database connection.
///
/// Work methods are called synchronously and hand back a `'static` future or
/// stream: the connection accepts the work at call time, so a later `close`
/// lets it settle before the connection reports [`ConnectionState::Destroyed`].
/// `destroy` fails accepted work immediately.
#[async_trait]
pub trait Connection: Send + Sync {
    /// A failed connect leaves the connection destroyed, so work accepted
    /// before it fails with the connect error instead of waiting forever.
    async fn connect(&self) -> Result<(), DbError>;

    async fn close(&self) -> Result<(), DbError>;

    fn destroy(&self, msg: Option<&str>);

    fn query(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'static, Result<QueryResult, DbError>>;

    fn prepare(&self, sql: &str) -> BoxFuture<'static, Result<Arc<dyn PreparedStatement>, DbError>>;

    fn query_stream(&self, sql: &str, params: Vec<Value>) -> RowEvents;

    fn state(&self) -> ConnectionState;
}
