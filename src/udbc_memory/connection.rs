use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt, future, stream};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::DbError;
use crate::udbc::connection::{
    Connection, ConnectionState, PreparedStatement, QueryResult, RowEvents,
};
use crate::udbc::state::StateTracker;
use crate::udbc::value::Value;
use crate::udbc_memory::Responder;

/// Connection that answers through a [`Responder`] after a fixed latency.
pub struct MemoryConnection {
    inner: Arc<Inner>,
}

struct Inner {
    database: String,
    latency: Duration,
    responder: Responder,
    connect_error: Option<String>,
    tracker: Arc<StateTracker>,
}

impl MemoryConnection {
    pub(crate) fn new(
        database: String,
        latency: Duration,
        responder: Responder,
        connect_error: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                database,
                latency,
                responder,
                connect_error,
                tracker: StateTracker::new(),
            }),
        }
    }

    pub fn database(&self) -> &str {
        &self.inner.database
    }

    /// Work accepted but not yet settled.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.in_flight()
    }
}

impl Inner {
    /// Admits work now, then answers after the configured latency unless the
    /// connection is destroyed first.
    fn run<T, F>(self: &Arc<Self>, answer: F) -> BoxFuture<'static, Result<T, DbError>>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, DbError> + Send + 'static,
    {
        let ticket = match self.tracker.admit() {
            Ok(ticket) => ticket,
            Err(e) => return future::ready(Err(e)).boxed(),
        };
        let inner = Arc::clone(self);
        async move {
            let _ticket = ticket;
            inner
                .tracker
                .guard(async {
                    tokio::time::sleep(inner.latency).await;
                    answer(&inner)
                })
                .await
        }
        .boxed()
    }

    fn respond(
        self: &Arc<Self>,
        sql: &str,
        params: Vec<Value>,
    ) -> BoxFuture<'static, Result<QueryResult, DbError>> {
        let sql = sql.to_string();
        self.run(move |inner| (inner.responder)(&sql, &params))
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn connect(&self) -> Result<(), DbError> {
        if let Some(msg) = &self.inner.connect_error {
            self.inner.tracker.set_destroyed(Some(msg.as_str()));
            return Err(DbError::Connection(msg.clone()));
        }
        self.inner.tracker.set_connected()?;
        debug!(database = %self.inner.database, "memory connection connected");
        Ok(())
    }

    async fn close(&self) -> Result<(), DbError> {
        if self.inner.tracker.drain().await {
            self.inner.tracker.set_destroyed(None);
        }
        Ok(())
    }

    fn destroy(&self, msg: Option<&str>) {
        self.inner.tracker.set_destroyed(msg);
    }

    fn query(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> BoxFuture<'static, Result<QueryResult, DbError>> {
        self.inner.respond(sql, params)
    }

    fn prepare(&self, sql: &str) -> BoxFuture<'static, Result<Arc<dyn PreparedStatement>, DbError>> {
        let statement: Arc<dyn PreparedStatement> = Arc::new(MemoryStatement {
            sql: sql.to_string(),
            inner: Arc::clone(&self.inner),
        });
        self.inner.run(move |_| Ok(statement))
    }

    fn query_stream(&self, sql: &str, params: Vec<Value>) -> RowEvents {
        stream::once(self.inner.respond(sql, params))
            .flat_map(|result| match result {
                Ok(result) => stream::iter(result.rows.into_iter().map(Ok)).left_stream(),
                Err(e) => stream::once(future::ready(Err(e))).right_stream(),
            })
            .boxed()
    }

    fn state(&self) -> ConnectionState {
        self.inner.tracker.state()
    }
}

struct MemoryStatement {
    sql: String,
    inner: Arc<Inner>,
}

impl PreparedStatement for MemoryStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn exec(&self, params: Vec<Value>) -> BoxFuture<'static, Result<QueryResult, DbError>> {
        self.inner.respond(&self.sql, params)
    }
}
