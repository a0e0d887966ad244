use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt, future, stream};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, Row as MyRow, Statement};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::error::DbError;
use crate::udbc::connection::{
    Connection, ConnectionState, PreparedStatement, QueryResult, RowEvents,
};
use crate::udbc::state::StateTracker;
use crate::udbc::value::Value;
use crate::udbc_mysql::value_codec::{map_row, to_params};

pub struct MysqlConnection {
    inner: Arc<Inner>,
}

struct Inner {
    opts: Opts,
    conn: Mutex<Option<Conn>>,
    tracker: Arc<StateTracker>,
}

impl MysqlConnection {
    pub fn new(opts: Opts) -> Self {
        Self {
            inner: Arc::new(Inner {
                opts,
                conn: Mutex::new(None),
                tracker: StateTracker::new(),
            }),
        }
    }

    fn to_result(rows: Vec<MyRow>, affected_rows: u64) -> QueryResult {
        let mut columns = Vec::new();
        let rows = rows
            .iter()
            .map(|row| {
                let (names, values) = map_row(row);
                if columns.is_empty() {
                    columns = names;
                }
                values
            })
            .collect();
        QueryResult {
            columns,
            rows,
            affected_rows,
        }
    }
}

impl Inner {
    /// Admits work now and runs it on the connection once connected.
    fn run<T, F>(self: &Arc<Self>, work: F) -> BoxFuture<'static, Result<T, DbError>>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut Conn) -> BoxFuture<'c, Result<T, DbError>> + Send + 'static,
    {
        let ticket = match self.tracker.admit() {
            Ok(ticket) => ticket,
            Err(e) => return future::ready(Err(e)).boxed(),
        };
        let inner = Arc::clone(self);
        async move {
            let _ticket = ticket;
            let result = inner
                .tracker
                .guard(async {
                    let mut slot = inner.conn.lock().await;
                    let conn = slot
                        .as_mut()
                        .ok_or_else(|| DbError::Connection("not connected".into()))?;
                    work(conn).await
                })
                .await;
            // A destroyed connection may have been interrupted mid-protocol.
            if inner.tracker.state() == ConnectionState::Destroyed {
                inner.conn.lock().await.take();
            }
            result
        }
        .boxed()
    }
}

#[async_trait]
impl Connection for MysqlConnection {
    async fn connect(&self) -> Result<(), DbError> {
        let conn = match Conn::new(self.inner.opts.clone()).await {
            Ok(conn) => conn,
            Err(e) => {
                let err = DbError::from(e);
                self.inner.tracker.set_destroyed(Some(err.to_string().as_str()));
                return Err(err);
            }
        };
        *self.inner.conn.lock().await = Some(conn);
        if let Err(e) = self.inner.tracker.set_connected() {
            self.inner.conn.lock().await.take();
            return Err(e);
        }
        debug!(server = %self.inner.opts.ip_or_hostname(), "mysql connection connected");
        Ok(())
    }

    async fn close(&self) -> Result<(), DbError> {
        if !self.inner.tracker.drain().await {
            return Ok(());
        }
        let conn = self.inner.conn.lock().await.take();
        self.inner.tracker.set_destroyed(None);
        if let Some(conn) = conn {
            conn.disconnect().await?;
        }
        Ok(())
    }

    fn destroy(&self, msg: Option<&str>) {
        self.inner.tracker.set_destroyed(msg);
        if let Ok(mut slot) = self.inner.conn.try_lock() {
            slot.take();
        }
    }

    fn query(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> BoxFuture<'static, Result<QueryResult, DbError>> {
        let sql = sql.to_string();
        self.inner.run(move |conn: &mut Conn| {
            async move {
                let rows: Vec<MyRow> = conn.exec(sql.as_str(), to_params(&params)).await?;
                Ok(Self::to_result(rows, conn.affected_rows()))
            }
            .boxed()
        })
    }

    fn prepare(&self, sql: &str) -> BoxFuture<'static, Result<Arc<dyn PreparedStatement>, DbError>> {
        let sql = sql.to_string();
        let inner = Arc::clone(&self.inner);
        self.inner.run(move |conn: &mut Conn| {
            async move {
                let stmt = conn.prep(sql.as_str()).await?;
                let prepared: Arc<dyn PreparedStatement> =
                    Arc::new(MysqlStatement { sql, stmt, inner });
                Ok(prepared)
            }
            .boxed()
        })
    }

    fn query_stream(&self, sql: &str, params: Vec<Value>) -> RowEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let rows_tx = tx.clone();
        let sql = sql.to_string();
        let work = self.inner.run(move |conn: &mut Conn| {
            async move {
                let mut result = conn.exec_iter(sql.as_str(), to_params(&params)).await?;
                result
                    .for_each(|row| {
                        let _ = rows_tx.send(Ok(map_row(&row).1));
                    })
                    .await?;
                Ok(())
            }
            .boxed()
        });
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => return stream::once(future::ready(Err(DbError::Task(e.to_string())))).boxed(),
        };
        runtime.spawn(async move {
            if let Err(e) = work.await {
                let _ = tx.send(Err(e));
            }
        });
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
    }

    fn state(&self) -> ConnectionState {
        self.inner.tracker.state()
    }
}

struct MysqlStatement {
    sql: String,
    stmt: Statement,
    inner: Arc<Inner>,
}

impl PreparedStatement for MysqlStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn exec(&self, params: Vec<Value>) -> BoxFuture<'static, Result<QueryResult, DbError>> {
        let stmt = self.stmt.clone();
        self.inner.run(move |conn: &mut Conn| {
            async move {
                let rows: Vec<MyRow> = conn.exec(stmt, to_params(&params)).await?;
                Ok(MysqlConnection::to_result(rows, conn.affected_rows()))
            }
            .boxed()
        })
    }
}
