//! Wraps each query, prepare or streaming query around a selected handle.
//!
//! The handle's running count is raised before the operation starts and lowered
//! exactly once when it completes: when an async result settles (success or
//! failure), or when a row stream ends or is released.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::{StreamExt, future, stream};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::DbError;
use crate::pool::handle::LoadGuard;
use crate::udbc::connection::{PreparedStatement, QueryResult, Row, RowEvents};
use crate::udbc::value::Value;

/// One unit of work the pool can dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Query { sql: String, params: Vec<Value> },
    Prepare { sql: String },
    QueryStream { sql: String, params: Vec<Value> },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Query { .. } => "query",
            Operation::Prepare { .. } => "prepare",
            Operation::QueryStream { .. } => "query_stream",
        }
    }
}

/// What a dispatched [`Operation`] produced.
pub enum DispatchResult {
    Query(Pending<QueryResult>),
    Prepare(Pending<Arc<dyn PreparedStatement>>),
    Stream(RowStream),
}

/// Eventual result of an operation running on a pool connection.
///
/// The operation runs on the tokio runtime whether or not this is awaited;
/// dropping it detaches, it never cancels. Dispatching outside a runtime
/// yields an already failed `Pending` carrying [`DbError::Task`].
#[must_use = "the operation runs regardless, but its result is lost"]
pub struct Pending<T> {
    state: PendingState<T>,
}

enum PendingState<T> {
    Failed(Option<DbError>),
    Running(JoinHandle<Result<T, DbError>>),
}

impl<T> Pending<T> {
    pub(crate) fn failed(err: DbError) -> Self {
        Self {
            state: PendingState::Failed(Some(err)),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, DbError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Failed(err) => Poll::Ready(Err(err
                .take()
                .unwrap_or_else(|| DbError::Task("result already taken".into())))),
            PendingState::Running(task) => Pin::new(task)
                .poll(cx)
                .map(|joined| joined.map_err(DbError::from).and_then(|r| r)),
        }
    }
}

fn spawn_tracked<T, F>(guard: LoadGuard, op: &'static str, fut: F) -> Pending<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, DbError>> + Send + 'static,
{
    let runtime = match Handle::try_current() {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(handle = guard.handle_id(), op, "dispatched outside a tokio runtime");
            return Pending::failed(DbError::Task(e.to_string()));
        }
    };
    let task = runtime.spawn(async move {
        let result = fut.await;
        if let Err(e) = &result {
            debug!(handle = guard.handle_id(), op, error = %e, "operation failed");
        }
        drop(guard);
        result
    });
    Pending {
        state: PendingState::Running(task),
    }
}

pub(crate) fn query(guard: LoadGuard, sql: &str, params: Vec<Value>) -> Pending<QueryResult> {
    let fut = guard.connection().query(sql, params);
    spawn_tracked(guard, "query", fut)
}

pub(crate) fn prepare(guard: LoadGuard, sql: &str) -> Pending<Arc<dyn PreparedStatement>> {
    let fut = guard.connection().prepare(sql);
    spawn_tracked(guard, "prepare", fut)
}

pub(crate) fn query_stream(guard: LoadGuard, sql: &str, params: Vec<Value>) -> RowStream {
    let events = guard.connection().query_stream(sql, params);
    RowStream {
        events,
        guard: Some(guard),
    }
}

/// Rows of a streaming query. The stream ending is the end signal.
///
/// The handle's running count is held until the stream ends, until
/// [`RowStream::release`] is called, or until the stream is dropped,
/// whichever happens first.
pub struct RowStream {
    events: RowEvents,
    guard: Option<LoadGuard>,
}

impl RowStream {
    pub(crate) fn failed(err: DbError) -> Self {
        Self {
            events: stream::once(future::ready(Err(err))).boxed(),
            guard: None,
        }
    }

    /// Releases the handle's running count ahead of the stream's end, for
    /// callers that continue the work out of band. Later calls do nothing.
    pub fn release(&mut self) {
        self.guard.take();
    }

    /// Whether this stream still counts against its handle.
    pub fn is_tracked(&self) -> bool {
        self.guard.is_some()
    }
}

impl Stream for RowStream {
    type Item = Result<Row, DbError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.events.as_mut().poll_next(cx);
        if let Poll::Ready(None) = polled {
            this.guard.take();
        }
        polled
    }
}
