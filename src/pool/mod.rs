//! A fixed set of connections balanced by least load.
//!
//! # Example
//!
//! ```rust,no_run
//! use lbpool::options::{ConnectionOptions, PoolOptions};
//! use lbpool::pool::Pool;
//! use lbpool::udbc_memory::MemoryDriver;
//!
//! # async fn example() -> Result<(), lbpool::error::DbError> {
//! let pool = Pool::new(
//!     Some(PoolOptions::new(4)),
//!     Some(ConnectionOptions::new().database("demo")),
//!     &MemoryDriver::new(),
//! )?;
//! pool.connect().await?;
//!
//! let result = pool.query("SELECT ?", &(42,)).await?;
//! println!("{} rows, load {:?}", result.row_count(), pool.running_load());
//!
//! pool.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod handle;
mod lifecycle;
mod selector;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::DbError;
use crate::options::{ConnectionOptions, PoolOptions};
use crate::udbc::connection::{PreparedStatement, QueryResult};
use crate::udbc::driver::Driver;
use crate::udbc::value::{Value, to_values};

pub use dispatch::{DispatchResult, Operation, Pending, RowStream};
pub use handle::{Handle, Reservation};
use selector::Selector;

/// Least-loaded pool over a fixed number of connections.
pub struct Pool {
    selector: Selector,
    testing: bool,
}

impl Pool {
    /// Opens `nr_connections` connections through `driver`, all with the same options.
    ///
    /// Fails with [`DbError::Config`] before opening anything if either options
    /// object is missing or empty, or if the connection count is missing or not
    /// positive. No I/O happens here; call [`Pool::connect`] afterwards.
    pub fn new(
        pool_options: Option<PoolOptions>,
        connection_options: Option<ConnectionOptions>,
        driver: &dyn Driver,
    ) -> Result<Self, DbError> {
        let (Some(pool_options), Some(connection_options)) = (pool_options, connection_options)
        else {
            return Err(DbError::Config(
                "both pool options and connection options are required".into(),
            ));
        };
        let size = pool_options.validated_size()?;
        connection_options.validate()?;

        let handles = (0..size)
            .map(|id| {
                driver
                    .open(&connection_options)
                    .map(|conn| Arc::new(Handle::new(id, conn)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(driver = driver.name(), size, "connection pool created");
        Ok(Self {
            selector: Selector::new(handles),
            testing: pool_options.testing,
        })
    }

    pub fn builder() -> PoolBuilder {
        PoolBuilder::default()
    }

    /// Number of connections, fixed at construction.
    pub fn size(&self) -> usize {
        self.selector.handles().len()
    }

    /// Raw handle collection, only for pools built with `testing` set.
    pub fn handles(&self) -> Option<&[Arc<Handle>]> {
        self.testing.then(|| self.selector.handles())
    }

    /// Picks the least-loaded unreserved handle, reserving it when asked.
    ///
    /// A reserved handle stays out of load balancing until [`Handle::release`].
    pub fn next_connection(&self, reserve: bool) -> Option<Arc<Handle>> {
        self.selector.next(reserve)
    }

    /// Reserves the least-loaded handle until the returned guard drops.
    pub fn reserve(&self) -> Result<Reservation, DbError> {
        self.selector
            .next(true)
            .map(Reservation::new)
            .ok_or(DbError::NoAvailableConnection)
    }

    pub fn query<P>(&self, sql: &str, params: &P) -> Pending<QueryResult>
    where
        P: Serialize + ?Sized,
    {
        match to_values(params) {
            Ok(params) => self.query_values(sql, params),
            Err(e) => Pending::failed(e),
        }
    }

    pub fn prepare(&self, sql: &str) -> Pending<Arc<dyn PreparedStatement>> {
        match self.selector.next_tracked() {
            Some(guard) => dispatch::prepare(guard, sql),
            None => Pending::failed(self.unavailable("prepare")),
        }
    }

    pub fn query_stream<P>(&self, sql: &str, params: &P) -> RowStream
    where
        P: Serialize + ?Sized,
    {
        match to_values(params) {
            Ok(params) => self.query_stream_values(sql, params),
            Err(e) => RowStream::failed(e),
        }
    }

    /// Dispatches any [`Operation`] to the least-loaded handle.
    pub fn dispatch(&self, op: Operation) -> DispatchResult {
        match op {
            Operation::Query { sql, params } => DispatchResult::Query(self.query_values(&sql, params)),
            Operation::Prepare { sql } => DispatchResult::Prepare(self.prepare(&sql)),
            Operation::QueryStream { sql, params } => {
                DispatchResult::Stream(self.query_stream_values(&sql, params))
            }
        }
    }

    fn query_values(&self, sql: &str, params: Vec<Value>) -> Pending<QueryResult> {
        match self.selector.next_tracked() {
            Some(guard) => dispatch::query(guard, sql, params),
            None => Pending::failed(self.unavailable("query")),
        }
    }

    fn query_stream_values(&self, sql: &str, params: Vec<Value>) -> RowStream {
        match self.selector.next_tracked() {
            Some(guard) => dispatch::query_stream(guard, sql, params),
            None => RowStream::failed(self.unavailable("query_stream")),
        }
    }

    fn unavailable(&self, op: &'static str) -> DbError {
        warn!(op, size = self.size(), "all connections reserved, rejecting");
        DbError::NoAvailableConnection
    }
}

/// Chained construction of a [`Pool`].
#[derive(Debug, Default)]
pub struct PoolBuilder {
    pool_options: PoolOptions,
    connection_options: Option<ConnectionOptions>,
}

impl PoolBuilder {
    pub fn nr_connections(mut self, nr_connections: i64) -> Self {
        self.pool_options = self.pool_options.nr_connections(nr_connections);
        self
    }

    pub fn testing(mut self, testing: bool) -> Self {
        self.pool_options = self.pool_options.testing(testing);
        self
    }

    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = Some(options);
        self
    }

    pub fn build(self, driver: &dyn Driver) -> Result<Pool, DbError> {
        Pool::new(Some(self.pool_options), self.connection_options, driver)
    }
}
