use futures_util::future::join_all;
use tracing::{info, warn};

use crate::error::DbError;
use crate::pool::Pool;
use crate::udbc::connection::ConnectionState;

impl Pool {
    /// Connects every handle concurrently.
    ///
    /// Waits for all of them to settle and reports the first failure in pool order.
    pub async fn connect(&self) -> Result<(), DbError> {
        let handles = self.selector.handles();
        let results = join_all(handles.iter().map(|h| h.connection().connect())).await;
        info!(size = handles.len(), "connect fan-out settled");
        first_failure("connect", results)
    }

    /// Closes every handle concurrently; outstanding work is left to the
    /// connections to drain.
    pub async fn close(&self) -> Result<(), DbError> {
        let handles = self.selector.handles();
        let results = join_all(handles.iter().map(|h| h.connection().close())).await;
        info!(size = handles.len(), "close fan-out settled");
        first_failure("close", results)
    }

    /// Destroys every handle without waiting. In-flight work fails as the
    /// connections tear down.
    pub fn destroy(&self, msg: Option<&str>) {
        for h in self.selector.handles() {
            h.connection().destroy(msg);
        }
        info!(size = self.size(), msg = ?msg, "destroy fan-out issued");
    }

    /// Running count of every unreserved handle, in pool order.
    pub fn running_load(&self) -> Vec<usize> {
        self.selector
            .handles()
            .iter()
            .filter(|h| !h.is_reserved())
            .map(|h| h.running_count())
            .collect()
    }

    /// Lifecycle state of every handle, in pool order.
    pub fn states(&self) -> Vec<ConnectionState> {
        self.selector.handles().iter().map(|h| h.state()).collect()
    }
}

fn first_failure(op: &str, results: Vec<Result<(), DbError>>) -> Result<(), DbError> {
    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!(op, failed, "fan-out had failures");
    }
    results.into_iter().collect()
}
