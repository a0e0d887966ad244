use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::debug;

use crate::pool::dispatch::{self, Pending, RowStream};
use crate::udbc::connection::{Connection, ConnectionState, PreparedStatement, QueryResult};
use crate::udbc::value::Value;

/// A pool-owned connection plus its load and reservation bookkeeping.
pub struct Handle {
    id: usize,
    conn: Arc<dyn Connection>,
    running: AtomicUsize,
    reserved: AtomicBool,
}

impl Handle {
    pub(crate) fn new(id: usize, conn: Arc<dyn Connection>) -> Self {
        Self {
            id,
            conn,
            running: AtomicUsize::new(0),
            reserved: AtomicBool::new(false),
        }
    }

    /// Position of this handle in the pool.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of operations dispatched to this handle and not yet completed.
    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved.load(Ordering::Acquire)
    }

    /// Returns the handle to load balancing.
    pub fn release(&self) {
        if self.reserved.swap(false, Ordering::AcqRel) {
            debug!(handle = self.id, "connection released");
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    // Callers hold the pool's selection lock.
    pub(crate) fn mark_reserved(&self) {
        self.reserved.store(true, Ordering::Release);
    }

    /// Counts one operation against this handle until the guard drops.
    pub(crate) fn track(self: &Arc<Self>) -> LoadGuard {
        let running = self.running.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(handle = self.id, running, "operation dispatched");
        LoadGuard {
            handle: Arc::clone(self),
        }
    }

    /// Runs a query on this handle directly, bypassing selection.
    pub fn query(self: &Arc<Self>, sql: &str, params: Vec<Value>) -> Pending<QueryResult> {
        dispatch::query(self.track(), sql, params)
    }

    pub fn prepare(self: &Arc<Self>, sql: &str) -> Pending<Arc<dyn PreparedStatement>> {
        dispatch::prepare(self.track(), sql)
    }

    pub fn query_stream(self: &Arc<Self>, sql: &str, params: Vec<Value>) -> RowStream {
        dispatch::query_stream(self.track(), sql, params)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("running", &self.running_count())
            .field("reserved", &self.is_reserved())
            .field("state", &self.state())
            .finish()
    }
}

/// One unit of outstanding work on a handle. Dropping it completes the unit.
///
/// A guard only exists after its increment, so the count never goes below zero.
#[derive(Debug)]
pub(crate) struct LoadGuard {
    handle: Arc<Handle>,
}

impl LoadGuard {
    pub(crate) fn connection(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.handle.conn)
    }

    pub(crate) fn handle_id(&self) -> usize {
        self.handle.id
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        let running = self.handle.running.fetch_sub(1, Ordering::AcqRel) - 1;
        debug!(handle = self.handle.id, running, "operation completed");
    }
}

/// Exclusive use of one handle; released back to the pool on drop.
#[derive(Debug)]
pub struct Reservation {
    handle: Arc<Handle>,
}

impl Reservation {
    pub(crate) fn new(handle: Arc<Handle>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }
}

impl Deref for Reservation {
    type Target = Arc<Handle>;

    fn deref(&self) -> &Arc<Handle> {
        &self.handle
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.handle.release();
    }
}

/// Builds a handle around an arbitrary connection for tests.
#[cfg(test)]
pub(crate) fn test_handle(id: usize, conn: Arc<dyn Connection>) -> Arc<Handle> {
    Arc::new(Handle::new(id, conn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ConnectionOptions;
    use crate::udbc::driver::Driver;
    use crate::udbc_memory::MemoryDriver;

    fn handle() -> Arc<Handle> {
        let conn = MemoryDriver::new()
            .open(&ConnectionOptions::new().database("test"))
            .unwrap();
        test_handle(0, conn)
    }

    #[test]
    fn test_guard_counts_exactly_once() {
        let h = handle();
        let a = h.track();
        let b = h.track();
        assert_eq!(h.running_count(), 2);
        drop(a);
        assert_eq!(h.running_count(), 1);
        drop(b);
        assert_eq!(h.running_count(), 0);
    }

    #[test]
    fn test_reservation_releases_on_drop() {
        let h = handle();
        h.mark_reserved();
        let r = Reservation::new(Arc::clone(&h));
        assert!(r.is_reserved());
        drop(r);
        assert!(!h.is_reserved());
        h.release();
        assert!(!h.is_reserved());
    }
}
