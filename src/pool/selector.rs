use std::sync::Arc;

use parking_lot::Mutex;

use crate::pool::handle::{Handle, LoadGuard};

/// Least-loaded choice among unreserved handles, ties broken by lowest index.
pub(crate) fn least_loaded(handles: &[Arc<Handle>]) -> Option<&Arc<Handle>> {
    let min_running = handles
        .iter()
        .filter(|h| !h.is_reserved())
        .map(|h| h.running_count())
        .min()?;
    handles
        .iter()
        .find(|h| !h.is_reserved() && h.running_count() == min_running)
}

/// Serializes selection so that choosing a handle and mutating it (reserving or
/// counting work against it) is one step relative to other selections.
pub(crate) struct Selector {
    handles: Box<[Arc<Handle>]>,
    lock: Mutex<()>,
}

impl Selector {
    pub(crate) fn new(handles: Vec<Arc<Handle>>) -> Self {
        Self {
            handles: handles.into_boxed_slice(),
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn handles(&self) -> &[Arc<Handle>] {
        &self.handles
    }

    pub(crate) fn next(&self, reserve: bool) -> Option<Arc<Handle>> {
        let _guard = self.lock.lock();
        let handle = least_loaded(&self.handles)?;
        if reserve {
            handle.mark_reserved();
        }
        Some(Arc::clone(handle))
    }

    /// Picks the least-loaded handle and counts one operation against it.
    pub(crate) fn next_tracked(&self) -> Option<LoadGuard> {
        let _guard = self.lock.lock();
        least_loaded(&self.handles).map(|h| h.track())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ConnectionOptions;
    use crate::pool::handle::test_handle;
    use crate::udbc::driver::Driver;
    use crate::udbc_memory::MemoryDriver;

    fn selector(k: usize) -> Selector {
        let driver = MemoryDriver::new();
        let options = ConnectionOptions::new().database("test");
        Selector::new(
            (0..k)
                .map(|i| test_handle(i, driver.open(&options).unwrap()))
                .collect(),
        )
    }

    #[test]
    fn test_ties_break_on_lowest_index() {
        let s = selector(3);
        assert_eq!(s.next(false).unwrap().id(), 0);
        let _g = s.next_tracked().unwrap();
        assert_eq!(s.next(false).unwrap().id(), 1);
    }

    #[test]
    fn test_load_spreads_evenly() {
        for k in 1..=6 {
            let s = selector(k);
            let mut guards = Vec::new();
            for m in 1..=(4 * k) {
                guards.push(s.next_tracked().unwrap());
                let lo = m / k;
                let hi = m.div_ceil(k);
                for h in s.handles() {
                    let c = h.running_count();
                    assert!(c == lo || c == hi, "k={k} m={m} count={c}");
                }
            }
        }
    }

    #[test]
    fn test_reserved_handle_is_skipped() {
        let s = selector(3);
        let reserved = s.next(true).unwrap();
        assert_eq!(reserved.id(), 0);
        for _ in 0..4 {
            assert_ne!(s.next_tracked().unwrap().handle_id(), 0);
        }
        assert_eq!(reserved.running_count(), 0);
    }

    #[test]
    fn test_none_when_all_reserved() {
        for k in 1..=4 {
            let s = selector(k);
            for _ in 0..k {
                assert!(s.next(true).is_some());
            }
            assert!(s.next(false).is_none());
            assert!(s.next_tracked().is_none());
        }
    }
}
