//! Lifecycle bookkeeping shared by connection implementations.
//!
//! Work is admitted at call time and holds a [`Ticket`] until it settles.
//! Closing stops admission and waits for outstanding tickets; destroying
//! wakes every waiter with a failure.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::DbError;
use crate::udbc::connection::ConnectionState;

const DEFAULT_DESTROY_MSG: &str = "connection destroyed";

#[derive(Debug)]
pub struct StateTracker {
    state: watch::Sender<ConnectionState>,
    in_flight: watch::Sender<usize>,
    destroy_msg: Mutex<Option<String>>,
}

impl StateTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: watch::Sender::new(ConnectionState::Disconnected),
            in_flight: watch::Sender::new(0),
            destroy_msg: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Accepts one unit of work, or refuses it once closing or destroyed.
    pub fn admit(self: &Arc<Self>) -> Result<Ticket, DbError> {
        match self.state() {
            ConnectionState::Closing => Err(DbError::Connection("connection is closing".into())),
            ConnectionState::Destroyed => Err(self.destroyed_error()),
            _ => {
                self.in_flight.send_modify(|n| *n += 1);
                Ok(Ticket {
                    tracker: Arc::clone(self),
                })
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    pub fn set_connected(&self) -> Result<(), DbError> {
        let mut refused = None;
        self.state.send_if_modified(|s| match *s {
            ConnectionState::Disconnected => {
                *s = ConnectionState::Connected;
                true
            }
            ConnectionState::Connected => false,
            other => {
                refused = Some(other);
                false
            }
        });
        match refused {
            Some(state) => Err(DbError::Connection(format!("cannot connect, connection is {state}"))),
            None => Ok(()),
        }
    }

    /// Stops admitting work and waits until all admitted work has settled.
    ///
    /// Returns false when the connection was already destroyed.
    pub async fn drain(&self) -> bool {
        let closing = self.state.send_if_modified(|s| match *s {
            ConnectionState::Destroyed => false,
            _ => {
                *s = ConnectionState::Closing;
                true
            }
        });
        if !closing && self.state() == ConnectionState::Destroyed {
            return false;
        }
        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|n| *n == 0).await;
        true
    }

    pub fn set_destroyed(&self, msg: Option<&str>) {
        if let Some(msg) = msg {
            *self.destroy_msg.lock() = Some(msg.to_string());
        }
        self.state.send_replace(ConnectionState::Destroyed);
    }

    /// Waits until the connection has been connected, or fails if it is destroyed first.
    pub async fn ready(&self) -> Result<(), DbError> {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|s| *s != ConnectionState::Disconnected).await {
            Ok(s) => *s,
            Err(_) => ConnectionState::Destroyed,
        };
        match state {
            ConnectionState::Destroyed => Err(self.destroyed_error()),
            _ => Ok(()),
        }
    }

    /// Resolves with the destroy error once the connection is destroyed.
    pub async fn destroyed(&self) -> DbError {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == ConnectionState::Destroyed).await;
        self.destroyed_error()
    }

    /// Runs admitted work, failing it as soon as the connection is destroyed.
    pub async fn guard<T, F>(&self, work: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        tokio::select! {
            err = self.destroyed() => Err(err),
            result = async {
                self.ready().await?;
                work.await
            } => result,
        }
    }

    fn destroyed_error(&self) -> DbError {
        let msg = self.destroy_msg.lock().clone();
        DbError::Connection(msg.unwrap_or_else(|| DEFAULT_DESTROY_MSG.to_string()))
    }
}

/// One admitted unit of work. Dropping it marks the work settled.
#[derive(Debug)]
pub struct Ticket {
    tracker: Arc<StateTracker>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.tracker.in_flight.send_modify(|n| *n -= 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_waits_for_tickets() {
        let tracker = StateTracker::new();
        tracker.set_connected().unwrap();
        let ticket = tracker.admit().unwrap();
        assert_eq!(tracker.in_flight(), 1);

        let t = Arc::clone(&tracker);
        let drained = tokio::spawn(async move { t.drain().await });
        tokio::task::yield_now().await;
        assert_eq!(tracker.state(), ConnectionState::Closing);
        assert!(tracker.admit().is_err());

        drop(ticket);
        assert!(drained.await.unwrap());
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_destroy_fails_guarded_work() {
        let tracker = StateTracker::new();
        tracker.set_connected().unwrap();
        let t = Arc::clone(&tracker);
        let work = tokio::spawn(async move {
            t.guard(std::future::pending::<Result<(), DbError>>()).await
        });
        tokio::task::yield_now().await;
        tracker.set_destroyed(Some("bye"));
        match work.await.unwrap() {
            Err(DbError::Connection(msg)) => assert_eq!(msg, "bye"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(tracker.set_connected().is_err());
        assert!(!tracker.drain().await);
    }
}
