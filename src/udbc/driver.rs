use crate::error::DbError;
use crate::options::ConnectionOptions;
use crate::udbc::connection::Connection;
use std::sync::Arc;

/// Factory for connections of one database kind.
///
/// Opening must not perform I/O; connecting is a separate step.
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, options: &ConnectionOptions) -> Result<Arc<dyn Connection>, DbError>;
}
