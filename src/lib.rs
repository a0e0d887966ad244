pub mod error;
pub mod options;
pub mod pool;
pub mod pool_manager;
pub mod udbc;
pub mod udbc_memory;
#[cfg(feature = "mysql")]
pub mod udbc_mysql;

pub use error::DbError;
pub use options::{ConnectionOptions, PoolOptions};
pub use pool::Pool;
