use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use tracing::info;

use crate::error::DbError;
use crate::options::{ConnectionOptions, PoolOptions};
use crate::pool::Pool;
use crate::udbc::driver::Driver;

// 全局单例（Rust 1.80+ 推荐）
pub static DB: LazyLock<PoolManager> = LazyLock::new(PoolManager::new);

/// 连接池注册表
/// Named registry of connection pools
pub struct PoolManager {
    pools: DashMap<String, Arc<Pool>>,
}

/// 获取全局 PoolManager 实例
pub fn pool_mgr() -> &'static PoolManager {
    &DB
}

impl PoolManager {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    /// 注册连接池，同名旧池被替换并返回
    pub fn register(&self, name: &str, pool: Pool) -> Option<Arc<Pool>> {
        info!(name, size = pool.size(), "pool registered");
        self.pools.insert(name.to_string(), Arc::new(pool))
    }

    /// Builds a pool and registers it under `name`.
    pub fn create(
        &self,
        name: &str,
        pool_options: PoolOptions,
        connection_options: ConnectionOptions,
        driver: &dyn Driver,
    ) -> Result<Arc<Pool>, DbError> {
        let pool = Arc::new(Pool::new(
            Some(pool_options),
            Some(connection_options),
            driver,
        )?);
        self.pools.insert(name.to_string(), Arc::clone(&pool));
        info!(name, size = pool.size(), driver = driver.name(), "pool registered");
        Ok(pool)
    }

    pub fn pool(&self, name: &str) -> Option<Arc<Pool>> {
        self.pools.get(name).map(|v| Arc::clone(v.value()))
    }

    /// Unregisters a pool. Its connections are left as they are.
    pub fn remove(&self, name: &str) -> Option<Arc<Pool>> {
        self.pools.remove(name).map(|(_, pool)| pool)
    }

    pub fn names(&self) -> Vec<String> {
        self.pools.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udbc_memory::MemoryDriver;

    #[test]
    fn test_register_and_lookup() {
        let manager = PoolManager::new();
        let pool = manager
            .create(
                "main",
                PoolOptions::new(2),
                ConnectionOptions::new().database("test"),
                &MemoryDriver::new(),
            )
            .unwrap();
        assert_eq!(pool.size(), 2);
        assert!(Arc::ptr_eq(&manager.pool("main").unwrap(), &pool));
        assert_eq!(manager.names(), vec!["main".to_string()]);

        let other = Pool::builder()
            .nr_connections(3)
            .connection_options(ConnectionOptions::new().database("test"))
            .build(&MemoryDriver::new())
            .unwrap();
        let replaced = manager.register("main", other).unwrap();
        assert!(Arc::ptr_eq(&replaced, &pool));
        assert_eq!(manager.pool("main").unwrap().size(), 3);

        assert!(manager.remove("main").is_some());
        assert!(manager.pool("main").is_none());
    }

    #[test]
    fn test_create_rejects_bad_options() {
        let manager = PoolManager::new();
        assert!(matches!(
            manager.create(
                "bad",
                PoolOptions::new(0),
                ConnectionOptions::new().database("test"),
                &MemoryDriver::new(),
            ),
            Err(DbError::Config(_))
        ));
        assert!(manager.pool("bad").is_none());
    }
}
