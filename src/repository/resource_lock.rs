// ==========================================
// 生产排程核心 - 资源级互斥锁
// ==========================================
// 职责: 同一 (资源类型, 资源ID) 上的变更操作串行执行
// 规则: 多资源按 key 排序后依次加锁,避免死锁
// 注意: 锁不可重入,持锁期间只调用 *_locked 内部函数
// ==========================================

use crate::domain::types::ResourceType;
use crate::repository::error::RepositoryError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// 资源锁键
pub type ResourceKey = (ResourceType, String);

#[derive(Default)]
pub struct ResourceLockRegistry {
    locks: Mutex<HashMap<ResourceKey, Arc<Mutex<()>>>>,
}

impl ResourceLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 持有全部资源锁执行 f,返回后释放
    pub fn with_locked<T, E, F>(&self, keys: &[ResourceKey], f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut sorted: Vec<ResourceKey> = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        let handles = self.handles_for(&sorted)?;
        let result = {
            let mut guards: Vec<MutexGuard<'_, ()>> = Vec::with_capacity(handles.len());
            for handle in &handles {
                let guard = handle
                    .lock()
                    .map_err(|e| RepositoryError::LockError(format!("资源锁已中毒: {}", e)))?;
                guards.push(guard);
            }
            tracing::trace!(resources = sorted.len(), "资源锁已获取");
            f()
        };
        drop(handles);
        self.prune();
        result
    }

    /// 当前登记的锁数量
    pub fn len(&self) -> usize {
        self.locks.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handles_for(&self, keys: &[ResourceKey]) -> Result<Vec<Arc<Mutex<()>>>, RepositoryError> {
        let mut map = self
            .locks
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(keys
            .iter()
            .map(|key| map.entry(key.clone()).or_default().clone())
            .collect())
    }

    /// 移除无人持有的锁条目
    fn prune(&self) {
        if let Ok(mut map) = self.locks.lock() {
            map.retain(|_, handle| Arc::strong_count(handle) > 1);
        }
    }
}
