// ==========================================
// 生产排程核心 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合排程引擎所需的 Repository 与共享连接
// 事务: with_transaction 内只允许调用仓储的 *_tx 函数
//       (连接锁不可重入)
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Transaction};

use crate::repository::{
    AdjustmentLogRepository, DirectoryRepository, EfficiencyRecordRepository, OeeRecordRepository,
    ProductionScheduleRepository, RepositoryError, ResourceConflictRepository,
};

/// 排程引擎仓储集合
#[derive(Clone)]
pub struct SchedulingRepositories {
    conn: Arc<Mutex<Connection>>,
    /// 排程仓储
    pub schedule_repo: Arc<ProductionScheduleRepository>,
    /// 资源冲突仓储
    pub conflict_repo: Arc<ResourceConflictRepository>,
    /// 调整日志仓储
    pub adjustment_log_repo: Arc<AdjustmentLogRepository>,
    pub oee_repo: Arc<OeeRecordRepository>,
    pub efficiency_repo: Arc<EfficiencyRecordRepository>,
    /// 工单/资源目录 (SQLite 实现)
    pub directory_repo: Arc<DirectoryRepository>,
}

impl SchedulingRepositories {
    /// 基于同一连接创建全部仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            schedule_repo: Arc::new(ProductionScheduleRepository::new(conn.clone())),
            conflict_repo: Arc::new(ResourceConflictRepository::new(conn.clone())),
            adjustment_log_repo: Arc::new(AdjustmentLogRepository::new(conn.clone())),
            oee_repo: Arc::new(OeeRecordRepository::new(conn.clone())),
            efficiency_repo: Arc::new(EfficiencyRecordRepository::new(conn.clone())),
            directory_repo: Arc::new(DirectoryRepository::new(conn.clone())),
            conn,
        }
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// 在单个事务中执行 f; f 返回 Err 时整体回滚
    pub fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(value)
    }

    /// 只读访问 (不开启事务)
    pub fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        f(&conn)
    }
}
