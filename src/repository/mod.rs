// ==========================================
// 生产排程核心 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 事务: 跨实体写入使用 *_tx 关联函数,由引擎层组合
// ==========================================

pub mod adjustment_log_repo;
pub mod conflict_repo;
pub mod directory_repo;
pub mod error;
pub mod metrics_repo;
pub mod resource_lock;
pub mod schedule_repo;
pub mod sql_utils;

// 重导出核心仓储
pub use adjustment_log_repo::AdjustmentLogRepository;
pub use conflict_repo::{ConflictQuery, ResourceConflictRepository, UpsertOutcome};
pub use directory_repo::DirectoryRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use metrics_repo::{EfficiencyRecordRepository, OeeRecordRepository, RecordWrite};
pub use resource_lock::{ResourceKey, ResourceLockRegistry};
pub use schedule_repo::{ProductionScheduleRepository, ScheduleQuery};
