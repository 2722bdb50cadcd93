// ==========================================
// 生产排程核心 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、状态机规则
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod adjustment;
pub mod conflict;
pub mod metrics;
pub mod resource;
pub mod schedule;
pub mod types;

// 重导出核心类型
pub use adjustment::{AdjustmentSnapshot, ScheduleAdjustmentLog, ScheduleSnapshot};
pub use conflict::{ConflictCandidate, ConflictKey, ResourceConflict};
pub use metrics::{
    EfficiencyGrade, EfficiencyInput, EfficiencyMetrics, EquipmentOeeRecord, OeeGrade, OeeInput,
    OeeMetrics, OeeSummary, WorkerEfficiencyRecord,
};
pub use resource::{ResourceProfile, WorkOrder};
pub use schedule::{ProductionSchedule, ResourceSelection, TimeWindow, ALGORITHM_VERSION};
pub use types::{
    AdjustmentType, ApprovalStatus, ConflictSeverity, ConflictStatus, ResourceType,
    ScheduleStatus, TriggerSource,
};
