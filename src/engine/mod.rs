// ==========================================
// 生产排程核心 - 引擎层
// ==========================================
// 职责: 实现排程业务规则,不拼 SQL
// 红线: Engine 不拼 SQL, 跨实体写入通过仓储 *_tx 函数组合
// ==========================================

pub mod adjustment_recorder;
pub mod conflict_detector;
pub mod directory;
pub mod error;
pub mod events;
pub mod metrics;
pub mod priority;
pub mod repositories;
pub mod schedule_builder;

// 重导出核心引擎
pub use adjustment_recorder::{AdjustmentDraft, AdjustmentOutcome, AdjustmentRecorder, RejectionOutcome};
pub use conflict_detector::{ConflictDetector, DetectionReport, SeverityThresholds, SYSTEM_OPERATOR};
pub use directory::{DirectoryError, ResourceDirectory, WorkOrderDirectory};
pub use error::{SchedulingError, SchedulingResult};
pub use events::{
    NoOpEventPublisher, OptionalEventPublisher, SchedulingEvent, SchedulingEventPublisher,
    SchedulingEventType,
};
pub use metrics::{compute_efficiency, compute_oee, BatchFailure, BatchReport, MetricsEngine};
pub use priority::PriorityScorer;
pub use repositories::SchedulingRepositories;
pub use schedule_builder::{
    AdjustmentRequest, CreateScheduleRequest, ScheduleBuilder, ScheduleChange, ScheduleCreation,
    StatusChange,
};
