// ==========================================
// 生产排程核心 - 核心库
// ==========================================
// 范围: 资源冲突检测、排程调整审计与审批、OEE/人效指标
// 技术栈: Rust + SQLite
// 不含: 排程优化求解
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 导入层 - 指标输入文件
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// 应用层 - 服务装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AdjustmentType, ApprovalStatus, ConflictSeverity, ConflictStatus, ResourceType,
    ScheduleStatus, TriggerSource,
};

// 领域实体
pub use domain::{
    EquipmentOeeRecord, ProductionSchedule, ResourceConflict, ResourceSelection,
    ScheduleAdjustmentLog, TimeWindow, WorkerEfficiencyRecord,
};

// 引擎
pub use engine::{
    AdjustmentRecorder, ConflictDetector, MetricsEngine, ScheduleBuilder, SchedulingError,
    SchedulingResult,
};

// 应用
pub use app::SchedulingServices;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "生产排程核心";
