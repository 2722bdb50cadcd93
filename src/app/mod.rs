// ==========================================
// 生产排程核心 - 应用层
// ==========================================
// 职责: 为宿主应用装配共享服务
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, SchedulingServices};
