// ==========================================
// 生产排程核心 - 导入层
// ==========================================
// 职责: 从外部文件读取指标输入行
// 支持: CSV
// ==========================================

pub mod error;
pub mod metrics_csv;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use metrics_csv::{read_efficiency_inputs, read_oee_inputs, MetricsCsvReader};
