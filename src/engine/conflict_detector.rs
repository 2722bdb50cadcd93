// ==========================================
// 生产排程核心 - 资源冲突检测引擎
// ==========================================
// 红线: 严格相交 startA < endB AND startB < endA
// 红线: 合计占用 > 100% 才记录冲突,100% 本身不冲突
// 红线: 按去重键 upsert,重复检测不产生重复行
// ==========================================
// 职责: 扫描资源时间窗内的排程重叠,计算合计占用与严重度
// 输出: ResourceConflict 行 + 排程 has_conflict 标记
// ==========================================

mod core;
mod overlap;
mod retry;


pub use self::core::{ConflictDetector, DetectionReport, SYSTEM_OPERATOR};
pub use overlap::{find_candidates, pair_candidate, SeverityThresholds, FULL_CAPACITY_PCT};
pub use retry::retry_batch;
