// ==========================================
// 生产排程核心 - 资源冲突领域模型
// ==========================================
// 红线: overlap_start = max(startA, startB), overlap_end = min(endA, endB)
// 红线: overlap_end > overlap_start
// 对齐: resource_conflict 表
// ==========================================

use crate::domain::schedule::TimeWindow;
use crate::domain::types::{ConflictSeverity, ConflictStatus, ResourceType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ResourceConflict - 资源冲突
// ==========================================
// schedule_id / conflicting_schedule_id 都只是排程ID引用,
// 通过ID查找,不持有排程
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConflict {
    pub conflict_id: String,
    pub schedule_id: String,             // 字典序较小的排程ID
    pub conflicting_schedule_id: String, // 字典序较大的排程ID
    pub resource_type: ResourceType,
    pub resource_id: String,

    // ===== 重叠窗口与占用 =====
    pub overlap_start: NaiveDateTime,
    pub overlap_end: NaiveDateTime,
    pub total_allocation_pct: f64,
    pub severity: ConflictSeverity,

    // ===== 处理状态 =====
    pub status: ConflictStatus,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<NaiveDateTime>,
    pub resolution_note: Option<String>,

    pub detected_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ResourceConflict {
    pub fn overlap_window(&self) -> TimeWindow {
        TimeWindow::new(self.overlap_start, self.overlap_end)
    }

    /// 去重键
    pub fn dedupe_key(&self) -> ConflictKey {
        ConflictKey {
            schedule_id: self.schedule_id.clone(),
            conflicting_schedule_id: self.conflicting_schedule_id.clone(),
            resource_type: self.resource_type,
            resource_id: self.resource_id.clone(),
            overlap_start: self.overlap_start,
            overlap_end: self.overlap_end,
        }
    }

    /// 是否涉及指定排程
    pub fn involves(&self, schedule_id: &str) -> bool {
        self.schedule_id == schedule_id || self.conflicting_schedule_id == schedule_id
    }
}

// ==========================================
// ConflictKey - 冲突去重键
// ==========================================
// (schedule_id, conflicting_schedule_id, 资源, 重叠窗口)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictKey {
    pub schedule_id: String,
    pub conflicting_schedule_id: String,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub overlap_start: NaiveDateTime,
    pub overlap_end: NaiveDateTime,
}

// ==========================================
// ConflictCandidate - 检测出的冲突 (尚未落库)
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictCandidate {
    pub key: ConflictKey,
    pub total_allocation_pct: f64,
    pub severity: ConflictSeverity,
}
