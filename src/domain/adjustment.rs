// ==========================================
// 生产排程核心 - 排程调整日志领域模型
// ==========================================
// 红线: 调整日志只追加,不删除
// 红线: before/after 为带类型标签的快照,读写时校验
// 对齐: schedule_adjustment_log 表
// ==========================================

use crate::domain::schedule::{ResourceSelection, TimeWindow};
use crate::domain::types::{AdjustmentType, ApprovalStatus, ScheduleStatus, TriggerSource};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ScheduleSnapshot - 排程业务字段快照
// ==========================================
// 不含 revision / has_conflict / 创建更新时间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub schedule_id: String,
    pub work_order_id: String,
    pub equipment_id: Option<String>,
    pub worker_id: Option<String>,
    pub workshop_id: Option<String>,
    pub process_id: Option<String>,
    pub scheduled_start: NaiveDateTime,
    pub scheduled_end: NaiveDateTime,
    pub actual_start: Option<NaiveDateTime>,
    pub actual_end: Option<NaiveDateTime>,
    pub allocation_pct: f64,
    pub priority_score: f64,
    pub status: ScheduleStatus,
    pub is_manually_adjusted: bool,
    pub algorithm_version: String,
}

impl ScheduleSnapshot {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.scheduled_start, self.scheduled_end)
    }

    pub fn selection(&self) -> ResourceSelection {
        ResourceSelection {
            equipment_id: self.equipment_id.clone(),
            worker_id: self.worker_id.clone(),
            workshop_id: self.workshop_id.clone(),
            process_id: self.process_id.clone(),
            allocation_pct: self.allocation_pct,
        }
    }

    /// 计划字段 (时间窗、资源、占用、优先级、人工调整标记) 是否一致
    ///
    /// 状态与实际开始/结束由状态迁移推进,不参与比较
    pub fn same_planning(&self, other: &ScheduleSnapshot) -> bool {
        self.selection() == other.selection()
            && self.window() == other.window()
            && self.priority_score == other.priority_score
            && self.is_manually_adjusted == other.is_manually_adjusted
    }
}

// ==========================================
// AdjustmentSnapshot - 按调整类型打标签的快照
// ==========================================
// JSON 形如 {"type":"TIME_CHANGE","schedule":{...}}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "schedule", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentSnapshot {
    TimeChange(ScheduleSnapshot),
    ResourceChange(ScheduleSnapshot),
    UrgentInsert(ScheduleSnapshot),
    PriorityChange(ScheduleSnapshot),
    Compensation(ScheduleSnapshot),
}

impl AdjustmentSnapshot {
    pub fn new(adjustment_type: AdjustmentType, snapshot: ScheduleSnapshot) -> Self {
        match adjustment_type {
            AdjustmentType::TimeChange => AdjustmentSnapshot::TimeChange(snapshot),
            AdjustmentType::ResourceChange => AdjustmentSnapshot::ResourceChange(snapshot),
            AdjustmentType::UrgentInsert => AdjustmentSnapshot::UrgentInsert(snapshot),
            AdjustmentType::PriorityChange => AdjustmentSnapshot::PriorityChange(snapshot),
            AdjustmentType::Compensation => AdjustmentSnapshot::Compensation(snapshot),
        }
    }

    pub fn adjustment_type(&self) -> AdjustmentType {
        match self {
            AdjustmentSnapshot::TimeChange(_) => AdjustmentType::TimeChange,
            AdjustmentSnapshot::ResourceChange(_) => AdjustmentType::ResourceChange,
            AdjustmentSnapshot::UrgentInsert(_) => AdjustmentType::UrgentInsert,
            AdjustmentSnapshot::PriorityChange(_) => AdjustmentType::PriorityChange,
            AdjustmentSnapshot::Compensation(_) => AdjustmentType::Compensation,
        }
    }

    pub fn schedule(&self) -> &ScheduleSnapshot {
        match self {
            AdjustmentSnapshot::TimeChange(s)
            | AdjustmentSnapshot::ResourceChange(s)
            | AdjustmentSnapshot::UrgentInsert(s)
            | AdjustmentSnapshot::PriorityChange(s)
            | AdjustmentSnapshot::Compensation(s) => s,
        }
    }

    /// 结构校验: 标签与日志类型一致、时间窗合法
    pub fn validate(&self, expected: AdjustmentType) -> Result<(), String> {
        if self.adjustment_type() != expected {
            return Err(format!(
                "快照类型 {} 与调整类型 {} 不一致",
                self.adjustment_type(),
                expected
            ));
        }
        let schedule = self.schedule();
        if !schedule.window().is_valid() {
            return Err(format!(
                "快照时间窗非法: {} ~ {}",
                schedule.scheduled_start, schedule.scheduled_end
            ));
        }
        if schedule.schedule_id.trim().is_empty() {
            return Err("快照缺少 schedule_id".to_string());
        }
        Ok(())
    }

    /// 序列化为 JSON (写入前校验)
    pub fn to_json(&self, expected: AdjustmentType) -> Result<String, String> {
        self.validate(expected)?;
        serde_json::to_string(self).map_err(|e| e.to_string())
    }

    /// 从 JSON 解析并校验
    pub fn from_json(raw: &str, expected: AdjustmentType) -> Result<Self, String> {
        let snapshot: AdjustmentSnapshot =
            serde_json::from_str(raw).map_err(|e| format!("快照解析失败: {}", e))?;
        snapshot.validate(expected)?;
        Ok(snapshot)
    }
}

// ==========================================
// ScheduleAdjustmentLog - 排程调整日志
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAdjustmentLog {
    pub log_id: String,
    pub schedule_id: String,
    pub adjustment_type: AdjustmentType,
    pub trigger_source: TriggerSource,

    // ===== 快照 =====
    pub before_data: AdjustmentSnapshot,
    pub after_data: AdjustmentSnapshot,

    pub reason: String,
    pub operator: String,
    pub affected_schedule_count: i32,

    // ===== 审批 =====
    pub requires_approval: bool,
    pub approval_status: ApprovalStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
    pub approval_comment: Option<String>,

    pub revision_after: i32,                // 调整落库后排程的 revision
    pub compensates_log_id: Option<String>, // 补偿调整指向的原日志
    pub created_at: NaiveDateTime,
}

impl ScheduleAdjustmentLog {
    pub fn is_pending(&self) -> bool {
        self.approval_status == ApprovalStatus::Pending
    }
}
