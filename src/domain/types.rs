// ==========================================
// 生产排程核心 - 领域类型定义
// ==========================================
// 职责: 排程/冲突/调整/指标共用的枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 排程状态 (Schedule Status)
// ==========================================
// 状态机: PENDING → CONFIRMED → IN_PROGRESS → COMPLETED
//         任意非终态 → CANCELLED
// 冲突标记是叠加层 (has_conflict),不是独立状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Pending,    // 待确认
    Confirmed,  // 已确认
    InProgress, // 执行中
    Completed,  // 已完成
    Cancelled,  // 已取消
}

impl ScheduleStatus {
    /// 参与冲突检测的状态
    pub const ACTIVE: [ScheduleStatus; 3] = [
        ScheduleStatus::Pending,
        ScheduleStatus::Confirmed,
        ScheduleStatus::InProgress,
    ];

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "PENDING",
            ScheduleStatus::Confirmed => "CONFIRMED",
            ScheduleStatus::InProgress => "IN_PROGRESS",
            ScheduleStatus::Completed => "COMPLETED",
            ScheduleStatus::Cancelled => "CANCELLED",
        }
    }

    /// 从字符串解析
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Some(ScheduleStatus::Pending),
            "CONFIRMED" => Some(ScheduleStatus::Confirmed),
            "IN_PROGRESS" => Some(ScheduleStatus::InProgress),
            "COMPLETED" => Some(ScheduleStatus::Completed),
            "CANCELLED" => Some(ScheduleStatus::Cancelled),
            _ => None,
        }
    }

    /// 是否终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Cancelled)
    }

    /// 状态迁移是否合法
    pub fn can_transition_to(&self, target: ScheduleStatus) -> bool {
        use ScheduleStatus::*;
        match (self, target) {
            (Pending, Confirmed) | (Confirmed, InProgress) | (InProgress, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 资源类型 (Resource Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Equipment, // 设备
    Worker,    // 人员
    Workshop,  // 车间
}

impl ResourceType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ResourceType::Equipment => "EQUIPMENT",
            ResourceType::Worker => "WORKER",
            ResourceType::Workshop => "WORKSHOP",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EQUIPMENT" => Some(ResourceType::Equipment),
            "WORKER" => Some(ResourceType::Worker),
            "WORKSHOP" => Some(ResourceType::Workshop),
            _ => None,
        }
    }

    /// production_schedule 表中对应的资源列
    pub fn schedule_column(&self) -> &'static str {
        match self {
            ResourceType::Equipment => "equipment_id",
            ResourceType::Worker => "worker_id",
            ResourceType::Workshop => "workshop_id",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 冲突严重度 (Conflict Severity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictSeverity {
    Low,    // 100% < 合计 ≤ 120%
    Medium, // 120% < 合计 ≤ 150%
    High,   // 合计 > 150%
}

impl ConflictSeverity {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ConflictSeverity::Low => "LOW",
            ConflictSeverity::Medium => "MEDIUM",
            ConflictSeverity::High => "HIGH",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Some(ConflictSeverity::Low),
            "MEDIUM" => Some(ConflictSeverity::Medium),
            "HIGH" => Some(ConflictSeverity::High),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 冲突状态 (Conflict Status)
// ==========================================
// 只允许 UNRESOLVED → RESOLVED / IGNORED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictStatus {
    Unresolved,
    Resolved,
    Ignored,
}

impl ConflictStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ConflictStatus::Unresolved => "UNRESOLVED",
            ConflictStatus::Resolved => "RESOLVED",
            ConflictStatus::Ignored => "IGNORED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "UNRESOLVED" => Some(ConflictStatus::Unresolved),
            "RESOLVED" => Some(ConflictStatus::Resolved),
            "IGNORED" => Some(ConflictStatus::Ignored),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 审批状态 (Approval Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Some(ApprovalStatus::Pending),
            "APPROVED" => Some(ApprovalStatus::Approved),
            "REJECTED" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 调整类型 (Adjustment Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    TimeChange,     // 时间窗调整
    ResourceChange, // 资源变更
    UrgentInsert,   // 紧急插单
    PriorityChange, // 优先级调整
    Compensation,   // 补偿调整 (撤销已生效的调整)
}

impl AdjustmentType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AdjustmentType::TimeChange => "TIME_CHANGE",
            AdjustmentType::ResourceChange => "RESOURCE_CHANGE",
            AdjustmentType::UrgentInsert => "URGENT_INSERT",
            AdjustmentType::PriorityChange => "PRIORITY_CHANGE",
            AdjustmentType::Compensation => "COMPENSATION",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "TIME_CHANGE" => Some(AdjustmentType::TimeChange),
            "RESOURCE_CHANGE" => Some(AdjustmentType::ResourceChange),
            "URGENT_INSERT" => Some(AdjustmentType::UrgentInsert),
            "PRIORITY_CHANGE" => Some(AdjustmentType::PriorityChange),
            "COMPENSATION" => Some(AdjustmentType::Compensation),
            _ => None,
        }
    }

    /// 是否属于高影响调整 (受审批门控)
    pub fn is_high_impact(&self) -> bool {
        matches!(
            self,
            AdjustmentType::UrgentInsert | AdjustmentType::ResourceChange
        )
    }
}

impl fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 触发来源 (Trigger Source)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSource {
    Manual,         // 人工
    System,         // 系统
    OrderChange,    // 订单变更
    EquipmentFault, // 设备故障
}

impl TriggerSource {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "MANUAL",
            TriggerSource::System => "SYSTEM",
            TriggerSource::OrderChange => "ORDER_CHANGE",
            TriggerSource::EquipmentFault => "EQUIPMENT_FAULT",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "MANUAL" => Some(TriggerSource::Manual),
            "SYSTEM" => Some(TriggerSource::System),
            "ORDER_CHANGE" => Some(TriggerSource::OrderChange),
            "EQUIPMENT_FAULT" => Some(TriggerSource::EquipmentFault),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_status_transitions() {
        use ScheduleStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Pending));
    }

    #[test]
    fn test_db_str_roundtrip_for_status_enums() {
        for s in [
            ScheduleStatus::Pending,
            ScheduleStatus::Confirmed,
            ScheduleStatus::InProgress,
            ScheduleStatus::Completed,
            ScheduleStatus::Cancelled,
        ] {
            assert_eq!(ScheduleStatus::from_db_str(s.to_db_str()), Some(s));
        }
        assert_eq!(ScheduleStatus::from_db_str("unknown"), None);
        assert_eq!(ResourceType::from_db_str("equipment"), Some(ResourceType::Equipment));
    }

    #[test]
    fn test_high_impact_adjustment_types() {
        assert!(AdjustmentType::UrgentInsert.is_high_impact());
        assert!(AdjustmentType::ResourceChange.is_high_impact());
        assert!(!AdjustmentType::TimeChange.is_high_impact());
        assert!(!AdjustmentType::PriorityChange.is_high_impact());
    }
}
