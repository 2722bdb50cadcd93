// ==========================================
// 生产排程核心 - 外部协作方数据模型
// ==========================================
// 来源: 生产订单子系统 (工单) / 资源管理 (资源目录)
// 对齐: work_order / resource_profile 表
// ==========================================

use crate::domain::types::ResourceType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// WorkOrder - 工单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub work_order_id: String,
    pub required_skills: Vec<String>,
    pub quantity: i64,
    pub unit_work_minutes: f64, // 单件标准工时 (分钟)
    pub due_date: NaiveDate,
    pub is_urgent: bool,
}

impl WorkOrder {
    /// 满负荷下的工作量 (分钟)
    pub fn work_content_minutes(&self) -> f64 {
        self.quantity as f64 * self.unit_work_minutes
    }
}

// ==========================================
// ResourceProfile - 资源档案
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub resource_name: String,
    pub capabilities: Vec<String>,
    pub is_available: bool,
}

impl ResourceProfile {
    pub fn has_capability(&self, skill: &str) -> bool {
        self.capabilities.iter().any(|c| c == skill)
    }
}
