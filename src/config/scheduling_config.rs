// ==========================================
// 生产排程核心 - 排程配置快照
// ==========================================

use serde::{Deserialize, Serialize};

/// 排程配置 (每次请求读取一份,运行中不变)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// 受影响排程数超过该值时,高影响调整需要审批
    pub approval_affected_threshold: u32,
    /// LOW 严重度上限 (含),单位 %
    pub severity_low_max: f64,
    /// MEDIUM 严重度上限 (含),单位 %
    pub severity_medium_max: f64,
    /// 冲突检测整批最大尝试次数
    pub max_detection_attempts: u32,
    pub priority_decay_per_day: f64,
    pub priority_urgent_bonus: f64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            approval_affected_threshold: 3,
            severity_low_max: 120.0,
            severity_medium_max: 150.0,
            max_detection_attempts: 3,
            priority_decay_per_day: 10.0,
            priority_urgent_bonus: 50.0,
        }
    }
}

impl SchedulingConfig {
    /// 修正不自洽的取值 (阈值倒挂、非正次数等)
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        if !(self.severity_low_max > 100.0 && self.severity_medium_max >= self.severity_low_max) {
            tracing::warn!(
                low_max = self.severity_low_max,
                medium_max = self.severity_medium_max,
                "严重度阈值不自洽，使用默认阈值"
            );
            self.severity_low_max = d.severity_low_max;
            self.severity_medium_max = d.severity_medium_max;
        }
        if self.max_detection_attempts == 0 {
            tracing::warn!("max_detection_attempts 为 0，按 1 次执行");
            self.max_detection_attempts = 1;
        }
        if self.priority_decay_per_day < 0.0 {
            self.priority_decay_per_day = d.priority_decay_per_day;
        }
        if self.priority_urgent_bonus < 0.0 {
            self.priority_urgent_bonus = d.priority_urgent_bonus;
        }
        self
    }
}
