// ==========================================
// 生产排程核心 - 排程优先级评分
// ==========================================
// 规则: priority = clamp(100 - 距交期天数 × 每日衰减, 0, 100) + 紧急加分
// 距交期天数从排程开始日计算,已逾期按 100 计
// ==========================================

use crate::config::SchedulingConfig;
use chrono::NaiveDate;

// ==========================================
// PriorityScorer - 优先级评分
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct PriorityScorer {
    decay_per_day: f64,
    urgent_bonus: f64,
}

impl PriorityScorer {
    pub fn new(decay_per_day: f64, urgent_bonus: f64) -> Self {
        Self {
            decay_per_day,
            urgent_bonus,
        }
    }

    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self::new(config.priority_decay_per_day, config.priority_urgent_bonus)
    }

    /// 交期临近度 [0, 100]
    pub fn proximity(&self, due_date: NaiveDate, start_date: NaiveDate) -> f64 {
        let days_until_due = (due_date - start_date).num_days();
        if days_until_due <= 0 {
            return 100.0;
        }
        (100.0 - days_until_due as f64 * self.decay_per_day).clamp(0.0, 100.0)
    }

    pub fn score(&self, due_date: NaiveDate, start_date: NaiveDate, is_urgent: bool) -> f64 {
        let bonus = if is_urgent { self.urgent_bonus } else { 0.0 };
        self.proximity(due_date, start_date) + bonus
    }
}
