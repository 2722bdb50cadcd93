// ==========================================
// 冲突检测 - 重叠计算 (纯函数)
// ==========================================

use crate::config::SchedulingConfig;
use crate::domain::conflict::{ConflictCandidate, ConflictKey};
use crate::domain::schedule::ProductionSchedule;
use crate::domain::types::{ConflictSeverity, ResourceType};

/// 资源满载占用 (%)
pub const FULL_CAPACITY_PCT: f64 = 100.0;

/// 严重度阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityThresholds {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            low_max: 120.0,
            medium_max: 150.0,
        }
    }
}

impl SeverityThresholds {
    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self {
            low_max: config.severity_low_max,
            medium_max: config.severity_medium_max,
        }
    }

    /// 合计占用 ≤ 100% 不构成冲突
    pub fn classify(&self, total_allocation_pct: f64) -> Option<ConflictSeverity> {
        if total_allocation_pct <= FULL_CAPACITY_PCT {
            None
        } else if total_allocation_pct <= self.low_max {
            Some(ConflictSeverity::Low)
        } else if total_allocation_pct <= self.medium_max {
            Some(ConflictSeverity::Medium)
        } else {
            Some(ConflictSeverity::High)
        }
    }
}

/// 两个排程在同一资源上的冲突候选
///
/// 时间窗不严格相交,或合计占用不超过 100% 时返回 None
pub fn pair_candidate(
    resource_type: ResourceType,
    resource_id: &str,
    a: &ProductionSchedule,
    b: &ProductionSchedule,
    thresholds: &SeverityThresholds,
) -> Option<ConflictCandidate> {
    if a.schedule_id == b.schedule_id {
        return None;
    }
    let overlap = a.window().intersection(&b.window())?;
    let total = a.allocation_pct + b.allocation_pct;
    let severity = thresholds.classify(total)?;

    let (first, second) = if a.schedule_id < b.schedule_id {
        (a, b)
    } else {
        (b, a)
    };

    Some(ConflictCandidate {
        key: ConflictKey {
            schedule_id: first.schedule_id.clone(),
            conflicting_schedule_id: second.schedule_id.clone(),
            resource_type,
            resource_id: resource_id.to_string(),
            overlap_start: overlap.start,
            overlap_end: overlap.end,
        },
        total_allocation_pct: total,
        severity,
    })
}

/// 枚举资源上所有两两冲突,按去重键排序
pub fn find_candidates(
    resource_type: ResourceType,
    resource_id: &str,
    schedules: &[ProductionSchedule],
    thresholds: &SeverityThresholds,
) -> Vec<ConflictCandidate> {
    let mut candidates = Vec::new();
    for (i, a) in schedules.iter().enumerate() {
        if a.resource_id(resource_type) != Some(resource_id) || !a.is_active() {
            continue;
        }
        for b in &schedules[i + 1..] {
            if b.resource_id(resource_type) != Some(resource_id) || !b.is_active() {
                continue;
            }
            if let Some(candidate) = pair_candidate(resource_type, resource_id, a, b, thresholds) {
                candidates.push(candidate);
            }
        }
    }
    candidates.sort_by(|x, y| x.key.cmp(&y.key));
    candidates
}
