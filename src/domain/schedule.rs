// ==========================================
// 生产排程核心 - 排程领域模型
// ==========================================
// 红线: scheduled_end > scheduled_start
// 对齐: production_schedule 表
// ==========================================

use crate::domain::adjustment::ScheduleSnapshot;
use crate::domain::types::{ResourceType, ScheduleStatus};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// 当前冲突检测/排程算法版本,写入 algorithm_version 字段
pub const ALGORITHM_VERSION: &str = "overlap-detect-1.0";

// ==========================================
// TimeWindow - 时间窗 [start, end)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// end 必须严格晚于 start
    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    /// 时长 (分钟,可为小数)
    pub fn duration_minutes(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 60_000.0
    }

    /// 严格相交: startA < endB AND startB < endA
    pub fn intersects(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// 交集窗口 (不相交返回 None)
    pub fn intersection(&self, other: &TimeWindow) -> Option<TimeWindow> {
        if !self.intersects(other) {
            return None;
        }
        Some(TimeWindow {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    /// 覆盖两个窗口的最小窗口
    pub fn span(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

// ==========================================
// ResourceSelection - 资源选择
// ==========================================
// 至少指定 equipment/worker/workshop 之一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSelection {
    pub equipment_id: Option<String>,
    pub worker_id: Option<String>,
    pub workshop_id: Option<String>,
    pub process_id: Option<String>,
    pub allocation_pct: f64, // 占用资源产能百分比 (0, 100]
}

impl ResourceSelection {
    /// 仅设备的资源选择 (100% 占用)
    pub fn equipment(equipment_id: &str) -> Self {
        Self {
            equipment_id: Some(equipment_id.to_string()),
            worker_id: None,
            workshop_id: None,
            process_id: None,
            allocation_pct: 100.0,
        }
    }

    pub fn with_worker(mut self, worker_id: &str) -> Self {
        self.worker_id = Some(worker_id.to_string());
        self
    }

    pub fn with_workshop(mut self, workshop_id: &str) -> Self {
        self.workshop_id = Some(workshop_id.to_string());
        self
    }

    pub fn with_process(mut self, process_id: &str) -> Self {
        self.process_id = Some(process_id.to_string());
        self
    }

    pub fn with_allocation(mut self, allocation_pct: f64) -> Self {
        self.allocation_pct = allocation_pct;
        self
    }

    /// 选中的 (资源类型, 资源ID) 列表
    pub fn resource_keys(&self) -> Vec<(ResourceType, String)> {
        let mut keys = Vec::new();
        if let Some(id) = &self.equipment_id {
            keys.push((ResourceType::Equipment, id.clone()));
        }
        if let Some(id) = &self.worker_id {
            keys.push((ResourceType::Worker, id.clone()));
        }
        if let Some(id) = &self.workshop_id {
            keys.push((ResourceType::Workshop, id.clone()));
        }
        keys
    }
}

// ==========================================
// ProductionSchedule - 生产排程
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionSchedule {
    // ===== 主键与关联 =====
    pub schedule_id: String,
    pub work_order_id: String,

    // ===== 资源引用 =====
    pub equipment_id: Option<String>,
    pub worker_id: Option<String>,
    pub workshop_id: Option<String>,
    pub process_id: Option<String>,

    // ===== 时间 =====
    pub scheduled_start: NaiveDateTime,
    pub scheduled_end: NaiveDateTime,
    pub actual_start: Option<NaiveDateTime>,
    pub actual_end: Option<NaiveDateTime>,

    // ===== 排程属性 =====
    pub allocation_pct: f64,
    pub priority_score: f64,
    pub status: ScheduleStatus,
    pub has_conflict: bool, // 存在未解决冲突 (叠加标记)
    pub is_manually_adjusted: bool,
    pub algorithm_version: String,

    // ===== 元数据 =====
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub revision: i32, // 乐观锁
}

impl ProductionSchedule {
    /// 创建新的 PENDING 排程
    pub fn new_pending(
        schedule_id: String,
        work_order_id: String,
        selection: &ResourceSelection,
        window: TimeWindow,
        priority_score: f64,
    ) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            schedule_id,
            work_order_id,
            equipment_id: selection.equipment_id.clone(),
            worker_id: selection.worker_id.clone(),
            workshop_id: selection.workshop_id.clone(),
            process_id: selection.process_id.clone(),
            scheduled_start: window.start,
            scheduled_end: window.end,
            actual_start: None,
            actual_end: None,
            allocation_pct: selection.allocation_pct,
            priority_score,
            status: ScheduleStatus::Pending,
            has_conflict: false,
            is_manually_adjusted: false,
            algorithm_version: ALGORITHM_VERSION.to_string(),
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.scheduled_start, self.scheduled_end)
    }

    pub fn set_window(&mut self, window: TimeWindow) {
        self.scheduled_start = window.start;
        self.scheduled_end = window.end;
    }

    /// 当前资源选择
    pub fn selection(&self) -> ResourceSelection {
        ResourceSelection {
            equipment_id: self.equipment_id.clone(),
            worker_id: self.worker_id.clone(),
            workshop_id: self.workshop_id.clone(),
            process_id: self.process_id.clone(),
            allocation_pct: self.allocation_pct,
        }
    }

    pub fn set_selection(&mut self, selection: &ResourceSelection) {
        self.equipment_id = selection.equipment_id.clone();
        self.worker_id = selection.worker_id.clone();
        self.workshop_id = selection.workshop_id.clone();
        self.process_id = selection.process_id.clone();
        self.allocation_pct = selection.allocation_pct;
    }

    /// 指定资源类型上的资源ID
    pub fn resource_id(&self, resource_type: ResourceType) -> Option<&str> {
        match resource_type {
            ResourceType::Equipment => self.equipment_id.as_deref(),
            ResourceType::Worker => self.worker_id.as_deref(),
            ResourceType::Workshop => self.workshop_id.as_deref(),
        }
    }

    pub fn resource_keys(&self) -> Vec<(ResourceType, String)> {
        self.selection().resource_keys()
    }

    pub fn is_active(&self) -> bool {
        ScheduleStatus::ACTIVE.contains(&self.status)
    }

    /// 抓取业务字段快照
    pub fn snapshot(&self) -> ScheduleSnapshot {
        ScheduleSnapshot {
            schedule_id: self.schedule_id.clone(),
            work_order_id: self.work_order_id.clone(),
            equipment_id: self.equipment_id.clone(),
            worker_id: self.worker_id.clone(),
            workshop_id: self.workshop_id.clone(),
            process_id: self.process_id.clone(),
            scheduled_start: self.scheduled_start,
            scheduled_end: self.scheduled_end,
            actual_start: self.actual_start,
            actual_end: self.actual_end,
            allocation_pct: self.allocation_pct,
            priority_score: self.priority_score,
            status: self.status,
            is_manually_adjusted: self.is_manually_adjusted,
            algorithm_version: self.algorithm_version.clone(),
        }
    }

    /// 按快照逐字段恢复 (revision/has_conflict/时间戳不在快照内)
    pub fn restore_from(&mut self, snapshot: &ScheduleSnapshot) {
        self.work_order_id = snapshot.work_order_id.clone();
        self.equipment_id = snapshot.equipment_id.clone();
        self.worker_id = snapshot.worker_id.clone();
        self.workshop_id = snapshot.workshop_id.clone();
        self.process_id = snapshot.process_id.clone();
        self.scheduled_start = snapshot.scheduled_start;
        self.scheduled_end = snapshot.scheduled_end;
        self.actual_start = snapshot.actual_start;
        self.actual_end = snapshot.actual_end;
        self.allocation_pct = snapshot.allocation_pct;
        self.priority_score = snapshot.priority_score;
        self.status = snapshot.status;
        self.is_manually_adjusted = snapshot.is_manually_adjusted;
        self.algorithm_version = snapshot.algorithm_version.clone();
    }

    /// 只恢复计划字段 (时间窗、资源、占用、优先级、人工调整标记)
    /// 状态与实际开始/结束保持当前值
    pub fn restore_planning_from(&mut self, snapshot: &ScheduleSnapshot) {
        self.set_selection(&snapshot.selection());
        self.set_window(snapshot.window());
        self.priority_score = snapshot.priority_score;
        self.is_manually_adjusted = snapshot.is_manually_adjusted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_window_strict_intersection() {
        let a = TimeWindow::new(at(8, 0), at(11, 0));
        let b = TimeWindow::new(at(9, 0), at(12, 0));
        let touching = TimeWindow::new(at(11, 0), at(13, 0));

        assert!(a.intersects(&b));
        assert_eq!(a.intersection(&b), Some(TimeWindow::new(at(9, 0), at(11, 0))));
        // 首尾相接不算重叠
        assert!(!a.intersects(&touching));
        assert!(a.intersection(&touching).is_none());
    }

    #[test]
    fn test_window_validity_and_duration() {
        assert!(TimeWindow::new(at(8, 0), at(8, 30)).is_valid());
        assert!(!TimeWindow::new(at(8, 0), at(8, 0)).is_valid());
        assert!(!TimeWindow::new(at(9, 0), at(8, 0)).is_valid());
        assert_eq!(TimeWindow::new(at(8, 0), at(10, 30)).duration_minutes(), 150.0);
        let short = TimeWindow::new(at(8, 0), at(8, 0) + chrono::Duration::milliseconds(1_500));
        assert!((short.duration_minutes() - 0.025).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_restore_is_field_for_field() {
        let selection = ResourceSelection::equipment("E1").with_worker("W1");
        let mut schedule = ProductionSchedule::new_pending(
            "S1".to_string(),
            "WO1".to_string(),
            &selection,
            TimeWindow::new(at(8, 0), at(10, 0)),
            42.0,
        );
        let before = schedule.snapshot();

        schedule.set_window(TimeWindow::new(at(12, 0), at(14, 0)));
        schedule.equipment_id = Some("E2".to_string());
        schedule.status = ScheduleStatus::Confirmed;
        schedule.is_manually_adjusted = true;

        schedule.restore_from(&before);
        assert_eq!(schedule.snapshot(), before);
    }

    #[test]
    fn test_planning_restore_keeps_status_and_actuals() {
        let mut schedule = ProductionSchedule::new_pending(
            "S1".to_string(),
            "WO1".to_string(),
            &ResourceSelection::equipment("E1").with_allocation(60.0),
            TimeWindow::new(at(8, 0), at(10, 0)),
            42.0,
        );
        let before = schedule.snapshot();

        schedule.set_window(TimeWindow::new(at(12, 0), at(14, 0)));
        schedule.set_selection(&ResourceSelection::equipment("E2"));
        schedule.status = ScheduleStatus::InProgress;
        schedule.actual_start = Some(at(12, 5));

        schedule.restore_planning_from(&before);
        assert_eq!(schedule.window(), before.window());
        assert_eq!(schedule.equipment_id.as_deref(), Some("E1"));
        assert_eq!(schedule.allocation_pct, 60.0);
        assert_eq!(schedule.status, ScheduleStatus::InProgress);
        assert_eq!(schedule.actual_start, Some(at(12, 5)));
    }
}
