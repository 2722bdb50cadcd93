// ==========================================
// 生产排程核心 - 排程构建引擎
// ==========================================
// 红线: 排程只由本引擎创建与调整,历史调整日志不删除
// 红线: 同一资源上的变更持锁串行
// ==========================================
// 职责: 创建排程 / 调整排程 / 状态迁移 / 补偿调整
// 输入: 工单目录 + 资源目录 + 资源选择 + 时间窗
// 输出: ProductionSchedule + 冲突检测结果 + 调整日志
// ==========================================

mod adjust;
mod create;
mod validation;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::schedule::{ProductionSchedule, ResourceSelection, TimeWindow};
use crate::domain::types::{AdjustmentType, TriggerSource};
use crate::engine::adjustment_recorder::AdjustmentRecorder;
use crate::engine::conflict_detector::{ConflictDetector, DetectionReport};
use crate::engine::directory::{ResourceDirectory, WorkOrderDirectory};
use crate::engine::events::OptionalEventPublisher;
use crate::engine::priority::PriorityScorer;
use crate::engine::repositories::SchedulingRepositories;

pub use validation::required_work_minutes;

// ==========================================
// 请求与结果
// ==========================================

/// 创建排程请求
#[derive(Debug, Clone)]
pub struct CreateScheduleRequest {
    /// 为空时自动生成 UUID
    pub schedule_id: Option<String>,
    pub work_order_id: String,
    pub selection: ResourceSelection,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleCreation {
    pub schedule: ProductionSchedule,
    pub detection: Vec<DetectionReport>,
}

/// 排程变更内容 (至少一项)
#[derive(Debug, Clone, Default)]
pub struct ScheduleChange {
    pub new_window: Option<TimeWindow>,
    pub new_selection: Option<ResourceSelection>,
    pub new_priority: Option<f64>,
}

impl ScheduleChange {
    pub fn window(window: TimeWindow) -> Self {
        Self {
            new_window: Some(window),
            ..Default::default()
        }
    }

    pub fn selection(selection: ResourceSelection) -> Self {
        Self {
            new_selection: Some(selection),
            ..Default::default()
        }
    }

    pub fn priority(priority: f64) -> Self {
        Self {
            new_priority: Some(priority),
            ..Default::default()
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.new_window = Some(window);
        self
    }

    pub fn with_selection(mut self, selection: ResourceSelection) -> Self {
        self.new_selection = Some(selection);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.new_window.is_none() && self.new_selection.is_none() && self.new_priority.is_none()
    }
}

/// 排程调整请求
#[derive(Debug, Clone)]
pub struct AdjustmentRequest {
    pub schedule_id: String,
    pub change: ScheduleChange,
    pub adjustment_type: AdjustmentType,
    pub trigger_source: TriggerSource,
    pub reason: String,
    pub operator: String,
    /// 调用方看到的 revision,不一致时拒绝
    pub expected_revision: Option<i32>,
}

/// 状态迁移结果
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub schedule: ProductionSchedule,
    pub detection: Vec<DetectionReport>,
}

// ==========================================
// ScheduleBuilder - 排程构建引擎
// ==========================================
pub struct ScheduleBuilder {
    repos: SchedulingRepositories,
    detector: Arc<ConflictDetector>,
    recorder: Arc<AdjustmentRecorder>,
    work_orders: Arc<dyn WorkOrderDirectory>,
    resources: Arc<dyn ResourceDirectory>,
    scorer: PriorityScorer,
    events: OptionalEventPublisher,
}

impl ScheduleBuilder {
    pub fn new(
        repos: SchedulingRepositories,
        detector: Arc<ConflictDetector>,
        recorder: Arc<AdjustmentRecorder>,
        work_orders: Arc<dyn WorkOrderDirectory>,
        resources: Arc<dyn ResourceDirectory>,
    ) -> Self {
        let scorer = PriorityScorer::from_config(detector.config());
        Self {
            repos,
            detector,
            recorder,
            work_orders,
            resources,
            scorer,
            events: OptionalEventPublisher::none(),
        }
    }

    /// 使用 SQLite 目录表作为工单/资源目录
    pub fn with_sqlite_directories(
        repos: SchedulingRepositories,
        detector: Arc<ConflictDetector>,
        recorder: Arc<AdjustmentRecorder>,
    ) -> Self {
        let directory = repos.directory_repo.clone();
        Self::new(repos, detector, recorder, directory.clone(), directory)
    }

    pub fn with_events(mut self, events: OptionalEventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn scorer(&self) -> &PriorityScorer {
        &self.scorer
    }
}

/// 迁移时间点写入实际开始/结束
fn stamp_actuals(schedule: &mut ProductionSchedule, at: NaiveDateTime) {
    use crate::domain::types::ScheduleStatus;
    match schedule.status {
        ScheduleStatus::InProgress => schedule.actual_start = Some(at),
        ScheduleStatus::Completed => {
            schedule.actual_end = Some(at);
            if schedule.actual_start.is_none() {
                schedule.actual_start = Some(at);
            }
        }
        _ => {}
    }
}
