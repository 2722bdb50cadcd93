// ==========================================
// 生产排程核心 - 排程调整记录与审批
// ==========================================
// 红线: 调整日志只追加;驳回在同一事务内恢复排程
// 红线: 已提交的调整只能通过补偿调整撤销
// ==========================================
// 审批门控: 调整类型 ∈ {URGENT_INSERT, RESOURCE_CHANGE}
//           且受影响排程数 > approval.affected_schedule_threshold
// 状态机: PENDING → APPROVED (调整保留)
//         PENDING → REJECTED (恢复到 before_data)
// ==========================================

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::adjustment::{AdjustmentSnapshot, ScheduleAdjustmentLog, ScheduleSnapshot};
use crate::domain::schedule::{ProductionSchedule, TimeWindow};
use crate::domain::types::{AdjustmentType, ApprovalStatus, ScheduleStatus, TriggerSource};
use crate::engine::conflict_detector::{ConflictDetector, DetectionReport};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::events::{OptionalEventPublisher, SchedulingEvent, SchedulingEventType};
use crate::engine::repositories::SchedulingRepositories;
use crate::repository::{
    AdjustmentLogRepository, ProductionScheduleRepository, RepositoryResult, ResourceKey,
    ScheduleQuery,
};

// ==========================================
// AdjustmentDraft - 待写入的调整
// ==========================================
#[derive(Debug, Clone)]
pub struct AdjustmentDraft {
    pub adjustment_type: AdjustmentType,
    pub trigger_source: TriggerSource,
    pub before: ScheduleSnapshot,
    pub after: ScheduleSnapshot,
    pub reason: String,
    pub operator: String,
    pub affected_schedule_count: i32,
    pub revision_after: i32,
    pub compensates_log_id: Option<String>,
}

// ==========================================
// AdjustmentOutcome - 调整结果
// ==========================================
// PendingApproval 不是错误: 调整已生效,等待审批
#[derive(Debug, Clone, Serialize)]
pub enum AdjustmentOutcome {
    Applied {
        schedule: ProductionSchedule,
        log: ScheduleAdjustmentLog,
        detection: Vec<DetectionReport>,
    },
    PendingApproval {
        schedule: ProductionSchedule,
        log: ScheduleAdjustmentLog,
        detection: Vec<DetectionReport>,
    },
}

impl AdjustmentOutcome {
    pub fn from_parts(
        schedule: ProductionSchedule,
        log: ScheduleAdjustmentLog,
        detection: Vec<DetectionReport>,
    ) -> Self {
        if log.is_pending() {
            AdjustmentOutcome::PendingApproval {
                schedule,
                log,
                detection,
            }
        } else {
            AdjustmentOutcome::Applied {
                schedule,
                log,
                detection,
            }
        }
    }

    pub fn is_pending_approval(&self) -> bool {
        matches!(self, AdjustmentOutcome::PendingApproval { .. })
    }

    pub fn schedule(&self) -> &ProductionSchedule {
        match self {
            AdjustmentOutcome::Applied { schedule, .. }
            | AdjustmentOutcome::PendingApproval { schedule, .. } => schedule,
        }
    }

    pub fn log(&self) -> &ScheduleAdjustmentLog {
        match self {
            AdjustmentOutcome::Applied { log, .. } | AdjustmentOutcome::PendingApproval { log, .. } => {
                log
            }
        }
    }

    pub fn detection(&self) -> &[DetectionReport] {
        match self {
            AdjustmentOutcome::Applied { detection, .. }
            | AdjustmentOutcome::PendingApproval { detection, .. } => detection,
        }
    }
}

/// 驳回结果
#[derive(Debug, Clone, Serialize)]
pub struct RejectionOutcome {
    pub log: ScheduleAdjustmentLog,
    /// 恢复后的排程
    pub schedule: ProductionSchedule,
    pub detection: Vec<DetectionReport>,
}

/// 排程前后两个状态涉及的全部资源
pub fn union_resource_keys(a: &ScheduleSnapshot, b: &ScheduleSnapshot) -> Vec<ResourceKey> {
    let keys: BTreeSet<ResourceKey> = a
        .selection()
        .resource_keys()
        .into_iter()
        .chain(b.selection().resource_keys())
        .collect();
    keys.into_iter().collect()
}

/// 驳回时排程已推进状态: 只恢复计划字段
///
/// 终态不可恢复;执行中不可换回原资源;CONFIRMED 换资源后回到 PENDING
fn restore_planning_after_lifecycle(
    schedule: &mut ProductionSchedule,
    before: &ScheduleSnapshot,
    log_id: &str,
) -> SchedulingResult<()> {
    if schedule.status.is_terminal() {
        return Err(SchedulingError::InvalidStateTransition {
            entity: "ScheduleAdjustmentLog".to_string(),
            id: log_id.to_string(),
            from: schedule.status.to_string(),
            to: ApprovalStatus::Rejected.to_string(),
        });
    }
    let resource_changes = schedule.selection().resource_keys() != before.selection().resource_keys();
    if resource_changes && schedule.status == ScheduleStatus::InProgress {
        return Err(SchedulingError::validation(
            "resource",
            "执行中的排程不能通过驳回换回原资源",
        ));
    }
    schedule.restore_planning_from(before);
    if resource_changes && schedule.status == ScheduleStatus::Confirmed {
        schedule.status = ScheduleStatus::Pending;
    }
    Ok(())
}

// ==========================================
// AdjustmentRecorder - 调整记录器
// ==========================================
pub struct AdjustmentRecorder {
    repos: SchedulingRepositories,
    detector: Arc<ConflictDetector>,
    events: OptionalEventPublisher,
}

impl AdjustmentRecorder {
    pub fn new(repos: SchedulingRepositories, detector: Arc<ConflictDetector>) -> Self {
        Self {
            repos,
            detector,
            events: OptionalEventPublisher::none(),
        }
    }

    pub fn with_events(mut self, events: OptionalEventPublisher) -> Self {
        self.events = events;
        self
    }

    /// 审批门控判断
    pub fn requires_approval(&self, adjustment_type: AdjustmentType, affected_count: i32) -> bool {
        let threshold = self.detector.config().approval_affected_threshold as i64;
        adjustment_type.is_high_impact() && affected_count as i64 > threshold
    }

    /// 受影响排程数 = 1 (自身) + 目标资源上与新时间窗重叠的其他活跃排程
    pub(crate) fn count_affected_tx(
        conn: &Connection,
        schedule_id: &str,
        keys: &[ResourceKey],
        window: TimeWindow,
    ) -> RepositoryResult<i32> {
        let mut others: BTreeSet<String> = BTreeSet::new();
        for (resource_type, resource_id) in keys {
            let overlapping = ProductionScheduleRepository::query_tx(
                conn,
                &ScheduleQuery::for_resource(*resource_type, resource_id)
                    .overlapping(window)
                    .active(),
            )?;
            others.extend(
                overlapping
                    .into_iter()
                    .map(|s| s.schedule_id)
                    .filter(|id| id != schedule_id),
            );
        }
        Ok(1 + others.len() as i32)
    }

    /// 写入调整日志 (事务内),按门控决定初始审批状态
    pub(crate) fn record_tx(
        &self,
        conn: &Connection,
        draft: AdjustmentDraft,
    ) -> SchedulingResult<ScheduleAdjustmentLog> {
        let requires_approval =
            self.requires_approval(draft.adjustment_type, draft.affected_schedule_count);
        let log = ScheduleAdjustmentLog {
            log_id: Uuid::new_v4().to_string(),
            schedule_id: draft.before.schedule_id.clone(),
            adjustment_type: draft.adjustment_type,
            trigger_source: draft.trigger_source,
            before_data: AdjustmentSnapshot::new(draft.adjustment_type, draft.before),
            after_data: AdjustmentSnapshot::new(draft.adjustment_type, draft.after),
            reason: draft.reason,
            operator: draft.operator,
            affected_schedule_count: draft.affected_schedule_count,
            requires_approval,
            approval_status: if requires_approval {
                ApprovalStatus::Pending
            } else {
                ApprovalStatus::Approved
            },
            approved_by: None,
            approved_at: None,
            approval_comment: None,
            revision_after: draft.revision_after,
            compensates_log_id: draft.compensates_log_id,
            created_at: Utc::now().naive_utc(),
        };
        AdjustmentLogRepository::insert_tx(conn, &log)?;
        Ok(log)
    }

    /// 调整写入后发布事件
    pub(crate) fn announce(&self, log: &ScheduleAdjustmentLog) {
        let event_type = if log.is_pending() {
            SchedulingEventType::AdjustmentPendingApproval
        } else {
            SchedulingEventType::AdjustmentApplied
        };
        self.events.publish(
            SchedulingEvent::new(event_type)
                .for_schedule(&log.schedule_id)
                .with_reference(&log.log_id)
                .with_detail(log.adjustment_type.to_string()),
        );
    }

    // ==========================================
    // 审批
    // ==========================================

    /// PENDING → APPROVED,调整保留
    #[instrument(skip(self, comment))]
    pub fn approve(
        &self,
        log_id: &str,
        approver: &str,
        comment: Option<&str>,
    ) -> SchedulingResult<ScheduleAdjustmentLog> {
        if approver.trim().is_empty() {
            return Err(SchedulingError::validation("approver", "审批人不能为空"));
        }
        let log = self.load_pending(log_id, ApprovalStatus::Approved)?;

        let approved = self.repos.with_transaction(|tx| -> SchedulingResult<ScheduleAdjustmentLog> {
            AdjustmentLogRepository::set_approval_tx(
                tx,
                log_id,
                ApprovalStatus::Approved,
                approver,
                comment,
                Utc::now().naive_utc(),
            )?;
            AdjustmentLogRepository::find_by_id_tx(tx, log_id)?
                .ok_or_else(|| SchedulingError::not_found("ScheduleAdjustmentLog", log_id))
        })?;

        info!(log_id, schedule_id = %log.schedule_id, "调整已批准");
        self.events.publish(
            SchedulingEvent::new(SchedulingEventType::AdjustmentApplied)
                .for_schedule(&approved.schedule_id)
                .with_reference(log_id)
                .with_detail("APPROVED"),
        );
        Ok(approved)
    }

    /// PENDING → REJECTED,同一事务内将排程恢复到 before_data
    ///
    /// 排程当前状态与 after_data 一致时逐字段恢复;仅状态推进过时只恢复计划字段
    ///
    /// # 错误
    /// - `ConcurrentModification`: 计划字段已被后续调整修改 (须先补偿后续调整)
    #[instrument(skip(self, comment))]
    pub fn reject(
        &self,
        log_id: &str,
        approver: &str,
        comment: Option<&str>,
    ) -> SchedulingResult<RejectionOutcome> {
        if approver.trim().is_empty() {
            return Err(SchedulingError::validation("approver", "审批人不能为空"));
        }
        let log = self.load_pending(log_id, ApprovalStatus::Rejected)?;
        let before = log.before_data.schedule().clone();
        let after = log.after_data.schedule().clone();
        let keys = union_resource_keys(&before, &after);

        let outcome = self.detector.locks().with_locked(&keys, || {
            let (rejected, restored) = self.repos.with_transaction(
                |tx| -> SchedulingResult<(ScheduleAdjustmentLog, ProductionSchedule)> {
                    let mut schedule = ProductionScheduleRepository::find_by_id_tx(tx, &log.schedule_id)?
                        .ok_or_else(|| SchedulingError::not_found("ProductionSchedule", &log.schedule_id))?;
                    let current = schedule.snapshot();
                    if current == after {
                        schedule.restore_from(&before);
                    } else if current.same_planning(&after) {
                        // 之后只发生了状态迁移: 恢复计划字段,保留当前状态
                        restore_planning_after_lifecycle(&mut schedule, &before, log_id)?;
                    } else {
                        return Err(SchedulingError::ConcurrentModification(format!(
                            "排程 {} 的计划字段在调整 {} 之后已被修改,请先补偿后续调整",
                            schedule.schedule_id, log_id
                        )));
                    }
                    ProductionScheduleRepository::update_tx(tx, &schedule)?;
                    AdjustmentLogRepository::set_approval_tx(
                        tx,
                        log_id,
                        ApprovalStatus::Rejected,
                        approver,
                        comment,
                        Utc::now().naive_utc(),
                    )?;

                    let rejected = AdjustmentLogRepository::find_by_id_tx(tx, log_id)?
                        .ok_or_else(|| SchedulingError::not_found("ScheduleAdjustmentLog", log_id))?;
                    let restored = ProductionScheduleRepository::find_by_id_tx(tx, &log.schedule_id)?
                        .ok_or_else(|| SchedulingError::not_found("ProductionSchedule", &log.schedule_id))?;
                    Ok((rejected, restored))
                },
            )?;

            let detection = self
                .detector
                .detect_many_locked(&keys, before.window().span(&after.window()))?;
            let schedule = self
                .repos
                .schedule_repo
                .find_by_id(&log.schedule_id)?
                .unwrap_or(restored);
            Ok::<_, SchedulingError>(RejectionOutcome {
                log: rejected,
                schedule,
                detection,
            })
        })?;

        info!(log_id, schedule_id = %log.schedule_id, "调整已驳回，排程已恢复");
        self.events.publish(
            SchedulingEvent::new(SchedulingEventType::AdjustmentRejected)
                .for_schedule(&log.schedule_id)
                .with_reference(log_id),
        );
        Ok(outcome)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn find_pending(&self) -> SchedulingResult<Vec<ScheduleAdjustmentLog>> {
        Ok(self.repos.adjustment_log_repo.find_pending()?)
    }

    /// 排程的调整历史 (时间正序)
    pub fn history(&self, schedule_id: &str) -> SchedulingResult<Vec<ScheduleAdjustmentLog>> {
        Ok(self.repos.adjustment_log_repo.find_by_schedule(schedule_id)?)
    }

    fn load_pending(&self, log_id: &str, target: ApprovalStatus) -> SchedulingResult<ScheduleAdjustmentLog> {
        let log = self
            .repos
            .adjustment_log_repo
            .find_by_id(log_id)?
            .ok_or_else(|| SchedulingError::not_found("ScheduleAdjustmentLog", log_id))?;
        if !log.is_pending() {
            warn!(log_id, status = %log.approval_status, "调整日志不处于待审批状态");
            return Err(SchedulingError::InvalidStateTransition {
                entity: "ScheduleAdjustmentLog".to_string(),
                id: log_id.to_string(),
                from: log.approval_status.to_string(),
                to: target.to_string(),
            });
        }
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulingConfig;
    use crate::db::open_in_memory_with_schema;
    use crate::domain::schedule::ResourceSelection;
    use crate::domain::types::ResourceType;
    use crate::repository::ResourceLockRegistry;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn recorder(threshold: u32) -> AdjustmentRecorder {
        let conn = Arc::new(Mutex::new(open_in_memory_with_schema().unwrap()));
        let repos = SchedulingRepositories::new(conn);
        let config = SchedulingConfig {
            approval_affected_threshold: threshold,
            ..SchedulingConfig::default()
        };
        let detector = Arc::new(ConflictDetector::new(
            repos.clone(),
            Arc::new(ResourceLockRegistry::new()),
            config,
        ));
        AdjustmentRecorder::new(repos, detector)
    }

    fn snapshot(selection: ResourceSelection) -> ScheduleSnapshot {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let schedule = ProductionSchedule::new_pending(
            "S1".to_string(),
            "WO1".to_string(),
            &selection,
            TimeWindow::new(
                day.and_hms_opt(8, 0, 0).unwrap(),
                day.and_hms_opt(10, 0, 0).unwrap(),
            ),
            50.0,
        );
        schedule.snapshot()
    }

    #[test]
    fn test_approval_gate_only_for_high_impact_over_threshold() {
        let recorder = recorder(3);
        assert!(!recorder.requires_approval(AdjustmentType::ResourceChange, 3));
        assert!(recorder.requires_approval(AdjustmentType::ResourceChange, 4));
        assert!(recorder.requires_approval(AdjustmentType::UrgentInsert, 10));
        assert!(!recorder.requires_approval(AdjustmentType::TimeChange, 10));
        assert!(!recorder.requires_approval(AdjustmentType::Compensation, 10));

        let strict = self::recorder(0);
        assert!(strict.requires_approval(AdjustmentType::UrgentInsert, 1));
    }

    #[test]
    fn test_union_resource_keys_is_sorted_and_deduped() {
        let before = snapshot(ResourceSelection::equipment("E2").with_worker("W1"));
        let after = snapshot(ResourceSelection::equipment("E1").with_worker("W1"));

        let keys = union_resource_keys(&before, &after);
        assert_eq!(
            keys,
            vec![
                (ResourceType::Equipment, "E1".to_string()),
                (ResourceType::Equipment, "E2".to_string()),
                (ResourceType::Worker, "W1".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_log_is_not_found() {
        let recorder = recorder(3);
        let err = recorder.approve("missing", "supervisor", None).unwrap_err();
        assert!(matches!(err, SchedulingError::NotFound { .. }));
        assert!(recorder.find_pending().unwrap().is_empty());
    }
}
