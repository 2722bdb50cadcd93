// ==========================================
// 冲突检测引擎 - 核心流程
// ==========================================

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, instrument};

use super::overlap::{find_candidates, SeverityThresholds};
use super::retry::retry_batch;
use crate::config::SchedulingConfig;
use crate::domain::conflict::{ConflictKey, ResourceConflict};
use crate::domain::schedule::TimeWindow;
use crate::domain::types::{ConflictStatus, ResourceType};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::events::{OptionalEventPublisher, SchedulingEvent, SchedulingEventType};
use crate::engine::repositories::SchedulingRepositories;
use crate::repository::{
    ConflictQuery, ProductionScheduleRepository, RepositoryResult, ResourceConflictRepository,
    ResourceKey, ResourceLockRegistry, ScheduleQuery, UpsertOutcome,
};

/// 自动解除冲突时记录的操作人
pub const SYSTEM_OPERATOR: &str = "SYSTEM";

// ==========================================
// DetectionReport - 单资源检测结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub window: TimeWindow,
    /// 本次检测确认存在的冲突 (含已忽略/已解决的历史行)
    pub conflicts: Vec<ResourceConflict>,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// 自动解除的冲突ID
    pub auto_resolved: Vec<String>,
    pub attempts: u32,
}

impl DetectionReport {
    /// 冲突集合是否有变化
    pub fn has_changes(&self) -> bool {
        self.created > 0 || self.updated > 0 || !self.auto_resolved.is_empty()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &ResourceConflict> {
        self.conflicts
            .iter()
            .filter(|c| c.status == ConflictStatus::Unresolved)
    }
}

// ==========================================
// ConflictDetector - 冲突检测引擎
// ==========================================
pub struct ConflictDetector {
    repos: SchedulingRepositories,
    locks: Arc<ResourceLockRegistry>,
    config: SchedulingConfig,
    events: OptionalEventPublisher,
}

impl ConflictDetector {
    pub fn new(
        repos: SchedulingRepositories,
        locks: Arc<ResourceLockRegistry>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            repos,
            locks,
            config,
            events: OptionalEventPublisher::none(),
        }
    }

    pub fn with_events(mut self, events: OptionalEventPublisher) -> Self {
        self.events = events;
        self
    }

    /// 共享的资源锁表
    pub fn locks(&self) -> &Arc<ResourceLockRegistry> {
        &self.locks
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    // ==========================================
    // 对外操作
    // ==========================================

    /// 检测资源在时间窗内的冲突
    ///
    /// 整批写入在一个事务内完成,失败时整批重试
    #[instrument(skip(self))]
    pub fn detect_conflicts(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        window: TimeWindow,
    ) -> SchedulingResult<DetectionReport> {
        if resource_id.trim().is_empty() {
            return Err(SchedulingError::validation("resource_id", "资源ID不能为空"));
        }
        if !window.is_valid() {
            return Err(SchedulingError::validation(
                "window",
                format!("检测窗口非法: {} ~ {}", window.start, window.end),
            ));
        }

        let key: ResourceKey = (resource_type, resource_id.to_string());
        self.locks.with_locked(&[key], || {
            self.detect_locked(resource_type, resource_id, window)
        })
    }

    /// 人工解决冲突 (UNRESOLVED → RESOLVED)
    #[instrument(skip(self, note))]
    pub fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolved_by: &str,
        note: Option<&str>,
    ) -> SchedulingResult<ResourceConflict> {
        self.close_conflict(conflict_id, ConflictStatus::Resolved, resolved_by, note)
    }

    /// 忽略冲突 (UNRESOLVED → IGNORED),之后的检测不会重新打开
    #[instrument(skip(self, note))]
    pub fn ignore_conflict(
        &self,
        conflict_id: &str,
        resolved_by: &str,
        note: Option<&str>,
    ) -> SchedulingResult<ResourceConflict> {
        self.close_conflict(conflict_id, ConflictStatus::Ignored, resolved_by, note)
    }

    pub fn list_unresolved(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> SchedulingResult<Vec<ResourceConflict>> {
        let query = ConflictQuery::for_resource(resource_type, resource_id).unresolved();
        Ok(self.repos.conflict_repo.query(&query)?)
    }

    pub fn list_for_schedule(&self, schedule_id: &str) -> SchedulingResult<Vec<ResourceConflict>> {
        Ok(self
            .repos
            .conflict_repo
            .query(&ConflictQuery::for_schedule(schedule_id))?)
    }

    // ==========================================
    // 持锁调用 (调用方已持有资源锁)
    // ==========================================

    pub(crate) fn detect_locked(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        window: TimeWindow,
    ) -> SchedulingResult<DetectionReport> {
        let thresholds = SeverityThresholds::from_config(&self.config);

        let report = retry_batch(self.config.max_detection_attempts, |attempt| {
            let now = Utc::now().naive_utc();
            let mut report = self.repos.with_transaction(|tx| {
                detection_pass_tx(tx, &thresholds, resource_type, resource_id, window, now)
            })?;
            report.attempts = attempt;
            Ok(report)
        })?;

        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            auto_resolved = report.auto_resolved.len(),
            attempts = report.attempts,
            "冲突检测完成"
        );

        if report.has_changes() {
            self.events.publish(
                SchedulingEvent::new(SchedulingEventType::ConflictsDetected)
                    .for_resource(resource_type, resource_id)
                    .with_detail(format!(
                        "created={}, updated={}, auto_resolved={}",
                        report.created,
                        report.updated,
                        report.auto_resolved.len()
                    )),
            );
        }
        Ok(report)
    }

    /// 对多个资源依次检测 (调用方已持有全部资源锁)
    pub(crate) fn detect_many_locked(
        &self,
        keys: &[ResourceKey],
        window: TimeWindow,
    ) -> SchedulingResult<Vec<DetectionReport>> {
        let unique: BTreeSet<&ResourceKey> = keys.iter().collect();
        unique
            .into_iter()
            .map(|(resource_type, resource_id)| self.detect_locked(*resource_type, resource_id, window))
            .collect()
    }

    fn close_conflict(
        &self,
        conflict_id: &str,
        status: ConflictStatus,
        resolved_by: &str,
        note: Option<&str>,
    ) -> SchedulingResult<ResourceConflict> {
        if resolved_by.trim().is_empty() {
            return Err(SchedulingError::validation("resolved_by", "处理人不能为空"));
        }
        let conflict = self
            .repos
            .conflict_repo
            .find_by_id(conflict_id)?
            .ok_or_else(|| SchedulingError::not_found("ResourceConflict", conflict_id))?;
        if conflict.status != ConflictStatus::Unresolved {
            return Err(SchedulingError::InvalidStateTransition {
                entity: "ResourceConflict".to_string(),
                id: conflict_id.to_string(),
                from: conflict.status.to_string(),
                to: status.to_string(),
            });
        }

        let key: ResourceKey = (conflict.resource_type, conflict.resource_id.clone());
        let closed = self.locks.with_locked(&[key], || {
            self.repos.with_transaction(|tx| -> SchedulingResult<ResourceConflict> {
                let at = Utc::now().naive_utc();
                ResourceConflictRepository::close_tx(tx, conflict_id, status, resolved_by, note, at)?;
                refresh_conflict_flags_tx(
                    tx,
                    [conflict.schedule_id.as_str(), conflict.conflicting_schedule_id.as_str()],
                )?;
                ResourceConflictRepository::find_by_id_tx(tx, conflict_id)?
                    .ok_or_else(|| SchedulingError::not_found("ResourceConflict", conflict_id))
            })
        })?;

        info!(conflict_id, status = %status, resolved_by, "冲突已关闭");
        self.events.publish(
            SchedulingEvent::new(SchedulingEventType::ConflictResolved)
                .for_resource(closed.resource_type, &closed.resource_id)
                .with_reference(conflict_id)
                .with_detail(status.to_string()),
        );
        Ok(closed)
    }
}

// ==========================================
// 单次检测批次 (事务内)
// ==========================================
fn detection_pass_tx(
    tx: &Connection,
    thresholds: &SeverityThresholds,
    resource_type: ResourceType,
    resource_id: &str,
    window: TimeWindow,
    now: NaiveDateTime,
) -> SchedulingResult<DetectionReport> {
    // 1. 资源上与窗口严格相交的活跃排程
    let schedules = ProductionScheduleRepository::query_tx(
        tx,
        &ScheduleQuery::for_resource(resource_type, resource_id)
            .overlapping(window)
            .active(),
    )?;

    // 2. 两两比较
    let candidates = find_candidates(resource_type, resource_id, &schedules, thresholds);
    let live_keys: HashSet<ConflictKey> = candidates.iter().map(|c| c.key.clone()).collect();

    let mut report = DetectionReport {
        resource_type,
        resource_id: resource_id.to_string(),
        window,
        conflicts: Vec::with_capacity(candidates.len()),
        created: 0,
        updated: 0,
        unchanged: 0,
        auto_resolved: Vec::new(),
        attempts: 0,
    };

    // 3. 按去重键写入
    for candidate in &candidates {
        match ResourceConflictRepository::upsert_tx(tx, candidate, now)? {
            UpsertOutcome::Created(c) => {
                report.created += 1;
                report.conflicts.push(c);
            }
            UpsertOutcome::Updated(c) => {
                report.updated += 1;
                report.conflicts.push(c);
            }
            UpsertOutcome::Unchanged(c) => {
                report.unchanged += 1;
                report.conflicts.push(c);
            }
        }
    }

    // 4. 窗口内已不成立的未解决冲突自动解除
    let mut touched: BTreeSet<String> = schedules.iter().map(|s| s.schedule_id.clone()).collect();
    let open = ResourceConflictRepository::query_tx(
        tx,
        &ConflictQuery::for_resource(resource_type, resource_id)
            .unresolved()
            .overlapping(window),
    )?;
    for stale in open.iter().filter(|c| !live_keys.contains(&c.dedupe_key())) {
        ResourceConflictRepository::close_tx(
            tx,
            &stale.conflict_id,
            ConflictStatus::Resolved,
            SYSTEM_OPERATOR,
            Some("自动解除: 不再重叠或合计占用不超过 100%"),
            now,
        )?;
        touched.insert(stale.schedule_id.clone());
        touched.insert(stale.conflicting_schedule_id.clone());
        report.auto_resolved.push(stale.conflict_id.clone());
    }

    // 5. 重算冲突标记
    refresh_conflict_flags_tx(tx, touched.iter().map(|s| s.as_str()))?;

    Ok(report)
}

/// 按未解决冲突重算排程的 has_conflict 标记
fn refresh_conflict_flags_tx<'a>(
    tx: &Connection,
    schedule_ids: impl IntoIterator<Item = &'a str>,
) -> RepositoryResult<()> {
    for schedule_id in schedule_ids {
        let has_conflict = ResourceConflictRepository::has_unresolved_for_schedule_tx(tx, schedule_id)?;
        ProductionScheduleRepository::set_conflict_flag_tx(tx, schedule_id, has_conflict)?;
    }
    Ok(())
}
