// ==========================================
// 排程构建引擎 - 调整 / 状态迁移 / 补偿
// ==========================================
// 事务: 排程变更与调整日志同一事务提交
// 检测: 提交后对新旧资源、新旧时间窗的并集重新检测
// ==========================================

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use tracing::{info, instrument, warn};

use super::validation;
use super::{stamp_actuals, AdjustmentRequest, ScheduleBuilder, StatusChange};
use crate::domain::adjustment::{ScheduleAdjustmentLog, ScheduleSnapshot};
use crate::domain::schedule::{ProductionSchedule, TimeWindow};
use crate::domain::types::{AdjustmentType, ApprovalStatus, ScheduleStatus, TriggerSource};
use crate::engine::adjustment_recorder::{union_resource_keys, AdjustmentDraft, AdjustmentOutcome, AdjustmentRecorder};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::events::{SchedulingEvent, SchedulingEventType};
use crate::repository::{AdjustmentLogRepository, ProductionScheduleRepository, ResourceKey};

impl ScheduleBuilder {
    // ==========================================
    // 调整排程
    // ==========================================

    /// 调整排程时间窗 / 资源 / 优先级
    ///
    /// # 规则
    /// - 终态排程不可调整; IN_PROGRESS 不可换资源
    /// - CONFIRMED 换资源后回到 PENDING
    /// - MANUAL 触发标记 is_manually_adjusted
    /// - URGENT_INSERT 按紧急加分重算优先级
    ///
    /// # 返回
    /// - `AdjustmentOutcome::Applied`: 自动生效
    /// - `AdjustmentOutcome::PendingApproval`: 已生效,等待审批
    #[instrument(skip(self, request), fields(
        schedule_id = %request.schedule_id,
        adjustment_type = %request.adjustment_type
    ))]
    pub fn adjust_schedule(&self, request: AdjustmentRequest) -> SchedulingResult<AdjustmentOutcome> {
        validation::ensure_text("reason", &request.reason)?;
        validation::ensure_text("operator", &request.operator)?;
        check_change_shape(&request)?;

        let current = self.load_schedule(&request.schedule_id)?;
        if current.status.is_terminal() {
            return Err(SchedulingError::InvalidStateTransition {
                entity: "ProductionSchedule".to_string(),
                id: current.schedule_id.clone(),
                from: current.status.to_string(),
                to: request.adjustment_type.to_string(),
            });
        }
        if request.change.new_selection.is_some() && current.status == ScheduleStatus::InProgress {
            return Err(SchedulingError::validation(
                "resource",
                "执行中的排程不能更换资源",
            ));
        }

        // 目标状态预校验 (目录访问放在持锁之前)
        let target_window = request.change.new_window.unwrap_or_else(|| current.window());
        let target_selection = request
            .change
            .new_selection
            .clone()
            .unwrap_or_else(|| current.selection());
        let new_keys = match &request.change.new_selection {
            Some(selection) => validation::ensure_selection(selection)?,
            None => current.resource_keys(),
        };
        let needs_order = request.change.new_window.is_some()
            || request.change.new_selection.is_some()
            || request.adjustment_type == AdjustmentType::UrgentInsert;
        let order = if needs_order {
            Some(validation::load_work_order(
                self.work_orders.as_ref(),
                &current.work_order_id,
            )?)
        } else {
            None
        };
        if let Some(order) = &order {
            if request.change.new_selection.is_some() {
                let profiles = validation::load_resources(self.resources.as_ref(), &new_keys)?;
                validation::ensure_skills(order, &profiles)?;
            }
            if request.change.new_window.is_some() || request.change.new_selection.is_some() {
                validation::ensure_window_covers_work(order, target_selection.allocation_pct, target_window)?;
            }
        }
        let urgent_priority = order.as_ref().and_then(|order| {
            (request.adjustment_type == AdjustmentType::UrgentInsert)
                .then(|| self.scorer.score(order.due_date, target_window.start.date(), true))
        });

        let lock_keys = merge_keys(&current.resource_keys(), &new_keys);
        let expected_keys = current.resource_keys();

        let outcome = self.detector.locks().with_locked(&lock_keys, || {
            let (before, log) = self.repos.with_transaction(
                |tx| -> SchedulingResult<(ScheduleSnapshot, ScheduleAdjustmentLog)> {
                    let mut schedule = ProductionScheduleRepository::find_by_id_tx(tx, &request.schedule_id)?
                        .ok_or_else(|| SchedulingError::not_found("ProductionSchedule", &request.schedule_id))?;
                    if let Some(expected) = request.expected_revision {
                        if schedule.revision != expected {
                            return Err(SchedulingError::ConcurrentModification(format!(
                                "排程 {} revision 已变化: 期望 {}, 实际 {}",
                                schedule.schedule_id, expected, schedule.revision
                            )));
                        }
                    }
                    if schedule.resource_keys() != expected_keys || schedule.status.is_terminal() {
                        return Err(SchedulingError::ConcurrentModification(format!(
                            "排程 {} 在校验后已被修改",
                            schedule.schedule_id
                        )));
                    }

                    let before = schedule.snapshot();
                    apply_change(&mut schedule, &request, urgent_priority);
                    let after = schedule.snapshot();
                    if before == after {
                        return Err(SchedulingError::validation("change", "变更前后无差异"));
                    }

                    let revision_after = ProductionScheduleRepository::update_tx(tx, &schedule)?;
                    let affected = AdjustmentRecorder::count_affected_tx(
                        tx,
                        &schedule.schedule_id,
                        &schedule.resource_keys(),
                        schedule.window(),
                    )?;
                    let log = self.recorder.record_tx(
                        tx,
                        AdjustmentDraft {
                            adjustment_type: request.adjustment_type,
                            trigger_source: request.trigger_source,
                            before: before.clone(),
                            after,
                            reason: request.reason.clone(),
                            operator: request.operator.clone(),
                            affected_schedule_count: affected,
                            revision_after,
                            compensates_log_id: None,
                        },
                    )?;
                    Ok((before, log))
                },
            )?;

            let detection = self
                .detector
                .detect_many_locked(&lock_keys, before.window().span(&target_window))?;
            let schedule = self.load_schedule(&request.schedule_id)?;
            Ok::<_, SchedulingError>(AdjustmentOutcome::from_parts(schedule, log, detection))
        })?;

        info!(
            log_id = %outcome.log().log_id,
            affected = outcome.log().affected_schedule_count,
            pending_approval = outcome.is_pending_approval(),
            "排程调整已提交"
        );
        self.recorder.announce(outcome.log());
        Ok(outcome)
    }

    // ==========================================
    // 状态迁移
    // ==========================================

    /// 按状态机迁移排程状态
    ///
    /// IN_PROGRESS 写入 actual_start, COMPLETED 写入 actual_end;
    /// 进入终态后重新检测,使失效冲突自动解除
    #[instrument(skip(self))]
    pub fn transition_status(
        &self,
        schedule_id: &str,
        target: ScheduleStatus,
        at: NaiveDateTime,
    ) -> SchedulingResult<StatusChange> {
        let current = self.load_schedule(schedule_id)?;
        ensure_transition(&current, target)?;
        let keys = current.resource_keys();

        let change = self.detector.locks().with_locked(&keys, || {
            let window = self.repos.with_transaction(|tx| -> SchedulingResult<TimeWindow> {
                let mut schedule = ProductionScheduleRepository::find_by_id_tx(tx, schedule_id)?
                    .ok_or_else(|| SchedulingError::not_found("ProductionSchedule", schedule_id))?;
                ensure_transition(&schedule, target)?;
                schedule.status = target;
                stamp_actuals(&mut schedule, at);
                ProductionScheduleRepository::update_tx(tx, &schedule)?;
                Ok(schedule.window())
            })?;

            let detection = if target.is_terminal() {
                self.detector.detect_many_locked(&keys, window)?
            } else {
                Vec::new()
            };
            let schedule = self.load_schedule(schedule_id)?;
            Ok::<_, SchedulingError>(StatusChange { schedule, detection })
        })?;

        info!(from = %current.status, to = %target, "排程状态已迁移");
        self.events.publish(
            SchedulingEvent::new(SchedulingEventType::ScheduleStatusChanged)
                .for_schedule(schedule_id)
                .with_detail(format!("{} -> {}", current.status, target)),
        );
        Ok(change)
    }

    // ==========================================
    // 补偿调整
    // ==========================================

    /// 撤销已生效 (APPROVED) 的调整
    ///
    /// 按原日志的 before_data 恢复计划字段,写入一条 COMPENSATION 日志;
    /// 每条日志只能补偿一次
    #[instrument(skip(self, reason))]
    pub fn revert_adjustment(
        &self,
        log_id: &str,
        operator: &str,
        reason: &str,
    ) -> SchedulingResult<AdjustmentOutcome> {
        validation::ensure_text("operator", operator)?;
        validation::ensure_text("reason", reason)?;

        let original = self
            .repos
            .adjustment_log_repo
            .find_by_id(log_id)?
            .ok_or_else(|| SchedulingError::not_found("ScheduleAdjustmentLog", log_id))?;
        if original.approval_status != ApprovalStatus::Approved {
            return Err(SchedulingError::InvalidStateTransition {
                entity: "ScheduleAdjustmentLog".to_string(),
                id: log_id.to_string(),
                from: original.approval_status.to_string(),
                to: AdjustmentType::Compensation.to_string(),
            });
        }
        if original.adjustment_type == AdjustmentType::Compensation {
            return Err(SchedulingError::validation("log_id", "补偿日志不能再次补偿"));
        }

        let current = self.load_schedule(&original.schedule_id)?;
        if current.status.is_terminal() {
            return Err(SchedulingError::InvalidStateTransition {
                entity: "ProductionSchedule".to_string(),
                id: current.schedule_id.clone(),
                from: current.status.to_string(),
                to: AdjustmentType::Compensation.to_string(),
            });
        }
        let target = original.before_data.schedule().clone();
        let resource_changes = current.selection().resource_keys() != target.selection().resource_keys();
        if resource_changes && current.status == ScheduleStatus::InProgress {
            return Err(SchedulingError::validation(
                "resource",
                "执行中的排程不能通过补偿更换资源",
            ));
        }

        let lock_keys = union_resource_keys(&current.snapshot(), &target);
        let expected_keys = current.resource_keys();

        let outcome = self.detector.locks().with_locked(&lock_keys, || {
            let (before, log) = self.repos.with_transaction(
                |tx| -> SchedulingResult<(ScheduleSnapshot, ScheduleAdjustmentLog)> {
                    if let Some(existing) = AdjustmentLogRepository::find_compensation_for_tx(tx, log_id)? {
                        warn!(log_id, compensation = %existing, "调整已被补偿");
                        return Err(SchedulingError::validation(
                            "log_id",
                            format!("调整 {} 已由 {} 补偿", log_id, existing),
                        ));
                    }
                    let mut schedule = ProductionScheduleRepository::find_by_id_tx(tx, &original.schedule_id)?
                        .ok_or_else(|| SchedulingError::not_found("ProductionSchedule", &original.schedule_id))?;
                    if schedule.resource_keys() != expected_keys || schedule.status.is_terminal() {
                        return Err(SchedulingError::ConcurrentModification(format!(
                            "排程 {} 在校验后已被修改",
                            schedule.schedule_id
                        )));
                    }

                    let before = schedule.snapshot();
                    schedule.restore_planning_from(&target);
                    if resource_changes && schedule.status == ScheduleStatus::Confirmed {
                        schedule.status = ScheduleStatus::Pending;
                    }
                    let after = schedule.snapshot();
                    if before == after {
                        return Err(SchedulingError::validation("log_id", "排程已处于调整前状态"));
                    }

                    let revision_after = ProductionScheduleRepository::update_tx(tx, &schedule)?;
                    let affected = AdjustmentRecorder::count_affected_tx(
                        tx,
                        &schedule.schedule_id,
                        &schedule.resource_keys(),
                        schedule.window(),
                    )?;
                    let log = self.recorder.record_tx(
                        tx,
                        AdjustmentDraft {
                            adjustment_type: AdjustmentType::Compensation,
                            trigger_source: TriggerSource::Manual,
                            before: before.clone(),
                            after,
                            reason: reason.to_string(),
                            operator: operator.to_string(),
                            affected_schedule_count: affected,
                            revision_after,
                            compensates_log_id: Some(log_id.to_string()),
                        },
                    )?;
                    Ok((before, log))
                },
            )?;

            let detection = self
                .detector
                .detect_many_locked(&lock_keys, before.window().span(&target.window()))?;
            let schedule = self.load_schedule(&original.schedule_id)?;
            Ok::<_, SchedulingError>(AdjustmentOutcome::from_parts(schedule, log, detection))
        })?;

        info!(compensation_log_id = %outcome.log().log_id, "调整已补偿");
        self.recorder.announce(outcome.log());
        Ok(outcome)
    }

    fn load_schedule(&self, schedule_id: &str) -> SchedulingResult<ProductionSchedule> {
        self.repos
            .schedule_repo
            .find_by_id(schedule_id)?
            .ok_or_else(|| SchedulingError::not_found("ProductionSchedule", schedule_id))
    }
}

// ==========================================
// 辅助函数
// ==========================================

/// 调整类型与变更内容的对应关系
fn check_change_shape(request: &AdjustmentRequest) -> SchedulingResult<()> {
    let change = &request.change;
    match request.adjustment_type {
        AdjustmentType::Compensation => {
            return Err(SchedulingError::validation(
                "adjustment_type",
                "补偿调整请使用 revert_adjustment",
            ))
        }
        AdjustmentType::TimeChange if change.new_window.is_none() => {
            return Err(SchedulingError::validation("window", "时间窗调整缺少新时间窗"))
        }
        AdjustmentType::ResourceChange if change.new_selection.is_none() => {
            return Err(SchedulingError::validation("resource", "资源变更缺少新资源"))
        }
        AdjustmentType::PriorityChange if change.new_priority.is_none() => {
            return Err(SchedulingError::validation("priority_score", "优先级调整缺少新优先级"))
        }
        _ => {}
    }

    if let Some(window) = change.new_window {
        validation::ensure_window(window)?;
    }
    if let Some(priority) = change.new_priority {
        if !priority.is_finite() || priority < 0.0 {
            return Err(SchedulingError::validation(
                "priority_score",
                format!("优先级必须为非负数: {}", priority),
            ));
        }
    }
    Ok(())
}

fn apply_change(schedule: &mut ProductionSchedule, request: &AdjustmentRequest, urgent_priority: Option<f64>) {
    let change = &request.change;
    if let Some(window) = change.new_window {
        schedule.set_window(window);
    }
    if let Some(selection) = &change.new_selection {
        let resources_changed = selection.resource_keys() != schedule.resource_keys();
        schedule.set_selection(selection);
        if resources_changed && schedule.status == ScheduleStatus::Confirmed {
            schedule.status = ScheduleStatus::Pending;
        }
    }
    if let Some(priority) = change.new_priority {
        schedule.priority_score = priority;
    }
    if let Some(priority) = urgent_priority {
        schedule.priority_score = priority;
    }
    if request.trigger_source == TriggerSource::Manual {
        schedule.is_manually_adjusted = true;
    }
}

fn ensure_transition(schedule: &ProductionSchedule, target: ScheduleStatus) -> SchedulingResult<()> {
    if !schedule.status.can_transition_to(target) {
        return Err(SchedulingError::InvalidStateTransition {
            entity: "ProductionSchedule".to_string(),
            id: schedule.schedule_id.clone(),
            from: schedule.status.to_string(),
            to: target.to_string(),
        });
    }
    Ok(())
}

fn merge_keys(a: &[ResourceKey], b: &[ResourceKey]) -> Vec<ResourceKey> {
    let set: BTreeSet<ResourceKey> = a.iter().chain(b.iter()).cloned().collect();
    set.into_iter().collect()
}
