use super::validation;
use super::{CreateScheduleRequest, ScheduleBuilder, ScheduleCreation};
use crate::domain::schedule::ProductionSchedule;
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::events::{SchedulingEvent, SchedulingEventType};
use crate::repository::ProductionScheduleRepository;
use tracing::{info, instrument};
use uuid::Uuid;

impl ScheduleBuilder {
    /// 为工单创建 PENDING 排程
    ///
    /// # 流程
    /// 1. 校验时间窗、资源选择、工单、资源档案与可用性、技能覆盖、工作量
    /// 2. 计算优先级 (交期临近度 + 紧急加分)
    /// 3. 持资源锁写入,随后对每个选中资源做冲突检测
    ///
    /// # 错误
    /// - `Validation`: 输入不合法 (带字段)
    /// - `DirectoryUnavailable`: 工单/资源目录不可用
    #[instrument(skip(self, request), fields(work_order_id = %request.work_order_id))]
    pub fn create_schedule(&self, request: CreateScheduleRequest) -> SchedulingResult<ScheduleCreation> {
        validation::ensure_window(request.window)?;
        let keys = validation::ensure_selection(&request.selection)?;
        let order = validation::load_work_order(self.work_orders.as_ref(), &request.work_order_id)?;
        let profiles = validation::load_resources(self.resources.as_ref(), &keys)?;
        validation::ensure_skills(&order, &profiles)?;
        validation::ensure_window_covers_work(&order, request.selection.allocation_pct, request.window)?;

        let schedule_id = match request.schedule_id {
            Some(id) => {
                validation::ensure_text("schedule_id", &id)?;
                id
            }
            None => Uuid::new_v4().to_string(),
        };
        let priority = self
            .scorer
            .score(order.due_date, request.window.start.date(), order.is_urgent);
        let schedule = ProductionSchedule::new_pending(
            schedule_id,
            order.work_order_id.clone(),
            &request.selection,
            request.window,
            priority,
        );

        let creation = self.detector.locks().with_locked(&keys, || {
            self.repos.with_transaction(|tx| -> SchedulingResult<String> {
                Ok(ProductionScheduleRepository::insert_tx(tx, &schedule)?)
            })?;

            let detection = self.detector.detect_many_locked(&keys, schedule.window())?;
            let stored = self
                .repos
                .schedule_repo
                .find_by_id(&schedule.schedule_id)?
                .ok_or_else(|| SchedulingError::not_found("ProductionSchedule", &schedule.schedule_id))?;
            Ok::<_, SchedulingError>(ScheduleCreation {
                schedule: stored,
                detection,
            })
        })?;

        info!(
            schedule_id = %creation.schedule.schedule_id,
            priority_score = creation.schedule.priority_score,
            has_conflict = creation.schedule.has_conflict,
            "排程已创建"
        );
        self.events.publish(
            SchedulingEvent::new(SchedulingEventType::ScheduleCreated)
                .for_schedule(&creation.schedule.schedule_id)
                .with_reference(&creation.schedule.work_order_id),
        );
        Ok(creation)
    }
}
