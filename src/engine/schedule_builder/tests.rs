use super::*;
use crate::app::SchedulingServices;
use crate::config::SchedulingConfig;
use crate::db::open_in_memory_with_schema;
use crate::domain::resource::{ResourceProfile, WorkOrder};
use crate::domain::types::{
    AdjustmentType, ApprovalStatus, ConflictSeverity, ConflictStatus, ResourceType, ScheduleStatus,
    TriggerSource,
};
use crate::engine::adjustment_recorder::AdjustmentOutcome;
use crate::engine::directory::DirectoryError;
use crate::engine::error::SchedulingError;
use crate::engine::events::{SchedulingEvent, SchedulingEventPublisher, SchedulingEventType};
use chrono::{NaiveDate, NaiveDateTime};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// 测试辅助函数
// ==========================================

fn at(h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn window(start: u32, end: u32) -> TimeWindow {
    TimeWindow::new(at(start), at(end))
}

fn work_order(id: &str, skill: &str, quantity: i64, due_day: u32, is_urgent: bool) -> WorkOrder {
    WorkOrder {
        work_order_id: id.to_string(),
        required_skills: vec![skill.to_string()],
        quantity,
        unit_work_minutes: 6.0,
        due_date: NaiveDate::from_ymd_opt(2026, 3, due_day).unwrap(),
        is_urgent,
    }
}

fn resource(resource_type: ResourceType, id: &str, skill: &str, is_available: bool) -> ResourceProfile {
    ResourceProfile {
        resource_type,
        resource_id: id.to_string(),
        resource_name: id.to_string(),
        capabilities: vec![skill.to_string()],
        is_available,
    }
}

fn services_with(events: OptionalEventPublisher) -> SchedulingServices {
    crate::logging::init_test();
    let conn = Arc::new(Mutex::new(open_in_memory_with_schema().unwrap()));
    let services = SchedulingServices::with_events(conn, SchedulingConfig::default(), events);

    let directory = &services.repos.directory_repo;
    // WO1: 10 件 × 6 分钟 = 60 分钟
    directory.upsert_work_order(&work_order("WO1", "CNC", 10, 5, false)).unwrap();
    directory.upsert_work_order(&work_order("WO-URGENT", "CNC", 10, 3, true)).unwrap();
    directory.upsert_work_order(&work_order("WO-WELD", "WELD", 10, 5, false)).unwrap();
    for (id, skill, available) in [
        ("E1", "CNC", true),
        ("E2", "CNC", true),
        ("E3", "WELD", true),
        ("E9", "CNC", false),
    ] {
        directory
            .upsert_resource(&resource(ResourceType::Equipment, id, skill, available))
            .unwrap();
    }
    directory
        .upsert_resource(&resource(ResourceType::Worker, "W1", "CNC", true))
        .unwrap();
    services
}

fn services() -> SchedulingServices {
    services_with(OptionalEventPublisher::none())
}

fn create(
    services: &SchedulingServices,
    id: &str,
    equipment: &str,
    allocation: f64,
    start: u32,
    end: u32,
) -> ScheduleCreation {
    services
        .builder
        .create_schedule(CreateScheduleRequest {
            schedule_id: Some(id.to_string()),
            work_order_id: "WO1".to_string(),
            selection: ResourceSelection::equipment(equipment).with_allocation(allocation),
            window: window(start, end),
        })
        .unwrap()
}

fn adjust(schedule_id: &str, change: ScheduleChange, adjustment_type: AdjustmentType) -> AdjustmentRequest {
    AdjustmentRequest {
        schedule_id: schedule_id.to_string(),
        change,
        adjustment_type,
        trigger_source: TriggerSource::Manual,
        reason: "产线调整".to_string(),
        operator: "planner".to_string(),
        expected_revision: None,
    }
}

fn create_err(services: &SchedulingServices, work_order_id: &str, selection: ResourceSelection, w: TimeWindow) -> SchedulingError {
    services
        .builder
        .create_schedule(CreateScheduleRequest {
            schedule_id: None,
            work_order_id: work_order_id.to_string(),
            selection,
            window: w,
        })
        .unwrap_err()
}

/// 在 E2 上放 4 个互不冲突的排程,使迁入 E2 的调整超过审批阈值
fn crowd_e2(services: &SchedulingServices) {
    for i in 1..=4 {
        create(services, &format!("P{}", i), "E2", 25.0, 8, 12);
    }
}

#[derive(Default)]
struct CapturingPublisher {
    events: Mutex<Vec<SchedulingEventType>>,
}

impl SchedulingEventPublisher for CapturingPublisher {
    fn publish(&self, event: SchedulingEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.events.lock().unwrap().push(event.event_type);
        Ok(String::new())
    }
}

struct OfflineDirectory;

impl WorkOrderDirectory for OfflineDirectory {
    fn find_work_order(&self, _work_order_id: &str) -> Result<Option<WorkOrder>, DirectoryError> {
        Err(DirectoryError::Unavailable {
            directory: "work_order".to_string(),
            message: "connection refused".to_string(),
        })
    }
}

impl ResourceDirectory for OfflineDirectory {
    fn find_resource(
        &self,
        _resource_type: ResourceType,
        _resource_id: &str,
    ) -> Result<Option<ResourceProfile>, DirectoryError> {
        Ok(None)
    }
}

// ==========================================
// 创建排程
// ==========================================

#[test]
fn test_create_schedule_scores_priority_and_detects() {
    let services = services();
    let creation = create(&services, "S1", "E1", 60.0, 8, 11);

    assert_eq!(creation.schedule.status, ScheduleStatus::Pending);
    // 距交期 3 天: 100 - 3 × 10
    assert_eq!(creation.schedule.priority_score, 70.0);
    assert_eq!(creation.detection.len(), 1);
    assert!(creation.detection[0].conflicts.is_empty());
    assert!(!creation.schedule.has_conflict);
}

#[test]
fn test_urgent_work_order_gets_bonus() {
    let services = services();
    let creation = services
        .builder
        .create_schedule(CreateScheduleRequest {
            schedule_id: None,
            work_order_id: "WO-URGENT".to_string(),
            selection: ResourceSelection::equipment("E1"),
            window: window(8, 10),
        })
        .unwrap();
    // 距交期 1 天: 90 + 50
    assert_eq!(creation.schedule.priority_score, 140.0);
    assert!(!creation.schedule.schedule_id.is_empty());
}

#[test]
fn test_create_schedule_validation_fields() {
    let services = services();

    let err = create_err(&services, "WO1", ResourceSelection::equipment("E404"), window(8, 10));
    assert_eq!(err.field(), Some("equipment_id"));

    let err = create_err(&services, "WO1", ResourceSelection::equipment("E9"), window(8, 10));
    assert_eq!(err.field(), Some("equipment_id"));

    let err = create_err(&services, "WO1", ResourceSelection::equipment("E3"), window(8, 10));
    assert_eq!(err.field(), Some("required_skills"));

    // 60% 占用需要 100 分钟
    let err = create_err(
        &services,
        "WO1",
        ResourceSelection::equipment("E1").with_allocation(60.0),
        window(8, 9),
    );
    assert_eq!(err.field(), Some("window"));

    let err = create_err(&services, "WO1", ResourceSelection::equipment("E1"), window(10, 8));
    assert_eq!(err.field(), Some("window"));

    let mut nothing = ResourceSelection::equipment("E1");
    nothing.equipment_id = None;
    let err = create_err(&services, "WO1", nothing, window(8, 10));
    assert_eq!(err.field(), Some("resource"));

    let err = create_err(
        &services,
        "WO1",
        ResourceSelection::equipment("E1").with_allocation(120.0),
        window(8, 10),
    );
    assert_eq!(err.field(), Some("allocation_pct"));

    let err = create_err(&services, "WO404", ResourceSelection::equipment("E1"), window(8, 10));
    assert_eq!(err.field(), Some("work_order_id"));
    assert!(err.is_validation());
}

#[test]
fn test_skill_covered_by_any_selected_resource() {
    let services = services();
    // E3 只有 WELD,W1 提供 CNC
    let creation = services
        .builder
        .create_schedule(CreateScheduleRequest {
            schedule_id: None,
            work_order_id: "WO1".to_string(),
            selection: ResourceSelection::equipment("E3").with_worker("W1"),
            window: window(8, 10),
        })
        .unwrap();
    assert_eq!(creation.detection.len(), 2);
}

#[test]
fn test_directory_outage_is_surfaced() {
    let services = services();
    let builder = ScheduleBuilder::new(
        services.repos.clone(),
        services.detector.clone(),
        services.recorder.clone(),
        Arc::new(OfflineDirectory),
        Arc::new(OfflineDirectory),
    );
    let err = builder
        .create_schedule(CreateScheduleRequest {
            schedule_id: None,
            work_order_id: "WO1".to_string(),
            selection: ResourceSelection::equipment("E1"),
            window: window(8, 10),
        })
        .unwrap_err();
    assert!(matches!(err, SchedulingError::DirectoryUnavailable { .. }));
}

#[test]
fn test_overlapping_creation_records_medium_conflict() {
    let services = services();
    create(&services, "S1", "E1", 60.0, 8, 11);
    let second = create(&services, "S2", "E1", 70.0, 9, 12);

    let conflicts = &second.detection[0].conflicts;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].severity, ConflictSeverity::Medium);
    assert_eq!(conflicts[0].overlap_start, at(9));
    assert_eq!(conflicts[0].overlap_end, at(11));
    assert!(second.schedule.has_conflict);
    assert!(services.repos.schedule_repo.find_by_id("S1").unwrap().unwrap().has_conflict);
}

// ==========================================
// 调整排程
// ==========================================

#[test]
fn test_time_change_clears_conflict_and_logs_snapshots() {
    let services = services();
    create(&services, "S1", "E1", 60.0, 8, 11);
    create(&services, "S2", "E1", 70.0, 9, 12);

    let outcome = services
        .builder
        .adjust_schedule(adjust("S2", ScheduleChange::window(window(11, 14)), AdjustmentType::TimeChange))
        .unwrap();

    assert!(!outcome.is_pending_approval());
    let schedule = outcome.schedule();
    assert_eq!(schedule.window(), window(11, 14));
    assert!(schedule.is_manually_adjusted);
    assert!(!schedule.has_conflict);
    assert_eq!(schedule.revision, 1);

    let log = outcome.log();
    assert_eq!(log.approval_status, ApprovalStatus::Approved);
    assert_eq!(log.before_data.schedule().window(), window(9, 12));
    assert_eq!(log.after_data.schedule().window(), window(11, 14));
    assert_eq!(log.revision_after, 1);

    let resolved: Vec<_> = outcome.detection().iter().flat_map(|r| r.auto_resolved.clone()).collect();
    assert_eq!(resolved.len(), 1);
    assert!(services
        .detector
        .list_unresolved(ResourceType::Equipment, "E1")
        .unwrap()
        .is_empty());
}

#[test]
fn test_resource_change_over_threshold_waits_for_approval() {
    let capture = Arc::new(CapturingPublisher::default());
    let services = services_with(OptionalEventPublisher::with_publisher(capture.clone()));
    crowd_e2(&services);
    create(&services, "M1", "E1", 25.0, 8, 12);

    let outcome = services
        .builder
        .adjust_schedule(adjust(
            "M1",
            ScheduleChange::selection(ResourceSelection::equipment("E2").with_allocation(25.0)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap();

    let AdjustmentOutcome::PendingApproval { schedule, log, .. } = &outcome else {
        panic!("expected pending approval, got {:?}", outcome);
    };
    assert_eq!(log.affected_schedule_count, 5);
    assert!(log.requires_approval);
    // 调整已生效,等待审批
    assert_eq!(schedule.equipment_id.as_deref(), Some("E2"));
    assert_eq!(services.recorder.find_pending().unwrap().len(), 1);
    assert!(capture
        .events
        .lock()
        .unwrap()
        .contains(&SchedulingEventType::AdjustmentPendingApproval));
}

#[test]
fn test_time_change_is_never_gated() {
    let services = services();
    crowd_e2(&services);
    create(&services, "M1", "E2", 25.0, 13, 17);

    let outcome = services
        .builder
        .adjust_schedule(adjust("M1", ScheduleChange::window(window(8, 12)), AdjustmentType::TimeChange))
        .unwrap();
    assert_eq!(outcome.log().affected_schedule_count, 5);
    assert!(!outcome.is_pending_approval());
}

#[test]
fn test_reject_restores_before_snapshot() {
    let services = services();
    crowd_e2(&services);
    create(&services, "M1", "E1", 25.0, 8, 12);
    let original = services.repos.schedule_repo.find_by_id("M1").unwrap().unwrap();

    let outcome = services
        .builder
        .adjust_schedule(adjust(
            "M1",
            ScheduleChange::selection(ResourceSelection::equipment("E2").with_allocation(25.0)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap();
    let log_id = outcome.log().log_id.clone();

    let rejection = services
        .recorder
        .reject(&log_id, "supervisor", Some("产能不足"))
        .unwrap();
    assert_eq!(rejection.log.approval_status, ApprovalStatus::Rejected);
    assert_eq!(rejection.log.approved_by.as_deref(), Some("supervisor"));
    assert_eq!(rejection.schedule.snapshot(), original.snapshot());
    assert_eq!(&rejection.schedule.snapshot(), outcome.log().before_data.schedule());
    assert!(services.recorder.find_pending().unwrap().is_empty());

    // 日志只追加
    assert_eq!(services.recorder.history("M1").unwrap().len(), 1);
}

#[test]
fn test_approve_keeps_change_and_is_single_shot() {
    let services = services();
    crowd_e2(&services);
    create(&services, "M1", "E1", 25.0, 8, 12);
    let outcome = services
        .builder
        .adjust_schedule(adjust(
            "M1",
            ScheduleChange::selection(ResourceSelection::equipment("E2").with_allocation(25.0)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap();
    let log_id = outcome.log().log_id.clone();

    let approved = services.recorder.approve(&log_id, "supervisor", None).unwrap();
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    let schedule = services.repos.schedule_repo.find_by_id("M1").unwrap().unwrap();
    assert_eq!(schedule.equipment_id.as_deref(), Some("E2"));

    let err = services.recorder.approve(&log_id, "supervisor", None).unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidStateTransition { .. }));
    let err = services.recorder.reject(&log_id, "supervisor", None).unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidStateTransition { .. }));
}

#[test]
fn test_reject_after_later_change_is_refused() {
    let services = services();
    crowd_e2(&services);
    create(&services, "M1", "E1", 25.0, 8, 12);
    let pending = services
        .builder
        .adjust_schedule(adjust(
            "M1",
            ScheduleChange::selection(ResourceSelection::equipment("E2").with_allocation(25.0)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap();
    let later = services
        .builder
        .adjust_schedule(adjust("M1", ScheduleChange::window(window(9, 13)), AdjustmentType::TimeChange))
        .unwrap();

    let err = services
        .recorder
        .reject(&pending.log().log_id, "supervisor", None)
        .unwrap_err();
    assert!(matches!(err, SchedulingError::ConcurrentModification(_)));
    // 日志仍待审批
    assert_eq!(services.recorder.find_pending().unwrap().len(), 1);

    // 补偿后续调整后即可驳回
    services
        .builder
        .revert_adjustment(&later.log().log_id, "planner", "撤销时间调整")
        .unwrap();
    let rejected = services
        .recorder
        .reject(&pending.log().log_id, "supervisor", Some("不批准换线"))
        .unwrap();
    assert_eq!(rejected.log.approval_status, ApprovalStatus::Rejected);
    assert_eq!(rejected.schedule.snapshot(), *pending.log().before_data.schedule());
    assert!(services.recorder.find_pending().unwrap().is_empty());
}

#[test]
fn test_reject_after_priority_change_and_its_compensation() {
    let services = services();
    crowd_e2(&services);
    create(&services, "M1", "E1", 25.0, 8, 12);
    let pending = services
        .builder
        .adjust_schedule(adjust(
            "M1",
            ScheduleChange::selection(ResourceSelection::equipment("E2").with_allocation(25.0)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap();
    assert!(pending.is_pending_approval());

    let reprioritized = services
        .builder
        .adjust_schedule(adjust("M1", ScheduleChange::priority(95.0), AdjustmentType::PriorityChange))
        .unwrap();
    services
        .builder
        .revert_adjustment(&reprioritized.log().log_id, "planner", "恢复优先级")
        .unwrap();

    let rejected = services
        .recorder
        .reject(&pending.log().log_id, "supervisor", None)
        .unwrap();
    assert_eq!(rejected.schedule.equipment_id.as_deref(), Some("E1"));
    assert_eq!(rejected.schedule.snapshot(), *pending.log().before_data.schedule());
}

#[test]
fn test_reject_after_confirmation_restores_planning_only() {
    let services = services();
    crowd_e2(&services);
    create(&services, "M1", "E1", 25.0, 8, 12);
    let pending = services
        .builder
        .adjust_schedule(adjust(
            "M1",
            ScheduleChange::selection(ResourceSelection::equipment("E2").with_allocation(25.0)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap();
    services
        .builder
        .transition_status("M1", ScheduleStatus::Confirmed, at(7))
        .unwrap();

    let rejected = services
        .recorder
        .reject(&pending.log().log_id, "supervisor", None)
        .unwrap();
    assert_eq!(rejected.schedule.equipment_id.as_deref(), Some("E1"));
    assert_eq!(rejected.schedule.window(), window(8, 12));
    // 换回原资源后需要重新确认
    assert_eq!(rejected.schedule.status, ScheduleStatus::Pending);

    // 执行中的排程不能换回原资源
    let moved = services
        .builder
        .adjust_schedule(adjust(
            "M1",
            ScheduleChange::selection(ResourceSelection::equipment("E2").with_allocation(25.0)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap();
    assert!(moved.is_pending_approval());
    services.builder.transition_status("M1", ScheduleStatus::Confirmed, at(7)).unwrap();
    services.builder.transition_status("M1", ScheduleStatus::InProgress, at(8)).unwrap();
    let err = services
        .recorder
        .reject(&moved.log().log_id, "supervisor", None)
        .unwrap_err();
    assert_eq!(err.field(), Some("resource"));
}

#[test]
fn test_resource_change_rules_by_status() {
    let services = services();
    create(&services, "S1", "E1", 60.0, 8, 11);
    services
        .builder
        .transition_status("S1", ScheduleStatus::Confirmed, at(7))
        .unwrap();

    // CONFIRMED 换资源回到 PENDING
    let outcome = services
        .builder
        .adjust_schedule(adjust(
            "S1",
            ScheduleChange::selection(ResourceSelection::equipment("E2").with_allocation(60.0)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap();
    assert_eq!(outcome.schedule().status, ScheduleStatus::Pending);

    services
        .builder
        .transition_status("S1", ScheduleStatus::Confirmed, at(7))
        .unwrap();
    services
        .builder
        .transition_status("S1", ScheduleStatus::InProgress, at(8))
        .unwrap();
    let err = services
        .builder
        .adjust_schedule(adjust(
            "S1",
            ScheduleChange::selection(ResourceSelection::equipment("E1").with_allocation(60.0)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap_err();
    assert_eq!(err.field(), Some("resource"));

    services
        .builder
        .transition_status("S1", ScheduleStatus::Completed, at(11))
        .unwrap();
    let err = services
        .builder
        .adjust_schedule(adjust("S1", ScheduleChange::window(window(12, 15)), AdjustmentType::TimeChange))
        .unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidStateTransition { .. }));
}

#[test]
fn test_urgent_insert_recomputes_priority() {
    let services = services();
    create(&services, "S1", "E1", 60.0, 8, 11);

    let mut request = adjust("S1", ScheduleChange::default(), AdjustmentType::UrgentInsert);
    request.trigger_source = TriggerSource::OrderChange;
    let outcome = services.builder.adjust_schedule(request).unwrap();

    assert_eq!(outcome.schedule().priority_score, 120.0);
    assert!(!outcome.schedule().is_manually_adjusted);
    assert_eq!(outcome.log().adjustment_type, AdjustmentType::UrgentInsert);
}

#[test]
fn test_adjust_rejects_stale_revision_and_mismatched_change() {
    let services = services();
    create(&services, "S1", "E1", 60.0, 8, 11);

    let mut request = adjust("S1", ScheduleChange::window(window(12, 15)), AdjustmentType::TimeChange);
    request.expected_revision = Some(3);
    let err = services.builder.adjust_schedule(request).unwrap_err();
    assert!(matches!(err, SchedulingError::ConcurrentModification(_)));

    let err = services
        .builder
        .adjust_schedule(adjust("S1", ScheduleChange::priority(90.0), AdjustmentType::TimeChange))
        .unwrap_err();
    assert_eq!(err.field(), Some("window"));

    let err = services
        .builder
        .adjust_schedule(adjust("S1", ScheduleChange::window(window(8, 11)), AdjustmentType::TimeChange))
        .unwrap_err();
    assert_eq!(err.field(), Some("change"));
    assert!(services.recorder.history("S1").unwrap().is_empty());
}

// ==========================================
// 状态迁移
// ==========================================

#[test]
fn test_status_transitions_stamp_actuals() {
    let services = services();
    create(&services, "S1", "E1", 60.0, 8, 11);

    let err = services
        .builder
        .transition_status("S1", ScheduleStatus::Completed, at(11))
        .unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidStateTransition { .. }));

    services.builder.transition_status("S1", ScheduleStatus::Confirmed, at(7)).unwrap();
    let started = services
        .builder
        .transition_status("S1", ScheduleStatus::InProgress, at(8))
        .unwrap();
    assert_eq!(started.schedule.actual_start, Some(at(8)));

    let done = services
        .builder
        .transition_status("S1", ScheduleStatus::Completed, at(11))
        .unwrap();
    assert_eq!(done.schedule.actual_end, Some(at(11)));
    assert_eq!(done.schedule.actual_start, Some(at(8)));
}

#[test]
fn test_cancel_auto_resolves_conflicts() {
    let services = services();
    create(&services, "S1", "E1", 60.0, 8, 11);
    create(&services, "S2", "E1", 70.0, 9, 12);

    let cancelled = services
        .builder
        .transition_status("S2", ScheduleStatus::Cancelled, at(7))
        .unwrap();
    assert_eq!(cancelled.detection[0].auto_resolved.len(), 1);

    let conflicts = services.detector.list_for_schedule("S1").unwrap();
    assert_eq!(conflicts[0].status, ConflictStatus::Resolved);
    assert!(!services.repos.schedule_repo.find_by_id("S1").unwrap().unwrap().has_conflict);
}

// ==========================================
// 补偿调整
// ==========================================

#[test]
fn test_revert_adjustment_writes_compensation() {
    let services = services();
    create(&services, "S1", "E1", 60.0, 8, 11);
    let applied = services
        .builder
        .adjust_schedule(adjust("S1", ScheduleChange::window(window(12, 15)), AdjustmentType::TimeChange))
        .unwrap();
    let original_log = applied.log().log_id.clone();

    let reverted = services
        .builder
        .revert_adjustment(&original_log, "planner", "客户取消改期")
        .unwrap();
    assert_eq!(reverted.schedule().window(), window(8, 11));
    assert!(!reverted.schedule().is_manually_adjusted);
    assert_eq!(reverted.log().adjustment_type, AdjustmentType::Compensation);
    assert_eq!(reverted.log().compensates_log_id.as_deref(), Some(original_log.as_str()));
    assert_eq!(services.recorder.history("S1").unwrap().len(), 2);

    let err = services
        .builder
        .revert_adjustment(&original_log, "planner", "重复")
        .unwrap_err();
    assert_eq!(err.field(), Some("log_id"));
}

#[test]
fn test_pending_adjustment_cannot_be_compensated() {
    let services = services();
    crowd_e2(&services);
    create(&services, "M1", "E1", 25.0, 8, 12);
    let pending = services
        .builder
        .adjust_schedule(adjust(
            "M1",
            ScheduleChange::selection(ResourceSelection::equipment("E2").with_allocation(25.0)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap();

    let err = services
        .builder
        .revert_adjustment(&pending.log().log_id, "planner", "撤销")
        .unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidStateTransition { .. }));
}

#[test]
fn test_combined_window_and_resource_change() {
    let services = services();
    create(&services, "S1", "E1", 100.0, 8, 10);
    create(&services, "S2", "E1", 50.0, 10, 12);

    let moved = services
        .builder
        .adjust_schedule(adjust(
            "S1",
            ScheduleChange::selection(ResourceSelection::equipment("E2")).with_window(window(13, 15)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap();
    assert!(!moved.is_pending_approval());
    assert_eq!(moved.schedule().equipment_id.as_deref(), Some("E2"));
    assert_eq!(moved.schedule().window(), window(13, 15));

    let moved = services
        .builder
        .adjust_schedule(adjust(
            "S2",
            ScheduleChange::window(window(15, 17))
                .with_selection(ResourceSelection::equipment("E2").with_allocation(50.0)),
            AdjustmentType::ResourceChange,
        ))
        .unwrap();
    assert_eq!(moved.log().approval_status, ApprovalStatus::Approved);
    assert_eq!(moved.schedule().equipment_id.as_deref(), Some("E2"));
    assert!(!moved.schedule().has_conflict);
}
