// ==========================================
// 调整审批集成测试
// ==========================================
// 测试目标: 审批门控、驳回回滚、补偿调整、日志只追加
// ==========================================

mod test_helpers;

use mes_scheduling::config::{config_keys, ConfigManager};
use mes_scheduling::domain::adjustment::AdjustmentSnapshot;
use mes_scheduling::domain::schedule::ResourceSelection;
use mes_scheduling::domain::types::{AdjustmentType, ApprovalStatus, ConflictStatus, TriggerSource};
use mes_scheduling::engine::{AdjustmentOutcome, AdjustmentRequest, ScheduleChange, SchedulingError};
use mes_scheduling::SchedulingServices;
use test_helpers::{create_on_equipment, create_seeded_services, seed_directory, window};

fn move_to(schedule_id: &str, equipment_id: &str, allocation: f64) -> AdjustmentRequest {
    AdjustmentRequest {
        schedule_id: schedule_id.to_string(),
        change: ScheduleChange::selection(ResourceSelection::equipment(equipment_id).with_allocation(allocation)),
        adjustment_type: AdjustmentType::ResourceChange,
        trigger_source: TriggerSource::Manual,
        reason: "设备检修".to_string(),
        operator: "planner".to_string(),
        expected_revision: None,
    }
}

/// E2 上 4 个并行排程 + E1 上的待迁移排程 M1
fn crowded(services: &SchedulingServices) {
    for i in 1..=4 {
        create_on_equipment(services, &format!("P{}", i), "E2", 25.0, 8, 12);
    }
    create_on_equipment(services, "M1", "E1", 25.0, 8, 12);
}

#[test]
fn test_gate_applies_change_and_waits_for_decision() {
    let (_temp_file, services) = create_seeded_services().unwrap();
    crowded(&services);

    let outcome = services.builder.adjust_schedule(move_to("M1", "E2", 25.0)).unwrap();
    assert!(matches!(outcome, AdjustmentOutcome::PendingApproval { .. }));
    assert_eq!(outcome.log().affected_schedule_count, 5);

    // 快照按调整类型打标签
    assert!(matches!(
        outcome.log().before_data,
        AdjustmentSnapshot::ResourceChange(_)
    ));

    let pending = services.recorder.find_pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].log_id, outcome.log().log_id);

    let approved = services
        .recorder
        .approve(&outcome.log().log_id, "supervisor", Some("同意"))
        .unwrap();
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    assert_eq!(approved.approval_comment.as_deref(), Some("同意"));
    assert!(approved.approved_at.is_some());
    assert!(services.recorder.find_pending().unwrap().is_empty());
}

#[test]
fn test_small_change_is_auto_approved() {
    let (_temp_file, services) = create_seeded_services().unwrap();
    create_on_equipment(&services, "P1", "E2", 25.0, 8, 12);
    create_on_equipment(&services, "M1", "E1", 25.0, 8, 12);

    let outcome = services.builder.adjust_schedule(move_to("M1", "E2", 25.0)).unwrap();
    assert!(matches!(outcome, AdjustmentOutcome::Applied { .. }));
    assert_eq!(outcome.log().affected_schedule_count, 2);
    assert!(!outcome.log().requires_approval);
    assert_eq!(outcome.log().approval_status, ApprovalStatus::Approved);
}

#[test]
fn test_reject_rolls_back_and_keeps_resolved_rows() {
    let (_temp_file, services) = create_seeded_services().unwrap();
    crowded(&services);
    // E1 上还有一个与 M1 冲突的排程,迁走后冲突解除
    create_on_equipment(&services, "X1", "E1", 90.0, 9, 11);
    assert!(services.repos.schedule_repo.find_by_id("M1").unwrap().unwrap().has_conflict);

    let outcome = services.builder.adjust_schedule(move_to("M1", "E2", 25.0)).unwrap();
    assert!(outcome.is_pending_approval());
    assert!(!outcome.schedule().has_conflict);

    let rejection = services
        .recorder
        .reject(&outcome.log().log_id, "supervisor", Some("E1 检修取消"))
        .unwrap();
    assert_eq!(rejection.schedule.equipment_id.as_deref(), Some("E1"));
    // 回滚后重新检测: 重叠再次出现,但已解除的冲突行保持 RESOLVED
    let e1 = rejection
        .detection
        .iter()
        .find(|r| r.resource_id == "E1")
        .unwrap();
    assert_eq!(e1.conflicts.len(), 1);
    assert_eq!(e1.conflicts[0].status, ConflictStatus::Resolved);
    assert_eq!(e1.created, 0);
    assert!(!rejection.schedule.has_conflict);

    let log = services
        .repos
        .adjustment_log_repo
        .find_by_id(&outcome.log().log_id)
        .unwrap()
        .unwrap();
    assert_eq!(log.approval_status, ApprovalStatus::Rejected);
}

#[test]
fn test_threshold_is_read_from_config() {
    let (temp_file, services) = create_seeded_services().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    ConfigManager::from_connection(services.repos.connection())
        .unwrap()
        .set_global_value(config_keys::APPROVAL_AFFECTED_SCHEDULE_THRESHOLD, "10")
        .unwrap();
    drop(services);

    let services = SchedulingServices::open(&db_path).unwrap();
    seed_directory(&services).unwrap();
    assert_eq!(services.config.approval_affected_threshold, 10);
    crowded(&services);

    let outcome = services.builder.adjust_schedule(move_to("M1", "E2", 25.0)).unwrap();
    assert!(!outcome.is_pending_approval());
}

#[test]
fn test_compensation_reverts_approved_change() {
    let (_temp_file, services) = create_seeded_services().unwrap();
    crowded(&services);
    let outcome = services.builder.adjust_schedule(move_to("M1", "E2", 25.0)).unwrap();
    services
        .recorder
        .approve(&outcome.log().log_id, "supervisor", None)
        .unwrap();

    let reverted = services
        .builder
        .revert_adjustment(&outcome.log().log_id, "planner", "检修取消")
        .unwrap();
    assert_eq!(reverted.schedule().equipment_id.as_deref(), Some("E1"));
    assert_eq!(reverted.schedule().window(), window(8, 12));
    assert_eq!(reverted.log().adjustment_type, AdjustmentType::Compensation);
    // 补偿调整不受审批门控
    assert!(!reverted.is_pending_approval());

    let history = services.recorder.history("M1").unwrap();
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .any(|log| log.compensates_log_id.as_deref() == Some(outcome.log().log_id.as_str())));

    // 补偿日志本身不能再被补偿
    let err = services
        .builder
        .revert_adjustment(&reverted.log().log_id, "planner", "再撤销")
        .unwrap_err();
    assert_eq!(err.field(), Some("log_id"));
}

#[test]
fn test_approval_requires_operator_and_known_log() {
    let (_temp_file, services) = create_seeded_services().unwrap();
    let err = services.recorder.approve("missing", "supervisor", None).unwrap_err();
    assert!(matches!(err, SchedulingError::NotFound { .. }));

    let err = services
        .builder
        .adjust_schedule(AdjustmentRequest {
            reason: "  ".to_string(),
            ..move_to("M1", "E2", 25.0)
        })
        .unwrap_err();
    assert_eq!(err.field(), Some("reason"));
}
