// ==========================================
// 并发控制测试
// ==========================================
// 职责: 验证同一资源上的变更串行化、乐观锁与冲突去重
// ==========================================

mod test_helpers;

use mes_scheduling::domain::schedule::ResourceSelection;
use mes_scheduling::domain::types::{AdjustmentType, ResourceType, TriggerSource};
use mes_scheduling::engine::{AdjustmentRequest, CreateScheduleRequest, ScheduleChange, SchedulingError};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use test_helpers::{create_on_equipment, create_seeded_services, window};

// ==========================================
// 测试1: 并发创建同一设备上的重叠排程
// ==========================================

#[test]
fn test_concurrent_creates_produce_complete_conflict_set() {
    let (_temp_file, services) = create_seeded_services().unwrap();
    let services = Arc::new(services);

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let services = services.clone();
            thread::spawn(move || {
                services
                    .builder
                    .create_schedule(CreateScheduleRequest {
                        schedule_id: Some(format!("C{}", i)),
                        work_order_id: "WO-100".to_string(),
                        selection: ResourceSelection::equipment("E1").with_allocation(60.0),
                        window: window(8, 12),
                    })
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // 6 个排程两两冲突: C(6,2) = 15,且无重复行
    let conflicts = services
        .detector
        .list_unresolved(ResourceType::Equipment, "E1")
        .unwrap();
    assert_eq!(conflicts.len(), 15);
    let pairs: HashSet<_> = conflicts
        .iter()
        .map(|c| (c.schedule_id.clone(), c.conflicting_schedule_id.clone()))
        .collect();
    assert_eq!(pairs.len(), 15);
    assert!(conflicts.iter().all(|c| c.schedule_id < c.conflicting_schedule_id));

    for i in 0..6 {
        let schedule = services
            .repos
            .schedule_repo
            .find_by_id(&format!("C{}", i))
            .unwrap()
            .unwrap();
        assert!(schedule.has_conflict);
    }
}

// ==========================================
// 测试2: 基于同一 revision 的并发调整只有一个成功
// ==========================================

#[test]
fn test_concurrent_adjustments_on_same_revision() {
    let (_temp_file, services) = create_seeded_services().unwrap();
    create_on_equipment(&services, "S1", "E1", 60.0, 8, 11);
    let services = Arc::new(services);

    let handles: Vec<_> = (0..4u32)
        .map(|i| {
            let services = services.clone();
            thread::spawn(move || {
                services.builder.adjust_schedule(AdjustmentRequest {
                    schedule_id: "S1".to_string(),
                    change: ScheduleChange::window(window(12 + i, 15 + i)),
                    adjustment_type: AdjustmentType::TimeChange,
                    trigger_source: TriggerSource::Manual,
                    reason: format!("并发调整 {}", i),
                    operator: format!("planner-{}", i),
                    expected_revision: Some(0),
                })
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, SchedulingError::ConcurrentModification(_))));

    let schedule = services.repos.schedule_repo.find_by_id("S1").unwrap().unwrap();
    assert_eq!(schedule.revision, 1);
    assert_eq!(services.recorder.history("S1").unwrap().len(), 1);
}

// ==========================================
// 测试3: 反向迁移不死锁
// ==========================================

#[test]
fn test_crossing_resource_changes_do_not_deadlock() {
    let (_temp_file, services) = create_seeded_services().unwrap();
    create_on_equipment(&services, "A", "E1", 40.0, 8, 12);
    create_on_equipment(&services, "B", "E2", 40.0, 8, 12);
    let services = Arc::new(services);

    let moves = [("A", "E2"), ("B", "E1")];
    let handles: Vec<_> = moves
        .iter()
        .map(|(id, target)| {
            let services = services.clone();
            let (id, target) = (id.to_string(), target.to_string());
            thread::spawn(move || {
                for round in 0..5 {
                    let equipment = if round % 2 == 0 { target.as_str() } else { "E3" };
                    // E3 只有 WELD,奇数轮被拒绝但不影响锁释放
                    let _ = services.builder.adjust_schedule(AdjustmentRequest {
                        schedule_id: id.clone(),
                        change: ScheduleChange::selection(
                            ResourceSelection::equipment(equipment).with_allocation(40.0),
                        ),
                        adjustment_type: AdjustmentType::ResourceChange,
                        trigger_source: TriggerSource::Manual,
                        reason: "交叉迁移".to_string(),
                        operator: "planner".to_string(),
                        expected_revision: None,
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let a = services.repos.schedule_repo.find_by_id("A").unwrap().unwrap();
    let b = services.repos.schedule_repo.find_by_id("B").unwrap().unwrap();
    assert_eq!(a.equipment_id.as_deref(), Some("E2"));
    assert_eq!(b.equipment_id.as_deref(), Some("E1"));
}
