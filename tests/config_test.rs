// ==========================================
// ConfigManager 集成测试
// ==========================================
// 测试目标: 配置覆写影响引擎行为,无效值回退默认
// ==========================================

mod test_helpers;

use mes_scheduling::config::{config_keys, ConfigManager, SchedulingConfig};
use mes_scheduling::domain::types::{ConflictSeverity, ResourceType};
use mes_scheduling::SchedulingServices;
use test_helpers::{create_on_equipment, create_test_services, seed_directory};

fn reopen_with(overrides: &[(&str, &str)]) -> (tempfile::NamedTempFile, SchedulingServices) {
    let (temp_file, services) = create_test_services().expect("Failed to create test db");
    let db_path = temp_file.path().to_str().unwrap().to_string();
    drop(services);

    let manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");
    for (key, value) in overrides {
        manager.set_global_value(key, value).unwrap();
    }

    let services = SchedulingServices::open(&db_path).unwrap();
    seed_directory(&services).unwrap();
    (temp_file, services)
}

#[test]
fn test_defaults_without_overrides() {
    let (_temp_file, services) = create_test_services().unwrap();
    assert_eq!(services.config, SchedulingConfig::default());
}

#[test]
fn test_severity_thresholds_override() {
    let (_temp_file, services) = reopen_with(&[
        (config_keys::CONFLICT_SEVERITY_LOW_MAX, "140"),
        (config_keys::CONFLICT_SEVERITY_MEDIUM_MAX, "160"),
    ]);
    assert_eq!(services.config.severity_low_max, 140.0);

    // 130% 在默认阈值下为 MEDIUM,覆写后为 LOW
    create_on_equipment(&services, "S1", "E1", 60.0, 8, 11);
    create_on_equipment(&services, "S2", "E1", 70.0, 9, 12);
    let conflicts = services
        .detector
        .list_unresolved(ResourceType::Equipment, "E1")
        .unwrap();
    assert_eq!(conflicts[0].severity, ConflictSeverity::Low);
}

#[test]
fn test_priority_override_changes_scoring() {
    let (_temp_file, services) = reopen_with(&[(config_keys::PRIORITY_DECAY_PER_DAY, "5")]);
    let created = create_on_equipment(&services, "S1", "E1", 100.0, 8, 10);
    // 距交期 3 天: 100 - 3 × 5
    assert_eq!(created.schedule.priority_score, 85.0);
}

#[test]
fn test_invalid_overrides_fall_back() {
    let (_temp_file, services) = reopen_with(&[
        (config_keys::CONFLICT_MAX_DETECTION_ATTEMPTS, "many"),
        // 倒挂阈值整体回退
        (config_keys::CONFLICT_SEVERITY_LOW_MAX, "170"),
        (config_keys::CONFLICT_SEVERITY_MEDIUM_MAX, "150"),
    ]);
    let defaults = SchedulingConfig::default();
    assert_eq!(services.config.max_detection_attempts, defaults.max_detection_attempts);
    assert_eq!(services.config.severity_low_max, defaults.severity_low_max);
    assert_eq!(services.config.severity_medium_max, defaults.severity_medium_max);
}

#[test]
fn test_config_snapshot_is_sorted_json() {
    let (temp_file, _services) = reopen_with(&[
        (config_keys::PRIORITY_URGENT_BONUS, "40"),
        (config_keys::APPROVAL_AFFECTED_SCHEDULE_THRESHOLD, "4"),
    ]);
    let manager = ConfigManager::new(temp_file.path().to_str().unwrap()).unwrap();
    let snapshot: serde_json::Value =
        serde_json::from_str(&manager.get_config_snapshot().unwrap()).unwrap();
    assert_eq!(snapshot["approval.affected_schedule_threshold"], "4");
    assert_eq!(snapshot["priority.urgent_bonus"], "40");
}
