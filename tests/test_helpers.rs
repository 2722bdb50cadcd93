// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、服务装配、目录种子数据
// ==========================================
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use mes_scheduling::app::SchedulingServices;
use mes_scheduling::domain::resource::{ResourceProfile, WorkOrder};
use mes_scheduling::domain::schedule::{ResourceSelection, TimeWindow};
use mes_scheduling::domain::types::ResourceType;
use mes_scheduling::engine::{CreateScheduleRequest, ScheduleCreation};
use std::error::Error;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并装配服务 (表结构由 open 初始化)
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - SchedulingServices
pub fn create_test_services() -> Result<(NamedTempFile, SchedulingServices), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().ok_or("非 UTF-8 路径")?.to_string();
    let services = SchedulingServices::open(&db_path)?;
    Ok((temp_file, services))
}

/// 创建并写入标准目录数据
///
/// 工单:
/// - WO-100: CNC, 10 件 × 6 分钟, 交期 2026-03-05
/// - WO-200: CNC, 紧急, 交期 2026-03-03
/// - WO-300: WELD, 20 件 × 6 分钟, 交期 2026-03-06
///
/// 资源: E1/E2 (CNC), E3 (WELD), E9 (CNC, 不可用), W1 (CNC 人员), WS1 (车间)
pub fn create_seeded_services() -> Result<(NamedTempFile, SchedulingServices), Box<dyn Error>> {
    let (temp_file, services) = create_test_services()?;
    seed_directory(&services)?;
    Ok((temp_file, services))
}

pub fn seed_directory(services: &SchedulingServices) -> Result<(), Box<dyn Error>> {
    let directory = &services.repos.directory_repo;
    for order in [
        work_order("WO-100", &["CNC"], 10, 5, false),
        work_order("WO-200", &["CNC"], 10, 3, true),
        work_order("WO-300", &["WELD"], 20, 6, false),
    ] {
        directory.upsert_work_order(&order)?;
    }

    for (resource_type, id, skills, available) in [
        (ResourceType::Equipment, "E1", vec!["CNC"], true),
        (ResourceType::Equipment, "E2", vec!["CNC"], true),
        (ResourceType::Equipment, "E3", vec!["WELD"], true),
        (ResourceType::Equipment, "E9", vec!["CNC"], false),
        (ResourceType::Worker, "W1", vec!["CNC"], true),
        (ResourceType::Workshop, "WS1", vec!["CNC", "WELD"], true),
    ] {
        directory.upsert_resource(&ResourceProfile {
            resource_type,
            resource_id: id.to_string(),
            resource_name: format!("{}-资源", id),
            capabilities: skills.into_iter().map(str::to_string).collect(),
            is_available: available,
        })?;
    }
    Ok(())
}

pub fn work_order(id: &str, skills: &[&str], quantity: i64, due_day: u32, is_urgent: bool) -> WorkOrder {
    WorkOrder {
        work_order_id: id.to_string(),
        required_skills: skills.iter().map(|s| s.to_string()).collect(),
        quantity,
        unit_work_minutes: 6.0,
        due_date: NaiveDate::from_ymd_opt(2026, 3, due_day).unwrap(),
        is_urgent,
    }
}

/// 2026-03-02 当天的整点
pub fn at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

pub fn window(start: u32, end: u32) -> TimeWindow {
    TimeWindow::new(at(start), at(end))
}

/// 在设备上创建 WO-100 的排程
pub fn create_on_equipment(
    services: &SchedulingServices,
    schedule_id: &str,
    equipment_id: &str,
    allocation_pct: f64,
    start: u32,
    end: u32,
) -> ScheduleCreation {
    services
        .builder
        .create_schedule(CreateScheduleRequest {
            schedule_id: Some(schedule_id.to_string()),
            work_order_id: "WO-100".to_string(),
            selection: ResourceSelection::equipment(equipment_id).with_allocation(allocation_pct),
            window: window(start, end),
        })
        .unwrap()
}
