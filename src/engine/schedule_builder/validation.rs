// ==========================================
// 排程构建引擎 - 输入校验
// ==========================================
// 校验顺序: 时间窗 → 资源选择 → 工单 → 资源档案 → 技能 → 工作量
// ==========================================

use crate::domain::resource::{ResourceProfile, WorkOrder};
use crate::domain::schedule::{ResourceSelection, TimeWindow};
use crate::engine::directory::{ResourceDirectory, WorkOrderDirectory};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::repository::ResourceKey;

/// 浮点比较容差 (分钟)
const MINUTES_EPSILON: f64 = 1e-6;

pub(super) fn ensure_window(window: TimeWindow) -> SchedulingResult<()> {
    if !window.is_valid() {
        return Err(SchedulingError::validation(
            "window",
            format!(
                "排程结束时间必须晚于开始时间: {} ~ {}",
                window.start, window.end
            ),
        ));
    }
    Ok(())
}

/// 校验资源选择,返回选中的资源键
pub(super) fn ensure_selection(selection: &ResourceSelection) -> SchedulingResult<Vec<ResourceKey>> {
    let keys = selection.resource_keys();
    if keys.is_empty() {
        return Err(SchedulingError::validation(
            "resource",
            "至少需要指定设备、人员或车间之一",
        ));
    }
    if let Some((resource_type, _)) = keys.iter().find(|(_, id)| id.trim().is_empty()) {
        return Err(SchedulingError::validation(
            resource_type.schedule_column(),
            "资源ID不能为空",
        ));
    }

    let pct = selection.allocation_pct;
    if !pct.is_finite() || pct <= 0.0 || pct > 100.0 {
        return Err(SchedulingError::validation(
            "allocation_pct",
            format!("占用比例必须在 (0, 100] 内: {}", pct),
        ));
    }
    Ok(keys)
}

pub(super) fn load_work_order(
    directory: &dyn WorkOrderDirectory,
    work_order_id: &str,
) -> SchedulingResult<WorkOrder> {
    if work_order_id.trim().is_empty() {
        return Err(SchedulingError::validation("work_order_id", "工单ID不能为空"));
    }
    directory.find_work_order(work_order_id)?.ok_or_else(|| {
        SchedulingError::validation("work_order_id", format!("工单不存在: {}", work_order_id))
    })
}

/// 加载全部选中资源,缺失或不可用时报错
pub(super) fn load_resources(
    directory: &dyn ResourceDirectory,
    keys: &[ResourceKey],
) -> SchedulingResult<Vec<ResourceProfile>> {
    let mut profiles = Vec::with_capacity(keys.len());
    for (resource_type, resource_id) in keys {
        let profile = directory
            .find_resource(*resource_type, resource_id)?
            .ok_or_else(|| {
                SchedulingError::validation(
                    resource_type.schedule_column(),
                    format!("资源不存在: {} {}", resource_type, resource_id),
                )
            })?;
        if !profile.is_available {
            return Err(SchedulingError::validation(
                resource_type.schedule_column(),
                format!("资源当前不可用: {} {}", resource_type, resource_id),
            ));
        }
        profiles.push(profile);
    }
    Ok(profiles)
}

/// 每项技能至少由一个选中资源覆盖
pub(super) fn ensure_skills(order: &WorkOrder, profiles: &[ResourceProfile]) -> SchedulingResult<()> {
    let missing: Vec<&str> = order
        .required_skills
        .iter()
        .filter(|skill| !profiles.iter().any(|p| p.has_capability(skill)))
        .map(|s| s.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(SchedulingError::validation(
            "required_skills",
            format!(
                "工单 {} 所需技能未被选中资源覆盖: {}",
                order.work_order_id,
                missing.join(",")
            ),
        ));
    }
    Ok(())
}

/// 按占用比例折算的所需工时 (分钟)
pub fn required_work_minutes(order: &WorkOrder, allocation_pct: f64) -> f64 {
    order.work_content_minutes() * 100.0 / allocation_pct
}

pub(super) fn ensure_window_covers_work(
    order: &WorkOrder,
    allocation_pct: f64,
    window: TimeWindow,
) -> SchedulingResult<()> {
    let required = required_work_minutes(order, allocation_pct);
    let available = window.duration_minutes();
    if available + MINUTES_EPSILON < required {
        return Err(SchedulingError::validation(
            "window",
            format!(
                "时间窗过短: 可用 {:.1} 分钟, 需要 {:.1} 分钟 (占用 {}%)",
                available, required, allocation_pct
            ),
        ));
    }
    Ok(())
}

pub(super) fn ensure_text(field: &str, value: &str) -> SchedulingResult<()> {
    if value.trim().is_empty() {
        return Err(SchedulingError::validation(field, format!("{} 不能为空", field)));
    }
    Ok(())
}
