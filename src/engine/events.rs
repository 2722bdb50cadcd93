// ==========================================
// 生产排程核心 - 引擎层事件发布
// ==========================================
// 职责: 定义排程事件发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，外部系统实现适配器
// 规则: 发布失败只记录日志,不影响业务结果
// ==========================================

use crate::domain::types::ResourceType;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 排程事件类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingEventType {
    /// 新排程创建
    ScheduleCreated,
    /// 排程状态变更
    ScheduleStatusChanged,
    /// 冲突集合变化 (新增/更新/自动解除)
    ConflictsDetected,
    /// 冲突人工解决或忽略
    ConflictResolved,
    /// 调整已生效
    AdjustmentApplied,
    /// 调整已生效,等待审批
    AdjustmentPendingApproval,
    /// 调整被驳回并已回滚
    AdjustmentRejected,
}

impl SchedulingEventType {
    pub fn as_str(&self) -> &str {
        match self {
            SchedulingEventType::ScheduleCreated => "ScheduleCreated",
            SchedulingEventType::ScheduleStatusChanged => "ScheduleStatusChanged",
            SchedulingEventType::ConflictsDetected => "ConflictsDetected",
            SchedulingEventType::ConflictResolved => "ConflictResolved",
            SchedulingEventType::AdjustmentApplied => "AdjustmentApplied",
            SchedulingEventType::AdjustmentPendingApproval => "AdjustmentPendingApproval",
            SchedulingEventType::AdjustmentRejected => "AdjustmentRejected",
        }
    }
}

/// 排程事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingEvent {
    pub event_type: SchedulingEventType,
    /// 相关排程
    pub schedule_id: Option<String>,
    /// 相关资源
    pub resource: Option<(ResourceType, String)>,
    /// 冲突ID / 日志ID 等
    pub reference_id: Option<String>,
    pub detail: Option<String>,
    pub occurred_at: NaiveDateTime,
}

impl SchedulingEvent {
    pub fn new(event_type: SchedulingEventType) -> Self {
        Self {
            event_type,
            schedule_id: None,
            resource: None,
            reference_id: None,
            detail: None,
            occurred_at: Utc::now().naive_utc(),
        }
    }

    pub fn for_schedule(mut self, schedule_id: &str) -> Self {
        self.schedule_id = Some(schedule_id.to_string());
        self
    }

    pub fn for_resource(mut self, resource_type: ResourceType, resource_id: &str) -> Self {
        self.resource = Some((resource_type, resource_id.to_string()));
        self
    }

    pub fn with_reference(mut self, reference_id: &str) -> Self {
        self.reference_id = Some(reference_id.to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 排程事件发布者
///
/// # 返回
/// - `Ok(id)`: 下游任务 ID（如果支持）或空字符串
/// - `Err`: 发布失败
pub trait SchedulingEventPublisher: Send + Sync {
    fn publish(&self, event: SchedulingEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl SchedulingEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: SchedulingEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(event_type = event.event_type.as_str(), "NoOpEventPublisher: 跳过事件发布");
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
#[derive(Clone, Default)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn SchedulingEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn SchedulingEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    /// 发布事件; 失败只记录 warn
    pub fn publish(&self, event: SchedulingEvent) {
        let Some(publisher) = &self.inner else {
            tracing::debug!(
                event_type = event.event_type.as_str(),
                "OptionalEventPublisher: 未配置发布者，跳过事件"
            );
            return;
        };
        let event_type = event.event_type;
        if let Err(e) = publisher.publish(event) {
            tracing::warn!(event_type = event_type.as_str(), error = %e, "排程事件发布失败");
        }
    }
}
