// ==========================================
// 生产排程核心 - 外部目录接口
// ==========================================
// 工单目录: 生产订单子系统
// 资源目录: 资源管理子系统 (能力、当前可用性)
// 说明: Engine 层定义 trait,仓储或外部适配器实现
// ==========================================

use crate::domain::resource::{ResourceProfile, WorkOrder};
use crate::domain::types::ResourceType;
use crate::repository::DirectoryRepository;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectoryError {
    #[error("目录不可用 ({directory}): {message}")]
    Unavailable { directory: String, message: String },
}

pub trait WorkOrderDirectory: Send + Sync {
    /// 按ID查询工单,不存在返回 Ok(None)
    fn find_work_order(&self, work_order_id: &str) -> Result<Option<WorkOrder>, DirectoryError>;
}

pub trait ResourceDirectory: Send + Sync {
    /// 按 (类型, ID) 查询资源档案,不存在返回 Ok(None)
    fn find_resource(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<Option<ResourceProfile>, DirectoryError>;
}

// ==========================================
// SQLite 目录实现
// ==========================================

impl WorkOrderDirectory for DirectoryRepository {
    fn find_work_order(&self, work_order_id: &str) -> Result<Option<WorkOrder>, DirectoryError> {
        DirectoryRepository::find_work_order(self, work_order_id).map_err(|e| {
            DirectoryError::Unavailable {
                directory: "work_order".to_string(),
                message: e.to_string(),
            }
        })
    }
}

impl ResourceDirectory for DirectoryRepository {
    fn find_resource(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<Option<ResourceProfile>, DirectoryError> {
        DirectoryRepository::find_resource(self, resource_type, resource_id).map_err(|e| {
            DirectoryError::Unavailable {
                directory: "resource_profile".to_string(),
                message: e.to_string(),
            }
        })
    }
}
