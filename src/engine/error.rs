// ==========================================
// 生产排程核心 - 引擎层错误类型
// ==========================================
// 分类:
// - Validation: 输入不合法 (缺资源、时间窗倒置),带字段
// - Computation: 指标分母为零,带字段
// - ConflictPersistence: 冲突批量写入失败 (已整批重试)
// - DirectoryUnavailable: 外部目录不可用,不吞掉
// 审批待定不是错误,见 AdjustmentOutcome::PendingApproval
// ==========================================

use crate::engine::directory::DirectoryError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("参数校验失败 (field={field}): {message}")]
    Validation { field: String, message: String },

    #[error("指标无法计算 (field={field}): {message}")]
    Computation { field: String, message: String },

    #[error("冲突写入失败 (已重试 {attempts} 次): {message}")]
    ConflictPersistence { attempts: u32, message: String },

    #[error("外部目录不可用 ({directory}): {message}")]
    DirectoryUnavailable { directory: String, message: String },

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    #[error("非法状态迁移: {entity} id={id}, {from} -> {to}")]
    InvalidStateTransition {
        entity: String,
        id: String,
        from: String,
        to: String,
    },

    #[error("并发修改冲突: {0}")]
    ConcurrentModification(String),

    #[error("数据访问失败: {0}")]
    Repository(RepositoryError),
}

impl SchedulingError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        SchedulingError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn computation(field: &str, message: impl Into<String>) -> Self {
        SchedulingError::Computation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        SchedulingError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// 出错字段 (校验/计算类错误)
    pub fn field(&self) -> Option<&str> {
        match self {
            SchedulingError::Validation { field, .. } | SchedulingError::Computation { field, .. } => {
                Some(field)
            }
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SchedulingError::Validation { .. })
    }

    pub fn is_computation(&self) -> bool {
        matches!(self, SchedulingError::Computation { .. })
    }
}

impl From<RepositoryError> for SchedulingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure { .. } | RepositoryError::StaleStatus { .. } => {
                SchedulingError::ConcurrentModification(err.to_string())
            }
            RepositoryError::NotFound { entity, id } => SchedulingError::NotFound { entity, id },
            RepositoryError::ImmutableRecord { entity, key } => SchedulingError::Validation {
                field: "record_key".to_string(),
                message: format!("{} {} 已确认,不可修改", entity, key),
            },
            other => SchedulingError::Repository(other),
        }
    }
}

impl From<DirectoryError> for SchedulingError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unavailable { directory, message } => {
                SchedulingError::DirectoryUnavailable { directory, message }
            }
        }
    }
}

pub type SchedulingResult<T> = Result<T, SchedulingError>;
