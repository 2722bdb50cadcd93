// ==========================================
// 冲突检测 - 整批重试
// ==========================================
// 去重键保证重放无副作用,存储故障时整批重跑
// ==========================================

use crate::engine::error::{SchedulingError, SchedulingResult};

/// 是否值得整批重试
fn is_retryable(err: &SchedulingError) -> bool {
    match err {
        SchedulingError::Repository(e) => e.is_storage_failure(),
        SchedulingError::ConcurrentModification(_) => true,
        _ => false,
    }
}

/// 最多执行 max_attempts 次; 全部失败时返回 ConflictPersistence
pub fn retry_batch<T, F>(max_attempts: u32, mut pass: F) -> SchedulingResult<T>
where
    F: FnMut(u32) -> SchedulingResult<T>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match pass(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) => {
                if attempt >= max_attempts {
                    tracing::error!(attempts = attempt, error = %err, "冲突检测批次重试耗尽");
                    return Err(SchedulingError::ConflictPersistence {
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
                tracing::warn!(attempt, error = %err, "冲突检测批次失败，整批重试");
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryError;

    fn storage_failure() -> SchedulingError {
        SchedulingError::Repository(RepositoryError::DatabaseQueryError("disk I/O error".to_string()))
    }

    #[test]
    fn test_succeeds_after_transient_failure() {
        let mut calls = 0;
        let result = retry_batch(3, |attempt| {
            calls += 1;
            if attempt < 2 {
                Err(storage_failure())
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_exhausted_attempts_become_persistence_error() {
        let mut calls = 0;
        let result: SchedulingResult<()> = retry_batch(3, |_| {
            calls += 1;
            Err(storage_failure())
        });
        assert_eq!(calls, 3);
        assert!(matches!(
            result,
            Err(SchedulingError::ConflictPersistence { attempts: 3, .. })
        ));
    }

    #[test]
    fn test_validation_error_not_retried() {
        let mut calls = 0;
        let result: SchedulingResult<()> = retry_batch(3, |_| {
            calls += 1;
            Err(SchedulingError::validation("window", "倒置"))
        });
        assert_eq!(calls, 1);
        assert!(result.unwrap_err().is_validation());
    }
}
