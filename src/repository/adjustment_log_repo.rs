// ==========================================
// 生产排程核心 - 排程调整日志仓储
// ==========================================
// 红线: 只追加,不提供删除
// 红线: 快照写入与读取都按调整类型校验结构
// ==========================================

use crate::domain::adjustment::{AdjustmentSnapshot, ScheduleAdjustmentLog};
use crate::domain::types::{AdjustmentType, ApprovalStatus, TriggerSource};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{fmt_opt_ts, fmt_ts, invalid_enum, parse_opt_ts, parse_ts};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const LOG_COLUMNS: &str = r#"
    log_id, schedule_id, adjustment_type, trigger_source, before_data, after_data,
    reason, operator, affected_schedule_count, requires_approval, approval_status,
    approved_by, approved_at, approval_comment, revision_after, compensates_log_id, created_at
"#;

/// 未经快照校验的原始行
struct RawLogRow {
    log: ScheduleAdjustmentLogHeader,
    before_raw: String,
    after_raw: String,
}

struct ScheduleAdjustmentLogHeader {
    log_id: String,
    schedule_id: String,
    adjustment_type: AdjustmentType,
    trigger_source: TriggerSource,
    reason: String,
    operator: String,
    affected_schedule_count: i32,
    requires_approval: bool,
    approval_status: ApprovalStatus,
    approved_by: Option<String>,
    approved_at: Option<NaiveDateTime>,
    approval_comment: Option<String>,
    revision_after: i32,
    compensates_log_id: Option<String>,
    created_at: NaiveDateTime,
}

impl RawLogRow {
    fn into_log(self) -> RepositoryResult<ScheduleAdjustmentLog> {
        let h = self.log;
        let violation = |message: String| RepositoryError::SnapshotSchemaViolation {
            log_id: h.log_id.clone(),
            message,
        };
        let before_data = AdjustmentSnapshot::from_json(&self.before_raw, h.adjustment_type)
            .map_err(|e| violation(format!("before_data: {}", e)))?;
        let after_data = AdjustmentSnapshot::from_json(&self.after_raw, h.adjustment_type)
            .map_err(|e| violation(format!("after_data: {}", e)))?;

        Ok(ScheduleAdjustmentLog {
            log_id: h.log_id,
            schedule_id: h.schedule_id,
            adjustment_type: h.adjustment_type,
            trigger_source: h.trigger_source,
            before_data,
            after_data,
            reason: h.reason,
            operator: h.operator,
            affected_schedule_count: h.affected_schedule_count,
            requires_approval: h.requires_approval,
            approval_status: h.approval_status,
            approved_by: h.approved_by,
            approved_at: h.approved_at,
            approval_comment: h.approval_comment,
            revision_after: h.revision_after,
            compensates_log_id: h.compensates_log_id,
            created_at: h.created_at,
        })
    }
}

// ==========================================
// AdjustmentLogRepository - 调整日志仓储
// ==========================================
pub struct AdjustmentLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AdjustmentLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_id(&self, log_id: &str) -> RepositoryResult<Option<ScheduleAdjustmentLog>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, log_id)
    }

    /// 排程的全部调整日志 (按时间正序)
    pub fn find_by_schedule(&self, schedule_id: &str) -> RepositoryResult<Vec<ScheduleAdjustmentLog>> {
        let conn = self.get_conn()?;
        Self::select_where(
            &conn,
            "schedule_id = ?1 ORDER BY created_at, rowid",
            params![schedule_id],
        )
    }

    /// 待审批日志 (按时间正序)
    pub fn find_pending(&self) -> RepositoryResult<Vec<ScheduleAdjustmentLog>> {
        let conn = self.get_conn()?;
        Self::select_where(
            &conn,
            "approval_status = 'PENDING' ORDER BY created_at, rowid",
            params![],
        )
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 追加调整日志
    ///
    /// # 错误
    /// - `SnapshotSchemaViolation`: 快照标签与调整类型不一致或结构非法
    pub fn insert_tx(conn: &Connection, log: &ScheduleAdjustmentLog) -> RepositoryResult<String> {
        let violation = |message: String| RepositoryError::SnapshotSchemaViolation {
            log_id: log.log_id.clone(),
            message,
        };
        let before_json = log
            .before_data
            .to_json(log.adjustment_type)
            .map_err(|e| violation(format!("before_data: {}", e)))?;
        let after_json = log
            .after_data
            .to_json(log.adjustment_type)
            .map_err(|e| violation(format!("after_data: {}", e)))?;

        conn.execute(
            &format!(
                "INSERT INTO schedule_adjustment_log ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                LOG_COLUMNS
            ),
            params![
                log.log_id,
                log.schedule_id,
                log.adjustment_type.to_db_str(),
                log.trigger_source.to_db_str(),
                before_json,
                after_json,
                log.reason,
                log.operator,
                log.affected_schedule_count,
                log.requires_approval,
                log.approval_status.to_db_str(),
                log.approved_by,
                fmt_opt_ts(&log.approved_at),
                log.approval_comment,
                log.revision_after,
                log.compensates_log_id,
                fmt_ts(&log.created_at),
            ],
        )?;
        Ok(log.log_id.clone())
    }

    pub fn find_by_id_tx(
        conn: &Connection,
        log_id: &str,
    ) -> RepositoryResult<Option<ScheduleAdjustmentLog>> {
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM schedule_adjustment_log WHERE log_id = ?1",
                    LOG_COLUMNS
                ),
                params![log_id],
                map_raw_row,
            )
            .optional()?;
        raw.map(RawLogRow::into_log).transpose()
    }

    /// 已有补偿日志的原日志ID
    pub fn find_compensation_for_tx(
        conn: &Connection,
        original_log_id: &str,
    ) -> RepositoryResult<Option<String>> {
        let id = conn
            .query_row(
                "SELECT log_id FROM schedule_adjustment_log WHERE compensates_log_id = ?1 LIMIT 1",
                params![original_log_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// PENDING → APPROVED / REJECTED
    ///
    /// # 错误
    /// - `StaleStatus`: 日志已不是 PENDING
    /// - `NotFound`: log_id 不存在
    pub fn set_approval_tx(
        conn: &Connection,
        log_id: &str,
        status: ApprovalStatus,
        approver: &str,
        comment: Option<&str>,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let rows_affected = conn.execute(
            r#"UPDATE schedule_adjustment_log
               SET approval_status = ?1, approved_by = ?2, approved_at = ?3, approval_comment = ?4
               WHERE log_id = ?5 AND approval_status = 'PENDING'"#,
            params![status.to_db_str(), approver, fmt_ts(&at), comment, log_id],
        )?;

        if rows_affected == 0 {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM schedule_adjustment_log WHERE log_id = ?1",
                    params![log_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match exists {
                Some(_) => RepositoryError::StaleStatus {
                    entity: "ScheduleAdjustmentLog".to_string(),
                    id: log_id.to_string(),
                    expected_status: ApprovalStatus::Pending.to_db_str().to_string(),
                },
                None => RepositoryError::NotFound {
                    entity: "ScheduleAdjustmentLog".to_string(),
                    id: log_id.to_string(),
                },
            });
        }
        Ok(())
    }

    fn select_where(
        conn: &Connection,
        where_and_order: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> RepositoryResult<Vec<ScheduleAdjustmentLog>> {
        let sql = format!(
            "SELECT {} FROM schedule_adjustment_log WHERE {}",
            LOG_COLUMNS, where_and_order
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, map_raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawLogRow::into_log).collect()
    }
}

fn map_raw_row(row: &Row) -> rusqlite::Result<RawLogRow> {
    let type_raw: String = row.get(2)?;
    let trigger_raw: String = row.get(3)?;
    let approval_raw: String = row.get(10)?;

    Ok(RawLogRow {
        log: ScheduleAdjustmentLogHeader {
            log_id: row.get(0)?,
            schedule_id: row.get(1)?,
            adjustment_type: AdjustmentType::from_db_str(&type_raw)
                .ok_or_else(|| invalid_enum(2, &type_raw))?,
            trigger_source: TriggerSource::from_db_str(&trigger_raw)
                .ok_or_else(|| invalid_enum(3, &trigger_raw))?,
            reason: row.get(6)?,
            operator: row.get(7)?,
            affected_schedule_count: row.get(8)?,
            requires_approval: row.get(9)?,
            approval_status: ApprovalStatus::from_db_str(&approval_raw)
                .ok_or_else(|| invalid_enum(10, &approval_raw))?,
            approved_by: row.get(11)?,
            approved_at: parse_opt_ts(12, row.get(12)?)?,
            approval_comment: row.get(13)?,
            revision_after: row.get(14)?,
            compensates_log_id: row.get(15)?,
            created_at: parse_ts(16, &row.get::<_, String>(16)?)?,
        },
        before_raw: row.get(4)?,
        after_raw: row.get(5)?,
    })
}
