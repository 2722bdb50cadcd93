// ==========================================
// 生产排程核心 - 资源冲突数据仓储
// ==========================================
// 去重键: (schedule_id, conflicting_schedule_id, resource_type,
//          resource_id, overlap_start, overlap_end)
// 红线: 状态只允许 UNRESOLVED → RESOLVED / IGNORED
// ==========================================

use crate::domain::conflict::{ConflictCandidate, ConflictKey, ResourceConflict};
use crate::domain::schedule::TimeWindow;
use crate::domain::types::{ConflictSeverity, ConflictStatus, ResourceType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{
    build_in_clause, fmt_ts, invalid_enum, parse_opt_ts, parse_ts, PredicateSql,
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const CONFLICT_COLUMNS: &str = r#"
    conflict_id, schedule_id, conflicting_schedule_id, resource_type, resource_id,
    overlap_start, overlap_end, total_allocation_pct, severity, status,
    resolved_by, resolved_at, resolution_note, detected_at, updated_at
"#;

/// 占用比较容差 (百分点)
const ALLOCATION_EPSILON: f64 = 1e-9;

// ==========================================
// ConflictQuery - 冲突查询条件
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConflictQuery {
    pub resource: Option<(ResourceType, String)>,
    pub statuses: Vec<ConflictStatus>,
    pub schedule_id: Option<String>,      // 任一侧涉及该排程
    pub overlapping: Option<TimeWindow>,  // 重叠窗口与之严格相交
}

impl ConflictQuery {
    pub fn for_resource(resource_type: ResourceType, resource_id: &str) -> Self {
        Self {
            resource: Some((resource_type, resource_id.to_string())),
            ..Default::default()
        }
    }

    pub fn for_schedule(schedule_id: &str) -> Self {
        Self {
            schedule_id: Some(schedule_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: &[ConflictStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn unresolved(self) -> Self {
        self.with_statuses(&[ConflictStatus::Unresolved])
    }

    pub fn overlapping(mut self, window: TimeWindow) -> Self {
        self.overlapping = Some(window);
        self
    }

    fn to_predicate(&self) -> PredicateSql {
        let mut p = PredicateSql::new();
        if let Some((resource_type, resource_id)) = &self.resource {
            p.push(
                "resource_type = ? AND resource_id = ?",
                vec![
                    Box::new(resource_type.to_db_str().to_string()),
                    Box::new(resource_id.clone()),
                ],
            );
        }
        if !self.statuses.is_empty() {
            let values: Vec<String> = self
                .statuses
                .iter()
                .map(|s| s.to_db_str().to_string())
                .collect();
            let clause = build_in_clause("status", &values);
            p.push(
                clause,
                values
                    .into_iter()
                    .map(|v| Box::new(v) as Box<dyn rusqlite::ToSql>)
                    .collect(),
            );
        }
        if let Some(schedule_id) = &self.schedule_id {
            p.push(
                "(schedule_id = ? OR conflicting_schedule_id = ?)",
                vec![Box::new(schedule_id.clone()), Box::new(schedule_id.clone())],
            );
        }
        if let Some(window) = &self.overlapping {
            p.push(
                "overlap_start < ? AND ? < overlap_end",
                vec![Box::new(fmt_ts(&window.end)), Box::new(fmt_ts(&window.start))],
            );
        }
        p
    }
}

// ==========================================
// UpsertOutcome - 冲突写入结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(ResourceConflict),
    Updated(ResourceConflict),   // 占用/严重度变化
    Unchanged(ResourceConflict), // 重复检测,无变化
}

impl UpsertOutcome {
    pub fn conflict(&self) -> &ResourceConflict {
        match self {
            UpsertOutcome::Created(c) | UpsertOutcome::Updated(c) | UpsertOutcome::Unchanged(c) => c,
        }
    }
}

// ==========================================
// ResourceConflictRepository - 资源冲突仓储
// ==========================================
pub struct ResourceConflictRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ResourceConflictRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_id(&self, conflict_id: &str) -> RepositoryResult<Option<ResourceConflict>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, conflict_id)
    }

    pub fn query(&self, query: &ConflictQuery) -> RepositoryResult<Vec<ResourceConflict>> {
        let conn = self.get_conn()?;
        Self::query_tx(&conn, query)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn find_by_id_tx(
        conn: &Connection,
        conflict_id: &str,
    ) -> RepositoryResult<Option<ResourceConflict>> {
        let conflict = conn
            .query_row(
                &format!(
                    "SELECT {} FROM resource_conflict WHERE conflict_id = ?1",
                    CONFLICT_COLUMNS
                ),
                params![conflict_id],
                map_conflict_row,
            )
            .optional()?;
        Ok(conflict)
    }

    pub fn find_by_key_tx(
        conn: &Connection,
        key: &ConflictKey,
    ) -> RepositoryResult<Option<ResourceConflict>> {
        let conflict = conn
            .query_row(
                &format!(
                    r#"SELECT {} FROM resource_conflict
                       WHERE schedule_id = ?1 AND conflicting_schedule_id = ?2
                         AND resource_type = ?3 AND resource_id = ?4
                         AND overlap_start = ?5 AND overlap_end = ?6"#,
                    CONFLICT_COLUMNS
                ),
                params![
                    key.schedule_id,
                    key.conflicting_schedule_id,
                    key.resource_type.to_db_str(),
                    key.resource_id,
                    fmt_ts(&key.overlap_start),
                    fmt_ts(&key.overlap_end),
                ],
                map_conflict_row,
            )
            .optional()?;
        Ok(conflict)
    }

    /// 按条件查询,按 (overlap_start, schedule_id, conflicting_schedule_id) 排序
    pub fn query_tx(
        conn: &Connection,
        query: &ConflictQuery,
    ) -> RepositoryResult<Vec<ResourceConflict>> {
        let predicate = query.to_predicate();
        let sql = format!(
            "SELECT {} FROM resource_conflict{} ORDER BY overlap_start, schedule_id, conflicting_schedule_id",
            CONFLICT_COLUMNS,
            predicate.where_clause()
        );
        let mut stmt = conn.prepare(&sql)?;
        let conflicts = stmt
            .query_map(predicate.params().as_slice(), map_conflict_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conflicts)
    }

    /// 按去重键写入冲突
    ///
    /// 已存在时只刷新占用与严重度,不改变处理状态
    pub fn upsert_tx(
        conn: &Connection,
        candidate: &ConflictCandidate,
        now: NaiveDateTime,
    ) -> RepositoryResult<UpsertOutcome> {
        match Self::find_by_key_tx(conn, &candidate.key)? {
            None => {
                let key = &candidate.key;
                let conflict = ResourceConflict {
                    conflict_id: Uuid::new_v4().to_string(),
                    schedule_id: key.schedule_id.clone(),
                    conflicting_schedule_id: key.conflicting_schedule_id.clone(),
                    resource_type: key.resource_type,
                    resource_id: key.resource_id.clone(),
                    overlap_start: key.overlap_start,
                    overlap_end: key.overlap_end,
                    total_allocation_pct: candidate.total_allocation_pct,
                    severity: candidate.severity,
                    status: ConflictStatus::Unresolved,
                    resolved_by: None,
                    resolved_at: None,
                    resolution_note: None,
                    detected_at: now,
                    updated_at: now,
                };
                conn.execute(
                    &format!(
                        "INSERT INTO resource_conflict ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                        CONFLICT_COLUMNS
                    ),
                    params![
                        conflict.conflict_id,
                        conflict.schedule_id,
                        conflict.conflicting_schedule_id,
                        conflict.resource_type.to_db_str(),
                        conflict.resource_id,
                        fmt_ts(&conflict.overlap_start),
                        fmt_ts(&conflict.overlap_end),
                        conflict.total_allocation_pct,
                        conflict.severity.to_db_str(),
                        conflict.status.to_db_str(),
                        Option::<String>::None,
                        Option::<String>::None,
                        Option::<String>::None,
                        fmt_ts(&conflict.detected_at),
                        fmt_ts(&conflict.updated_at),
                    ],
                )?;
                Ok(UpsertOutcome::Created(conflict))
            }
            Some(mut existing) => {
                let allocation_changed = (existing.total_allocation_pct
                    - candidate.total_allocation_pct)
                    .abs()
                    > ALLOCATION_EPSILON;
                if !allocation_changed && existing.severity == candidate.severity {
                    return Ok(UpsertOutcome::Unchanged(existing));
                }

                conn.execute(
                    r#"UPDATE resource_conflict
                       SET total_allocation_pct = ?1, severity = ?2, updated_at = ?3
                       WHERE conflict_id = ?4"#,
                    params![
                        candidate.total_allocation_pct,
                        candidate.severity.to_db_str(),
                        fmt_ts(&now),
                        existing.conflict_id,
                    ],
                )?;
                existing.total_allocation_pct = candidate.total_allocation_pct;
                existing.severity = candidate.severity;
                existing.updated_at = now;
                Ok(UpsertOutcome::Updated(existing))
            }
        }
    }

    /// UNRESOLVED → RESOLVED / IGNORED
    ///
    /// # 错误
    /// - `StaleStatus`: 冲突已不是 UNRESOLVED
    /// - `NotFound`: conflict_id 不存在
    pub fn close_tx(
        conn: &Connection,
        conflict_id: &str,
        status: ConflictStatus,
        resolved_by: &str,
        note: Option<&str>,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let rows_affected = conn.execute(
            r#"UPDATE resource_conflict
               SET status = ?1, resolved_by = ?2, resolved_at = ?3, resolution_note = ?4, updated_at = ?3
               WHERE conflict_id = ?5 AND status = 'UNRESOLVED'"#,
            params![status.to_db_str(), resolved_by, fmt_ts(&at), note, conflict_id],
        )?;

        if rows_affected == 0 {
            return Err(match Self::find_by_id_tx(conn, conflict_id)? {
                Some(_) => RepositoryError::StaleStatus {
                    entity: "ResourceConflict".to_string(),
                    id: conflict_id.to_string(),
                    expected_status: ConflictStatus::Unresolved.to_db_str().to_string(),
                },
                None => RepositoryError::NotFound {
                    entity: "ResourceConflict".to_string(),
                    id: conflict_id.to_string(),
                },
            });
        }
        Ok(())
    }

    /// 排程是否仍有未解决冲突 (任一资源、任一侧)
    pub fn has_unresolved_for_schedule_tx(
        conn: &Connection,
        schedule_id: &str,
    ) -> RepositoryResult<bool> {
        let count: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM resource_conflict
               WHERE status = 'UNRESOLVED'
                 AND (schedule_id = ?1 OR conflicting_schedule_id = ?1)"#,
            params![schedule_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn map_conflict_row(row: &Row) -> rusqlite::Result<ResourceConflict> {
    let resource_type_raw: String = row.get(3)?;
    let severity_raw: String = row.get(8)?;
    let status_raw: String = row.get(9)?;

    Ok(ResourceConflict {
        conflict_id: row.get(0)?,
        schedule_id: row.get(1)?,
        conflicting_schedule_id: row.get(2)?,
        resource_type: ResourceType::from_db_str(&resource_type_raw)
            .ok_or_else(|| invalid_enum(3, &resource_type_raw))?,
        resource_id: row.get(4)?,
        overlap_start: parse_ts(5, &row.get::<_, String>(5)?)?,
        overlap_end: parse_ts(6, &row.get::<_, String>(6)?)?,
        total_allocation_pct: row.get(7)?,
        severity: ConflictSeverity::from_db_str(&severity_raw)
            .ok_or_else(|| invalid_enum(8, &severity_raw))?,
        status: ConflictStatus::from_db_str(&status_raw)
            .ok_or_else(|| invalid_enum(9, &status_raw))?,
        resolved_by: row.get(10)?,
        resolved_at: parse_opt_ts(11, row.get(11)?)?,
        resolution_note: row.get(12)?,
        detected_at: parse_ts(13, &row.get::<_, String>(13)?)?,
        updated_at: parse_ts(14, &row.get::<_, String>(14)?)?,
    })
}
