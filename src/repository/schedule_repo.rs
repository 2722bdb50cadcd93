// ==========================================
// 生产排程核心 - 生产排程数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 并发: revision 乐观锁,业务更新必须带期望 revision
// ==========================================

use crate::domain::schedule::{ProductionSchedule, TimeWindow};
use crate::domain::types::{ResourceType, ScheduleStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{
    build_in_clause, fmt_opt_ts, fmt_ts, invalid_enum, parse_opt_ts, parse_ts, PredicateSql,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SCHEDULE_COLUMNS: &str = r#"
    schedule_id, work_order_id, equipment_id, worker_id, workshop_id, process_id,
    scheduled_start, scheduled_end, actual_start, actual_end,
    allocation_pct, priority_score, status, has_conflict, is_manually_adjusted,
    algorithm_version, created_at, updated_at, revision
"#;

// ==========================================
// ScheduleQuery - 排程查询条件
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ScheduleQuery {
    pub resource: Option<(ResourceType, String)>,
    pub overlapping: Option<TimeWindow>, // 严格相交
    pub statuses: Vec<ScheduleStatus>,   // 为空表示不限
    pub work_order_id: Option<String>,
    pub schedule_ids: Option<Vec<String>>,
}

impl ScheduleQuery {
    pub fn for_resource(resource_type: ResourceType, resource_id: &str) -> Self {
        Self {
            resource: Some((resource_type, resource_id.to_string())),
            ..Default::default()
        }
    }

    pub fn overlapping(mut self, window: TimeWindow) -> Self {
        self.overlapping = Some(window);
        self
    }

    pub fn with_statuses(mut self, statuses: &[ScheduleStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// 仅参与冲突检测的状态
    pub fn active(self) -> Self {
        self.with_statuses(&ScheduleStatus::ACTIVE)
    }

    pub fn for_work_order(mut self, work_order_id: &str) -> Self {
        self.work_order_id = Some(work_order_id.to_string());
        self
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.schedule_ids = Some(ids);
        self
    }

    fn to_predicate(&self) -> PredicateSql {
        let mut p = PredicateSql::new();
        if let Some((resource_type, resource_id)) = &self.resource {
            p.push(
                format!("{} = ?", resource_type.schedule_column()),
                vec![Box::new(resource_id.clone())],
            );
        }
        if let Some(window) = &self.overlapping {
            // startA < endB AND startB < endA
            p.push(
                "scheduled_start < ? AND ? < scheduled_end",
                vec![Box::new(fmt_ts(&window.end)), Box::new(fmt_ts(&window.start))],
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
        if let Some(work_order_id) = &self.work_order_id {
            p.push("work_order_id = ?", vec![Box::new(work_order_id.clone())]);
        }
        if let Some(ids) = &self.schedule_ids {
            let clause = build_in_clause("schedule_id", ids);
            p.push(
                clause,
                ids.iter()
                    .map(|v| Box::new(v.clone()) as Box<dyn rusqlite::ToSql>)
                    .collect(),
            );
        }
        p
    }
}

// ==========================================
// ProductionScheduleRepository - 排程仓储
// ==========================================
pub struct ProductionScheduleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionScheduleRepository {
    /// 从已有连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, schedule: &ProductionSchedule) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, schedule)
    }

    pub fn find_by_id(&self, schedule_id: &str) -> RepositoryResult<Option<ProductionSchedule>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, schedule_id)
    }

    pub fn query(&self, query: &ScheduleQuery) -> RepositoryResult<Vec<ProductionSchedule>> {
        let conn = self.get_conn()?;
        Self::query_tx(&conn, query)
    }

    /// 更新排程 (带乐观锁检查),返回新的 revision
    pub fn update(&self, schedule: &ProductionSchedule) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;
        Self::update_tx(&conn, schedule)
    }

    // ==========================================
    // 事务内操作 (调用方负责开启/提交事务)
    // ==========================================

    pub fn insert_tx(conn: &Connection, schedule: &ProductionSchedule) -> RepositoryResult<String> {
        conn.execute(
            &format!(
                "INSERT INTO production_schedule ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                SCHEDULE_COLUMNS
            ),
            params![
                schedule.schedule_id,
                schedule.work_order_id,
                schedule.equipment_id,
                schedule.worker_id,
                schedule.workshop_id,
                schedule.process_id,
                fmt_ts(&schedule.scheduled_start),
                fmt_ts(&schedule.scheduled_end),
                fmt_opt_ts(&schedule.actual_start),
                fmt_opt_ts(&schedule.actual_end),
                schedule.allocation_pct,
                schedule.priority_score,
                schedule.status.to_db_str(),
                schedule.has_conflict,
                schedule.is_manually_adjusted,
                schedule.algorithm_version,
                fmt_ts(&schedule.created_at),
                fmt_ts(&schedule.updated_at),
                schedule.revision,
            ],
        )?;
        Ok(schedule.schedule_id.clone())
    }

    pub fn find_by_id_tx(
        conn: &Connection,
        schedule_id: &str,
    ) -> RepositoryResult<Option<ProductionSchedule>> {
        let schedule = conn
            .query_row(
                &format!(
                    "SELECT {} FROM production_schedule WHERE schedule_id = ?1",
                    SCHEDULE_COLUMNS
                ),
                params![schedule_id],
                map_schedule_row,
            )
            .optional()?;
        Ok(schedule)
    }

    /// 按条件查询,按 (scheduled_start, schedule_id) 排序
    pub fn query_tx(
        conn: &Connection,
        query: &ScheduleQuery,
    ) -> RepositoryResult<Vec<ProductionSchedule>> {
        let predicate = query.to_predicate();
        let sql = format!(
            "SELECT {} FROM production_schedule{} ORDER BY scheduled_start, schedule_id",
            SCHEDULE_COLUMNS,
            predicate.where_clause()
        );
        let mut stmt = conn.prepare(&sql)?;
        let schedules = stmt
            .query_map(predicate.params().as_slice(), map_schedule_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    /// 更新排程全部业务字段,revision + 1
    ///
    /// # 错误
    /// - `OptimisticLockFailure`: revision 不匹配 (已被其他请求更新)
    /// - `NotFound`: schedule_id 不存在
    pub fn update_tx(conn: &Connection, schedule: &ProductionSchedule) -> RepositoryResult<i32> {
        let rows_affected = conn.execute(
            r#"UPDATE production_schedule
               SET work_order_id = ?1, equipment_id = ?2, worker_id = ?3, workshop_id = ?4,
                   process_id = ?5, scheduled_start = ?6, scheduled_end = ?7,
                   actual_start = ?8, actual_end = ?9, allocation_pct = ?10,
                   priority_score = ?11, status = ?12, is_manually_adjusted = ?13,
                   algorithm_version = ?14, updated_at = ?15, revision = revision + 1
               WHERE schedule_id = ?16 AND revision = ?17"#,
            params![
                schedule.work_order_id,
                schedule.equipment_id,
                schedule.worker_id,
                schedule.workshop_id,
                schedule.process_id,
                fmt_ts(&schedule.scheduled_start),
                fmt_ts(&schedule.scheduled_end),
                fmt_opt_ts(&schedule.actual_start),
                fmt_opt_ts(&schedule.actual_end),
                schedule.allocation_pct,
                schedule.priority_score,
                schedule.status.to_db_str(),
                schedule.is_manually_adjusted,
                schedule.algorithm_version,
                fmt_ts(&Utc::now().naive_utc()),
                schedule.schedule_id,
                schedule.revision,
            ],
        )?;

        if rows_affected == 0 {
            let actual: Option<i32> = conn
                .query_row(
                    "SELECT revision FROM production_schedule WHERE schedule_id = ?1",
                    params![schedule.schedule_id],
                    |row| row.get(0),
                )
                .optional()?;

            return Err(match actual {
                Some(actual_revision) => RepositoryError::OptimisticLockFailure {
                    entity: "ProductionSchedule".to_string(),
                    id: schedule.schedule_id.clone(),
                    expected: schedule.revision,
                    actual: actual_revision,
                },
                None => RepositoryError::NotFound {
                    entity: "ProductionSchedule".to_string(),
                    id: schedule.schedule_id.clone(),
                },
            });
        }

        Ok(schedule.revision + 1)
    }

    /// 写入冲突叠加标记 (不推进 revision)
    pub fn set_conflict_flag_tx(
        conn: &Connection,
        schedule_id: &str,
        has_conflict: bool,
    ) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE production_schedule SET has_conflict = ?1 WHERE schedule_id = ?2",
            params![has_conflict, schedule_id],
        )?;
        Ok(())
    }
}

fn map_schedule_row(row: &Row) -> rusqlite::Result<ProductionSchedule> {
    let status_raw: String = row.get(12)?;
    let status = ScheduleStatus::from_db_str(&status_raw).ok_or_else(|| invalid_enum(12, &status_raw))?;

    Ok(ProductionSchedule {
        schedule_id: row.get(0)?,
        work_order_id: row.get(1)?,
        equipment_id: row.get(2)?,
        worker_id: row.get(3)?,
        workshop_id: row.get(4)?,
        process_id: row.get(5)?,
        scheduled_start: parse_ts(6, &row.get::<_, String>(6)?)?,
        scheduled_end: parse_ts(7, &row.get::<_, String>(7)?)?,
        actual_start: parse_opt_ts(8, row.get(8)?)?,
        actual_end: parse_opt_ts(9, row.get(9)?)?,
        allocation_pct: row.get(10)?,
        priority_score: row.get(11)?,
        status,
        has_conflict: row.get(13)?,
        is_manually_adjusted: row.get(14)?,
        algorithm_version: row.get(15)?,
        created_at: parse_ts(16, &row.get::<_, String>(16)?)?,
        updated_at: parse_ts(17, &row.get::<_, String>(17)?)?,
        revision: row.get(18)?,
    })
}
