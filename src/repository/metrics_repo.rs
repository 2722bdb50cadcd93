// ==========================================
// 生产排程核心 - 绩效指标记录仓储
// ==========================================
// 表: equipment_oee_record / worker_efficiency_record
// 红线: 每 (资源, 日期, 班次) 一行;已确认记录不可覆盖
// ==========================================

use crate::domain::metrics::{
    EfficiencyGrade, EfficiencyInput, EfficiencyMetrics, EquipmentOeeRecord, OeeGrade, OeeInput,
    OeeMetrics, WorkerEfficiencyRecord,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{fmt_date, fmt_ts, invalid_enum, parse_date, parse_opt_ts, parse_ts};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const OEE_COLUMNS: &str = r#"
    record_id, equipment_id, record_date, shift,
    planned_production_time, planned_downtime, unplanned_downtime, ideal_cycle_time,
    actual_output, qualified_qty, defect_qty,
    operating_time, availability, performance, quality, oee, grade,
    is_auto_calculated, calculation_note, is_confirmed, confirmed_by, confirmed_at,
    created_at, updated_at
"#;

const EFFICIENCY_COLUMNS: &str = r#"
    record_id, worker_id, record_date, shift,
    standard_hours, actual_hours, overtime_hours, idle_hours, completed_qty, qualified_qty,
    efficiency, quality_rate, utilization_rate, overall_efficiency, grade,
    is_auto_calculated, calculation_note, is_confirmed, confirmed_by, confirmed_at,
    created_at, updated_at
"#;

/// 记录写入内容 (计算结果或失败说明)
#[derive(Debug, Clone)]
pub struct RecordWrite<'a, I, M> {
    pub input: &'a I,
    pub metrics: Option<&'a M>,
    pub calculation_note: Option<&'a str>,
    pub at: NaiveDateTime,
}

fn record_key(resource_id: &str, date: &NaiveDate, shift: &str) -> String {
    format!("{}/{}/{}", resource_id, fmt_date(date), shift)
}

/// 按自然键取 (record_id, is_confirmed)
fn existing_state(
    conn: &Connection,
    table: &str,
    resource_column: &str,
    resource_id: &str,
    date: &NaiveDate,
    shift: &str,
) -> RepositoryResult<Option<(String, bool)>> {
    let state = conn
        .query_row(
            &format!(
                "SELECT record_id, is_confirmed FROM {} WHERE {} = ?1 AND record_date = ?2 AND shift = ?3",
                table, resource_column
            ),
            params![resource_id, fmt_date(date), shift],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(state)
}

/// 确认: 仅未确认的行可确认
fn confirm_row(
    conn: &Connection,
    entity: &str,
    table: &str,
    resource_column: &str,
    key: (&str, &NaiveDate, &str),
    confirmed_by: &str,
    at: NaiveDateTime,
) -> RepositoryResult<()> {
    let (resource_id, date, shift) = key;
    let rows_affected = conn.execute(
        &format!(
            r#"UPDATE {} SET is_confirmed = 1, confirmed_by = ?1, confirmed_at = ?2, updated_at = ?2
               WHERE {} = ?3 AND record_date = ?4 AND shift = ?5 AND is_confirmed = 0"#,
            table, resource_column
        ),
        params![confirmed_by, fmt_ts(&at), resource_id, fmt_date(date), shift],
    )?;
    if rows_affected == 0 {
        return Err(
            match existing_state(conn, table, resource_column, resource_id, date, shift)? {
                Some(_) => RepositoryError::ImmutableRecord {
                    entity: entity.to_string(),
                    key: record_key(resource_id, date, shift),
                },
                None => RepositoryError::NotFound {
                    entity: entity.to_string(),
                    id: record_key(resource_id, date, shift),
                },
            },
        );
    }
    Ok(())
}

// ==========================================
// OeeRecordRepository - 设备 OEE 记录仓储
// ==========================================
pub struct OeeRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OeeRecordRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按自然键写入 (新建或覆盖未确认的行)
    ///
    /// # 错误
    /// - `ImmutableRecord`: 该键的记录已确认
    pub fn upsert(&self, write: &RecordWrite<'_, OeeInput, OeeMetrics>) -> RepositoryResult<EquipmentOeeRecord> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Self::upsert_tx(&tx, write)?;
        let record = Self::find_by_key_tx(&tx, &write.input.equipment_id, &write.input.record_date, &write.input.shift)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "EquipmentOeeRecord".to_string(),
                id: record_key(&write.input.equipment_id, &write.input.record_date, &write.input.shift),
            })?;
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(record)
    }

    pub fn find_by_key(
        &self,
        equipment_id: &str,
        record_date: &NaiveDate,
        shift: &str,
    ) -> RepositoryResult<Option<EquipmentOeeRecord>> {
        let conn = self.get_conn()?;
        Self::find_by_key_tx(&conn, equipment_id, record_date, shift)
    }

    pub fn confirm(
        &self,
        equipment_id: &str,
        record_date: &NaiveDate,
        shift: &str,
        confirmed_by: &str,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        confirm_row(
            &conn,
            "EquipmentOeeRecord",
            "equipment_oee_record",
            "equipment_id",
            (equipment_id, record_date, shift),
            confirmed_by,
            at,
        )
    }

    /// 日期闭区间内的记录,按 (record_date, shift) 排序
    pub fn find_range(
        &self,
        equipment_id: &str,
        from: &NaiveDate,
        to: &NaiveDate,
    ) -> RepositoryResult<Vec<EquipmentOeeRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"SELECT {} FROM equipment_oee_record
               WHERE equipment_id = ?1 AND record_date >= ?2 AND record_date <= ?3
               ORDER BY record_date, shift"#,
            OEE_COLUMNS
        ))?;
        let records = stmt
            .query_map(
                params![equipment_id, fmt_date(from), fmt_date(to)],
                map_oee_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn find_by_key_tx(
        conn: &Connection,
        equipment_id: &str,
        record_date: &NaiveDate,
        shift: &str,
    ) -> RepositoryResult<Option<EquipmentOeeRecord>> {
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM equipment_oee_record WHERE equipment_id = ?1 AND record_date = ?2 AND shift = ?3",
                    OEE_COLUMNS
                ),
                params![equipment_id, fmt_date(record_date), shift],
                map_oee_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn upsert_tx(
        conn: &Connection,
        write: &RecordWrite<'_, OeeInput, OeeMetrics>,
    ) -> RepositoryResult<String> {
        let input = write.input;
        let existing = existing_state(
            conn,
            "equipment_oee_record",
            "equipment_id",
            &input.equipment_id,
            &input.record_date,
            &input.shift,
        )?;
        let m = write.metrics;
        let now = fmt_ts(&write.at);

        match existing {
            Some((_, true)) => Err(RepositoryError::ImmutableRecord {
                entity: "EquipmentOeeRecord".to_string(),
                key: record_key(&input.equipment_id, &input.record_date, &input.shift),
            }),
            Some((record_id, false)) => {
                conn.execute(
                    r#"UPDATE equipment_oee_record
                       SET planned_production_time = ?1, planned_downtime = ?2, unplanned_downtime = ?3,
                           ideal_cycle_time = ?4, actual_output = ?5, qualified_qty = ?6, defect_qty = ?7,
                           operating_time = ?8, availability = ?9, performance = ?10, quality = ?11,
                           oee = ?12, grade = ?13, is_auto_calculated = ?14, calculation_note = ?15,
                           updated_at = ?16
                       WHERE record_id = ?17 AND is_confirmed = 0"#,
                    params![
                        input.planned_production_time,
                        input.planned_downtime,
                        input.unplanned_downtime,
                        input.ideal_cycle_time,
                        input.actual_output,
                        input.qualified_qty,
                        input.defect_qty,
                        m.map(|m| m.operating_time),
                        m.map(|m| m.availability),
                        m.map(|m| m.performance),
                        m.map(|m| m.quality),
                        m.map(|m| m.oee),
                        m.map(|m| m.grade.code()),
                        m.is_some(),
                        write.calculation_note,
                        now,
                        record_id,
                    ],
                )?;
                Ok(record_id)
            }
            None => {
                let record_id = Uuid::new_v4().to_string();
                conn.execute(
                    &format!(
                        "INSERT INTO equipment_oee_record ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, 0, NULL, NULL, ?20, ?20)",
                        OEE_COLUMNS
                    ),
                    params![
                        record_id,
                        input.equipment_id,
                        fmt_date(&input.record_date),
                        input.shift,
                        input.planned_production_time,
                        input.planned_downtime,
                        input.unplanned_downtime,
                        input.ideal_cycle_time,
                        input.actual_output,
                        input.qualified_qty,
                        input.defect_qty,
                        m.map(|m| m.operating_time),
                        m.map(|m| m.availability),
                        m.map(|m| m.performance),
                        m.map(|m| m.quality),
                        m.map(|m| m.oee),
                        m.map(|m| m.grade.code()),
                        m.is_some(),
                        write.calculation_note,
                        now,
                    ],
                )?;
                Ok(record_id)
            }
        }
    }
}

fn map_oee_row(row: &Row) -> rusqlite::Result<EquipmentOeeRecord> {
    let input = OeeInput {
        equipment_id: row.get(1)?,
        record_date: parse_date(2, &row.get::<_, String>(2)?)?,
        shift: row.get(3)?,
        planned_production_time: row.get(4)?,
        planned_downtime: row.get(5)?,
        unplanned_downtime: row.get(6)?,
        ideal_cycle_time: row.get(7)?,
        actual_output: row.get(8)?,
        qualified_qty: row.get(9)?,
        defect_qty: row.get(10)?,
    };

    let grade_raw: Option<String> = row.get(16)?;
    let metrics = match grade_raw {
        Some(raw) => Some(OeeMetrics {
            operating_time: row.get(11)?,
            availability: row.get(12)?,
            performance: row.get(13)?,
            quality: row.get(14)?,
            oee: row.get(15)?,
            grade: OeeGrade::from_code(&raw).ok_or_else(|| invalid_enum(16, &raw))?,
        }),
        None => None,
    };

    Ok(EquipmentOeeRecord {
        record_id: row.get(0)?,
        input,
        metrics,
        is_auto_calculated: row.get(17)?,
        calculation_note: row.get(18)?,
        is_confirmed: row.get(19)?,
        confirmed_by: row.get(20)?,
        confirmed_at: parse_opt_ts(21, row.get(21)?)?,
        created_at: parse_ts(22, &row.get::<_, String>(22)?)?,
        updated_at: parse_ts(23, &row.get::<_, String>(23)?)?,
    })
}

// ==========================================
// EfficiencyRecordRepository - 人员效率记录仓储
// ==========================================
pub struct EfficiencyRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EfficiencyRecordRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn upsert(
        &self,
        write: &RecordWrite<'_, EfficiencyInput, EfficiencyMetrics>,
    ) -> RepositoryResult<WorkerEfficiencyRecord> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Self::upsert_tx(&tx, write)?;
        let record = Self::find_by_key_tx(&tx, &write.input.worker_id, &write.input.record_date, &write.input.shift)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "WorkerEfficiencyRecord".to_string(),
                id: record_key(&write.input.worker_id, &write.input.record_date, &write.input.shift),
            })?;
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(record)
    }

    pub fn find_by_key(
        &self,
        worker_id: &str,
        record_date: &NaiveDate,
        shift: &str,
    ) -> RepositoryResult<Option<WorkerEfficiencyRecord>> {
        let conn = self.get_conn()?;
        Self::find_by_key_tx(&conn, worker_id, record_date, shift)
    }

    pub fn confirm(
        &self,
        worker_id: &str,
        record_date: &NaiveDate,
        shift: &str,
        confirmed_by: &str,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        confirm_row(
            &conn,
            "WorkerEfficiencyRecord",
            "worker_efficiency_record",
            "worker_id",
            (worker_id, record_date, shift),
            confirmed_by,
            at,
        )
    }

    pub fn find_range(
        &self,
        worker_id: &str,
        from: &NaiveDate,
        to: &NaiveDate,
    ) -> RepositoryResult<Vec<WorkerEfficiencyRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"SELECT {} FROM worker_efficiency_record
               WHERE worker_id = ?1 AND record_date >= ?2 AND record_date <= ?3
               ORDER BY record_date, shift"#,
            EFFICIENCY_COLUMNS
        ))?;
        let records = stmt
            .query_map(
                params![worker_id, fmt_date(from), fmt_date(to)],
                map_efficiency_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn find_by_key_tx(
        conn: &Connection,
        worker_id: &str,
        record_date: &NaiveDate,
        shift: &str,
    ) -> RepositoryResult<Option<WorkerEfficiencyRecord>> {
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM worker_efficiency_record WHERE worker_id = ?1 AND record_date = ?2 AND shift = ?3",
                    EFFICIENCY_COLUMNS
                ),
                params![worker_id, fmt_date(record_date), shift],
                map_efficiency_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn upsert_tx(
        conn: &Connection,
        write: &RecordWrite<'_, EfficiencyInput, EfficiencyMetrics>,
    ) -> RepositoryResult<String> {
        let input = write.input;
        let existing = existing_state(
            conn,
            "worker_efficiency_record",
            "worker_id",
            &input.worker_id,
            &input.record_date,
            &input.shift,
        )?;
        let m = write.metrics;
        let now = fmt_ts(&write.at);

        match existing {
            Some((_, true)) => Err(RepositoryError::ImmutableRecord {
                entity: "WorkerEfficiencyRecord".to_string(),
                key: record_key(&input.worker_id, &input.record_date, &input.shift),
            }),
            Some((record_id, false)) => {
                conn.execute(
                    r#"UPDATE worker_efficiency_record
                       SET standard_hours = ?1, actual_hours = ?2, overtime_hours = ?3, idle_hours = ?4,
                           completed_qty = ?5, qualified_qty = ?6, efficiency = ?7, quality_rate = ?8,
                           utilization_rate = ?9, overall_efficiency = ?10, grade = ?11,
                           is_auto_calculated = ?12, calculation_note = ?13, updated_at = ?14
                       WHERE record_id = ?15 AND is_confirmed = 0"#,
                    params![
                        input.standard_hours,
                        input.actual_hours,
                        input.overtime_hours,
                        input.idle_hours,
                        input.completed_qty,
                        input.qualified_qty,
                        m.map(|m| m.efficiency),
                        m.map(|m| m.quality_rate),
                        m.map(|m| m.utilization_rate),
                        m.map(|m| m.overall_efficiency),
                        m.map(|m| m.grade.code()),
                        m.is_some(),
                        write.calculation_note,
                        now,
                        record_id,
                    ],
                )?;
                Ok(record_id)
            }
            None => {
                let record_id = Uuid::new_v4().to_string();
                conn.execute(
                    &format!(
                        "INSERT INTO worker_efficiency_record ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, 0, NULL, NULL, ?18, ?18)",
                        EFFICIENCY_COLUMNS
                    ),
                    params![
                        record_id,
                        input.worker_id,
                        fmt_date(&input.record_date),
                        input.shift,
                        input.standard_hours,
                        input.actual_hours,
                        input.overtime_hours,
                        input.idle_hours,
                        input.completed_qty,
                        input.qualified_qty,
                        m.map(|m| m.efficiency),
                        m.map(|m| m.quality_rate),
                        m.map(|m| m.utilization_rate),
                        m.map(|m| m.overall_efficiency),
                        m.map(|m| m.grade.code()),
                        m.is_some(),
                        write.calculation_note,
                        now,
                    ],
                )?;
                Ok(record_id)
            }
        }
    }
}

fn map_efficiency_row(row: &Row) -> rusqlite::Result<WorkerEfficiencyRecord> {
    let input = EfficiencyInput {
        worker_id: row.get(1)?,
        record_date: parse_date(2, &row.get::<_, String>(2)?)?,
        shift: row.get(3)?,
        standard_hours: row.get(4)?,
        actual_hours: row.get(5)?,
        overtime_hours: row.get(6)?,
        idle_hours: row.get(7)?,
        completed_qty: row.get(8)?,
        qualified_qty: row.get(9)?,
    };

    let grade_raw: Option<String> = row.get(14)?;
    let metrics = match grade_raw {
        Some(raw) => Some(EfficiencyMetrics {
            efficiency: row.get(10)?,
            quality_rate: row.get(11)?,
            utilization_rate: row.get(12)?,
            overall_efficiency: row.get(13)?,
            grade: EfficiencyGrade::from_code(&raw).ok_or_else(|| invalid_enum(14, &raw))?,
        }),
        None => None,
    };

    Ok(WorkerEfficiencyRecord {
        record_id: row.get(0)?,
        input,
        metrics,
        is_auto_calculated: row.get(15)?,
        calculation_note: row.get(16)?,
        is_confirmed: row.get(17)?,
        confirmed_by: row.get(18)?,
        confirmed_at: parse_opt_ts(19, row.get(19)?)?,
        created_at: parse_ts(20, &row.get::<_, String>(20)?)?,
        updated_at: parse_ts(21, &row.get::<_, String>(21)?)?,
    })
}
