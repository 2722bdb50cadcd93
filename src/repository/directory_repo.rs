// ==========================================
// 生产排程核心 - 工单/资源目录仓储
// ==========================================
// 表: work_order / resource_profile
// 说明: 目录数据由外部子系统维护,此处提供只读查询与同步写入
// ==========================================

use crate::domain::resource::{ResourceProfile, WorkOrder};
use crate::domain::types::ResourceType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{fmt_date, invalid_enum, join_list, parse_date, split_list};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub struct DirectoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DirectoryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 工单 =====

    pub fn upsert_work_order(&self, order: &WorkOrder) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO work_order (work_order_id, required_skills, quantity, unit_work_minutes, due_date, is_urgent)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(work_order_id) DO UPDATE SET
                   required_skills = excluded.required_skills,
                   quantity = excluded.quantity,
                   unit_work_minutes = excluded.unit_work_minutes,
                   due_date = excluded.due_date,
                   is_urgent = excluded.is_urgent"#,
            params![
                order.work_order_id,
                join_list(&order.required_skills),
                order.quantity,
                order.unit_work_minutes,
                fmt_date(&order.due_date),
                order.is_urgent,
            ],
        )?;
        Ok(())
    }

    pub fn find_work_order(&self, work_order_id: &str) -> RepositoryResult<Option<WorkOrder>> {
        let conn = self.get_conn()?;
        let order = conn
            .query_row(
                r#"SELECT work_order_id, required_skills, quantity, unit_work_minutes, due_date, is_urgent
                   FROM work_order WHERE work_order_id = ?1"#,
                params![work_order_id],
                map_work_order_row,
            )
            .optional()?;
        Ok(order)
    }

    // ===== 资源档案 =====

    pub fn upsert_resource(&self, profile: &ResourceProfile) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO resource_profile (resource_type, resource_id, resource_name, capabilities, is_available)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(resource_type, resource_id) DO UPDATE SET
                   resource_name = excluded.resource_name,
                   capabilities = excluded.capabilities,
                   is_available = excluded.is_available"#,
            params![
                profile.resource_type.to_db_str(),
                profile.resource_id,
                profile.resource_name,
                join_list(&profile.capabilities),
                profile.is_available,
            ],
        )?;
        Ok(())
    }

    pub fn set_resource_availability(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        is_available: bool,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows_affected = conn.execute(
            "UPDATE resource_profile SET is_available = ?1 WHERE resource_type = ?2 AND resource_id = ?3",
            params![is_available, resource_type.to_db_str(), resource_id],
        )?;
        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ResourceProfile".to_string(),
                id: format!("{}/{}", resource_type, resource_id),
            });
        }
        Ok(())
    }

    pub fn find_resource(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> RepositoryResult<Option<ResourceProfile>> {
        let conn = self.get_conn()?;
        let profile = conn
            .query_row(
                r#"SELECT resource_type, resource_id, resource_name, capabilities, is_available
                   FROM resource_profile WHERE resource_type = ?1 AND resource_id = ?2"#,
                params![resource_type.to_db_str(), resource_id],
                map_resource_row,
            )
            .optional()?;
        Ok(profile)
    }
}

fn map_work_order_row(row: &Row) -> rusqlite::Result<WorkOrder> {
    Ok(WorkOrder {
        work_order_id: row.get(0)?,
        required_skills: split_list(&row.get::<_, String>(1)?),
        quantity: row.get(2)?,
        unit_work_minutes: row.get(3)?,
        due_date: parse_date(4, &row.get::<_, String>(4)?)?,
        is_urgent: row.get(5)?,
    })
}

fn map_resource_row(row: &Row) -> rusqlite::Result<ResourceProfile> {
    let type_raw: String = row.get(0)?;
    Ok(ResourceProfile {
        resource_type: ResourceType::from_db_str(&type_raw).ok_or_else(|| invalid_enum(0, &type_raw))?,
        resource_id: row.get(1)?,
        resource_name: row.get(2)?,
        capabilities: split_list(&row.get::<_, String>(3)?),
        is_available: row.get(4)?,
    })
}
