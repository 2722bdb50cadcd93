// ==========================================
// 生产排程核心 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 规则: 无法解析的值回退默认值并记录 warn
// ==========================================

use crate::config::scheduling_config::SchedulingConfig;
use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 按数据库路径创建
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }
        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值 (UPSERT)
    pub fn set_global_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES (?1, ?2, ?3, datetime('now'))
               ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    /// 获取所有 global 配置的快照（JSON 格式,按 key 排序）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        serde_json::to_string(&json!(config_map))
            .map_err(|e| RepositoryError::FieldValueError {
                field: "config_snapshot".to_string(),
                message: e.to_string(),
            })
    }

    /// 解析数值配置,缺失或格式错误时回退默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T: FromStr + Copy,
    {
        match self.get_global_config_value(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(config_key = key, raw_value = %raw, "配置值格式错误，使用默认值");
                    Ok(default)
                }
            },
        }
    }

    // ===== 排程配置 =====

    /// 读取一份不可变的排程配置快照
    pub fn load_scheduling_config(&self) -> RepositoryResult<SchedulingConfig> {
        let d = SchedulingConfig::default();
        let loaded = SchedulingConfig {
            approval_affected_threshold: self.get_parsed_or_default(
                config_keys::APPROVAL_AFFECTED_SCHEDULE_THRESHOLD,
                d.approval_affected_threshold,
            )?,
            severity_low_max: self
                .get_parsed_or_default(config_keys::CONFLICT_SEVERITY_LOW_MAX, d.severity_low_max)?,
            severity_medium_max: self.get_parsed_or_default(
                config_keys::CONFLICT_SEVERITY_MEDIUM_MAX,
                d.severity_medium_max,
            )?,
            max_detection_attempts: self.get_parsed_or_default(
                config_keys::CONFLICT_MAX_DETECTION_ATTEMPTS,
                d.max_detection_attempts,
            )?,
            priority_decay_per_day: self
                .get_parsed_or_default(config_keys::PRIORITY_DECAY_PER_DAY, d.priority_decay_per_day)?,
            priority_urgent_bonus: self
                .get_parsed_or_default(config_keys::PRIORITY_URGENT_BONUS, d.priority_urgent_bonus)?,
        };
        Ok(loaded.sanitized())
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 审批门控
    pub const APPROVAL_AFFECTED_SCHEDULE_THRESHOLD: &str = "approval.affected_schedule_threshold";

    // 冲突检测
    pub const CONFLICT_SEVERITY_LOW_MAX: &str = "conflict.severity_low_max";
    pub const CONFLICT_SEVERITY_MEDIUM_MAX: &str = "conflict.severity_medium_max";
    pub const CONFLICT_MAX_DETECTION_ATTEMPTS: &str = "conflict.max_detection_attempts";

    // 优先级
    pub const PRIORITY_DECAY_PER_DAY: &str = "priority.decay_per_day";
    pub const PRIORITY_URGENT_BONUS: &str = "priority.urgent_bonus";
}
