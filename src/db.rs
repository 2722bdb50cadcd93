// ==========================================
// 生产排程核心 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表幂等 (CREATE TABLE IF NOT EXISTS)
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存库并建表 (测试/嵌入场景)
pub fn open_in_memory_with_schema() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化全部表结构（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    match read_schema_version(conn)? {
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                db_version = v,
                code_version = CURRENT_SCHEMA_VERSION,
                "数据库 schema_version 高于代码期望版本"
            );
        }
        _ => {}
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

-- 外部协作方: 工单
CREATE TABLE IF NOT EXISTS work_order (
    work_order_id TEXT PRIMARY KEY,
    required_skills TEXT NOT NULL DEFAULT '',
    quantity INTEGER NOT NULL,
    unit_work_minutes REAL NOT NULL,
    due_date TEXT NOT NULL,
    is_urgent INTEGER NOT NULL DEFAULT 0
);

-- 外部协作方: 资源目录
CREATE TABLE IF NOT EXISTS resource_profile (
    resource_type TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    resource_name TEXT NOT NULL DEFAULT '',
    capabilities TEXT NOT NULL DEFAULT '',
    is_available INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (resource_type, resource_id)
);

CREATE TABLE IF NOT EXISTS production_schedule (
    schedule_id TEXT PRIMARY KEY,
    work_order_id TEXT NOT NULL,
    equipment_id TEXT,
    worker_id TEXT,
    workshop_id TEXT,
    process_id TEXT,
    scheduled_start TEXT NOT NULL,
    scheduled_end TEXT NOT NULL,
    actual_start TEXT,
    actual_end TEXT,
    allocation_pct REAL NOT NULL DEFAULT 100,
    priority_score REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    has_conflict INTEGER NOT NULL DEFAULT 0,
    is_manually_adjusted INTEGER NOT NULL DEFAULT 0,
    algorithm_version TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    revision INTEGER NOT NULL DEFAULT 0,
    CHECK (scheduled_end > scheduled_start)
);
CREATE INDEX IF NOT EXISTS idx_schedule_equipment ON production_schedule(equipment_id, scheduled_start);
CREATE INDEX IF NOT EXISTS idx_schedule_worker ON production_schedule(worker_id, scheduled_start);
CREATE INDEX IF NOT EXISTS idx_schedule_workshop ON production_schedule(workshop_id, scheduled_start);

CREATE TABLE IF NOT EXISTS resource_conflict (
    conflict_id TEXT PRIMARY KEY,
    schedule_id TEXT NOT NULL REFERENCES production_schedule(schedule_id),
    conflicting_schedule_id TEXT NOT NULL REFERENCES production_schedule(schedule_id),
    resource_type TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    overlap_start TEXT NOT NULL,
    overlap_end TEXT NOT NULL,
    total_allocation_pct REAL NOT NULL,
    severity TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'UNRESOLVED',
    resolved_by TEXT,
    resolved_at TEXT,
    resolution_note TEXT,
    detected_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (overlap_end > overlap_start),
    UNIQUE (schedule_id, conflicting_schedule_id, resource_type, resource_id, overlap_start, overlap_end)
);
CREATE INDEX IF NOT EXISTS idx_conflict_resource ON resource_conflict(resource_type, resource_id, status);

CREATE TABLE IF NOT EXISTS schedule_adjustment_log (
    log_id TEXT PRIMARY KEY,
    schedule_id TEXT NOT NULL REFERENCES production_schedule(schedule_id),
    adjustment_type TEXT NOT NULL,
    trigger_source TEXT NOT NULL,
    before_data TEXT NOT NULL,
    after_data TEXT NOT NULL,
    reason TEXT NOT NULL,
    operator TEXT NOT NULL,
    affected_schedule_count INTEGER NOT NULL DEFAULT 1,
    requires_approval INTEGER NOT NULL DEFAULT 0,
    approval_status TEXT NOT NULL,
    approved_by TEXT,
    approved_at TEXT,
    approval_comment TEXT,
    revision_after INTEGER NOT NULL,
    compensates_log_id TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_adjustment_schedule ON schedule_adjustment_log(schedule_id, created_at);

CREATE TABLE IF NOT EXISTS equipment_oee_record (
    record_id TEXT PRIMARY KEY,
    equipment_id TEXT NOT NULL,
    record_date TEXT NOT NULL,
    shift TEXT NOT NULL,
    planned_production_time REAL NOT NULL,
    planned_downtime REAL NOT NULL,
    unplanned_downtime REAL NOT NULL,
    ideal_cycle_time REAL NOT NULL,
    actual_output INTEGER NOT NULL,
    qualified_qty INTEGER NOT NULL,
    defect_qty INTEGER NOT NULL,
    operating_time REAL,
    availability REAL,
    performance REAL,
    quality REAL,
    oee REAL,
    grade TEXT,
    is_auto_calculated INTEGER NOT NULL DEFAULT 0,
    calculation_note TEXT,
    is_confirmed INTEGER NOT NULL DEFAULT 0,
    confirmed_by TEXT,
    confirmed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (equipment_id, record_date, shift)
);

CREATE TABLE IF NOT EXISTS worker_efficiency_record (
    record_id TEXT PRIMARY KEY,
    worker_id TEXT NOT NULL,
    record_date TEXT NOT NULL,
    shift TEXT NOT NULL,
    standard_hours REAL NOT NULL,
    actual_hours REAL NOT NULL,
    overtime_hours REAL NOT NULL,
    idle_hours REAL NOT NULL,
    completed_qty INTEGER NOT NULL,
    qualified_qty INTEGER NOT NULL,
    efficiency REAL,
    quality_rate REAL,
    utilization_rate REAL,
    overall_efficiency REAL,
    grade TEXT,
    is_auto_calculated INTEGER NOT NULL DEFAULT 0,
    calculation_note TEXT,
    is_confirmed INTEGER NOT NULL DEFAULT 0,
    confirmed_by TEXT,
    confirmed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (worker_id, record_date, shift)
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = open_in_memory_with_schema().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
