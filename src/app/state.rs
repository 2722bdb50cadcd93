// ==========================================
// 生产排程核心 - 服务装配
// ==========================================
// 职责: 共享连接 + 配置快照 + 各引擎实例的装配
// 说明: 宿主应用持有一份 SchedulingServices,各请求共享
//       (仅资源锁表与连接跨请求共享)
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::{ConfigManager, SchedulingConfig};
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::{
    AdjustmentRecorder, ConflictDetector, MetricsEngine, OptionalEventPublisher, ScheduleBuilder,
    SchedulingRepositories,
};
use crate::repository::ResourceLockRegistry;

/// 排程服务集合
pub struct SchedulingServices {
    /// 数据库路径 (内存库为 None)
    pub db_path: Option<String>,

    pub config: SchedulingConfig,

    pub repos: SchedulingRepositories,

    /// 冲突检测
    pub detector: Arc<ConflictDetector>,

    /// 调整记录与审批
    pub recorder: Arc<AdjustmentRecorder>,

    /// 排程创建/调整
    pub builder: Arc<ScheduleBuilder>,

    /// OEE / 人效
    pub metrics: Arc<MetricsEngine>,
}

impl SchedulingServices {
    /// 打开数据库、初始化表结构、读取配置并装配引擎
    ///
    /// # 返回
    /// - Ok(SchedulingServices)
    /// - Err(String): 初始化错误
    pub fn open(db_path: &str) -> Result<Self, String> {
        tracing::info!("初始化排程服务，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("无法初始化表结构: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        let config = ConfigManager::from_connection(conn.clone())
            .and_then(|manager| manager.load_scheduling_config())
            .map_err(|e| format!("无法加载排程配置: {}", e))?;

        let mut services = Self::assemble(conn, config, OptionalEventPublisher::none());
        services.db_path = Some(db_path.to_string());
        Ok(services)
    }

    /// 基于已有连接装配 (表结构需已初始化)
    pub fn from_connection(conn: Arc<Mutex<Connection>>, config: SchedulingConfig) -> Self {
        Self::assemble(conn, config, OptionalEventPublisher::none())
    }

    /// 装配并挂接事件发布者
    pub fn with_events(
        conn: Arc<Mutex<Connection>>,
        config: SchedulingConfig,
        events: OptionalEventPublisher,
    ) -> Self {
        Self::assemble(conn, config, events)
    }

    fn assemble(
        conn: Arc<Mutex<Connection>>,
        config: SchedulingConfig,
        events: OptionalEventPublisher,
    ) -> Self {
        let config = config.sanitized();
        let repos = SchedulingRepositories::new(conn);
        let locks = Arc::new(ResourceLockRegistry::new());

        let detector = Arc::new(
            ConflictDetector::new(repos.clone(), locks, config.clone()).with_events(events.clone()),
        );
        let recorder = Arc::new(
            AdjustmentRecorder::new(repos.clone(), detector.clone()).with_events(events.clone()),
        );
        let builder = Arc::new(
            ScheduleBuilder::with_sqlite_directories(repos.clone(), detector.clone(), recorder.clone())
                .with_events(events),
        );
        let metrics = Arc::new(MetricsEngine::new(repos.clone()));

        tracing::debug!(
            approval_threshold = config.approval_affected_threshold,
            max_detection_attempts = config.max_detection_attempts,
            "排程服务装配完成"
        );

        Self {
            db_path: None,
            config,
            repos,
            detector,
            recorder,
            builder,
            metrics,
        }
    }
}

/// 默认数据库路径
///
/// 优先读取环境变量 MES_SCHEDULING_DB_PATH
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("MES_SCHEDULING_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    "./mes_scheduling.db".to_string()
}
