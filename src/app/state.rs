// ==========================================
// 仓储定价运营系统 - 应用状态
// ==========================================
// 职责: 管理应用级共享资源（配置、审计仓储、后端）与当前定价会话
// 生命周期: start_session 于登录时创建会话，end_session 于登出时销毁
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{ApiError, ApiResult, PricingApi};
use crate::backend::{HttpPricingBackend, PricingBackend};
use crate::config::{env_keys, AppConfig, ConfigManager};
use crate::db::open_sqlite_connection;
use crate::engine::events::{OptionalEventPublisher, StagingEventPublisher};
use crate::engine::PricingSession;
use crate::repository::action_log_repo::ActionLogRepository;

/// 应用状态
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 启动时读取的配置快照
    pub config: AppConfig,

    pub config_manager: Arc<ConfigManager>,

    /// 操作日志仓储（用于审计追踪）
    pub action_log_repo: Arc<ActionLogRepository>,

    /// 后端定价服务
    pub backend: Arc<dyn PricingBackend>,

    /// 事件发布器（可选）
    pub event_publisher: Option<Arc<dyn StagingEventPublisher>>,

    current: Mutex<Option<Arc<PricingApi>>>,
}

impl AppState {
    /// 创建AppState，后端按配置使用 HTTP 实现
    ///
    /// # 参数
    /// - db_path: 本地数据库文件路径（配置 + 审计）
    pub fn new(db_path: String) -> ApiResult<Self> {
        let (config_manager, action_log_repo) = open_stores(&db_path)?;
        let config = config_manager.load_app_config()?;

        let backend = HttpPricingBackend::new(
            &config.api_base_url,
            config.api_token.clone(),
            config.request_timeout(),
        )?;
        tracing::info!(base_url = %config.api_base_url, "后端定价服务已配置");

        Ok(Self::assemble(db_path, config, config_manager, action_log_repo, Arc::new(backend)))
    }

    /// 使用指定后端创建AppState（测试或替换实现）
    pub fn with_backend(db_path: String, backend: Arc<dyn PricingBackend>) -> ApiResult<Self> {
        let (config_manager, action_log_repo) = open_stores(&db_path)?;
        let config = config_manager.load_app_config()?;
        Ok(Self::assemble(db_path, config, config_manager, action_log_repo, backend))
    }

    fn assemble(
        db_path: String,
        config: AppConfig,
        config_manager: Arc<ConfigManager>,
        action_log_repo: Arc<ActionLogRepository>,
        backend: Arc<dyn PricingBackend>,
    ) -> Self {
        if config.audit_retention_days > 0 {
            let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::days(config.audit_retention_days);
            // best-effort: 清理失败不阻塞启动
            match action_log_repo.purge_before(cutoff) {
                Ok(rows) if rows > 0 => tracing::info!(rows, "已清理过期审计日志"),
                Ok(_) => {}
                Err(e) => tracing::warn!("审计日志清理失败(将继续启动): {}", e),
            }
        }

        Self {
            db_path,
            config,
            config_manager,
            action_log_repo,
            backend,
            event_publisher: None,
            current: Mutex::new(None),
        }
    }

    pub fn with_event_publisher(mut self, publisher: Arc<dyn StagingEventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    // ==========================================
    // 会话生命周期
    // ==========================================

    /// 登录: 创建新的定价会话
    ///
    /// 已有会话时先销毁（每个会话只有一个编辑中的操作员）
    pub fn start_session(&self, operator: Option<&str>) -> ApiResult<Arc<PricingApi>> {
        let operator = operator
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(self.config.default_operator.as_str());

        let mut current = self.lock_current()?;
        if let Some(previous) = current.take() {
            previous.with_session(|s| s.teardown())?;
        }

        let events = match &self.event_publisher {
            Some(publisher) => OptionalEventPublisher::with_publisher(Arc::clone(publisher)),
            None => OptionalEventPublisher::none(),
        };
        let session = Arc::new(Mutex::new(PricingSession::new(operator)));
        let api = Arc::new(
            PricingApi::new(session, Arc::clone(&self.backend))
                .with_audit(Arc::clone(&self.action_log_repo))
                .with_events(events)
                .with_query(self.config.facility_query()),
        );
        *current = Some(Arc::clone(&api));
        Ok(api)
    }

    /// 当前会话
    pub fn current(&self) -> ApiResult<Arc<PricingApi>> {
        self.lock_current()?
            .as_ref()
            .map(Arc::clone)
            .ok_or(ApiError::NoActiveSession)
    }

    /// 登出: 销毁当前会话，未发布的暂存编辑随之丢弃
    ///
    /// # 返回
    /// - true: 销毁了一个会话
    /// - false: 没有活动会话
    pub fn end_session(&self) -> ApiResult<bool> {
        let previous = self.lock_current()?.take();
        match previous {
            Some(api) => {
                api.with_session(|s| s.teardown())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn lock_current(&self) -> ApiResult<std::sync::MutexGuard<'_, Option<Arc<PricingApi>>>> {
        self.current
            .lock()
            .map_err(|e| ApiError::InternalError(format!("会话锁获取失败: {}", e)))
    }
}

fn open_stores(db_path: &str) -> ApiResult<(Arc<ConfigManager>, Arc<ActionLogRepository>)> {
    tracing::info!("初始化AppState，数据库路径: {}", db_path);
    let conn = open_sqlite_connection(db_path)
        .map_err(|e| ApiError::DatabaseConnectionError(format!("无法打开数据库 {}: {}", db_path, e)))?;
    let conn = Arc::new(Mutex::new(conn));

    let config_manager = Arc::new(ConfigManager::from_connection(Arc::clone(&conn))?);
    let action_log_repo = Arc::new(ActionLogRepository::new(conn));
    Ok((config_manager, action_log_repo))
}

// ==========================================
// 辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - `FACILITY_PRICING_DB` 已设置时使用该路径
/// - 开发环境: 用户数据目录/facility-pricing-ops-dev/facility_pricing.db
/// - 生产环境: 用户数据目录/facility-pricing-ops/facility_pricing.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var(env_keys::DB_PATH) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./facility_pricing.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("facility-pricing-ops-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("facility-pricing-ops");
        }

        // 目录创建失败时 open 会报错，这里不提前失败
        std::fs::create_dir_all(&path).ok();
        path = path.join("facility_pricing.db");
    }

    path.to_string_lossy().to_string()
}
