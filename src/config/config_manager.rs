// ==========================================
// 仓储定价运营系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 优先级: 环境变量 > config_kv(global) > 内置默认值
// ==========================================

use crate::config::app_config::AppConfig;
use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(format!("{}: {}", db_path, e)))?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 从已有连接创建 ConfigManager（与审计仓储共用连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        let manager = Self { conn };
        manager.ensure_table()?;
        Ok(manager)
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS config_kv (
              scope_id TEXT NOT NULL,
              key TEXT NOT NULL,
              value TEXT NOT NULL,
              updated_at TEXT NOT NULL DEFAULT (datetime('now')),
              PRIMARY KEY (scope_id, key)
            );
            "#,
        )?;
        Ok(())
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(key, "配置已更新");
        Ok(())
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_global_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    fn parse_or_default<T: std::str::FromStr>(&self, key: &str, default: T) -> RepositoryResult<T> {
        match self.get_global_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|_| RepositoryError::FieldValueError {
                    field: key.to_string(),
                    message: format!("无法解析配置值: {}", raw),
                }),
        }
    }

    /// 获取 global 配置快照（JSON，令牌除外）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            if key == config_keys::API_TOKEN {
                continue;
            }
            config_map.insert(key, value);
        }

        serde_json::to_string(&config_map).map_err(|e| RepositoryError::Other(e.into()))
    }

    /// 组装应用配置（含环境变量覆写）
    pub fn load_app_config(&self) -> RepositoryResult<AppConfig> {
        self.load_app_config_with(|name| std::env::var(name).ok())
    }

    /// 组装应用配置；`env` 用于查找环境变量（测试可注入）
    pub fn load_app_config_with<F>(&self, env: F) -> RepositoryResult<AppConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let mut config = AppConfig {
            api_base_url: self.get_config_or_default(config_keys::API_BASE_URL, &defaults.api_base_url)?,
            api_token: self.get_global_config_value(config_keys::API_TOKEN)?,
            request_timeout_secs: self
                .parse_or_default(config_keys::REQUEST_TIMEOUT_SECS, defaults.request_timeout_secs)?,
            page_size: self.parse_or_default(config_keys::PAGE_SIZE, defaults.page_size)?,
            default_operator: self
                .get_config_or_default(config_keys::DEFAULT_OPERATOR, &defaults.default_operator)?,
            audit_retention_days: self
                .parse_or_default(config_keys::AUDIT_RETENTION_DAYS, defaults.audit_retention_days)?,
        };

        if let Some(url) = env(env_keys::API_URL).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(env = env_keys::API_URL, "环境变量覆写后端地址");
            config.api_base_url = url.trim().to_string();
        }
        if let Some(token) = env(env_keys::API_TOKEN).filter(|v| !v.trim().is_empty()) {
            config.api_token = Some(token.trim().to_string());
        }
        Ok(config)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 后端服务
    pub const API_BASE_URL: &str = "api_base_url";
    pub const API_TOKEN: &str = "api_token";
    pub const REQUEST_TIMEOUT_SECS: &str = "request_timeout_secs";

    // 拉取
    pub const PAGE_SIZE: &str = "page_size";

    // 会话与审计
    pub const DEFAULT_OPERATOR: &str = "default_operator";
    pub const AUDIT_RETENTION_DAYS: &str = "audit_retention_days";
}

/// 环境变量名
pub mod env_keys {
    pub const API_URL: &str = "FACILITY_PRICING_API_URL";
    pub const API_TOKEN: &str = "FACILITY_PRICING_API_TOKEN";
    pub const DB_PATH: &str = "FACILITY_PRICING_DB";
}
