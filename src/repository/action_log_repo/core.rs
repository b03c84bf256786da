use crate::domain::action_log::ActionLog;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// ActionLogRepository - 操作日志仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub struct ActionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ActionLogRepository {
    /// 创建新的操作日志仓储
    ///
    /// 建表为 best-effort：失败只记录警告，错误在实际读写时暴露
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let repo = Self { conn };
        if let Err(e) = repo.ensure_table() {
            tracing::warn!("action_log ensure failed: {}", e);
        }
        repo
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS action_log (
              action_id TEXT PRIMARY KEY,
              session_id TEXT NOT NULL,
              action_type TEXT NOT NULL,
              action_ts TEXT NOT NULL,
              actor TEXT NOT NULL,
              facility_id TEXT,
              payload_json TEXT,
              outcome TEXT NOT NULL CHECK(outcome IN ('SUCCEEDED', 'FAILED')),
              detail TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_action_log_ts ON action_log(action_ts);
            CREATE INDEX IF NOT EXISTS idx_action_log_facility ON action_log(facility_id, action_ts);
            "#,
        )?;
        Ok(())
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入操作日志
    ///
    /// # 返回
    /// - `Ok(action_id)`: 成功插入
    /// - `Err(...)`: 数据库错误
    pub fn insert(&self, log: &ActionLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO action_log (
                action_id, session_id, action_type, action_ts, actor,
                facility_id, payload_json, outcome, detail
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                log.action_id,
                log.session_id,
                log.action_type,
                log.action_ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                log.actor,
                log.facility_id,
                log.payload_json.as_ref().map(|v| v.to_string()),
                log.outcome.as_str(),
                log.detail,
            ],
        )?;

        Ok(log.action_id.clone())
    }

    /// 删除早于指定时间的日志，返回删除行数
    pub fn purge_before(&self, before: chrono::NaiveDateTime) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM action_log WHERE action_ts < ?1",
            params![before.format("%Y-%m-%d %H:%M:%S%.3f").to_string()],
        )?;
        Ok(rows)
    }
}
