use super::core::ActionLogRepository;
use crate::domain::action_log::{ActionLog, ActionOutcome};
use crate::repository::error::RepositoryResult;
use chrono::NaiveDateTime;
use rusqlite::{params, Result as SqliteResult, Row};

const SELECT_COLUMNS: &str = r#"
    SELECT action_id, session_id, action_type, action_ts, actor,
           facility_id, payload_json, outcome, detail
    FROM action_log
"#;

impl ActionLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 action_id 查询单个日志
    pub fn find_by_id(&self, action_id: &str) -> RepositoryResult<Option<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} WHERE action_id = ?", SELECT_COLUMNS))?;

        match stmt.query_row(params![action_id], map_row) {
            Ok(log) => Ok(Some(log)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 最近的操作日志（按时间倒序）
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY action_ts DESC, rowid DESC LIMIT ?",
            SELECT_COLUMNS
        ))?;

        let logs = stmt
            .query_map(params![limit as i64], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 指定门店的操作日志（按时间倒序）
    pub fn list_by_facility(&self, facility_id: &str, limit: usize) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE facility_id = ? ORDER BY action_ts DESC, rowid DESC LIMIT ?",
            SELECT_COLUMNS
        ))?;

        let logs = stmt
            .query_map(params![facility_id, limit as i64], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 指定会话的操作日志（按时间正序）
    pub fn list_by_session(&self, session_id: &str) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE session_id = ? ORDER BY action_ts ASC, rowid ASC",
            SELECT_COLUMNS
        ))?;

        let logs = stmt
            .query_map(params![session_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 失败次数（按操作类型）
    pub fn count_failures(&self, action_type: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM action_log WHERE action_type = ?1 AND outcome = 'FAILED'",
            params![action_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_row(row: &Row) -> SqliteResult<ActionLog> {
    let ts_raw: String = row.get(3)?;
    let action_ts = NaiveDateTime::parse_from_str(&ts_raw, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;

    let payload_raw: Option<String> = row.get(6)?;
    let outcome_raw: String = row.get(7)?;

    Ok(ActionLog {
        action_id: row.get(0)?,
        session_id: row.get(1)?,
        action_type: row.get(2)?,
        action_ts,
        actor: row.get(4)?,
        facility_id: row.get(5)?,
        payload_json: payload_raw.and_then(|s| serde_json::from_str(&s).ok()),
        outcome: ActionOutcome::parse(&outcome_raw),
        detail: row.get(8)?,
    })
}
