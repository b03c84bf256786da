// ==========================================
// 仓储定价运营系统 - 操作日志领域模型
// ==========================================
// 用途: 审计追踪（保存、放弃、发布、设置同步）
// 说明: 暂存编辑本身不落盘，仅记录操作事实
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub session_id: String,
    pub action_type: String,
    pub action_ts: NaiveDateTime,
    pub actor: String,

    pub facility_id: Option<String>, // 门店范围 (全组合发布时为None)
    pub payload_json: Option<JsonValue>,
    pub outcome: ActionOutcome,
    pub detail: Option<String>, // 失败时保存原始错误日志
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    SaveUnits,
    DiscardChanges,
    PublishAll,
    PublishFacility,
    UpdateSettings,
}

impl ActionType {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::SaveUnits => "SaveUnits",
            ActionType::DiscardChanges => "DiscardChanges",
            ActionType::PublishAll => "PublishAll",
            ActionType::PublishFacility => "PublishFacility",
            ActionType::UpdateSettings => "UpdateSettings",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SaveUnits" => Some(ActionType::SaveUnits),
            "DiscardChanges" => Some(ActionType::DiscardChanges),
            "PublishAll" => Some(ActionType::PublishAll),
            "PublishFacility" => Some(ActionType::PublishFacility),
            "UpdateSettings" => Some(ActionType::UpdateSettings),
            _ => None,
        }
    }
}

// ==========================================
// ActionOutcome - 操作结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionOutcome {
    Succeeded,
    Failed,
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Succeeded => "SUCCEEDED",
            ActionOutcome::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "SUCCEEDED" => ActionOutcome::Succeeded,
            _ => ActionOutcome::Failed,
        }
    }
}

impl ActionLog {
    /// 创建新的操作日志（默认结果为成功）
    pub fn new(session_id: &str, action_type: ActionType, actor: &str) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            action_type: action_type.as_str().to_string(),
            action_ts: chrono::Utc::now().naive_utc(),
            actor: actor.to_string(),
            facility_id: None,
            payload_json: None,
            outcome: ActionOutcome::Succeeded,
            detail: None,
        }
    }

    pub fn with_facility(mut self, facility_id: &str) -> Self {
        self.facility_id = Some(facility_id.to_string());
        self
    }

    /// 设置操作负载 (转换为JSON)
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload_json = serde_json::to_value(payload).ok();
        self
    }

    /// 标记为失败并保存错误日志
    pub fn failed(mut self, error_log: impl Into<String>) -> Self {
        self.outcome = ActionOutcome::Failed;
        self.detail = Some(error_log.into());
        self
    }
}
