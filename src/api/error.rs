// ==========================================
// 仓储定价运营系统 - API层错误类型
// ==========================================
// 职责: 汇总引擎/后端/仓储错误，转换为面向操作员的错误消息
// 红线: 每个错误都带显式原因；发布失败必须携带后端原始错误日志
// ==========================================

use crate::backend::BackendError;
use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 校验与状态机错误（本地处理，不发送到后端）
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    /// 操作员输入校验失败（带逐项原因）
    #[error("操作校验失败: {reason}")]
    ValidationError {
        reason: String,
        violations: Vec<ValidationViolation>,
    },

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    /// 请求序号未知、已完成或类型不符
    #[error("请求已失效: {0}")]
    StaleRequest(String),

    #[error("没有活动的定价会话")]
    NoActiveSession,

    // ==========================================
    // 后端错误
    // ==========================================
    /// 发布失败；台账保持不变，可重试
    #[error("发布失败: {raw_log}")]
    PublishFailed { raw_log: String },

    #[error("后端调用失败: {raw_log}")]
    BackendError { raw_log: String },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 是否为本地校验类错误（界面表现为禁用确认/高亮输入）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ApiError::InvalidInput(_) | ApiError::ValidationError { .. }
        )
    }

    /// 后端原始错误日志（非后端错误时为 None）
    pub fn raw_log(&self) -> Option<&str> {
        match self {
            ApiError::PublishFailed { raw_log } | ApiError::BackendError { raw_log } => Some(raw_log),
            _ => None,
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let reason = err.to_string();
        match err {
            EngineError::NotInSavedPartition { unit_ids } => ApiError::ValidationError {
                reason,
                violations: unit_ids
                    .into_iter()
                    .map(|id| ValidationViolation::new("NOT_SAVED", None, id, "单元未处于 SAVED 分区"))
                    .collect(),
            },
            EngineError::NotStaged {
                facility_id,
                unit_ids,
            } => ApiError::ValidationError {
                reason,
                violations: unit_ids
                    .into_iter()
                    .map(|id| {
                        ValidationViolation::new("NOT_STAGED", Some(facility_id.clone()), id, "单元没有暂存编辑")
                    })
                    .collect(),
            },
            EngineError::UnitNotFound { .. } => ApiError::NotFound(reason),
            EngineError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            EngineError::NoPendingDraft { .. } => ApiError::InvalidInput(reason),
            EngineError::UnknownRequest(_) | EngineError::RequestKindMismatch { .. } => {
                ApiError::StaleRequest(reason)
            }
            other if other.is_validation() => ApiError::ValidationError {
                reason,
                violations: Vec::new(),
            },
            _ => ApiError::InternalError(reason),
        }
    }
}

// ==========================================
// 从 BackendError 转换（非发布路径）
// ==========================================
impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        ApiError::BackendError {
            raw_log: err.raw_log(),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::DatabaseError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

// ==========================================
// 校验违规详情
// ==========================================

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidationViolation {
    /// 违规类型（NOT_SAVED / NOT_STAGED）
    pub violation_type: String,
    pub facility_id: Option<String>,
    pub unit_id: String,
    pub reason: String,
}

impl ValidationViolation {
    fn new(violation_type: &str, facility_id: Option<String>, unit_id: String, reason: &str) -> Self {
        Self {
            violation_type: violation_type.to_string(),
            facility_id,
            unit_id,
            reason: reason.to_string(),
        }
    }
}
