// ==========================================
// 仓储定价运营系统 - 引擎层错误类型
// ==========================================
// 职责: 本地同步校验失败与状态机拒绝
// 说明: 校验错误在入口处处理，绝不发送到后端
// ==========================================

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // ===== 关联/锚定校验 =====
    #[error("未选择关联目标: unit_id={unit_id}")]
    MissingLinkTarget { unit_id: String },

    #[error("未选择锚定类别: unit_id={unit_id}")]
    MissingAnchorGuide { unit_id: String },

    #[error("调整比例无效: {input:?}")]
    InvalidAdjustment { input: String },

    #[error("单元类型不能关联自身: unit_id={0}")]
    SelfLink(String),

    #[error("关联目标不在同一门店: facility_id={facility_id}, target_id={target_id}")]
    UnknownLinkTarget {
        facility_id: String,
        target_id: String,
    },

    #[error("关联形成环路: unit_id={unit_id}, target_id={target_id}")]
    LinkCycle { unit_id: String, target_id: String },

    // ===== 锁定校验 =====
    #[error("锁定到期日必须晚于今天: expiration={expiration}, today={today}")]
    ExpirationNotInFuture { expiration: String, today: String },

    // ===== 状态机 =====
    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("没有进行中的编辑步骤: facility_id={facility_id}, unit_id={unit_id}")]
    NoPendingDraft { facility_id: String, unit_id: String },

    // ===== 暂存/发布 =====
    #[error("单元类型不存在: facility_id={facility_id}, unit_id={unit_id}")]
    UnitNotFound { facility_id: String, unit_id: String },

    #[error("单元未处于暂存状态: facility_id={facility_id}, unit_ids={unit_ids:?}")]
    NotStaged {
        facility_id: String,
        unit_ids: Vec<String>,
    },

    #[error("发布列表包含未保存的单元: {unit_ids:?}")]
    NotInSavedPartition { unit_ids: Vec<String> },

    #[error("价格无效: {0}")]
    InvalidRate(f64),

    // ===== 请求序号 =====
    #[error("请求序号未知或已完成: seq={0}")]
    UnknownRequest(u64),

    #[error("请求类型不匹配: seq={seq}, expected={expected}")]
    RequestKindMismatch { seq: u64, expected: &'static str },
}

impl EngineError {
    /// 是否为操作员输入校验类错误（界面上表现为禁用确认按钮）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::MissingLinkTarget { .. }
                | EngineError::MissingAnchorGuide { .. }
                | EngineError::InvalidAdjustment { .. }
                | EngineError::SelfLink(_)
                | EngineError::UnknownLinkTarget { .. }
                | EngineError::LinkCycle { .. }
                | EngineError::ExpirationNotInFuture { .. }
                | EngineError::NotStaged { .. }
                | EngineError::NotInSavedPartition { .. }
                | EngineError::InvalidRate(_)
        )
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

/// 解析操作员输入的调整比例（百分比）
///
/// 允许前后空格与末尾 `%`；非数字或非有限值视为校验错误
pub fn parse_adjustment(input: &str) -> EngineResult<f64> {
    let trimmed = input.trim().trim_end_matches('%').trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(EngineError::InvalidAdjustment {
            input: input.to_string(),
        }),
    }
}
