// ==========================================
// 仓储定价运营系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod facility;
pub mod ledger;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionOutcome, ActionType};
pub use facility::{
    projected_rate, AnchorInfo, Facility, LinkInfo, LockInfo, LockState, Relationship,
    UnitTypeStatistic,
};
pub use ledger::{ChangedFacility, StagedUnit};
pub use types::{CategoryGuide, StagePhase};
