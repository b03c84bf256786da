// ==========================================
// 仓储定价运营系统 - 数据仓储层
// ==========================================
// 职责: 本地 SQLite 审计日志读写
// 红线: Repository 不含业务逻辑，暂存编辑不落盘
// ==========================================

pub mod action_log_repo;
pub mod error;

pub use action_log_repo::ActionLogRepository;
pub use error::{RepositoryError, RepositoryResult};
