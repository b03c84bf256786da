// ==========================================
// 仓储定价运营系统 - 应用层
// ==========================================
// 职责: 组装配置、审计、后端与会话
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
