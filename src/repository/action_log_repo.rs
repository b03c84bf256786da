// ==========================================
// 仓储定价运营系统 - 操作日志数据仓储
// ==========================================
// 红线: 保存、放弃、发布、设置推送的每次尝试都必须记录（含失败）
// 说明: 暂存编辑本身不落盘
// ==========================================

mod core;
mod queries;


pub use core::ActionLogRepository;
