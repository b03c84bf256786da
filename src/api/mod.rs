// ==========================================
// 仓储定价运营系统 - API 层
// ==========================================
// 职责: 提供会话级异步业务接口，供应用层与命令行调用
// ==========================================

pub mod error;
pub mod pricing_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult, ValidationViolation};
pub use pricing_api::{PricingApi, PublishOutcome};
