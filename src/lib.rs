// ==========================================
// 仓储定价运营系统 - 核心库
// ==========================================
// 技术栈: Rust + tokio + reqwest + SQLite
// 系统定位: 调价暂存与发布引擎 (操作员最终决定发布内容)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 审计日志
pub mod repository;

// 引擎层 - 暂存/发布规则
pub mod engine;

// 后端层 - 定价服务契约与 HTTP 实现
pub mod backend;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 性能埋点
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 应用层 - 会话生命周期
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{CategoryGuide, StagePhase};

// 领域实体
pub use domain::{
    ActionLog, ActionType, ChangedFacility, Facility, LockState, Relationship, StagedUnit,
    UnitTypeStatistic,
};

// 引擎
pub use engine::{
    ChangeTracker, EngineError, PricingSession, PublishTarget, RelationshipResolver, StagingViews,
    UnitStore,
};

// 后端
pub use backend::{HttpPricingBackend, PricingBackend};

// API
pub use api::{ApiError, PricingApi, PublishOutcome};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "仓储定价运营系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert!(!APP_NAME.is_empty());
    }
}
