// ==========================================
// 仓储定价运营系统 - 引擎层
// ==========================================
// 职责: 调价暂存与发布的核心规则（仓、台账、关联/锁定状态机、发布对账、派生视图）
// 红线: Engine 不做网络与 SQL；所有编辑经 ChangeTracker 登记
// ==========================================

pub mod change_tracker;
pub mod error;
pub mod events;
pub mod lock_schedule;
pub mod pending;
pub mod publish;
pub mod relationship;
pub mod session;
pub mod unit_store;
pub mod views;

// 重导出核心引擎
pub use change_tracker::{ChangeTracker, EditOutcome};
pub use error::{parse_adjustment, EngineError, EngineResult};
pub use events::{
    NoOpEventPublisher, OptionalEventPublisher, StagingEvent, StagingEventPublisher, StagingEventType,
};
pub use lock_schedule::LockDraft;
pub use pending::{PendingRequest, PendingRequests, RequestKind};
pub use publish::{
    PublishCoordinator, PublishPlan, PublishReport, PublishRequest, PublishSnapshot, PublishTarget,
    PublishTicket,
};
pub use relationship::{RelationDraft, RelationshipResolver, UnitKey};
pub use session::{FetchOutcome, PricingSession, StagingSummary};
pub use unit_store::UnitStore;
pub use views::{DerivedViews, StagingViews};
