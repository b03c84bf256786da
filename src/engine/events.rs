// ==========================================
// 仓储定价运营系统 - 暂存事件发布
// ==========================================
// 职责: 定义暂存/发布事件与发布者 trait，引擎层只依赖 trait
// 说明: 上层（如界面刷新、审计）实现适配器
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 暂存事件类型
// ==========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagingEventType {
    /// 台账变更（编辑、保存、放弃）
    LedgerChanged,
    /// 门店数据重新加载
    FacilitiesReloaded,
    /// 发布成功
    Published,
    /// 发布失败
    PublishFailed,
    /// 单元设置已推送
    SettingsPushed,
}

impl StagingEventType {
    pub fn as_str(&self) -> &str {
        match self {
            StagingEventType::LedgerChanged => "LedgerChanged",
            StagingEventType::FacilitiesReloaded => "FacilitiesReloaded",
            StagingEventType::Published => "Published",
            StagingEventType::PublishFailed => "PublishFailed",
            StagingEventType::SettingsPushed => "SettingsPushed",
        }
    }
}

/// 暂存事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingEvent {
    pub session_id: String,
    pub event_type: StagingEventType,
    /// 受影响门店（None 表示全组合）
    pub facility_ids: Option<Vec<String>>,
    /// 事件发生时的台账 revision
    pub revision: u64,
}

impl StagingEvent {
    /// 全组合事件
    pub fn portfolio(session_id: &str, event_type: StagingEventType, revision: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            event_type,
            facility_ids: None,
            revision,
        }
    }

    /// 指定门店事件
    pub fn for_facilities(
        session_id: &str,
        event_type: StagingEventType,
        facility_ids: Vec<String>,
        revision: u64,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            event_type,
            facility_ids: Some(facility_ids),
            revision,
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 暂存事件发布者
///
/// # 返回
/// - `Ok(id)`: 下游登记 id（不支持时为空字符串）
/// - `Err`: 发布失败；调用方只记录日志，不影响台账
pub trait StagingEventPublisher: Send + Sync {
    fn publish(&self, event: StagingEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作发布者（单元测试、命令行场景）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl StagingEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: StagingEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            session_id = %event.session_id,
            event_type = event.event_type.as_str(),
            "NoOpEventPublisher: 跳过事件发布"
        );
        Ok(String::new())
    }
}

/// 可选发布者包装，简化 Option<Arc<dyn StagingEventPublisher>> 的使用
#[derive(Clone, Default)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn StagingEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn StagingEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件；失败只记录警告
    pub fn emit(&self, event: StagingEvent) {
        let Some(publisher) = &self.inner else {
            return;
        };
        let event_type = event.event_type.as_str().to_string();
        if let Err(e) = publisher.publish(event) {
            tracing::warn!(event_type = %event_type, error = %e, "暂存事件发布失败");
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}
