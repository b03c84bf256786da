// ==========================================
// 仓储定价运营系统 - 后端定价服务契约
// ==========================================
// 职责: 定义后端请求/响应形状与异步 trait
// 红线: 响应以原始 JSON 记录返回，字段名差异只在 normalize 中处理一次
// ==========================================

pub mod http;
pub mod normalize;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::facility::{AnchorInfo, LinkInfo, LockInfo, Relationship, UnitTypeStatistic};

pub use http::HttpPricingBackend;
pub use normalize::{normalize_facilities, normalize_link_candidates, LinkCandidate};

/// 后端原始记录（字段名未规范化）
pub type RawRecord = Map<String, Value>;

// ==========================================
// 错误类型
// ==========================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("后端请求失败: {0}")]
    Transport(String),

    #[error("后端请求超时")]
    Timeout,

    #[error("后端返回错误状态 {status}: {body}")]
    Status { status: u16, body: String },

    #[error("后端响应解析失败: {0}")]
    Decode(String),
}

impl BackendError {
    /// 原始错误日志（展示给操作员）
    pub fn raw_log(&self) -> String {
        match self {
            BackendError::Status { body, .. } if !body.trim().is_empty() => body.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

// ==========================================
// 请求/响应形状
// ==========================================

/// 门店查询条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub facility_ids: Vec<String>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for FacilityQuery {
    fn default() -> Self {
        Self {
            date_from: None,
            date_to: None,
            facility_ids: Vec::new(),
            page: 1,
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
}

/// 门店拉取响应（原始）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFacilitiesResponse {
    #[serde(default)]
    pub result: Vec<RawRecord>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishAllRequest {
    pub ecri_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishIndividualRequest {
    pub facility_id: String,
    pub ecri_ids: Vec<String>,
}

/// 单元设置推送: 关联/锚定 + 锁定子对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSettingsRequest {
    pub facility_id: String,
    pub unit_type_id: String,
    pub link: Option<LinkInfo>,
    pub category_data: Option<AnchorInfo>,
    pub lock: Option<LockInfo>,
}

impl UnitSettingsRequest {
    pub fn from_unit(facility_id: &str, unit: &UnitTypeStatistic) -> Self {
        let (link, category_data) = match &unit.relationship {
            Relationship::Unlinked => (None, None),
            Relationship::Linked(link) => (Some(link.clone()), None),
            Relationship::Anchored(anchor) => (None, Some(anchor.clone())),
        };
        Self {
            facility_id: facility_id.to_string(),
            unit_type_id: unit.id.clone(),
            link,
            category_data,
            lock: unit.lock.to_lock_info(),
        }
    }
}

// ==========================================
// PricingBackend Trait
// ==========================================

/// 后端定价服务
///
/// 生产环境使用 [`HttpPricingBackend`]，测试使用内存实现
#[async_trait]
pub trait PricingBackend: Send + Sync {
    /// 拉取门店与单元类型统计
    async fn fetch_facilities(&self, query: &FacilityQuery) -> BackendResult<RawFacilitiesResponse>;

    /// 拉取门店可关联的单元类型候选
    async fn fetch_link_candidates(&self, facility_id: &str) -> BackendResult<Vec<RawRecord>>;

    /// 全组合发布
    async fn publish_all(&self, request: &PublishAllRequest) -> BackendResult<()>;

    /// 单门店发布
    async fn publish_individual(&self, request: &PublishIndividualRequest) -> BackendResult<()>;

    /// 推送单元关联/锁定设置
    async fn update_unit_settings(&self, request: &UnitSettingsRequest) -> BackendResult<()>;
}
