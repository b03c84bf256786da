// ==========================================
// 仓储定价运营系统 - 在途请求表
// ==========================================
// 职责: 会话内所有异步请求按单调序号登记，响应按序号对账
// 规则:
// - 拉取响应只有属于最新一次拉取时才被采纳，其余视为过期丢弃
// - 未知或已完成的序号被确定性拒绝
// ==========================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::publish::PublishSnapshot;

/// 请求类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    FetchFacilities,
    FetchLinkCandidates { facility_id: String },
    Publish { snapshot: PublishSnapshot },
    UpdateSettings { facility_id: String, unit_id: String },
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::FetchFacilities => "FETCH_FACILITIES",
            RequestKind::FetchLinkCandidates { .. } => "FETCH_LINK_CANDIDATES",
            RequestKind::Publish { .. } => "PUBLISH",
            RequestKind::UpdateSettings { .. } => "UPDATE_SETTINGS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub seq: u64,
    pub kind: RequestKind,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PendingRequests {
    last_seq: u64,
    in_flight: BTreeMap<u64, PendingRequest>,
    latest_fetch_seq: Option<u64>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记请求，返回新序号
    pub fn register(&mut self, kind: RequestKind) -> u64 {
        self.last_seq += 1;
        let seq = self.last_seq;
        if kind == RequestKind::FetchFacilities {
            self.latest_fetch_seq = Some(seq);
        }
        tracing::debug!(seq, kind = kind.as_str(), "登记在途请求");
        self.in_flight.insert(
            seq,
            PendingRequest {
                seq,
                kind,
                issued_at: Utc::now(),
            },
        );
        seq
    }

    /// 取出并完成请求
    pub fn complete(&mut self, seq: u64) -> EngineResult<PendingRequest> {
        self.in_flight
            .remove(&seq)
            .ok_or(EngineError::UnknownRequest(seq))
    }

    /// 是否为最新一次门店拉取
    pub fn is_latest_fetch(&self, seq: u64) -> bool {
        self.latest_fetch_seq == Some(seq)
    }

    pub fn get(&self, seq: u64) -> Option<&PendingRequest> {
        self.in_flight.get(&seq)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// 会话结束: 丢弃全部在途登记，序号不回退
    pub fn clear(&mut self) {
        self.in_flight.clear();
        self.latest_fetch_seq = None;
    }
}
