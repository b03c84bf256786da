// ==========================================
// 仓储定价运营系统 - 定价会话 (Pricing Session)
// ==========================================
// 职责: 显式状态容器，持有单元记录仓、暂存台账、关联/锁定草稿、在途请求表、派生视图
// 生命周期: 登录时创建，登出时销毁（暂存编辑不跨会话保留）
// 红线: 所有状态变更在同一逻辑线程内完成；网络调用由上层在锁外执行
// ==========================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{
    normalize_facilities, normalize_link_candidates, LinkCandidate, RawFacilitiesResponse, RawRecord,
    UnitSettingsRequest,
};
use crate::domain::facility::{projected_rate, LockState, Relationship, UnitTypeStatistic};
use crate::domain::types::CategoryGuide;
use crate::engine::change_tracker::{ChangeTracker, EditOutcome};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::pending::{PendingRequest, PendingRequests, RequestKind};
use crate::engine::publish::{PublishCoordinator, PublishPlan, PublishReport, PublishSnapshot, PublishTarget};
use crate::engine::relationship::{require_unit, RelationshipResolver};
use crate::engine::unit_store::UnitStore;
use crate::engine::views::{DerivedViews, StagingViews};

/// 拉取响应对账结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchOutcome {
    Adopted { facility_count: usize, total: u64 },
    /// 已有更新的拉取发出，本响应被丢弃
    Stale,
}

/// 会话概要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingSummary {
    pub session_id: String,
    pub operator: String,
    pub facility_count: usize,
    pub total: u64,
    pub staged_units: usize,
    pub facilities_with_changes: usize,
    pub facilities_with_unsaved: usize,
    pub in_flight_requests: usize,
    pub revision: u64,
}

#[derive(Debug)]
pub struct PricingSession {
    session_id: String,
    operator: String,
    started_at: DateTime<Utc>,
    store: UnitStore,
    tracker: ChangeTracker,
    resolver: RelationshipResolver,
    pending: PendingRequests,
    views: DerivedViews,
    link_candidates: HashMap<String, Vec<LinkCandidate>>,
}

impl PricingSession {
    pub fn new(operator: &str) -> Self {
        let session = Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            operator: operator.to_string(),
            started_at: Utc::now(),
            store: UnitStore::new(),
            tracker: ChangeTracker::new(),
            resolver: RelationshipResolver::new(),
            pending: PendingRequests::new(),
            views: DerivedViews::new(),
            link_candidates: HashMap::new(),
        };
        tracing::info!(session_id = %session.session_id, operator, "定价会话已创建");
        session
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn store(&self) -> &UnitStore {
        &self.store
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn resolver(&self) -> &RelationshipResolver {
        &self.resolver
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    // ==========================================
    // 拉取
    // ==========================================

    /// 登记门店拉取，返回请求序号
    pub fn begin_fetch(&mut self) -> u64 {
        self.pending.register(RequestKind::FetchFacilities)
    }

    /// 门店拉取响应对账
    ///
    /// 仅最新一次拉取被采纳（整体覆盖，后写者胜）；采纳后把仍在台账中的
    /// 暂存单元重新叠加到仓中，保持展示值与暂存值一致
    pub fn complete_fetch(&mut self, seq: u64, raw: RawFacilitiesResponse) -> EngineResult<FetchOutcome> {
        self.take_request(seq, "FETCH_FACILITIES", |k| matches!(k, RequestKind::FetchFacilities))?;
        if !self.pending.is_latest_fetch(seq) {
            tracing::info!(seq, "门店拉取响应已过期，丢弃");
            return Ok(FetchOutcome::Stale);
        }

        let (facilities, total) = normalize_facilities(raw);
        let facility_count = facilities.len();
        self.store.replace_all(facilities, total);

        let mut overlaid = 0;
        for entry in self.tracker.ledger() {
            if self.store.find_facility(&entry.facility_id).is_none() {
                continue;
            }
            for staged in &entry.units_statistics {
                self.store.upsert_unit(&entry.facility_id, staged.unit.clone());
                overlaid += 1;
            }
        }

        tracing::info!(seq, facility_count, total, overlaid, "门店数据已加载");
        Ok(FetchOutcome::Adopted { facility_count, total })
    }

    /// 登记可关联候选拉取
    pub fn begin_link_candidates(&mut self, facility_id: &str) -> u64 {
        self.pending.register(RequestKind::FetchLinkCandidates {
            facility_id: facility_id.to_string(),
        })
    }

    /// 可关联候选响应对账，返回候选数量
    pub fn complete_link_candidates(&mut self, seq: u64, records: &[RawRecord]) -> EngineResult<usize> {
        let request = self.take_request(seq, "FETCH_LINK_CANDIDATES", |k| {
            matches!(k, RequestKind::FetchLinkCandidates { .. })
        })?;
        let RequestKind::FetchLinkCandidates { facility_id } = request.kind else {
            return Err(EngineError::RequestKindMismatch {
                seq,
                expected: "FETCH_LINK_CANDIDATES",
            });
        };

        let candidates = normalize_link_candidates(records);
        let count = candidates.len();
        tracing::debug!(seq, facility_id = %facility_id, count, "可关联候选已加载");
        self.link_candidates.insert(facility_id, candidates);
        Ok(count)
    }

    pub fn link_candidates(&self, facility_id: &str) -> &[LinkCandidate] {
        self.link_candidates
            .get(facility_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 放弃在途请求（传输失败等），不影响台账
    pub fn abandon_request(&mut self, seq: u64) -> EngineResult<()> {
        let request = self.pending.complete(seq)?;
        tracing::debug!(seq, kind = request.kind.as_str(), "在途请求已放弃");
        Ok(())
    }

    // ==========================================
    // 编辑 / 保存 / 放弃
    // ==========================================

    pub fn apply_edit(&mut self, facility_id: &str, unit: UnitTypeStatistic, is_new_edit: bool) -> EditOutcome {
        self.tracker.apply_edit(&mut self.store, facility_id, unit, is_new_edit)
    }

    /// 编辑新价格；价格必须为非负有限值
    pub fn edit_rate(&mut self, facility_id: &str, unit_id: &str, rate: f64) -> EngineResult<EditOutcome> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(EngineError::InvalidRate(rate));
        }
        if self.store.find_facility(facility_id).is_none() {
            tracing::debug!(facility_id, unit_id, "门店尚未加载，忽略改价");
            return Ok(EditOutcome::FacilityNotLoaded);
        }
        let unit = require_unit(&self.store, facility_id, unit_id)?.clone().with_rate(rate);
        Ok(self.tracker.apply_edit(&mut self.store, facility_id, unit, true))
    }

    pub fn save_units(&mut self, facility_id: &str, unit_ids: &[String]) -> EngineResult<usize> {
        self.tracker.save_units(facility_id, unit_ids)
    }

    pub fn discard_unit(&mut self, facility_id: &str, unit_id: &str) -> bool {
        self.tracker.discard_unit(facility_id, unit_id)
    }

    pub fn clear_changes_for_facility(&mut self, facility_id: &str) -> bool {
        self.tracker.clear_changes_for_facility(facility_id)
    }

    // ==========================================
    // 关联 / 锚定
    // ==========================================

    pub fn begin_link(&mut self, facility_id: &str, unit_id: &str) -> EngineResult<()> {
        self.resolver.begin_link(&self.store, facility_id, unit_id)
    }

    /// 选择关联目标；目标可以是同门店单元，或已加载的可关联候选
    pub fn select_link_target(&mut self, facility_id: &str, unit_id: &str, target_id: &str) -> EngineResult<()> {
        let extra: Vec<String> = self
            .link_candidates(facility_id)
            .iter()
            .map(|c| c.id.clone())
            .collect();
        self.resolver
            .select_link_target(&self.store, facility_id, unit_id, target_id, &extra)
    }

    pub fn set_link_adjustment(&mut self, facility_id: &str, unit_id: &str, input: &str) -> EngineResult<f64> {
        self.resolver.set_link_adjustment(facility_id, unit_id, input)
    }

    pub fn confirm_link(&mut self, facility_id: &str, unit_id: &str) -> EngineResult<EditOutcome> {
        self.resolver
            .confirm_link(&mut self.store, &mut self.tracker, facility_id, unit_id)
    }

    pub fn begin_anchor(&mut self, facility_id: &str, unit_id: &str) -> EngineResult<()> {
        self.resolver.begin_anchor(&self.store, facility_id, unit_id)
    }

    pub fn select_anchor_guide(&mut self, facility_id: &str, unit_id: &str, guide: CategoryGuide) -> EngineResult<()> {
        self.resolver.select_anchor_guide(facility_id, unit_id, guide)
    }

    pub fn set_anchor_variance(&mut self, facility_id: &str, unit_id: &str, input: &str) -> EngineResult<f64> {
        self.resolver.set_anchor_variance(facility_id, unit_id, input)
    }

    pub fn confirm_anchor(&mut self, facility_id: &str, unit_id: &str) -> EngineResult<EditOutcome> {
        self.resolver
            .confirm_anchor(&mut self.store, &mut self.tracker, facility_id, unit_id)
    }

    pub fn cancel_relation_draft(&mut self, facility_id: &str, unit_id: &str) -> bool {
        self.resolver.cancel_relation_draft(facility_id, unit_id)
    }

    pub fn remove_relationship(&mut self, facility_id: &str, unit_id: &str) -> EngineResult<EditOutcome> {
        self.resolver
            .remove_relationship(&mut self.store, &mut self.tracker, facility_id, unit_id)
    }

    /// 关联单元的预览价格（目标价格 × 调整比例）；目标不在仓中时为 None
    pub fn preview_linked_rate(&self, facility_id: &str, unit_id: &str) -> Option<f64> {
        let unit = self.store.find_unit(facility_id, unit_id)?;
        match &unit.relationship {
            Relationship::Linked(link) => {
                let target = self.store.find_unit(facility_id, &link.linked_unit_type_id)?;
                Some(projected_rate(target.rate, link.adjustment_percentage))
            }
            _ => None,
        }
    }

    // ==========================================
    // 锁定
    // ==========================================

    pub fn begin_lock(&mut self, facility_id: &str, unit_id: &str, today: NaiveDate) -> EngineResult<()> {
        self.resolver.begin_lock(&self.store, facility_id, unit_id, today)
    }

    pub fn lock_now(&mut self, facility_id: &str, unit_id: &str) -> EngineResult<EditOutcome> {
        self.resolver
            .lock_now(&mut self.store, &mut self.tracker, facility_id, unit_id)
    }

    pub fn choose_schedule(&mut self, facility_id: &str, unit_id: &str) -> EngineResult<()> {
        self.resolver.choose_schedule(facility_id, unit_id)
    }

    pub fn set_lock_expiration(
        &mut self,
        facility_id: &str,
        unit_id: &str,
        expiration: NaiveDate,
        today: NaiveDate,
    ) -> EngineResult<()> {
        self.resolver
            .set_lock_expiration(facility_id, unit_id, expiration, today)
    }

    pub fn confirm_scheduled_lock(&mut self, facility_id: &str, unit_id: &str, today: NaiveDate) -> EngineResult<EditOutcome> {
        self.resolver
            .confirm_scheduled_lock(&mut self.store, &mut self.tracker, facility_id, unit_id, today)
    }

    pub fn cancel_lock_draft(&mut self, facility_id: &str, unit_id: &str) -> bool {
        self.resolver.cancel_lock_draft(facility_id, unit_id)
    }

    pub fn unlock(&mut self, facility_id: &str, unit_id: &str, today: NaiveDate) -> EngineResult<EditOutcome> {
        self.resolver
            .unlock(&mut self.store, &mut self.tracker, facility_id, unit_id, today)
    }

    /// 读取时的锁定状态（到期的排期锁定视为未锁定）
    pub fn effective_lock(&self, facility_id: &str, unit_id: &str, today: NaiveDate) -> Option<LockState> {
        self.store
            .find_unit(facility_id, unit_id)
            .map(|u| u.lock.effective(today))
    }

    // ==========================================
    // 发布
    // ==========================================

    /// 以给定 id 构建发布请求
    pub fn begin_publish(&mut self, target: PublishTarget, saved_ids: &[String]) -> EngineResult<PublishPlan> {
        PublishCoordinator::begin(&self.tracker, &mut self.pending, target, saved_ids)
    }

    /// 以范围内全部 SAVED 单元构建发布请求
    pub fn begin_publish_saved(&mut self, target: PublishTarget) -> EngineResult<PublishPlan> {
        let ids = PublishCoordinator::saved_ids(&self.tracker, &target);
        self.begin_publish(target, &ids)
    }

    pub fn complete_publish(&mut self, seq: u64) -> EngineResult<PublishReport> {
        PublishCoordinator::complete_success(&mut self.tracker, &mut self.pending, seq)
    }

    pub fn fail_publish(&mut self, seq: u64) -> EngineResult<PublishSnapshot> {
        PublishCoordinator::complete_failure(&mut self.pending, seq)
    }

    // ==========================================
    // 单元设置推送
    // ==========================================

    /// 登记设置推送，返回序号与请求体（单元当前的关联 + 锁定子对象）
    pub fn begin_settings_push(&mut self, facility_id: &str, unit_id: &str) -> EngineResult<(u64, UnitSettingsRequest)> {
        let unit = require_unit(&self.store, facility_id, unit_id)?;
        let request = UnitSettingsRequest::from_unit(facility_id, unit);
        let seq = self.pending.register(RequestKind::UpdateSettings {
            facility_id: facility_id.to_string(),
            unit_id: unit_id.to_string(),
        });
        Ok((seq, request))
    }

    pub fn complete_settings_push(&mut self, seq: u64) -> EngineResult<()> {
        self.take_request(seq, "UPDATE_SETTINGS", |k| matches!(k, RequestKind::UpdateSettings { .. }))?;
        Ok(())
    }

    // ==========================================
    // 视图 / 概要 / 生命周期
    // ==========================================

    pub fn views(&mut self) -> Arc<StagingViews> {
        self.views.get(&self.tracker)
    }

    pub fn view_recompute_count(&self) -> u64 {
        self.views.recompute_count()
    }

    pub fn summary(&mut self) -> StagingSummary {
        let views = self.views();
        StagingSummary {
            session_id: self.session_id.clone(),
            operator: self.operator.clone(),
            facility_count: self.store.facilities().len(),
            total: self.store.total(),
            staged_units: views.all_staged_units.len(),
            facilities_with_changes: views.facilities_with_changes,
            facilities_with_unsaved: views.facilities_with_unsaved,
            in_flight_requests: self.pending.in_flight_count(),
            revision: self.tracker.revision(),
        }
    }

    /// 登出: 丢弃全部会话状态
    pub fn teardown(&mut self) {
        let discarded = self.tracker.ledger().len();
        self.store.clear();
        self.tracker.clear_all();
        self.resolver.clear();
        self.pending.clear();
        self.views.invalidate();
        self.link_candidates.clear();
        tracing::info!(session_id = %self.session_id, discarded_facilities = discarded, "定价会话已销毁");
    }

    /// 校验序号类型后完成请求；类型不符时请求保留
    fn take_request(
        &mut self,
        seq: u64,
        expected: &'static str,
        is_expected: impl Fn(&RequestKind) -> bool,
    ) -> EngineResult<PendingRequest> {
        match self.pending.get(seq) {
            Some(request) if is_expected(&request.kind) => self.pending.complete(seq),
            Some(_) => Err(EngineError::RequestKindMismatch { seq, expected }),
            None => Err(EngineError::UnknownRequest(seq)),
        }
    }
}
