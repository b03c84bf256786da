// ==========================================
// 仓储定价运营系统 - 定价操作 API
// ==========================================
// 职责: 会话状态与后端调用之间的异步门面（拉取、改价、保存、发布、设置推送）
// 红线:
// - 会话锁绝不跨 `.await` 持有：先在锁内登记请求，释放后调用后端，再在锁内按序号对账
// - 保存、放弃、发布、设置推送的每次尝试都写入审计日志（含失败）
// ==========================================

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::backend::{FacilityQuery, PricingBackend};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::engine::error::EngineError;
use crate::engine::events::{OptionalEventPublisher, StagingEvent, StagingEventType};
use crate::engine::{
    EditOutcome, FetchOutcome, PricingSession, PublishPlan, PublishReport, PublishRequest,
    PublishTarget, StagingSummary, StagingViews,
};
use crate::perf::PerfGuard;
use crate::repository::action_log_repo::ActionLogRepository;

/// 发布调用结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishOutcome {
    /// 没有可发布的 SAVED 单元，未调用后端
    NothingToPublish,
    Published(PublishReport),
}

// ==========================================
// PricingApi - 定价操作 API
// ==========================================
pub struct PricingApi {
    session: Arc<Mutex<PricingSession>>,
    backend: Arc<dyn PricingBackend>,
    action_log_repo: Option<Arc<ActionLogRepository>>,
    events: OptionalEventPublisher,
    query: FacilityQuery,
}

impl PricingApi {
    pub fn new(session: Arc<Mutex<PricingSession>>, backend: Arc<dyn PricingBackend>) -> Self {
        Self {
            session,
            backend,
            action_log_repo: None,
            events: OptionalEventPublisher::none(),
            query: FacilityQuery::default(),
        }
    }

    pub fn with_audit(mut self, repo: Arc<ActionLogRepository>) -> Self {
        self.action_log_repo = Some(repo);
        self
    }

    pub fn with_events(mut self, events: OptionalEventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn with_query(mut self, query: FacilityQuery) -> Self {
        self.query = query;
        self
    }

    pub fn session(&self) -> Arc<Mutex<PricingSession>> {
        Arc::clone(&self.session)
    }

    fn lock(&self) -> ApiResult<MutexGuard<'_, PricingSession>> {
        self.session
            .lock()
            .map_err(|e| ApiError::InternalError(format!("会话锁获取失败: {}", e)))
    }

    /// 在会话锁内执行同步操作（关联/锁定状态机等）
    pub fn with_session<R>(&self, f: impl FnOnce(&mut PricingSession) -> R) -> ApiResult<R> {
        let mut session = self.lock()?;
        Ok(f(&mut session))
    }

    // ==========================================
    // 拉取
    // ==========================================

    /// 拉取全组合门店数据
    ///
    /// # 返回
    /// - `Ok(Adopted)`: 数据已覆盖写入仓
    /// - `Ok(Stale)`: 期间发出了更新的拉取，本次响应被丢弃
    /// - `Err(BackendError)`: 后端调用失败，仓保持不变
    pub async fn refresh_facilities(&self) -> ApiResult<FetchOutcome> {
        let seq = self.lock()?.begin_fetch();

        let result = {
            let _perf = PerfGuard::new("api.refresh_facilities");
            self.backend.fetch_facilities(&self.query).await
        };

        let mut session = self.lock()?;
        match result {
            Ok(raw) => {
                let outcome = session.complete_fetch(seq, raw)?;
                if matches!(outcome, FetchOutcome::Adopted { .. }) {
                    self.events.emit(StagingEvent::portfolio(
                        session.session_id(),
                        StagingEventType::FacilitiesReloaded,
                        session.tracker().revision(),
                    ));
                }
                Ok(outcome)
            }
            Err(e) => {
                let _ = session.abandon_request(seq);
                tracing::warn!(seq, error = %e, "门店拉取失败");
                Err(e.into())
            }
        }
    }

    /// 并发拉取多个门店的可关联候选
    ///
    /// 单个门店失败只记录警告；返回成功加载的候选总数
    pub async fn load_link_candidates(&self, facility_ids: &[String]) -> ApiResult<usize> {
        let seqs: Vec<u64> = {
            let mut session = self.lock()?;
            facility_ids
                .iter()
                .map(|fid| session.begin_link_candidates(fid))
                .collect()
        };

        let results = join_all(
            facility_ids
                .iter()
                .map(|fid| self.backend.fetch_link_candidates(fid)),
        )
        .await;

        let mut session = self.lock()?;
        let mut loaded = 0;
        for ((seq, fid), result) in seqs.into_iter().zip(facility_ids).zip(results) {
            match result {
                Ok(records) => loaded += session.complete_link_candidates(seq, &records)?,
                Err(e) => {
                    let _ = session.abandon_request(seq);
                    tracing::warn!(facility_id = %fid, error = %e, "可关联候选拉取失败");
                }
            }
        }
        Ok(loaded)
    }

    // ==========================================
    // 改价 / 保存 / 放弃
    // ==========================================

    pub fn edit_rate(&self, facility_id: &str, unit_id: &str, rate: f64) -> ApiResult<EditOutcome> {
        let mut session = self.lock()?;
        let outcome = session.edit_rate(facility_id, unit_id, rate)?;
        if outcome.is_applied() {
            self.emit_ledger_changed(&session, facility_id);
        }
        Ok(outcome)
    }

    /// 保存单元（NEW → SAVED）
    pub fn save_units(&self, facility_id: &str, unit_ids: &[String]) -> ApiResult<usize> {
        let mut session = self.lock()?;
        let log = ActionLog::new(session.session_id(), ActionType::SaveUnits, session.operator())
            .with_facility(facility_id)
            .with_payload(&unit_ids);

        match session.save_units(facility_id, unit_ids) {
            Ok(count) => {
                self.audit(log);
                self.emit_ledger_changed(&session, facility_id);
                Ok(count)
            }
            Err(e) => {
                self.audit(log.failed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// 放弃门店全部暂存编辑
    pub fn discard_changes(&self, facility_id: &str) -> ApiResult<bool> {
        let mut session = self.lock()?;
        let removed = session.clear_changes_for_facility(facility_id);
        if removed {
            self.audit(
                ActionLog::new(session.session_id(), ActionType::DiscardChanges, session.operator())
                    .with_facility(facility_id),
            );
            self.emit_ledger_changed(&session, facility_id);
        }
        Ok(removed)
    }

    // ==========================================
    // 发布
    // ==========================================

    /// 全组合发布全部 SAVED 单元
    pub async fn publish_all(&self) -> ApiResult<PublishOutcome> {
        self.publish(PublishTarget::Portfolio, None).await
    }

    /// 单门店发布全部 SAVED 单元
    pub async fn publish_individual(&self, facility_id: &str) -> ApiResult<PublishOutcome> {
        self.publish(PublishTarget::Facility(facility_id.to_string()), None)
            .await
    }

    /// 以操作员选定的 id 发布；id 必须全部处于 SAVED 分区
    pub async fn publish_ids(&self, target: PublishTarget, saved_ids: Vec<String>) -> ApiResult<PublishOutcome> {
        self.publish(target, Some(saved_ids)).await
    }

    async fn publish(&self, target: PublishTarget, saved_ids: Option<Vec<String>>) -> ApiResult<PublishOutcome> {
        let (plan, session_id, operator) = {
            let mut session = self.lock()?;
            let plan = match &saved_ids {
                Some(ids) => session.begin_publish(target.clone(), ids),
                None => session.begin_publish_saved(target.clone()),
            }?;
            (plan, session.session_id().to_string(), session.operator().to_string())
        };

        let ticket = match plan {
            PublishPlan::NothingToPublish => return Ok(PublishOutcome::NothingToPublish),
            PublishPlan::Ready(ticket) => ticket,
        };

        let (action_type, facility_id) = match &target {
            PublishTarget::Portfolio => (ActionType::PublishAll, None),
            PublishTarget::Facility(fid) => (ActionType::PublishFacility, Some(fid.as_str())),
        };
        let mut log = ActionLog::new(&session_id, action_type, &operator).with_payload(&ticket.request);
        if let Some(fid) = facility_id {
            log = log.with_facility(fid);
        }

        let result = {
            let _perf = PerfGuard::new("api.publish");
            match &ticket.request {
                PublishRequest::All(request) => self.backend.publish_all(request).await,
                PublishRequest::Individual(request) => self.backend.publish_individual(request).await,
            }
        };

        // 审计以后端结果为准，先于本地对账写入
        match &result {
            Ok(()) => self.audit(log),
            Err(e) => self.audit(log.failed(e.raw_log())),
        }

        let mut session = self.lock()?;
        match result {
            Ok(()) => {
                let report = match session.complete_publish(ticket.seq) {
                    Ok(report) => report,
                    Err(EngineError::UnknownRequest(seq)) => {
                        tracing::warn!(seq, "发布已被后端确认，但会话已重置，无台账可对账");
                        PublishReport::unreconciled(ticket.seq, ticket.snapshot.clone())
                    }
                    Err(e) => return Err(e.into()),
                };
                self.events.emit(StagingEvent::for_facilities(
                    session.session_id(),
                    StagingEventType::Published,
                    ticket.snapshot.facility_ids.clone(),
                    session.tracker().revision(),
                ));
                Ok(PublishOutcome::Published(report))
            }
            Err(e) => {
                let raw_log = e.raw_log();
                match session.fail_publish(ticket.seq) {
                    Ok(_) | Err(EngineError::UnknownRequest(_)) => {}
                    Err(other) => return Err(other.into()),
                }
                self.events.emit(StagingEvent::for_facilities(
                    session.session_id(),
                    StagingEventType::PublishFailed,
                    ticket.snapshot.facility_ids.clone(),
                    session.tracker().revision(),
                ));
                Err(ApiError::PublishFailed { raw_log })
            }
        }
    }

    // ==========================================
    // 单元设置推送
    // ==========================================

    /// 推送单元当前的关联/锚定 + 锁定设置
    pub async fn push_unit_settings(&self, facility_id: &str, unit_id: &str) -> ApiResult<()> {
        let (seq, request, log) = {
            let mut session = self.lock()?;
            let (seq, request) = session.begin_settings_push(facility_id, unit_id)?;
            let log = ActionLog::new(session.session_id(), ActionType::UpdateSettings, session.operator())
                .with_facility(facility_id)
                .with_payload(&request);
            (seq, request, log)
        };

        let result = self.backend.update_unit_settings(&request).await;
        match &result {
            Ok(()) => self.audit(log),
            Err(e) => self.audit(log.failed(e.raw_log())),
        }

        let mut session = self.lock()?;
        match result {
            Ok(()) => {
                match session.complete_settings_push(seq) {
                    Ok(()) | Err(EngineError::UnknownRequest(_)) => {}
                    Err(e) => return Err(e.into()),
                }
                self.events.emit(StagingEvent::for_facilities(
                    session.session_id(),
                    StagingEventType::SettingsPushed,
                    vec![facility_id.to_string()],
                    session.tracker().revision(),
                ));
                Ok(())
            }
            Err(e) => {
                let _ = session.abandon_request(seq);
                Err(e.into())
            }
        }
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn staging_summary(&self) -> ApiResult<StagingSummary> {
        Ok(self.lock()?.summary())
    }

    pub fn views(&self) -> ApiResult<Arc<StagingViews>> {
        Ok(self.lock()?.views())
    }

    // ==========================================
    // 内部
    // ==========================================

    /// 写审计日志；失败只记录警告，不影响操作结果
    fn audit(&self, log: ActionLog) {
        let Some(repo) = &self.action_log_repo else {
            return;
        };
        if let Err(e) = repo.insert(&log) {
            tracing::warn!(action_type = %log.action_type, error = %e, "审计日志写入失败");
        }
    }

    fn emit_ledger_changed(&self, session: &PricingSession, facility_id: &str) {
        self.events.emit(StagingEvent::for_facilities(
            session.session_id(),
            StagingEventType::LedgerChanged,
            vec![facility_id.to_string()],
            session.tracker().revision(),
        ));
    }
}
