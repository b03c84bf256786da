// ==========================================
// 仓储定价运营系统 - 发布协调器 (Publish Coordinator)
// ==========================================
// 职责: 依据台账构建发布请求、登记在途、按后端确认对账
// 红线: 只允许提交 SAVED 分区中的单元 id
// 对账:
// - 成功: 受影响门店中快照时刻及之前暂存的单元全部移除（含 NEW），
//         发出请求之后的编辑保留，等待下一次发布
// - 失败: 台账保持不变，操作员可直接重试
// ==========================================

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::backend::{PublishAllRequest, PublishIndividualRequest};
use crate::domain::types::StagePhase;
use crate::engine::change_tracker::ChangeTracker;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::pending::{PendingRequests, RequestKind};

/// 发布范围
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "facility_id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishTarget {
    Portfolio,
    Facility(String),
}

/// 发出请求时捕获的快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishSnapshot {
    pub target: PublishTarget,
    pub unit_ids: Vec<String>,
    pub facility_ids: Vec<String>,
    /// 快照时刻的编辑序号水位
    pub edit_watermark: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PublishRequest {
    All(PublishAllRequest),
    Individual(PublishIndividualRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishTicket {
    pub seq: u64,
    pub request: PublishRequest,
    pub snapshot: PublishSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishPlan {
    /// 台账为空或无 id，未发出请求
    NothingToPublish,
    Ready(PublishTicket),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReport {
    pub seq: u64,
    pub target: PublishTarget,
    pub published_ids: Vec<String>,
    pub cleared_facilities: Vec<String>,
    /// 请求发出后新编辑、因而保留在台账中的单元数
    pub retained_units: usize,
}

impl PublishReport {
    /// 会话已重置时的报告: 后端已确认，但没有可对账的台账
    pub fn unreconciled(seq: u64, snapshot: PublishSnapshot) -> Self {
        Self {
            seq,
            target: snapshot.target,
            published_ids: snapshot.unit_ids,
            cleared_facilities: Vec::new(),
            retained_units: 0,
        }
    }
}

pub struct PublishCoordinator;

impl PublishCoordinator {
    /// 收集范围内全部 SAVED 单元 id（去重、保持台账顺序）
    pub fn saved_ids(tracker: &ChangeTracker, target: &PublishTarget) -> Vec<String> {
        let mut seen = BTreeSet::new();
        tracker
            .ledger()
            .iter()
            .filter(|entry| match target {
                PublishTarget::Portfolio => true,
                PublishTarget::Facility(fid) => &entry.facility_id == fid,
            })
            .flat_map(|entry| entry.units_in_phase(StagePhase::Saved))
            .filter(|unit| seen.insert(unit.id.clone()))
            .map(|unit| unit.id.clone())
            .collect()
    }

    /// 构建发布请求并登记在途
    ///
    /// # 返回
    /// - `NothingToPublish`: 范围内台账已清空或 id 为空
    /// - `Ready(ticket)`: 调用方用 ticket.request 调用后端，再按序号对账
    /// - `Err(NotInSavedPartition)`: 存在不在 SAVED 分区的 id，未登记任何请求
    pub fn begin(
        tracker: &ChangeTracker,
        pending: &mut PendingRequests,
        target: PublishTarget,
        saved_ids: &[String],
    ) -> EngineResult<PublishPlan> {
        let mut seen = BTreeSet::new();
        let unit_ids: Vec<String> = saved_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let scope_is_empty = match &target {
            PublishTarget::Portfolio => tracker.ledger().is_empty(),
            PublishTarget::Facility(fid) => tracker.entry(fid).is_none(),
        };
        if unit_ids.is_empty() || scope_is_empty {
            tracing::debug!(?target, requested = unit_ids.len(), "无可发布内容");
            return Ok(PublishPlan::NothingToPublish);
        }

        let mut facility_ids = BTreeSet::new();
        let mut rejected = Vec::new();
        for id in &unit_ids {
            let owners: Vec<&str> = tracker
                .ledger()
                .iter()
                .filter(|entry| match &target {
                    PublishTarget::Portfolio => true,
                    PublishTarget::Facility(fid) => &entry.facility_id == fid,
                })
                .filter(|entry| entry.find(id).map(|s| s.is_saved()).unwrap_or(false))
                .map(|entry| entry.facility_id.as_str())
                .collect();
            if owners.is_empty() {
                rejected.push(id.clone());
            }
            facility_ids.extend(owners.into_iter().map(str::to_string));
        }
        if !rejected.is_empty() {
            tracing::warn!(?target, rejected = ?rejected, "发布列表包含未保存单元，已拒绝");
            return Err(EngineError::NotInSavedPartition { unit_ids: rejected });
        }

        let snapshot = PublishSnapshot {
            target: target.clone(),
            unit_ids: unit_ids.clone(),
            facility_ids: facility_ids.into_iter().collect(),
            edit_watermark: tracker.last_edit_seq(),
        };
        let request = match &target {
            PublishTarget::Portfolio => PublishRequest::All(PublishAllRequest { ecri_ids: unit_ids }),
            PublishTarget::Facility(fid) => PublishRequest::Individual(PublishIndividualRequest {
                facility_id: fid.clone(),
                ecri_ids: unit_ids,
            }),
        };
        let seq = pending.register(RequestKind::Publish {
            snapshot: snapshot.clone(),
        });

        tracing::info!(
            seq,
            ?target,
            unit_count = snapshot.unit_ids.len(),
            facility_count = snapshot.facility_ids.len(),
            "发布请求已登记"
        );
        Ok(PublishPlan::Ready(PublishTicket {
            seq,
            request,
            snapshot,
        }))
    }

    /// 后端确认成功: 清理受影响门店的台账
    pub fn complete_success(
        tracker: &mut ChangeTracker,
        pending: &mut PendingRequests,
        seq: u64,
    ) -> EngineResult<PublishReport> {
        let snapshot = take_snapshot(pending, seq)?;

        let mut cleared_facilities = Vec::new();
        let mut retained_units = 0;
        for facility_id in &snapshot.facility_ids {
            let retained = tracker.clear_up_to(facility_id, snapshot.edit_watermark);
            if retained == 0 {
                cleared_facilities.push(facility_id.clone());
            }
            retained_units += retained;
        }

        tracing::info!(
            seq,
            published = snapshot.unit_ids.len(),
            cleared = cleared_facilities.len(),
            retained_units,
            "发布成功，台账已对账"
        );
        Ok(PublishReport {
            seq,
            target: snapshot.target,
            published_ids: snapshot.unit_ids,
            cleared_facilities,
            retained_units,
        })
    }

    /// 后端失败: 视为全部未发布，台账不变
    pub fn complete_failure(pending: &mut PendingRequests, seq: u64) -> EngineResult<PublishSnapshot> {
        let snapshot = take_snapshot(pending, seq)?;
        tracing::warn!(seq, target = ?snapshot.target, "发布失败，台账保持不变");
        Ok(snapshot)
    }
}

fn take_snapshot(pending: &mut PendingRequests, seq: u64) -> EngineResult<PublishSnapshot> {
    match pending.get(seq).map(|r| &r.kind) {
        Some(RequestKind::Publish { .. }) => {}
        Some(_) => {
            return Err(EngineError::RequestKindMismatch {
                seq,
                expected: "PUBLISH",
            })
        }
        None => return Err(EngineError::UnknownRequest(seq)),
    }
    match pending.complete(seq)?.kind {
        RequestKind::Publish { snapshot } => Ok(snapshot),
        _ => Err(EngineError::RequestKindMismatch {
            seq,
            expected: "PUBLISH",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::facility::{Facility, UnitTypeStatistic};
    use crate::engine::unit_store::UnitStore;

    fn setup() -> (UnitStore, ChangeTracker, PendingRequests) {
        let mut store = UnitStore::new();
        store.replace_all(
            vec![
                Facility::new(
                    "f1",
                    vec![
                        UnitTypeStatistic::new("u1", "5x5", 50.0),
                        UnitTypeStatistic::new("u2", "5x10", 80.0),
                    ],
                ),
                Facility::new("f2", vec![UnitTypeStatistic::new("u7", "10x20", 200.0)]),
            ],
            2,
        );
        (store, ChangeTracker::new(), PendingRequests::new())
    }

    fn edit(store: &mut UnitStore, tracker: &mut ChangeTracker, fid: &str, uid: &str, rate: f64) {
        let unit = store.find_unit(fid, uid).unwrap().clone().with_rate(rate);
        tracker.apply_edit(store, fid, unit, true);
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_publish_individual_success_clears_entry() {
        let (mut store, mut tracker, mut pending) = setup();
        edit(&mut store, &mut tracker, "f1", "u1", 55.0);
        edit(&mut store, &mut tracker, "f1", "u2", 85.0);
        tracker.save_units("f1", &ids(&["u1"])).unwrap();

        let plan = PublishCoordinator::begin(
            &tracker,
            &mut pending,
            PublishTarget::Facility("f1".to_string()),
            &ids(&["u1"]),
        )
        .unwrap();
        let ticket = match plan {
            PublishPlan::Ready(t) => t,
            other => panic!("unexpected plan: {:?}", other),
        };
        assert_eq!(
            ticket.request,
            PublishRequest::Individual(PublishIndividualRequest {
                facility_id: "f1".to_string(),
                ecri_ids: ids(&["u1"]),
            })
        );

        let report = PublishCoordinator::complete_success(&mut tracker, &mut pending, ticket.seq).unwrap();

        assert_eq!(report.cleared_facilities, ids(&["f1"]));
        assert!(tracker.entry("f1").is_none());
        assert_eq!(pending.in_flight_count(), 0);
    }

    #[test]
    fn test_publish_failure_leaves_ledger_untouched() {
        let (mut store, mut tracker, mut pending) = setup();
        edit(&mut store, &mut tracker, "f1", "u1", 55.0);
        tracker.save_units("f1", &ids(&["u1"])).unwrap();
        let before = tracker.ledger().to_vec();

        let seq = match PublishCoordinator::begin(
            &tracker,
            &mut pending,
            PublishTarget::Facility("f1".to_string()),
            &ids(&["u1"]),
        )
        .unwrap()
        {
            PublishPlan::Ready(t) => t.seq,
            other => panic!("unexpected plan: {:?}", other),
        };
        let snapshot = PublishCoordinator::complete_failure(&mut pending, seq).unwrap();

        assert_eq!(snapshot.unit_ids, ids(&["u1"]));
        assert_eq!(tracker.ledger(), before.as_slice());
        // 同一序号不能再次对账
        assert_eq!(
            PublishCoordinator::complete_success(&mut tracker, &mut pending, seq),
            Err(EngineError::UnknownRequest(seq))
        );
    }

    #[test]
    fn test_unsaved_id_is_rejected_before_any_request() {
        let (mut store, mut tracker, mut pending) = setup();
        edit(&mut store, &mut tracker, "f1", "u1", 55.0);
        edit(&mut store, &mut tracker, "f1", "u2", 85.0);
        tracker.save_units("f1", &ids(&["u1"])).unwrap();

        let err = PublishCoordinator::begin(
            &tracker,
            &mut pending,
            PublishTarget::Portfolio,
            &ids(&["u1", "u2"]),
        )
        .unwrap_err();

        assert_eq!(
            err,
            EngineError::NotInSavedPartition {
                unit_ids: ids(&["u2"])
            }
        );
        assert_eq!(pending.in_flight_count(), 0);
    }

    #[test]
    fn test_individual_scope_rejects_other_facility_ids() {
        let (mut store, mut tracker, mut pending) = setup();
        edit(&mut store, &mut tracker, "f1", "u1", 55.0);
        edit(&mut store, &mut tracker, "f2", "u7", 205.0);
        tracker.save_units("f1", &ids(&["u1"])).unwrap();
        tracker.save_units("f2", &ids(&["u7"])).unwrap();

        assert!(matches!(
            PublishCoordinator::begin(
                &tracker,
                &mut pending,
                PublishTarget::Facility("f1".to_string()),
                &ids(&["u1", "u7"]),
            ),
            Err(EngineError::NotInSavedPartition { .. })
        ));
    }

    #[test]
    fn test_publish_on_cleared_ledger_is_noop() {
        let (_store, tracker, mut pending) = setup();

        let plan = PublishCoordinator::begin(&tracker, &mut pending, PublishTarget::Portfolio, &ids(&["u1"])).unwrap();

        assert_eq!(plan, PublishPlan::NothingToPublish);
        assert_eq!(pending.in_flight_count(), 0);
    }

    #[test]
    fn test_edits_after_issue_remain_staged() {
        let (mut store, mut tracker, mut pending) = setup();
        edit(&mut store, &mut tracker, "f1", "u1", 55.0);
        edit(&mut store, &mut tracker, "f2", "u7", 205.0);
        tracker.save_units("f1", &ids(&["u1"])).unwrap();
        tracker.save_units("f2", &ids(&["u7"])).unwrap();

        let saved = PublishCoordinator::saved_ids(&tracker, &PublishTarget::Portfolio);
        assert_eq!(saved, ids(&["u1", "u7"]));
        let seq = match PublishCoordinator::begin(&tracker, &mut pending, PublishTarget::Portfolio, &saved).unwrap() {
            PublishPlan::Ready(t) => t.seq,
            other => panic!("unexpected plan: {:?}", other),
        };

        // 请求在途期间继续编辑
        edit(&mut store, &mut tracker, "f1", "u2", 90.0);
        edit(&mut store, &mut tracker, "f2", "u7", 210.0);

        let report = PublishCoordinator::complete_success(&mut tracker, &mut pending, seq).unwrap();

        assert_eq!(report.retained_units, 2);
        assert!(report.cleared_facilities.is_empty());
        assert!(tracker.staged("f1", "u1").is_none());
        assert_eq!(tracker.staged("f1", "u2").unwrap().phase, StagePhase::New);
        let u7 = tracker.staged("f2", "u7").unwrap();
        assert_eq!(u7.unit.rate, 210.0);
        assert_eq!(u7.phase, StagePhase::New);
    }

    #[test]
    fn test_portfolio_publish_leaves_unaffected_facilities() {
        let (mut store, mut tracker, mut pending) = setup();
        edit(&mut store, &mut tracker, "f1", "u1", 55.0);
        edit(&mut store, &mut tracker, "f2", "u7", 205.0);
        tracker.save_units("f1", &ids(&["u1"])).unwrap();

        let seq = match PublishCoordinator::begin(&tracker, &mut pending, PublishTarget::Portfolio, &ids(&["u1"])).unwrap() {
            PublishPlan::Ready(t) => t.seq,
            other => panic!("unexpected plan: {:?}", other),
        };
        PublishCoordinator::complete_success(&mut tracker, &mut pending, seq).unwrap();

        assert!(tracker.entry("f1").is_none());
        assert!(tracker.staged("f2", "u7").is_some());
    }

    #[test]
    fn test_complete_with_non_publish_seq_is_mismatch() {
        let (_store, mut tracker, mut pending) = setup();
        let seq = pending.register(RequestKind::FetchFacilities);

        assert_eq!(
            PublishCoordinator::complete_success(&mut tracker, &mut pending, seq),
            Err(EngineError::RequestKindMismatch {
                seq,
                expected: "PUBLISH"
            })
        );
        // 不匹配时不消耗该请求
        assert!(pending.get(seq).is_some());
    }
}
