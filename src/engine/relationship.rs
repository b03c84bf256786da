// ==========================================
// 仓储定价运营系统 - 关联关系解析器 (Relationship Resolver)
// ==========================================
// 状态机: UNLINKED → {LINK_PENDING, ANCHOR_PENDING} → {LINKED, ANCHORED}
// 红线: 只修改单元的 relationship / lock 子状态，且一律经 apply_edit 登记
// 说明: 锁定状态机见 lock_schedule.rs
// ==========================================

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::facility::{AnchorInfo, LinkInfo, Relationship, UnitTypeStatistic};
use crate::domain::types::CategoryGuide;
use crate::engine::change_tracker::{ChangeTracker, EditOutcome};
use crate::engine::error::{parse_adjustment, EngineError, EngineResult};
use crate::engine::lock_schedule::LockDraft;
use crate::engine::unit_store::UnitStore;

/// 单元定位键 (facility_id, unit_id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub facility_id: String,
    pub unit_id: String,
}

impl UnitKey {
    pub fn new(facility_id: &str, unit_id: &str) -> Self {
        Self {
            facility_id: facility_id.to_string(),
            unit_id: unit_id.to_string(),
        }
    }
}

// ==========================================
// RelationDraft - 关联/锚定编辑中状态
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationDraft {
    LinkPending {
        target_id: Option<String>,
        adjustment: Option<f64>,
    },
    AnchorPending {
        guide: Option<CategoryGuide>,
        variance: Option<f64>,
    },
}

impl RelationDraft {
    pub fn label(&self) -> &'static str {
        match self {
            RelationDraft::LinkPending { .. } => "LINK_PENDING",
            RelationDraft::AnchorPending { .. } => "ANCHOR_PENDING",
        }
    }

    /// 确认按钮是否可用
    pub fn can_confirm(&self) -> bool {
        match self {
            RelationDraft::LinkPending { target_id, .. } => target_id.is_some(),
            RelationDraft::AnchorPending { guide, .. } => guide.is_some(),
        }
    }
}

// ==========================================
// RelationshipResolver
// ==========================================
// 每个单元类型持有独立的关联草稿与锁定草稿
#[derive(Debug, Default)]
pub struct RelationshipResolver {
    relation_drafts: HashMap<UnitKey, RelationDraft>,
    pub(crate) lock_drafts: HashMap<UnitKey, LockDraft>,
}

impl RelationshipResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation_draft(&self, facility_id: &str, unit_id: &str) -> Option<&RelationDraft> {
        self.relation_drafts.get(&UnitKey::new(facility_id, unit_id))
    }

    // ==========================================
    // 关联 (Link)
    // ==========================================

    /// 进入 LINK_PENDING（打开目标选择）
    pub fn begin_link(&mut self, store: &UnitStore, facility_id: &str, unit_id: &str) -> EngineResult<()> {
        require_unit(store, facility_id, unit_id)?;
        self.relation_drafts.insert(
            UnitKey::new(facility_id, unit_id),
            RelationDraft::LinkPending {
                target_id: None,
                adjustment: None,
            },
        );
        Ok(())
    }

    /// 选择关联目标（同门店内的其他单元类型）
    pub fn select_link_target(
        &mut self,
        store: &UnitStore,
        facility_id: &str,
        unit_id: &str,
        target_id: &str,
        extra_candidates: &[String],
    ) -> EngineResult<()> {
        validate_link_target(store, facility_id, unit_id, target_id, extra_candidates)?;
        match self.draft_mut(facility_id, unit_id)? {
            RelationDraft::LinkPending { target_id: slot, .. } => {
                *slot = Some(target_id.to_string());
                Ok(())
            }
            other => Err(transition(other.label(), "LINK_TARGET_SELECTED")),
        }
    }

    /// 输入关联调整比例（操作员原始输入）
    pub fn set_link_adjustment(&mut self, facility_id: &str, unit_id: &str, input: &str) -> EngineResult<f64> {
        let value = parse_adjustment(input)?;
        match self.draft_mut(facility_id, unit_id)? {
            RelationDraft::LinkPending { adjustment, .. } => {
                *adjustment = Some(value);
                Ok(value)
            }
            other => Err(transition(other.label(), "LINK_ADJUSTMENT_SET")),
        }
    }

    /// 确认关联: LINK_PENDING → LINKED
    ///
    /// 未选择目标时拒绝；未输入调整比例按 0 处理
    pub fn confirm_link(
        &mut self,
        store: &mut UnitStore,
        tracker: &mut ChangeTracker,
        facility_id: &str,
        unit_id: &str,
    ) -> EngineResult<EditOutcome> {
        let key = UnitKey::new(facility_id, unit_id);
        let (target_id, adjustment) = match self.relation_drafts.get(&key) {
            Some(RelationDraft::LinkPending {
                target_id: Some(target_id),
                adjustment,
            }) => (target_id.clone(), adjustment.unwrap_or(0.0)),
            Some(RelationDraft::LinkPending { target_id: None, .. }) => {
                return Err(EngineError::MissingLinkTarget {
                    unit_id: unit_id.to_string(),
                })
            }
            Some(other) => return Err(transition(other.label(), "LINKED")),
            None => return Err(no_draft(facility_id, unit_id)),
        };

        // 目标可能在草稿期间被重新关联，确认前复核环路
        validate_link_target(store, facility_id, unit_id, &target_id, &[])
            .or_else(|e| match e {
                // 目标仅存在于候选列表时允许
                EngineError::UnknownLinkTarget { .. } => Ok(()),
                other => Err(other),
            })?;

        let mut unit = require_unit(store, facility_id, unit_id)?.clone();
        unit.relationship = Relationship::Linked(LinkInfo {
            linked_unit_type_id: target_id.clone(),
            adjustment_percentage: adjustment,
        });

        let outcome = tracker.apply_edit(store, facility_id, unit, true);
        self.relation_drafts.remove(&key);
        tracing::info!(
            facility_id,
            unit_id,
            target_id = %target_id,
            adjustment,
            "单元类型已关联"
        );
        Ok(outcome)
    }

    // ==========================================
    // 锚定 (Anchor)
    // ==========================================

    /// 进入 ANCHOR_PENDING
    pub fn begin_anchor(&mut self, store: &UnitStore, facility_id: &str, unit_id: &str) -> EngineResult<()> {
        require_unit(store, facility_id, unit_id)?;
        self.relation_drafts.insert(
            UnitKey::new(facility_id, unit_id),
            RelationDraft::AnchorPending {
                guide: None,
                variance: None,
            },
        );
        Ok(())
    }

    /// 选择类别指导价（三选一）
    pub fn select_anchor_guide(&mut self, facility_id: &str, unit_id: &str, guide: CategoryGuide) -> EngineResult<()> {
        match self.draft_mut(facility_id, unit_id)? {
            RelationDraft::AnchorPending { guide: slot, .. } => {
                *slot = Some(guide);
                Ok(())
            }
            other => Err(transition(other.label(), "ANCHOR_GUIDE_SELECTED")),
        }
    }

    /// 输入锚定偏差比例；必须先选择类别
    pub fn set_anchor_variance(&mut self, facility_id: &str, unit_id: &str, input: &str) -> EngineResult<f64> {
        let draft = self.draft_mut(facility_id, unit_id)?;
        match draft {
            RelationDraft::AnchorPending { guide: None, .. } => Err(EngineError::MissingAnchorGuide {
                unit_id: unit_id.to_string(),
            }),
            RelationDraft::AnchorPending { variance, .. } => {
                let value = parse_adjustment(input)?;
                *variance = Some(value);
                Ok(value)
            }
            other => Err(transition(other.label(), "ANCHOR_VARIANCE_SET")),
        }
    }

    /// 确认锚定: ANCHOR_PENDING → ANCHORED
    pub fn confirm_anchor(
        &mut self,
        store: &mut UnitStore,
        tracker: &mut ChangeTracker,
        facility_id: &str,
        unit_id: &str,
    ) -> EngineResult<EditOutcome> {
        let key = UnitKey::new(facility_id, unit_id);
        let (guide, variance) = match self.relation_drafts.get(&key) {
            Some(RelationDraft::AnchorPending {
                guide: Some(guide),
                variance,
            }) => (*guide, variance.unwrap_or(0.0)),
            Some(RelationDraft::AnchorPending { guide: None, .. }) => {
                return Err(EngineError::MissingAnchorGuide {
                    unit_id: unit_id.to_string(),
                })
            }
            Some(other) => return Err(transition(other.label(), "ANCHORED")),
            None => return Err(no_draft(facility_id, unit_id)),
        };

        let mut unit = require_unit(store, facility_id, unit_id)?.clone();
        unit.relationship = Relationship::Anchored(AnchorInfo { guide, variance });

        let outcome = tracker.apply_edit(store, facility_id, unit, true);
        self.relation_drafts.remove(&key);
        tracing::info!(facility_id, unit_id, guide = %guide, variance, "单元类型已锚定");
        Ok(outcome)
    }

    // ==========================================
    // 取消 / 解除
    // ==========================================

    /// 取消进行中的关联/锚定步骤，不修改单元
    pub fn cancel_relation_draft(&mut self, facility_id: &str, unit_id: &str) -> bool {
        self.relation_drafts
            .remove(&UnitKey::new(facility_id, unit_id))
            .is_some()
    }

    /// 解除关联或锚定，回到 UNLINKED
    ///
    /// 价格重算交由定价引擎，本地保持当前价格
    pub fn remove_relationship(
        &mut self,
        store: &mut UnitStore,
        tracker: &mut ChangeTracker,
        facility_id: &str,
        unit_id: &str,
    ) -> EngineResult<EditOutcome> {
        let mut unit = require_unit(store, facility_id, unit_id)?.clone();
        self.relation_drafts.remove(&UnitKey::new(facility_id, unit_id));
        if unit.relationship == Relationship::Unlinked {
            return Ok(EditOutcome::Unchanged);
        }
        let previous = unit.relationship.label();
        unit.relationship = Relationship::Unlinked;
        let outcome = tracker.apply_edit(store, facility_id, unit, true);
        tracing::info!(facility_id, unit_id, previous, "单元类型关联已解除");
        Ok(outcome)
    }

    /// 会话结束时清空全部草稿
    pub fn clear(&mut self) {
        self.relation_drafts.clear();
        self.lock_drafts.clear();
    }

    fn draft_mut(&mut self, facility_id: &str, unit_id: &str) -> EngineResult<&mut RelationDraft> {
        self.relation_drafts
            .get_mut(&UnitKey::new(facility_id, unit_id))
            .ok_or_else(|| no_draft(facility_id, unit_id))
    }
}

// ==========================================
// 辅助函数
// ==========================================

pub(crate) fn require_unit<'a>(
    store: &'a UnitStore,
    facility_id: &str,
    unit_id: &str,
) -> EngineResult<&'a UnitTypeStatistic> {
    store
        .find_unit(facility_id, unit_id)
        .ok_or_else(|| EngineError::UnitNotFound {
            facility_id: facility_id.to_string(),
            unit_id: unit_id.to_string(),
        })
}

pub(crate) fn no_draft(facility_id: &str, unit_id: &str) -> EngineError {
    EngineError::NoPendingDraft {
        facility_id: facility_id.to_string(),
        unit_id: unit_id.to_string(),
    }
}

pub(crate) fn transition(from: &str, to: &str) -> EngineError {
    EngineError::InvalidStateTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// 校验关联目标
///
/// - 不能是自身
/// - 必须是同门店单元类型，或出现在该门店的可关联候选列表中
/// - 沿目标的关联链回溯不得回到自身
fn validate_link_target(
    store: &UnitStore,
    facility_id: &str,
    unit_id: &str,
    target_id: &str,
    extra_candidates: &[String],
) -> EngineResult<()> {
    if target_id == unit_id {
        return Err(EngineError::SelfLink(unit_id.to_string()));
    }

    let facility = store
        .find_facility(facility_id)
        .ok_or_else(|| EngineError::UnitNotFound {
            facility_id: facility_id.to_string(),
            unit_id: unit_id.to_string(),
        })?;

    let in_facility = facility.find_unit(target_id).is_some();
    if !in_facility && !extra_candidates.iter().any(|c| c == target_id) {
        return Err(EngineError::UnknownLinkTarget {
            facility_id: facility_id.to_string(),
            target_id: target_id.to_string(),
        });
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut cursor = facility.find_unit(target_id);
    while let Some(current) = cursor {
        if !visited.insert(current.id.as_str()) {
            break;
        }
        match current.link() {
            Some(link) if link.linked_unit_type_id == unit_id => {
                return Err(EngineError::LinkCycle {
                    unit_id: unit_id.to_string(),
                    target_id: target_id.to_string(),
                })
            }
            Some(link) => cursor = facility.find_unit(&link.linked_unit_type_id),
            None => cursor = None,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::facility::Facility;
    use crate::domain::types::StagePhase;

    fn setup() -> (UnitStore, ChangeTracker, RelationshipResolver) {
        let mut store = UnitStore::new();
        store.replace_all(
            vec![Facility::new(
                "f1",
                vec![
                    UnitTypeStatistic::new("u1", "5x5", 50.0),
                    UnitTypeStatistic::new("u2", "5x10", 80.0),
                    UnitTypeStatistic::new("u3", "10x10", 120.0),
                ],
            )],
            1,
        );
        (store, ChangeTracker::new(), RelationshipResolver::new())
    }

    #[test]
    fn test_link_scenario() {
        let (mut store, mut tracker, mut resolver) = setup();

        resolver.begin_link(&store, "f1", "u2").unwrap();
        resolver
            .select_link_target(&store, "f1", "u2", "u1", &[])
            .unwrap();
        resolver.set_link_adjustment("f1", "u2", "10").unwrap();
        let outcome = resolver
            .confirm_link(&mut store, &mut tracker, "f1", "u2")
            .unwrap();

        assert!(outcome.is_applied());
        let u2 = store.find_unit("f1", "u2").unwrap();
        assert_eq!(
            u2.link(),
            Some(&LinkInfo {
                linked_unit_type_id: "u1".to_string(),
                adjustment_percentage: 10.0,
            })
        );
        assert_eq!(u2.guide(), None);
        // 关联变化与价格编辑同样登记到台账
        assert_eq!(tracker.staged("f1", "u2").unwrap().unit, *u2);
        assert_eq!(tracker.staged("f1", "u2").unwrap().phase, StagePhase::New);
        assert!(resolver.relation_draft("f1", "u2").is_none());
    }

    #[test]
    fn test_confirm_link_without_target_is_rejected() {
        let (mut store, mut tracker, mut resolver) = setup();
        resolver.begin_link(&store, "f1", "u2").unwrap();
        resolver.set_link_adjustment("f1", "u2", "5").unwrap();

        assert!(!resolver.relation_draft("f1", "u2").unwrap().can_confirm());
        let err = resolver
            .confirm_link(&mut store, &mut tracker, "f1", "u2")
            .unwrap_err();

        assert_eq!(
            err,
            EngineError::MissingLinkTarget {
                unit_id: "u2".to_string()
            }
        );
        assert!(tracker.ledger().is_empty());
        assert!(resolver.relation_draft("f1", "u2").is_some());
    }

    #[test]
    fn test_link_target_validation() {
        let (store, _tracker, mut resolver) = setup();
        resolver.begin_link(&store, "f1", "u2").unwrap();

        assert_eq!(
            resolver.select_link_target(&store, "f1", "u2", "u2", &[]),
            Err(EngineError::SelfLink("u2".to_string()))
        );
        assert!(matches!(
            resolver.select_link_target(&store, "f1", "u2", "u99", &[]),
            Err(EngineError::UnknownLinkTarget { .. })
        ));
        // 候选列表中的单元类型允许作为目标
        assert!(resolver
            .select_link_target(&store, "f1", "u2", "u99", &["u99".to_string()])
            .is_ok());
    }

    #[test]
    fn test_link_cycle_is_rejected() {
        let (mut store, mut tracker, mut resolver) = setup();

        resolver.begin_link(&store, "f1", "u2").unwrap();
        resolver.select_link_target(&store, "f1", "u2", "u1", &[]).unwrap();
        resolver.confirm_link(&mut store, &mut tracker, "f1", "u2").unwrap();

        resolver.begin_link(&store, "f1", "u3").unwrap();
        resolver.select_link_target(&store, "f1", "u3", "u2", &[]).unwrap();
        resolver.confirm_link(&mut store, &mut tracker, "f1", "u3").unwrap();

        // u1 → u3 → u2 → u1 形成环路
        resolver.begin_link(&store, "f1", "u1").unwrap();
        assert!(matches!(
            resolver.select_link_target(&store, "f1", "u1", "u3", &[]),
            Err(EngineError::LinkCycle { .. })
        ));
    }

    #[test]
    fn test_anchor_requires_guide_first() {
        let (mut store, mut tracker, mut resolver) = setup();
        resolver.begin_anchor(&store, "f1", "u3").unwrap();

        assert_eq!(
            resolver.set_anchor_variance("f1", "u3", "4"),
            Err(EngineError::MissingAnchorGuide {
                unit_id: "u3".to_string()
            })
        );
        assert!(matches!(
            resolver.confirm_anchor(&mut store, &mut tracker, "f1", "u3"),
            Err(EngineError::MissingAnchorGuide { .. })
        ));

        resolver
            .select_anchor_guide("f1", "u3", CategoryGuide::ClimateControlled)
            .unwrap();
        assert!(matches!(
            resolver.set_anchor_variance("f1", "u3", "abc"),
            Err(EngineError::InvalidAdjustment { .. })
        ));
        resolver.set_anchor_variance("f1", "u3", "-3.5").unwrap();
        resolver
            .confirm_anchor(&mut store, &mut tracker, "f1", "u3")
            .unwrap();

        let u3 = store.find_unit("f1", "u3").unwrap();
        assert_eq!(u3.guide(), Some(CategoryGuide::ClimateControlled));
        assert!(u3.link().is_none());
        assert_eq!(
            u3.relationship,
            Relationship::Anchored(AnchorInfo {
                guide: CategoryGuide::ClimateControlled,
                variance: -3.5,
            })
        );
    }

    #[test]
    fn test_anchor_replaces_link() {
        let (mut store, mut tracker, mut resolver) = setup();
        resolver.begin_link(&store, "f1", "u2").unwrap();
        resolver.select_link_target(&store, "f1", "u2", "u1", &[]).unwrap();
        resolver.confirm_link(&mut store, &mut tracker, "f1", "u2").unwrap();

        resolver.begin_anchor(&store, "f1", "u2").unwrap();
        resolver
            .select_anchor_guide("f1", "u2", CategoryGuide::DriveUp)
            .unwrap();
        resolver.confirm_anchor(&mut store, &mut tracker, "f1", "u2").unwrap();

        let u2 = store.find_unit("f1", "u2").unwrap();
        assert!(u2.link().is_none());
        assert_eq!(u2.guide(), Some(CategoryGuide::DriveUp));
        assert_eq!(tracker.entry("f1").unwrap().units_statistics.len(), 1);
    }

    #[test]
    fn test_wrong_step_is_invalid_transition() {
        let (store, _tracker, mut resolver) = setup();
        resolver.begin_anchor(&store, "f1", "u2").unwrap();

        assert!(matches!(
            resolver.set_link_adjustment("f1", "u2", "3"),
            Err(EngineError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            resolver.select_anchor_guide("f1", "u1", CategoryGuide::Parking),
            Err(EngineError::NoPendingDraft { .. })
        ));
    }

    #[test]
    fn test_remove_relationship() {
        let (mut store, mut tracker, mut resolver) = setup();

        assert_eq!(
            resolver
                .remove_relationship(&mut store, &mut tracker, "f1", "u2")
                .unwrap(),
            EditOutcome::Unchanged
        );

        resolver.begin_link(&store, "f1", "u2").unwrap();
        resolver.select_link_target(&store, "f1", "u2", "u1", &[]).unwrap();
        resolver.confirm_link(&mut store, &mut tracker, "f1", "u2").unwrap();

        resolver
            .remove_relationship(&mut store, &mut tracker, "f1", "u2")
            .unwrap();
        let u2 = store.find_unit("f1", "u2").unwrap();
        assert_eq!(u2.relationship, Relationship::Unlinked);
        assert_eq!(u2.rate, 80.0);
    }

    #[test]
    fn test_cancel_draft_leaves_unit_untouched() {
        let (store, tracker, mut resolver) = setup();
        resolver.begin_link(&store, "f1", "u2").unwrap();

        assert!(resolver.cancel_relation_draft("f1", "u2"));
        assert!(!resolver.cancel_relation_draft("f1", "u2"));
        assert!(tracker.ledger().is_empty());
        assert_eq!(
            store.find_unit("f1", "u2").unwrap().relationship,
            Relationship::Unlinked
        );
    }
}
