// ==========================================
// 仓储定价运营系统 - 派生视图层
// ==========================================
// 职责: 台账的只读投影（按门店分组、全量列表、NEW/SAVED 分区、计数）
// 记忆化: 以台账 revision 为键，revision 不变时直接复用上次结果
// ==========================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::facility::UnitTypeStatistic;
use crate::domain::ledger::StagedUnit;
use crate::domain::types::StagePhase;
use crate::engine::change_tracker::ChangeTracker;

/// 一次计算得到的全部视图
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StagingViews {
    pub revision: u64,
    pub units_by_facility: BTreeMap<String, Vec<StagedUnit>>,
    pub all_staged_units: Vec<StagedUnit>,
    new_by_facility: BTreeMap<String, Vec<UnitTypeStatistic>>,
    saved_by_facility: BTreeMap<String, Vec<UnitTypeStatistic>>,
    pub facilities_with_unsaved: usize,
    pub facilities_with_changes: usize,
}

impl StagingViews {
    fn compute(tracker: &ChangeTracker) -> Self {
        let mut views = StagingViews {
            revision: tracker.revision(),
            ..Default::default()
        };

        for entry in tracker.ledger() {
            let fid = entry.facility_id.clone();
            views
                .new_by_facility
                .insert(fid.clone(), entry.units_in_phase(StagePhase::New).cloned().collect());
            views
                .saved_by_facility
                .insert(fid.clone(), entry.units_in_phase(StagePhase::Saved).cloned().collect());
            views.all_staged_units.extend(entry.units_statistics.iter().cloned());
            views.units_by_facility.insert(fid, entry.units_statistics.clone());

            if entry.has_unsaved() {
                views.facilities_with_unsaved += 1;
            }
            if !entry.units_statistics.is_empty() {
                views.facilities_with_changes += 1;
            }
        }
        views
    }

    pub fn units_for(&self, facility_id: &str) -> &[StagedUnit] {
        self.units_by_facility
            .get(facility_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// NEW 分区（已编辑未保存）
    pub fn new_units(&self, facility_id: &str) -> &[UnitTypeStatistic] {
        self.new_by_facility
            .get(facility_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// SAVED 分区（已保存未发布）
    pub fn saved_units(&self, facility_id: &str) -> &[UnitTypeStatistic] {
        self.saved_by_facility
            .get(facility_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn saved_ids(&self, facility_id: &str) -> Vec<String> {
        self.saved_units(facility_id).iter().map(|u| u.id.clone()).collect()
    }

    /// 全组合 SAVED id（按门店顺序）
    pub fn all_saved_ids(&self) -> Vec<String> {
        self.saved_by_facility
            .values()
            .flatten()
            .map(|u| u.id.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities_with_changes == 0
    }
}

/// DerivedViews - 记忆化缓存
#[derive(Debug, Default)]
pub struct DerivedViews {
    cached: Option<Arc<StagingViews>>,
    recompute_count: u64,
}

impl DerivedViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得与当前台账一致的视图
    pub fn get(&mut self, tracker: &ChangeTracker) -> Arc<StagingViews> {
        if let Some(cached) = &self.cached {
            if cached.revision == tracker.revision() {
                return Arc::clone(cached);
            }
        }

        let views = Arc::new(StagingViews::compute(tracker));
        self.recompute_count += 1;
        tracing::trace!(revision = views.revision, "派生视图重算");
        self.cached = Some(Arc::clone(&views));
        views
    }

    /// 重算次数（诊断用）
    pub fn recompute_count(&self) -> u64 {
        self.recompute_count
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::facility::Facility;
    use crate::engine::unit_store::UnitStore;

    fn loaded() -> (UnitStore, ChangeTracker) {
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
        (store, ChangeTracker::new())
    }

    #[test]
    fn test_views_are_memoized_on_revision() {
        let (mut store, mut tracker) = loaded();
        let mut views = DerivedViews::new();

        let first = views.get(&tracker);
        let again = views.get(&tracker);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(views.recompute_count(), 1);

        let unit = store.find_unit("f1", "u1").unwrap().clone().with_rate(55.0);
        tracker.apply_edit(&mut store, "f1", unit, true);

        let after = views.get(&tracker);
        assert!(!Arc::ptr_eq(&first, &after));
        assert_eq!(views.recompute_count(), 2);
        assert_eq!(after.units_for("f1").len(), 1);
    }

    #[test]
    fn test_partitions_and_counts() {
        let (mut store, mut tracker) = loaded();
        for (fid, uid, rate) in [("f1", "u1", 55.0), ("f1", "u2", 85.0), ("f2", "u7", 205.0)] {
            let unit = store.find_unit(fid, uid).unwrap().clone().with_rate(rate);
            tracker.apply_edit(&mut store, fid, unit, true);
        }
        tracker.save_units("f1", &["u1".to_string()]).unwrap();
        tracker.save_units("f2", &["u7".to_string()]).unwrap();

        let mut views = DerivedViews::new();
        let v = views.get(&tracker);

        assert_eq!(v.all_staged_units.len(), 3);
        assert_eq!(v.saved_ids("f1"), vec!["u1".to_string()]);
        assert_eq!(v.new_units("f1")[0].id, "u2");
        assert!(v.new_units("f2").is_empty());
        assert_eq!(v.facilities_with_changes, 2);
        assert_eq!(v.facilities_with_unsaved, 1);
        assert_eq!(v.all_saved_ids(), vec!["u1".to_string(), "u7".to_string()]);
        assert!(v.units_for("missing").is_empty());
    }
}
