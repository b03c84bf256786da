// ==========================================
// 仓储定价运营系统 - 变更追踪器 (Change Tracker)
// ==========================================
// 职责: 应用编辑到单元记录仓，并登记到门店暂存台账
// 红线: apply_edit 之后，仓中展示值与台账暂存值必须一致
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::facility::UnitTypeStatistic;
use crate::domain::ledger::{ChangedFacility, StagedUnit};
use crate::domain::types::StagePhase;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::unit_store::UnitStore;

/// 编辑结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditOutcome {
    /// 已写入仓与台账
    Applied { created_entry: bool },
    /// 门店尚未加载，编辑被静默丢弃（可恢复的竞态）
    FacilityNotLoaded,
    /// 无实际变化，未登记
    Unchanged,
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied { .. })
    }
}

/// ChangeTracker - 暂存台账持有者
///
/// - `revision`: 台账每次变化递增，供派生视图做记忆化判断
/// - `last_edit_seq`: 单元编辑全局序号，供发布对账判断快照前后
#[derive(Debug, Default)]
pub struct ChangeTracker {
    ledger: Vec<ChangedFacility>,
    revision: u64,
    last_edit_seq: u64,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // ==========================================
    // 编辑
    // ==========================================

    /// 应用一次编辑
    ///
    /// # 参数
    /// - `is_new_edit`: true 时暂存阶段重置为 NEW（新的编辑撤销此前的保存确认）；
    ///   false 时沿用已暂存单元的阶段，未暂存单元仍以 NEW 进入
    pub fn apply_edit(
        &mut self,
        store: &mut UnitStore,
        facility_id: &str,
        unit: UnitTypeStatistic,
        is_new_edit: bool,
    ) -> EditOutcome {
        if !store.upsert_unit(facility_id, unit.clone()) {
            tracing::debug!(
                facility_id,
                unit_id = %unit.id,
                "门店尚未加载，忽略编辑"
            );
            return EditOutcome::FacilityNotLoaded;
        }

        self.last_edit_seq += 1;
        let edit_seq = self.last_edit_seq;

        let created_entry = self.entry(facility_id).is_none();
        if created_entry {
            self.ledger.push(ChangedFacility::new(facility_id));
        }
        let entry = self
            .ledger
            .iter_mut()
            .find(|e| e.facility_id == facility_id);

        if let Some(entry) = entry {
            match entry.find_mut(&unit.id) {
                Some(staged) => {
                    staged.unit = unit;
                    staged.edit_seq = edit_seq;
                    if is_new_edit {
                        staged.phase = StagePhase::New;
                    }
                }
                None => entry.units_statistics.push(StagedUnit {
                    unit,
                    phase: StagePhase::New,
                    edit_seq,
                }),
            }
        }

        self.bump();
        EditOutcome::Applied { created_entry }
    }

    // ==========================================
    // 保存 / 放弃
    // ==========================================

    /// 显式保存: NEW → SAVED
    ///
    /// 所有 id 必须已暂存于该门店，否则整体拒绝
    pub fn save_units(&mut self, facility_id: &str, unit_ids: &[String]) -> EngineResult<usize> {
        let missing: Vec<String> = match self.entry(facility_id) {
            Some(entry) => unit_ids
                .iter()
                .filter(|id| entry.find(id).is_none())
                .cloned()
                .collect(),
            None => unit_ids.to_vec(),
        };
        if !missing.is_empty() {
            return Err(EngineError::NotStaged {
                facility_id: facility_id.to_string(),
                unit_ids: missing,
            });
        }

        let mut promoted = 0;
        if let Some(entry) = self.entry_mut(facility_id) {
            for staged in entry
                .units_statistics
                .iter_mut()
                .filter(|s| unit_ids.contains(&s.unit.id))
            {
                if staged.phase == StagePhase::New {
                    staged.phase = StagePhase::Saved;
                    promoted += 1;
                }
            }
        }

        if promoted > 0 {
            self.bump();
        }
        Ok(promoted)
    }

    /// 放弃单个暂存单元；门店记录为空时一并移除
    ///
    /// 不回滚单元记录仓中的值
    pub fn discard_unit(&mut self, facility_id: &str, unit_id: &str) -> bool {
        let removed = match self.entry_mut(facility_id) {
            Some(entry) => {
                let before = entry.units_statistics.len();
                entry.units_statistics.retain(|s| s.unit.id != unit_id);
                before != entry.units_statistics.len()
            }
            None => false,
        };
        if removed {
            self.drop_empty_entries();
            self.bump();
        }
        removed
    }

    /// 清除门店台账记录（发布成功或显式放弃后调用），幂等
    pub fn clear_changes_for_facility(&mut self, facility_id: &str) -> bool {
        let before = self.ledger.len();
        self.ledger.retain(|e| e.facility_id != facility_id);
        let removed = before != self.ledger.len();
        if removed {
            self.bump();
        }
        removed
    }

    /// 发布对账: 移除编辑序号不晚于 `watermark` 的暂存单元
    ///
    /// 快照之后的编辑保留，等待下一次发布
    ///
    /// # 返回
    /// 保留下来的单元数量
    pub(crate) fn clear_up_to(&mut self, facility_id: &str, watermark: u64) -> usize {
        let mut retained = 0;
        let mut changed = false;
        if let Some(entry) = self.entry_mut(facility_id) {
            let before = entry.units_statistics.len();
            entry.units_statistics.retain(|s| s.edit_seq > watermark);
            retained = entry.units_statistics.len();
            changed = before != retained;
        }
        if changed {
            self.drop_empty_entries();
            self.bump();
        }
        retained
    }

    pub fn clear_all(&mut self) {
        if !self.ledger.is_empty() {
            self.ledger.clear();
            self.bump();
        }
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn ledger(&self) -> &[ChangedFacility] {
        &self.ledger
    }

    pub fn entry(&self, facility_id: &str) -> Option<&ChangedFacility> {
        self.ledger.iter().find(|e| e.facility_id == facility_id)
    }

    pub fn staged(&self, facility_id: &str, unit_id: &str) -> Option<&StagedUnit> {
        self.entry(facility_id).and_then(|e| e.find(unit_id))
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_edit_seq(&self) -> u64 {
        self.last_edit_seq
    }

    // ==========================================
    // 内部
    // ==========================================

    fn entry_mut(&mut self, facility_id: &str) -> Option<&mut ChangedFacility> {
        self.ledger
            .iter_mut()
            .find(|e| e.facility_id == facility_id)
    }

    fn drop_empty_entries(&mut self) {
        self.ledger.retain(|e| !e.units_statistics.is_empty());
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}
