// ==========================================
// 仓储定价运营系统 - 暂存台账领域模型
// ==========================================
// 职责: 每门店一条台账记录，记录已编辑未发布的单元类型
// 红线: 同一门店在台账中至多出现一次；记录内按单元 id 去重
// ==========================================

use crate::domain::facility::UnitTypeStatistic;
use crate::domain::types::StagePhase;
use serde::{Deserialize, Serialize};

/// 暂存单元：编辑后的单元记录 + 暂存阶段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedUnit {
    pub unit: UnitTypeStatistic,
    pub phase: StagePhase,
    /// 最近一次编辑的全局序号（单调递增），用于发布对账
    pub edit_seq: u64,
}

impl StagedUnit {
    pub fn is_saved(&self) -> bool {
        self.phase == StagePhase::Saved
    }
}

/// ChangedFacility - 门店台账记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedFacility {
    pub facility_id: String,
    pub units_statistics: Vec<StagedUnit>,
}

impl ChangedFacility {
    pub fn new(facility_id: impl Into<String>) -> Self {
        Self {
            facility_id: facility_id.into(),
            units_statistics: Vec::new(),
        }
    }

    pub fn find(&self, unit_id: &str) -> Option<&StagedUnit> {
        self.units_statistics.iter().find(|s| s.unit.id == unit_id)
    }

    pub(crate) fn find_mut(&mut self, unit_id: &str) -> Option<&mut StagedUnit> {
        self.units_statistics.iter_mut().find(|s| s.unit.id == unit_id)
    }

    /// 指定阶段的单元
    pub fn units_in_phase(&self, phase: StagePhase) -> impl Iterator<Item = &UnitTypeStatistic> {
        self.units_statistics
            .iter()
            .filter(move |s| s.phase == phase)
            .map(|s| &s.unit)
    }

    pub fn has_unsaved(&self) -> bool {
        self.units_statistics
            .iter()
            .any(|s| s.phase == StagePhase::New)
    }
}
