// ==========================================
// 仓储定价运营系统 - 单元记录仓 (UnitRecord Store)
// ==========================================
// 职责: 保存最近一次从后端拉取的门店与单元类型统计
// 红线: 不访问网络；replace_all 只由拉取完成事件触发
// ==========================================

use chrono::{DateTime, Utc};

use crate::domain::facility::{Facility, UnitTypeStatistic};

#[derive(Debug, Default)]
pub struct UnitStore {
    facilities: Vec<Facility>,
    total: u64,
    fetched_at: Option<DateTime<Utc>>,
}

impl UnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体覆盖权威数据（最后写入者胜出）
    pub fn replace_all(&mut self, facilities: Vec<Facility>, total: u64) {
        tracing::debug!(
            facility_count = facilities.len(),
            total,
            "单元记录仓整体覆盖"
        );
        self.facilities = facilities;
        self.total = total;
        self.fetched_at = Some(Utc::now());
    }

    pub fn find_facility(&self, facility_id: &str) -> Option<&Facility> {
        self.facilities.iter().find(|f| f.facility_id == facility_id)
    }

    pub fn find_unit(&self, facility_id: &str, unit_id: &str) -> Option<&UnitTypeStatistic> {
        self.find_facility(facility_id)
            .and_then(|f| f.find_unit(unit_id))
    }

    /// 按 id 写入单元（仅供变更追踪器调用）
    ///
    /// # 返回
    /// - `false`: 门店尚未加载，未写入
    pub(crate) fn upsert_unit(&mut self, facility_id: &str, unit: UnitTypeStatistic) -> bool {
        match self
            .facilities
            .iter_mut()
            .find(|f| f.facility_id == facility_id)
        {
            Some(facility) => {
                facility.upsert_unit(unit);
                true
            }
            None => false,
        }
    }

    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    /// 后端分页总数
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn is_loaded(&self) -> bool {
        self.fetched_at.is_some()
    }

    pub fn clear(&mut self) {
        self.facilities.clear();
        self.total = 0;
        self.fetched_at = None;
    }
}
