// ==========================================
// 仓储定价运营系统 - 门店与单元类型领域模型
// ==========================================
// 职责: 门店、单元类型统计、关联/锚定/锁定子状态
// 红线: 关联与锚定互斥，由 Relationship 标签联合静态保证
// ==========================================

use crate::domain::types::CategoryGuide;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// LinkInfo - 关联信息
// ==========================================
// 本单元价格 = 同门店另一单元类型价格 × (1 + adjustment_percentage / 100)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    pub linked_unit_type_id: String,
    pub adjustment_percentage: f64,
}

// ==========================================
// AnchorInfo - 锚定信息 (CategoryData)
// ==========================================
// 本单元价格 = 类别指导价 × (1 + variance / 100)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorInfo {
    pub guide: CategoryGuide,
    pub variance: f64,
}

// ==========================================
// Relationship - 关联状态
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    #[default]
    Unlinked,
    Linked(LinkInfo),
    Anchored(AnchorInfo),
}

impl Relationship {
    pub fn label(&self) -> &'static str {
        match self {
            Relationship::Unlinked => "UNLINKED",
            Relationship::Linked(_) => "LINKED",
            Relationship::Anchored(_) => "ANCHORED",
        }
    }
}

// ==========================================
// LockInfo - 锁定信息（后端线格式）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub locked: bool,
    pub expiration_date: Option<NaiveDate>,
}

// ==========================================
// LockState - 锁定状态
// ==========================================
// SCHEDULED_LOCK 到期后在读取时惰性视为 UNLOCKED（无后台定时器）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    #[default]
    Unlocked,
    LockedNow,
    ScheduledLock { expiration_date: NaiveDate },
}

impl LockState {
    /// 按给定日期计算有效锁定状态
    ///
    /// 到期日当天起锁定即释放
    pub fn effective(&self, today: NaiveDate) -> LockState {
        match self {
            LockState::ScheduledLock { expiration_date } if *expiration_date <= today => {
                LockState::Unlocked
            }
            other => other.clone(),
        }
    }

    pub fn is_locked_on(&self, today: NaiveDate) -> bool {
        !matches!(self.effective(today), LockState::Unlocked)
    }

    pub fn label(&self) -> &'static str {
        match self {
            LockState::Unlocked => "UNLOCKED",
            LockState::LockedNow => "LOCKED_NOW",
            LockState::ScheduledLock { .. } => "SCHEDULED_LOCK",
        }
    }

    /// 转换为后端线格式；未锁定返回 None
    pub fn to_lock_info(&self) -> Option<LockInfo> {
        match self {
            LockState::Unlocked => None,
            LockState::LockedNow => Some(LockInfo {
                locked: true,
                expiration_date: None,
            }),
            LockState::ScheduledLock { expiration_date } => Some(LockInfo {
                locked: true,
                expiration_date: Some(*expiration_date),
            }),
        }
    }

    /// 从后端线格式还原
    pub fn from_lock_info(info: Option<&LockInfo>) -> LockState {
        match info {
            Some(LockInfo {
                locked: true,
                expiration_date: Some(date),
            }) => LockState::ScheduledLock {
                expiration_date: *date,
            },
            Some(LockInfo {
                locked: true,
                expiration_date: None,
            }) => LockState::LockedNow,
            _ => LockState::Unlocked,
        }
    }
}

// ==========================================
// UnitTypeStatistic - 单元类型统计
// ==========================================
// 主键: id（门店内唯一）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTypeStatistic {
    pub id: String,
    pub ut_name: String,
    pub rate: f64,

    // ===== 展示用统计（规范化后的字段名） =====
    pub street_rate: Option<f64>,
    pub occupancy: Option<f64>,
    pub area: Option<f64>,
    pub floor: Option<String>,

    // ===== 子状态 =====
    #[serde(default)]
    pub relationship: Relationship,
    #[serde(default)]
    pub lock: LockState,
}

impl UnitTypeStatistic {
    pub fn new(id: impl Into<String>, ut_name: impl Into<String>, rate: f64) -> Self {
        Self {
            id: id.into(),
            ut_name: ut_name.into(),
            rate,
            street_rate: None,
            occupancy: None,
            area: None,
            floor: None,
            relationship: Relationship::Unlinked,
            lock: LockState::Unlocked,
        }
    }

    /// 锚定类别（未锚定时为 None）
    pub fn guide(&self) -> Option<CategoryGuide> {
        match &self.relationship {
            Relationship::Anchored(anchor) => Some(anchor.guide),
            _ => None,
        }
    }

    /// 关联信息（未关联时为 None）
    pub fn link(&self) -> Option<&LinkInfo> {
        match &self.relationship {
            Relationship::Linked(link) => Some(link),
            _ => None,
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }
}

// ==========================================
// Facility - 门店
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub facility_id: String,
    pub facility_name: Option<String>,
    pub unit_types: Vec<UnitTypeStatistic>,
}

impl Facility {
    pub fn new(facility_id: impl Into<String>, unit_types: Vec<UnitTypeStatistic>) -> Self {
        Self {
            facility_id: facility_id.into(),
            facility_name: None,
            unit_types,
        }
    }

    pub fn find_unit(&self, unit_id: &str) -> Option<&UnitTypeStatistic> {
        self.unit_types.iter().find(|u| u.id == unit_id)
    }

    /// 按 id 替换或追加单元类型
    ///
    /// # 返回
    /// - `true`: 替换了已有记录
    /// - `false`: 追加了新记录
    pub fn upsert_unit(&mut self, unit: UnitTypeStatistic) -> bool {
        match self.unit_types.iter_mut().find(|u| u.id == unit.id) {
            Some(existing) => {
                *existing = unit;
                true
            }
            None => {
                self.unit_types.push(unit);
                false
            }
        }
    }
}

/// 按百分比调整计算预览价格（保留两位小数）
pub fn projected_rate(base_rate: f64, adjustment_percentage: f64) -> f64 {
    let raw = base_rate * (1.0 + adjustment_percentage / 100.0);
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_scheduled_lock_expires_lazily() {
        let lock = LockState::ScheduledLock {
            expiration_date: date(2026, 3, 10),
        };

        assert!(lock.is_locked_on(date(2026, 3, 9)));
        assert_eq!(lock.effective(date(2026, 3, 10)), LockState::Unlocked);
        assert_eq!(lock.effective(date(2026, 4, 1)), LockState::Unlocked);
        // 读取不改变存储值
        assert_eq!(lock.label(), "SCHEDULED_LOCK");
    }

    #[test]
    fn test_lock_info_round_trip_shapes() {
        assert_eq!(LockState::Unlocked.to_lock_info(), None);
        assert_eq!(
            LockState::from_lock_info(Some(&LockInfo {
                locked: true,
                expiration_date: None
            })),
            LockState::LockedNow
        );
        assert_eq!(
            LockState::from_lock_info(Some(&LockInfo {
                locked: false,
                expiration_date: Some(date(2026, 1, 1))
            })),
            LockState::Unlocked
        );
    }

    #[test]
    fn test_guide_and_link_are_exclusive_views() {
        let mut unit = UnitTypeStatistic::new("u2", "10x10", 100.0);
        unit.relationship = Relationship::Linked(LinkInfo {
            linked_unit_type_id: "u1".to_string(),
            adjustment_percentage: 10.0,
        });
        assert!(unit.link().is_some());
        assert_eq!(unit.guide(), None);

        unit.relationship = Relationship::Anchored(AnchorInfo {
            guide: CategoryGuide::Parking,
            variance: -5.0,
        });
        assert!(unit.link().is_none());
        assert_eq!(unit.guide(), Some(CategoryGuide::Parking));
    }

    #[test]
    fn test_facility_upsert_replaces_by_id() {
        let mut facility = Facility::new("f1", vec![UnitTypeStatistic::new("u1", "5x5", 50.0)]);

        assert!(facility.upsert_unit(UnitTypeStatistic::new("u1", "5x5", 55.0)));
        assert!(!facility.upsert_unit(UnitTypeStatistic::new("u2", "5x10", 70.0)));

        assert_eq!(facility.unit_types.len(), 2);
        assert_eq!(facility.find_unit("u1").unwrap().rate, 55.0);
    }

    #[test]
    fn test_projected_rate() {
        assert_eq!(projected_rate(100.0, 10.0), 110.0);
        assert_eq!(projected_rate(89.99, -5.0), 85.49);
    }
}
