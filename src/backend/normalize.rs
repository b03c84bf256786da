// ==========================================
// 仓储定价运营系统 - 后端响应规范化
// ==========================================
// 职责: 将字段名不一致的后端记录映射为规范形状
// 规则: 每个字段有一组别名，取第一个非空值
// 红线: 缺少 id 或价格的单元记录被跳过并记录警告，不中断整体加载
// ==========================================

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{RawFacilitiesResponse, RawRecord};
use crate::domain::facility::{AnchorInfo, Facility, LinkInfo, LockInfo, LockState, Relationship, UnitTypeStatistic};
use crate::domain::types::CategoryGuide;

// ===== 字段别名 =====
const FACILITY_ID: &[&str] = &["facility_id", "facilityId", "id"];
const FACILITY_NAME: &[&str] = &["facility_name", "facilityName", "name"];
const FACILITY_UNITS: &[&str] = &["unit_types", "unitTypes", "units", "units_statistics"];

const UNIT_ID: &[&str] = &["id", "ut_id", "unit_type_id", "unitTypeId"];
const UNIT_NAME: &[&str] = &["ut_name", "unit_type", "unitType", "name"];
const UNIT_RATE: &[&str] = &["rate", "new_rate", "newRate", "current_rate"];
const STREET_RATE: &[&str] = &["street_rate", "streetRate", "web_rate"];
const OCCUPANCY: &[&str] = &["occupancy_percentage", "occupancy", "occupancyPercentage"];
const AREA: &[&str] = &["area", "ut_sqft", "sqft"];
const FLOOR: &[&str] = &["floor", "ut_floor"];

const LINK: &[&str] = &["link", "link_info", "linkInfo"];
const LINK_TARGET: &[&str] = &["linkedUnitTypeId", "linked_unit_type_id", "linked_ut_id"];
const LINK_ADJUSTMENT: &[&str] = &["adjustmentPercentage", "adjustment_percentage", "adjustment"];
const GUIDE: &[&str] = &["guide", "category", "category_guide"];
const CATEGORY_DATA: &[&str] = &["category_data", "categoryData", "anchor"];
const VARIANCE: &[&str] = &["variance", "category_variance"];
const LOCK: &[&str] = &["lock", "lock_info", "lockInfo"];
const LOCKED: &[&str] = &["locked", "is_locked"];
const EXPIRATION: &[&str] = &["expirationDate", "expiration_date", "lock_expiration"];

/// 关联候选（规范化后）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub id: String,
    pub ut_name: String,
    pub floor: Option<String>,
    pub area: Option<f64>,
}

/// 规范化门店拉取响应
///
/// # 返回
/// (门店列表, 总数)；分页信息缺失时以门店数作为总数
pub fn normalize_facilities(raw: RawFacilitiesResponse) -> (Vec<Facility>, u64) {
    let facilities: Vec<Facility> = raw.result.iter().filter_map(normalize_facility).collect();
    let total = raw
        .pagination
        .map(|p| p.total)
        .unwrap_or(facilities.len() as u64);
    (facilities, total)
}

pub fn normalize_facility(record: &RawRecord) -> Option<Facility> {
    let Some(facility_id) = get_string(record, FACILITY_ID) else {
        tracing::warn!("门店记录缺少 facility_id，已跳过");
        return None;
    };

    let mut facility = Facility::new(facility_id, Vec::new());
    facility.facility_name = get_string(record, FACILITY_NAME);

    let units = first_value(record, FACILITY_UNITS)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    for unit in units.iter().filter_map(Value::as_object).filter_map(normalize_unit) {
        if facility.find_unit(&unit.id).is_some() {
            tracing::warn!(
                facility_id = %facility.facility_id,
                unit_id = %unit.id,
                "门店内单元 id 重复，保留首条"
            );
            continue;
        }
        facility.unit_types.push(unit);
    }
    Some(facility)
}

pub fn normalize_unit(record: &RawRecord) -> Option<UnitTypeStatistic> {
    let Some(id) = get_string(record, UNIT_ID) else {
        tracing::warn!("单元记录缺少 id，已跳过");
        return None;
    };
    let Some(rate) = get_f64(record, UNIT_RATE) else {
        tracing::warn!(unit_id = %id, "单元记录缺少价格，已跳过");
        return None;
    };

    let ut_name = get_string(record, UNIT_NAME).unwrap_or_else(|| id.clone());
    let mut unit = UnitTypeStatistic::new(id, ut_name, rate);
    unit.street_rate = get_f64(record, STREET_RATE);
    unit.occupancy = get_f64(record, OCCUPANCY);
    unit.area = get_f64(record, AREA);
    unit.floor = get_string(record, FLOOR);
    unit.relationship = normalize_relationship(record);
    unit.lock = normalize_lock(record);
    Some(unit)
}

/// 关联优先于锚定；两者都缺失时为未关联
fn normalize_relationship(record: &RawRecord) -> Relationship {
    if let Some(link) = first_value(record, LINK).and_then(Value::as_object) {
        if let Some(target) = get_string(link, LINK_TARGET) {
            return Relationship::Linked(LinkInfo {
                linked_unit_type_id: target,
                adjustment_percentage: get_f64(link, LINK_ADJUSTMENT).unwrap_or(0.0),
            });
        }
    }

    let anchor_source = first_value(record, CATEGORY_DATA)
        .and_then(Value::as_object)
        .unwrap_or(record);
    get_string(anchor_source, GUIDE)
        .and_then(|g| CategoryGuide::parse(&g))
        .map(|guide| {
            Relationship::Anchored(AnchorInfo {
                guide,
                variance: get_f64(anchor_source, VARIANCE).unwrap_or(0.0),
            })
        })
        .unwrap_or_default()
}

fn normalize_lock(record: &RawRecord) -> LockState {
    let Some(lock) = first_value(record, LOCK).and_then(Value::as_object) else {
        return LockState::Unlocked;
    };
    let info = LockInfo {
        locked: get_bool(lock, LOCKED).unwrap_or(false),
        expiration_date: get_string(lock, EXPIRATION).and_then(|s| parse_date(&s)),
    };
    LockState::from_lock_info(Some(&info))
}

/// 规范化关联候选
pub fn normalize_link_candidates(records: &[RawRecord]) -> Vec<LinkCandidate> {
    records
        .iter()
        .filter_map(|record| {
            let id = get_string(record, UNIT_ID)?;
            Some(LinkCandidate {
                ut_name: get_string(record, UNIT_NAME).unwrap_or_else(|| id.clone()),
                id,
                floor: get_string(record, FLOOR),
                area: get_f64(record, AREA),
            })
        })
        .collect()
}

// ==========================================
// 字段提取
// ==========================================

fn first_value<'a>(record: &'a RawRecord, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| record.get(*alias))
        .find(|v| !v.is_null())
}

/// 字符串字段: 字符串去空白后非空，或数字转字符串
fn get_string(record: &RawRecord, aliases: &[&str]) -> Option<String> {
    for alias in aliases {
        match record.get(*alias) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// 数值字段: 数字，或可解析的字符串（允许 `$`、`%`、千分位逗号）
fn get_f64(record: &RawRecord, aliases: &[&str]) -> Option<f64> {
    for alias in aliases {
        let parsed = match record.get(*alias) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => {
                let cleaned: String = s
                    .trim()
                    .chars()
                    .filter(|c| !matches!(c, '$' | '%' | ','))
                    .collect();
                cleaned.parse::<f64>().ok()
            }
            _ => None,
        };
        if let Some(v) = parsed.filter(|v| v.is_finite()) {
            return Some(v);
        }
    }
    None
}

fn get_bool(record: &RawRecord, aliases: &[&str]) -> Option<bool> {
    for alias in aliases {
        match record.get(*alias) {
            Some(Value::Bool(b)) => return Some(*b),
            Some(Value::Number(n)) => return Some(n.as_i64() == Some(1)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => return Some(true),
                "false" | "0" | "no" => return Some(false),
                _ => {}
            },
            _ => {}
        }
    }
    None
}

/// 日期: `YYYY-MM-DD` 或 RFC3339 时间戳
fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Pagination;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_unit_aliases_first_non_empty_wins() {
        let unit = normalize_unit(&record(json!({
            "ut_id": 42,
            "ut_name": "",
            "unit_type": "10x10",
            "new_rate": "$1,129.50",
            "web_rate": 120,
            "occupancy": "91%",
            "ut_sqft": "100",
            "floor": 2
        })))
        .unwrap();

        assert_eq!(unit.id, "42");
        assert_eq!(unit.ut_name, "10x10");
        assert_eq!(unit.rate, 1129.5);
        assert_eq!(unit.street_rate, Some(120.0));
        assert_eq!(unit.occupancy, Some(91.0));
        assert_eq!(unit.area, Some(100.0));
        assert_eq!(unit.floor.as_deref(), Some("2"));
        assert_eq!(unit.relationship, Relationship::Unlinked);
        assert_eq!(unit.lock, LockState::Unlocked);
    }

    #[test]
    fn test_unit_without_rate_is_skipped() {
        assert!(normalize_unit(&record(json!({"id": "u1", "ut_name": "5x5"}))).is_none());
        assert!(normalize_unit(&record(json!({"rate": 10}))).is_none());
    }

    #[test]
    fn test_relationship_and_lock_sub_objects() {
        let linked = normalize_unit(&record(json!({
            "id": "u1", "rate": 50,
            "link": {"linkedUnitTypeId": "u2", "adjustmentPercentage": "-5"},
            "guide": "Parking",
            "lock": {"locked": true, "expirationDate": "2026-12-31T00:00:00Z"}
        })))
        .unwrap();
        assert_eq!(
            linked.relationship,
            Relationship::Linked(LinkInfo {
                linked_unit_type_id: "u2".to_string(),
                adjustment_percentage: -5.0
            })
        );
        assert_eq!(
            linked.lock,
            LockState::ScheduledLock {
                expiration_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()
            }
        );

        let anchored = normalize_unit(&record(json!({
            "id": "u3", "rate": 70,
            "category_data": {"guide": "Climate Controlled", "variance": 3},
            "lock": {"locked": "true"}
        })))
        .unwrap();
        assert_eq!(anchored.guide(), Some(CategoryGuide::ClimateControlled));
        assert_eq!(anchored.lock, LockState::LockedNow);
    }

    #[test]
    fn test_facilities_dedupe_units_and_total_fallback() {
        let raw = RawFacilitiesResponse {
            result: vec![
                record(json!({
                    "facilityId": "f1",
                    "name": "Downtown",
                    "units": [
                        {"id": "u1", "rate": 50},
                        {"id": "u1", "rate": 55},
                        {"id": "u2", "rate": 80}
                    ]
                })),
                record(json!({"name": "no id"})),
            ],
            pagination: None,
        };

        let (facilities, total) = normalize_facilities(raw);

        assert_eq!(total, 1);
        assert_eq!(facilities[0].facility_name.as_deref(), Some("Downtown"));
        assert_eq!(facilities[0].unit_types.len(), 2);
        assert_eq!(facilities[0].find_unit("u1").unwrap().rate, 50.0);

        let (_, total) = normalize_facilities(RawFacilitiesResponse {
            result: vec![],
            pagination: Some(Pagination { total: 37 }),
        });
        assert_eq!(total, 37);
    }

    #[test]
    fn test_link_candidates() {
        let candidates = normalize_link_candidates(&[
            record(json!({"ut_id": "u9", "unit_type": "10x15", "ut_sqft": 150})),
            record(json!({"unit_type": "missing id"})),
        ]);

        assert_eq!(
            candidates,
            vec![LinkCandidate {
                id: "u9".to_string(),
                ut_name: "10x15".to_string(),
                floor: None,
                area: Some(150.0),
            }]
        );
    }
}
