// ==========================================
// 发布列表性质测试
// ==========================================
// 随机生成 3 个门店的 NEW/SAVED 分区、请求列表（可含重复与其他门店的 id）、发布范围:
// - 请求为空或范围内无台账 → 无可发布
// - 请求 ⊆ 范围内 SAVED → 提交列表恰为请求（去重），对账后受影响门店整体清除
// - 否则 → 拒绝，拒绝列表恰为不在范围内 SAVED 的 id，且未登记在途请求
// ==========================================


use std::collections::BTreeSet;

use facility_pricing_ops::engine::{EngineError, PublishPlan, PublishRequest, PublishTarget};
use proptest::prelude::*;
use proptest::test_runner::Config;
use test_helpers::loaded_facilities;

const FACILITIES: [&str; 3] = ["f1", "f2", "f3"];
const UNITS_PER_FACILITY: usize = 4;
const UNIT_COUNT: usize = FACILITIES.len() * UNITS_PER_FACILITY;

/// 单元在台账中的状态
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Untouched,
    New,
    Saved,
}

fn phase_strategy() -> impl Strategy<Value = Phase> {
    prop_oneof![Just(Phase::Untouched), Just(Phase::New), Just(Phase::Saved)]
}

/// 第 idx 个单元: (门店 id, 单元 id)；单元 id 跨门店唯一
fn unit_at(idx: usize) -> (&'static str, String) {
    let facility_id = FACILITIES[idx / UNITS_PER_FACILITY];
    (facility_id, format!("{}-u{}", facility_id, idx % UNITS_PER_FACILITY))
}

fn target_of(target: Option<usize>) -> PublishTarget {
    match target {
        None => PublishTarget::Portfolio,
        Some(i) => PublishTarget::Facility(FACILITIES[i].to_string()),
    }
}

proptest! {
    #![proptest_config(Config::with_cases(256))]

    #[test]
    fn submitted_ids_stay_within_saved_scope(
        phases in prop::collection::vec(phase_strategy(), UNIT_COUNT),
        requested_idx in prop::collection::vec(0..UNIT_COUNT, 0..10),
        target_idx in prop::option::of(0..FACILITIES.len()),
    ) {
        let layout: Vec<(&str, Vec<String>)> = FACILITIES
            .iter()
            .enumerate()
            .map(|(f, fid)| {
                let units = (0..UNITS_PER_FACILITY)
                    .map(|u| unit_at(f * UNITS_PER_FACILITY + u).1)
                    .collect();
                (*fid, units)
            })
            .collect();
        let mut session = loaded_facilities(&layout);

        for (idx, phase) in phases.iter().enumerate() {
            if *phase != Phase::Untouched {
                let (facility_id, unit_id) = unit_at(idx);
                session.edit_rate(facility_id, &unit_id, 60.0).unwrap();
            }
        }
        for facility_id in FACILITIES {
            let to_save: Vec<String> = phases
                .iter()
                .enumerate()
                .filter(|(idx, phase)| **phase == Phase::Saved && unit_at(*idx).0 == facility_id)
                .map(|(idx, _)| unit_at(idx).1)
                .collect();
            if !to_save.is_empty() {
                session.save_units(facility_id, &to_save).unwrap();
            }
        }

        let target = target_of(target_idx);
        let in_scope = |facility_id: &str| match &target {
            PublishTarget::Portfolio => true,
            PublishTarget::Facility(fid) => fid == facility_id,
        };
        let scope_saved: BTreeSet<String> = phases
            .iter()
            .enumerate()
            .filter(|(idx, phase)| **phase == Phase::Saved && in_scope(unit_at(*idx).0))
            .map(|(idx, _)| unit_at(idx).1)
            .collect();
        let scope_has_entry = phases
            .iter()
            .enumerate()
            .any(|(idx, phase)| *phase != Phase::Untouched && in_scope(unit_at(idx).0));

        let requested: Vec<String> = requested_idx.iter().map(|idx| unit_at(*idx).1).collect();
        let mut seen = BTreeSet::new();
        let deduped: Vec<String> = requested
            .iter()
            .filter(|id| seen.insert(id.to_string()))
            .cloned()
            .collect();
        let outside: Vec<String> = deduped
            .iter()
            .filter(|id| !scope_saved.contains(*id))
            .cloned()
            .collect();

        let ledger_before = session.tracker().ledger().to_vec();
        let result = session.begin_publish(target.clone(), &requested);

        if deduped.is_empty() || !scope_has_entry {
            prop_assert_eq!(result, Ok(PublishPlan::NothingToPublish));
            prop_assert_eq!(session.pending().in_flight_count(), 0);
            return Ok(());
        }

        match result {
            Ok(PublishPlan::Ready(ticket)) => {
                prop_assert!(outside.is_empty());
                let submitted = match (&ticket.request, &target) {
                    (PublishRequest::All(request), PublishTarget::Portfolio) => request.ecri_ids.clone(),
                    (PublishRequest::Individual(request), PublishTarget::Facility(fid)) => {
                        prop_assert_eq!(&request.facility_id, fid);
                        request.ecri_ids.clone()
                    }
                    (request, target) => {
                        return Err(TestCaseError::fail(format!(
                            "request {:?} does not match target {:?}",
                            request, target
                        )));
                    }
                };
                prop_assert_eq!(&submitted, &deduped);
                prop_assert!(submitted.iter().all(|id| scope_saved.contains(id)));

                let owners: Vec<String> = submitted
                    .iter()
                    .map(|id| {
                        let idx = (0..UNIT_COUNT).find(|i| &unit_at(*i).1 == id).unwrap_or(0);
                        unit_at(idx).0.to_string()
                    })
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                prop_assert_eq!(&ticket.snapshot.facility_ids, &owners);

                let report = session.complete_publish(ticket.seq).unwrap();
                prop_assert_eq!(&report.cleared_facilities, &owners);
                prop_assert_eq!(report.retained_units, 0);
                for entry in &ledger_before {
                    let after = session.tracker().entry(&entry.facility_id);
                    if owners.contains(&entry.facility_id) {
                        // 受影响门店整体清除（NEW 单元一并清除）
                        prop_assert!(after.is_none());
                    } else {
                        prop_assert_eq!(after, Some(entry));
                    }
                }
                prop_assert_eq!(session.pending().in_flight_count(), 0);
            }
            Err(EngineError::NotInSavedPartition { unit_ids }) => {
                prop_assert_eq!(&unit_ids, &outside);
                prop_assert_eq!(session.pending().in_flight_count(), 0);
                prop_assert_eq!(session.tracker().ledger(), ledger_before.as_slice());
            }
            other => {
                return Err(TestCaseError::fail(format!("unexpected result {:?}", other)));
            }
        }
    }
}
