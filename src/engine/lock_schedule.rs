// ==========================================
// 仓储定价运营系统 - 锁定排期状态机
// ==========================================
// 状态机: UNLOCKED → SCHEDULE_CONFIRM → {LOCKED_NOW, SCHEDULED_LOCK(date)}
// SCHEDULE_CONFIRM 为二选一: 立即锁定 / 选择到期日
// 到期判断在读取时惰性进行，见 LockState::effective
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::facility::LockState;
use crate::engine::change_tracker::{ChangeTracker, EditOutcome};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::relationship::{no_draft, require_unit, transition, RelationshipResolver, UnitKey};
use crate::engine::unit_store::UnitStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockDraft {
    ScheduleConfirm,
    PickingExpiration { expiration_date: Option<NaiveDate> },
}

impl LockDraft {
    pub fn label(&self) -> &'static str {
        match self {
            LockDraft::ScheduleConfirm => "SCHEDULE_CONFIRM",
            LockDraft::PickingExpiration { .. } => "PICKING_EXPIRATION",
        }
    }
}

// 锁定变化不改变提议价格，已保存的单元保持 SAVED
const LOCK_EDIT_IS_NEW: bool = false;

impl RelationshipResolver {
    pub fn lock_draft(&self, facility_id: &str, unit_id: &str) -> Option<&LockDraft> {
        self.lock_drafts.get(&UnitKey::new(facility_id, unit_id))
    }

    /// 进入 SCHEDULE_CONFIRM；单元在 `today` 必须处于未锁定状态
    pub fn begin_lock(
        &mut self,
        store: &UnitStore,
        facility_id: &str,
        unit_id: &str,
        today: NaiveDate,
    ) -> EngineResult<()> {
        let unit = require_unit(store, facility_id, unit_id)?;
        let effective = unit.lock.effective(today);
        if effective != LockState::Unlocked {
            return Err(transition(effective.label(), "SCHEDULE_CONFIRM"));
        }
        self.lock_drafts
            .insert(UnitKey::new(facility_id, unit_id), LockDraft::ScheduleConfirm);
        Ok(())
    }

    /// 二选一: 立即锁定（无到期日）
    pub fn lock_now(
        &mut self,
        store: &mut UnitStore,
        tracker: &mut ChangeTracker,
        facility_id: &str,
        unit_id: &str,
    ) -> EngineResult<EditOutcome> {
        let key = UnitKey::new(facility_id, unit_id);
        match self.lock_drafts.get(&key) {
            Some(LockDraft::ScheduleConfirm) => {}
            Some(other) => return Err(transition(other.label(), "LOCKED_NOW")),
            None => return Err(no_draft(facility_id, unit_id)),
        }

        let outcome = self.write_lock(store, tracker, facility_id, unit_id, LockState::LockedNow)?;
        self.lock_drafts.remove(&key);
        Ok(outcome)
    }

    /// 二选一: 进入到期日选择
    pub fn choose_schedule(&mut self, facility_id: &str, unit_id: &str) -> EngineResult<()> {
        let draft = self
            .lock_drafts
            .get_mut(&UnitKey::new(facility_id, unit_id))
            .ok_or_else(|| no_draft(facility_id, unit_id))?;
        if *draft != LockDraft::ScheduleConfirm {
            return Err(transition(draft.label(), "PICKING_EXPIRATION"));
        }
        *draft = LockDraft::PickingExpiration {
            expiration_date: None,
        };
        Ok(())
    }

    /// 选择到期日；必须晚于今天
    pub fn set_lock_expiration(
        &mut self,
        facility_id: &str,
        unit_id: &str,
        expiration: NaiveDate,
        today: NaiveDate,
    ) -> EngineResult<()> {
        if expiration <= today {
            return Err(EngineError::ExpirationNotInFuture {
                expiration: expiration.to_string(),
                today: today.to_string(),
            });
        }
        match self
            .lock_drafts
            .get_mut(&UnitKey::new(facility_id, unit_id))
        {
            Some(LockDraft::PickingExpiration { expiration_date }) => {
                *expiration_date = Some(expiration);
                Ok(())
            }
            Some(other) => Err(transition(other.label(), "EXPIRATION_SELECTED")),
            None => Err(no_draft(facility_id, unit_id)),
        }
    }

    /// 确认排期锁定: PICKING_EXPIRATION → SCHEDULED_LOCK
    ///
    /// 确认时再次检查到期日（草稿可能跨日）
    pub fn confirm_scheduled_lock(
        &mut self,
        store: &mut UnitStore,
        tracker: &mut ChangeTracker,
        facility_id: &str,
        unit_id: &str,
        today: NaiveDate,
    ) -> EngineResult<EditOutcome> {
        let key = UnitKey::new(facility_id, unit_id);
        let expiration_date = match self.lock_drafts.get(&key) {
            Some(LockDraft::PickingExpiration {
                expiration_date: Some(date),
            }) => *date,
            Some(LockDraft::PickingExpiration {
                expiration_date: None,
            }) => return Err(transition("PICKING_EXPIRATION", "SCHEDULED_LOCK")),
            Some(other) => return Err(transition(other.label(), "SCHEDULED_LOCK")),
            None => return Err(no_draft(facility_id, unit_id)),
        };
        if expiration_date <= today {
            return Err(EngineError::ExpirationNotInFuture {
                expiration: expiration_date.to_string(),
                today: today.to_string(),
            });
        }

        let outcome = self.write_lock(
            store,
            tracker,
            facility_id,
            unit_id,
            LockState::ScheduledLock { expiration_date },
        )?;
        self.lock_drafts.remove(&key);
        Ok(outcome)
    }

    pub fn cancel_lock_draft(&mut self, facility_id: &str, unit_id: &str) -> bool {
        self.lock_drafts
            .remove(&UnitKey::new(facility_id, unit_id))
            .is_some()
    }

    /// 解锁；已处于未锁定（含已到期）时不登记
    pub fn unlock(
        &mut self,
        store: &mut UnitStore,
        tracker: &mut ChangeTracker,
        facility_id: &str,
        unit_id: &str,
        today: NaiveDate,
    ) -> EngineResult<EditOutcome> {
        self.lock_drafts.remove(&UnitKey::new(facility_id, unit_id));
        let unit = require_unit(store, facility_id, unit_id)?;
        if unit.lock == LockState::Unlocked {
            return Ok(EditOutcome::Unchanged);
        }
        if unit.lock.effective(today) == LockState::Unlocked {
            tracing::debug!(facility_id, unit_id, "排期锁定已到期，按解锁处理");
        }
        self.write_lock(store, tracker, facility_id, unit_id, LockState::Unlocked)
    }

    fn write_lock(
        &self,
        store: &mut UnitStore,
        tracker: &mut ChangeTracker,
        facility_id: &str,
        unit_id: &str,
        lock: LockState,
    ) -> EngineResult<EditOutcome> {
        let mut unit = require_unit(store, facility_id, unit_id)?.clone();
        tracing::info!(
            facility_id,
            unit_id,
            from = unit.lock.label(),
            to = lock.label(),
            "单元类型锁定状态变更"
        );
        unit.lock = lock;
        Ok(tracker.apply_edit(store, facility_id, unit, LOCK_EDIT_IS_NEW))
    }
}
