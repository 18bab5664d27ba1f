use std::sync::Arc;

use chrono::NaiveDate;

use crate::grid::{self, OfficeHours};
use crate::model::*;

use super::{Ledgers, SchedulerError, Store};

// ── Free-slot algorithm ─────────────────────────────────────────

/// Grid slots of `date` inside office hours that neither ledger overlaps.
///
/// Uses the same overlap predicate as booking, so every slot returned here
/// would be accepted by `book` against the same ledgers.
pub fn free_slots(ledgers: &Ledgers, date: NaiveDate, hours: &OfficeHours) -> Vec<Span> {
    grid::grid_slots(date, hours)
        .filter(|slot| {
            !ledgers.appointments.has_conflict(slot, None)
                && !ledgers.exceptions.has_blocking_exception(slot)
        })
        .collect()
}

/// Every grid slot of `date`, tagged with what occupies it.
pub fn day_schedule(ledgers: &Ledgers, date: NaiveDate, hours: &OfficeHours) -> Vec<DaySlot> {
    grid::grid_slots(date, hours)
        .map(|span| {
            let state = if let Some(id) = ledgers.exceptions.blocking_exception(&span) {
                SlotState::Blocked(id)
            } else if let Some(id) = ledgers.appointments.conflicting(&span, None) {
                SlotState::Booked(id)
            } else {
                SlotState::Free
            };
            DaySlot { span, state }
        })
        .collect()
}

/// Read-only view answering "which slots are free on day D?".
#[derive(Clone)]
pub struct AvailabilityCalculator {
    store: Arc<Store>,
    hours: OfficeHours,
}

impl AvailabilityCalculator {
    pub fn new(store: Arc<Store>, hours: OfficeHours) -> Self {
        Self { store, hours }
    }

    pub async fn free_slots(&self, date: NaiveDate) -> Result<Vec<Span>, SchedulerError> {
        let guard = self.store.read().await?;
        Ok(free_slots(&guard, date, &self.hours))
    }

    /// Free slots on the next occurrence of `day_name` on or after
    /// `reference` (today when absent).
    pub async fn free_slots_on(
        &self,
        day_name: &str,
        reference: Option<NaiveDate>,
    ) -> Result<(NaiveDate, Vec<Span>), SchedulerError> {
        let reference = reference.unwrap_or_else(|| chrono::Local::now().date_naive());
        let date = grid::resolve_day_of_week(day_name, reference)?;
        Ok((date, self.free_slots(date).await?))
    }

    pub async fn day_schedule(&self, date: NaiveDate) -> Result<Vec<DaySlot>, SchedulerError> {
        let guard = self.store.read().await?;
        Ok(day_schedule(&guard, date, &self.hours))
    }
}
