use chrono::Duration;

use crate::grid;
use crate::limits::*;
use crate::model::*;

use super::{Ledgers, SchedulerError};

pub(crate) fn now() -> Instant {
    chrono::Local::now().naive_local()
}

/// A slot is bookable when no block and no other appointment overlaps it.
/// Blocks are reported before bookings.
pub(crate) fn check_bookable(
    ledgers: &Ledgers,
    span: &Span,
    exclude: Option<AppointmentId>,
) -> Result<(), SchedulerError> {
    if let Some(id) = ledgers.exceptions.blocking_exception(span) {
        return Err(SchedulerError::Blocked(id));
    }
    if let Some(id) = ledgers.appointments.conflicting(span, exclude) {
        return Err(SchedulerError::SlotTaken(id));
    }
    Ok(())
}

/// Blocks never evict bookings, and never overlap each other.
pub(crate) fn check_blockable(ledgers: &Ledgers, span: &Span) -> Result<(), SchedulerError> {
    if let Some(id) = ledgers.appointments.conflicting(span, None) {
        return Err(SchedulerError::ConflictsWithAppointment(id));
    }
    if let Some(id) = ledgers.exceptions.blocking_exception(span) {
        return Err(SchedulerError::ConflictsWithException(id));
    }
    Ok(())
}

pub(crate) fn validate_block_range(start: Instant, end: Instant) -> Result<Span, SchedulerError> {
    if start >= end {
        return Err(SchedulerError::InvalidRange { start, end });
    }
    if !grid::is_on_grid(start) || !grid::is_on_grid(end) {
        return Err(SchedulerError::InvalidTime(
            "Blocks must align to 30-minute boundaries.".into(),
        ));
    }
    if end - start > Duration::days(MAX_BLOCK_DAYS) {
        return Err(SchedulerError::LimitExceeded("block too wide"));
    }
    Ok(Span::new(start, end))
}

pub(crate) fn validate_phone(phone: &str) -> Result<&str, SchedulerError> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(SchedulerError::InvalidInput("phone must not be empty".into()));
    }
    if phone.len() > MAX_PHONE_LEN {
        return Err(SchedulerError::LimitExceeded("phone too long"));
    }
    Ok(phone)
}

pub(crate) fn validate_text(
    value: Option<&str>,
    max: usize,
    what: &'static str,
) -> Result<(), SchedulerError> {
    match value {
        Some(v) if v.len() > max => Err(SchedulerError::LimitExceeded(what)),
        _ => Ok(()),
    }
}
