use std::time::Duration;

use thiserror::Error;

use crate::model::{AppointmentId, ExceptionId, Instant, Span};

/// A record an operation expected to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Patient(String),
    Appointment(AppointmentId),
    Exception(ExceptionId),
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Patient(phone) => write!(f, "Patient {phone}"),
            Missing::Appointment(id) => write!(f, "Appointment {id}"),
            Missing::Exception(id) => write!(f, "Block {id}"),
        }
    }
}

/// Messages are user-facing and forwarded verbatim by the wire layer.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{0}")]
    InvalidTime(String),
    #[error("start time must be before end time ({start} >= {end})")]
    InvalidRange { start: Instant, end: Instant },
    #[error("Time is outside office hours.")]
    OutOfHours(Span),
    #[error("Time falls within a blocked period.")]
    Blocked(ExceptionId),
    #[error("Slot already booked.")]
    SlotTaken(AppointmentId),
    #[error("Cannot block this time; it is already booked by an existing appointment.")]
    ConflictsWithAppointment(AppointmentId),
    #[error("Time falls within a pre-existing blocked period.")]
    ConflictsWithException(ExceptionId),
    #[error("{0} not found.")]
    NotFound(Missing),
    #[error("{0}")]
    InvalidInput(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("storage busy: lock not acquired within {0:?}")]
    Timeout(Duration),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl SchedulerError {
    /// Both overlap rejections for block creation.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            SchedulerError::ConflictsWithAppointment(_) | SchedulerError::ConflictsWithException(_)
        )
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerError::InvalidTime(_) => "invalid_time",
            SchedulerError::InvalidRange { .. } => "invalid_range",
            SchedulerError::OutOfHours(_) => "out_of_hours",
            SchedulerError::Blocked(_) => "blocked",
            SchedulerError::SlotTaken(_) => "slot_taken",
            SchedulerError::ConflictsWithAppointment(_)
            | SchedulerError::ConflictsWithException(_) => "conflict",
            SchedulerError::NotFound(_) => "not_found",
            SchedulerError::InvalidInput(_) => "invalid_input",
            SchedulerError::LimitExceeded(_) => "limit_exceeded",
            SchedulerError::Timeout(_) => "timeout",
            SchedulerError::WalError(_) => "wal",
        }
    }

    /// SQLSTATE reported to wire clients.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidTime(_) => "22007",
            SchedulerError::InvalidRange { .. }
            | SchedulerError::OutOfHours(_)
            | SchedulerError::InvalidInput(_) => "22023",
            SchedulerError::Blocked(_)
            | SchedulerError::SlotTaken(_)
            | SchedulerError::ConflictsWithAppointment(_)
            | SchedulerError::ConflictsWithException(_) => "23P01",
            SchedulerError::NotFound(_) => "P0002",
            SchedulerError::LimitExceeded(_) => "54000",
            SchedulerError::Timeout(_) => "55P03",
            SchedulerError::WalError(_) => "58030",
        }
    }
}
