use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Local wall-clock instant. The clinic runs in one implicit zone.
pub type Instant = NaiveDateTime;

pub type PatientId = u64;
pub type AppointmentId = u64;
pub type ExceptionId = u64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Instant,
    pub end: Instant,
}

impl Span {
    pub fn new(start: Instant, end: Instant) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// The one overlap predicate. Every conflict check and the free-slot
    /// computation go through here.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub phone: String,
    pub name: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient_id: PatientId,
    pub span: Span,
    pub note: Option<String>,
    pub created_at: Instant,
}

/// Administrative block. Never bookable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityException {
    pub id: ExceptionId,
    pub span: Span,
    pub reason: Option<String>,
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PatientUpserted {
        id: PatientId,
        phone: String,
        name: String,
        notes: String,
    },
    AppointmentBooked {
        id: AppointmentId,
        patient_id: PatientId,
        span: Span,
        note: Option<String>,
        created_at: Instant,
    },
    AppointmentRescheduled {
        id: AppointmentId,
        span: Span,
    },
    AppointmentCancelled {
        id: AppointmentId,
    },
    ExceptionAdded {
        id: ExceptionId,
        span: Span,
        reason: Option<String>,
    },
    ExceptionRemoved {
        id: ExceptionId,
    },
    /// Written at the head of a compacted WAL so ids of deleted records are
    /// never handed out again.
    IdsReserved {
        next_patient: PatientId,
        next_appointment: AppointmentId,
        next_exception: ExceptionId,
    },
}

// ── Query result types ───────────────────────────────────────────

/// What occupies a grid slot on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Booked(AppointmentId),
    Blocked(ExceptionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySlot {
    pub span: Span,
    pub state: SlotState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub ok: bool,
    pub office_open: chrono::NaiveTime,
    pub office_close: chrono::NaiveTime,
}

#[cfg(test)]
pub(crate) fn at(s: &str) -> Instant {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap()
}
