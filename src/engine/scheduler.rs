use std::sync::Arc;

use tokio::sync::RwLockWriteGuard;
use tracing::{debug, info};

use crate::grid::{self, OfficeHours};
use crate::limits::*;
use crate::model::*;

use super::conflict::{
    check_blockable, check_bookable, now, validate_block_range, validate_phone, validate_text,
};
use super::{Ledgers, Missing, SchedulerError, Store};

/// Validates requests against the grid and office hours, checks both
/// ledgers, and performs create / reschedule / cancel / block transitions.
///
/// Every mutation runs its checks and its write under the store's write
/// lock; a rejected call leaves the ledgers and the WAL untouched.
pub struct Scheduler {
    pub(super) store: Arc<Store>,
    pub(super) hours: OfficeHours,
}

fn rejected(op: &'static str, err: SchedulerError) -> SchedulerError {
    debug!(op, kind = err.kind(), "rejected: {err}");
    metrics::counter!(
        crate::observability::SCHEDULING_REJECTIONS_TOTAL,
        "op" => op,
        "kind" => err.kind()
    )
    .increment(1);
    err
}

impl Scheduler {
    pub fn new(store: Arc<Store>, hours: OfficeHours) -> Self {
        Self { store, hours }
    }

    /// A lock timeout counts as a rejection of `op`.
    async fn write_lock(
        &self,
        op: &'static str,
    ) -> Result<RwLockWriteGuard<'_, Ledgers>, SchedulerError> {
        self.store.write().await.map_err(|e| rejected(op, e))
    }

    /// Create or overwrite a patient's name and notes.
    pub async fn upsert_patient(
        &self,
        phone: &str,
        name: &str,
        notes: Option<&str>,
    ) -> Result<Patient, SchedulerError> {
        let phone = validate_phone(phone).map_err(|e| rejected("upsert_patient", e))?;
        validate_text(Some(name), MAX_NAME_LEN, "name too long")
            .and_then(|()| validate_text(notes, MAX_NOTE_LEN, "notes too long"))
            .map_err(|e| rejected("upsert_patient", e))?;

        let mut guard = self.write_lock("upsert_patient").await?;
        let id = guard
            .patients
            .find_by_phone(phone)
            .map_or_else(|| guard.next_patient_id(), |p| p.id);
        let patient = Patient {
            id,
            phone: phone.to_string(),
            name: name.to_string(),
            notes: notes.unwrap_or_default().to_string(),
        };
        let event = Event::PatientUpserted {
            id,
            phone: patient.phone.clone(),
            name: patient.name.clone(),
            notes: patient.notes.clone(),
        };
        self.store.persist_and_apply(&mut guard, vec![event]).await?;
        info!(patient = id, "upserted patient {phone}");
        Ok(patient)
    }

    /// Book the 30-minute slot starting at `start` for the patient with `phone`.
    ///
    /// An unknown phone registers a new patient named after the phone. An
    /// existing patient's name and notes are left as they are.
    pub async fn book(
        &self,
        phone: &str,
        start: Instant,
        note: Option<String>,
    ) -> Result<Appointment, SchedulerError> {
        let phone = validate_phone(phone).map_err(|e| rejected("book", e))?;
        validate_text(note.as_deref(), MAX_NOTE_LEN, "note too long")
            .map_err(|e| rejected("book", e))?;
        let span = grid::slot_at(start, &self.hours).map_err(|e| rejected("book", e))?;

        let mut guard = self.write_lock("book").await?;
        check_bookable(&guard, &span, None).map_err(|e| rejected("book", e))?;

        let mut events = Vec::with_capacity(2);
        let patient_id = match guard.patients.find_by_phone(phone) {
            Some(p) => p.id,
            None => {
                let id = guard.next_patient_id();
                events.push(Event::PatientUpserted {
                    id,
                    phone: phone.to_string(),
                    name: phone.to_string(),
                    notes: String::new(),
                });
                id
            }
        };
        let appointment = Appointment {
            id: guard.next_appointment_id(),
            patient_id,
            span,
            note,
            created_at: now(),
        };
        events.push(Event::AppointmentBooked {
            id: appointment.id,
            patient_id,
            span,
            note: appointment.note.clone(),
            created_at: appointment.created_at,
        });

        self.store.persist_and_apply(&mut guard, events).await?;
        info!(appointment = appointment.id, patient = patient_id, "booked {}", span.start);
        Ok(appointment)
    }

    /// Move an appointment to the slot starting at `new_start`. The
    /// appointment's own current slot never counts as a conflict.
    pub async fn reschedule(
        &self,
        id: AppointmentId,
        new_start: Instant,
    ) -> Result<Appointment, SchedulerError> {
        let span = grid::slot_at(new_start, &self.hours).map_err(|e| rejected("reschedule", e))?;

        let mut guard = self.write_lock("reschedule").await?;
        let mut appointment = guard
            .appointments
            .get(id)
            .cloned()
            .ok_or_else(|| rejected("reschedule", SchedulerError::NotFound(Missing::Appointment(id))))?;
        check_bookable(&guard, &span, Some(id)).map_err(|e| rejected("reschedule", e))?;

        let event = Event::AppointmentRescheduled { id, span };
        self.store.persist_and_apply(&mut guard, vec![event]).await?;
        info!(appointment = id, "rescheduled {} -> {}", appointment.span.start, span.start);
        appointment.span = span;
        Ok(appointment)
    }

    /// Delete an appointment. Returns what was removed.
    pub async fn cancel(&self, id: AppointmentId) -> Result<Appointment, SchedulerError> {
        let mut guard = self.write_lock("cancel").await?;
        let appointment = guard
            .appointments
            .get(id)
            .cloned()
            .ok_or_else(|| rejected("cancel", SchedulerError::NotFound(Missing::Appointment(id))))?;

        let event = Event::AppointmentCancelled { id };
        self.store.persist_and_apply(&mut guard, vec![event]).await?;
        info!(appointment = id, "cancelled {}", appointment.span.start);
        Ok(appointment)
    }

    /// Close `[start, end)` for booking. Fails rather than evicting an
    /// existing appointment.
    pub async fn block(
        &self,
        start: Instant,
        end: Instant,
        reason: Option<String>,
    ) -> Result<AvailabilityException, SchedulerError> {
        let span = validate_block_range(start, end).map_err(|e| rejected("block", e))?;
        validate_text(reason.as_deref(), MAX_NOTE_LEN, "reason too long")
            .map_err(|e| rejected("block", e))?;

        let mut guard = self.write_lock("block").await?;
        check_blockable(&guard, &span).map_err(|e| rejected("block", e))?;

        let exception = AvailabilityException {
            id: guard.next_exception_id(),
            span,
            reason,
        };
        let event = Event::ExceptionAdded {
            id: exception.id,
            span,
            reason: exception.reason.clone(),
        };
        self.store.persist_and_apply(&mut guard, vec![event]).await?;
        info!(block = exception.id, "blocked {} - {}", span.start, span.end);
        Ok(exception)
    }

    /// Delete a block. Returns what was removed.
    pub async fn remove_exception(
        &self,
        id: ExceptionId,
    ) -> Result<AvailabilityException, SchedulerError> {
        let mut guard = self.write_lock("remove_exception").await?;
        let exception = guard
            .exceptions
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| {
                rejected("remove_exception", SchedulerError::NotFound(Missing::Exception(id)))
            })?;

        let event = Event::ExceptionRemoved { id };
        self.store.persist_and_apply(&mut guard, vec![event]).await?;
        info!(block = id, "removed block {} - {}", exception.span.start, exception.span.end);
        Ok(exception)
    }
}
