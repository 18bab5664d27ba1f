use std::collections::HashMap;

use crate::model::*;

/// Booked appointments, sorted by `span.start`. Never holds two overlapping spans.
#[derive(Debug, Default, Clone)]
pub struct AppointmentLedger {
    appointments: Vec<Appointment>,
}

impl AppointmentLedger {
    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.iter()
    }

    pub fn get(&self, id: AppointmentId) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.span.start <= appointment.span.start);
        self.appointments.insert(pos, appointment);
    }

    pub fn remove(&mut self, id: AppointmentId) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    /// Replace both endpoints at once. Returns the previous span.
    pub fn update_interval(&mut self, id: AppointmentId, span: Span) -> Option<Span> {
        let mut appointment = self.remove(id)?;
        let old = appointment.span;
        appointment.span = span;
        self.insert(appointment);
        Some(old)
    }

    /// Appointments whose span overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let right_bound = self
            .appointments
            .partition_point(|a| a.span.start < query.end);
        let query = *query;
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.span.overlaps(&query))
    }

    /// First appointment other than `exclude` overlapping `span`.
    pub fn conflicting(&self, span: &Span, exclude: Option<AppointmentId>) -> Option<AppointmentId> {
        self.overlapping(span)
            .find(|a| Some(a.id) != exclude)
            .map(|a| a.id)
    }

    pub fn has_conflict(&self, span: &Span, exclude: Option<AppointmentId>) -> bool {
        self.conflicting(span, exclude).is_some()
    }

    pub fn list_by_patient(&self, patient_id: PatientId) -> Vec<Appointment> {
        self.appointments
            .iter()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect()
    }
}

/// Administrative blocks, sorted by `span.start`. Never holds two overlapping spans.
#[derive(Debug, Default, Clone)]
pub struct AvailabilityLedger {
    exceptions: Vec<AvailabilityException>,
}

impl AvailabilityLedger {
    pub fn len(&self) -> usize {
        self.exceptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exceptions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AvailabilityException> {
        self.exceptions.iter()
    }

    pub fn insert(&mut self, exception: AvailabilityException) {
        let pos = self
            .exceptions
            .partition_point(|e| e.span.start <= exception.span.start);
        self.exceptions.insert(pos, exception);
    }

    pub fn remove(&mut self, id: ExceptionId) -> Option<AvailabilityException> {
        let pos = self.exceptions.iter().position(|e| e.id == id)?;
        Some(self.exceptions.remove(pos))
    }

    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &AvailabilityException> {
        let right_bound = self
            .exceptions
            .partition_point(|e| e.span.start < query.end);
        let query = *query;
        self.exceptions[..right_bound]
            .iter()
            .filter(move |e| e.span.overlaps(&query))
    }

    pub fn blocking_exception(&self, span: &Span) -> Option<ExceptionId> {
        self.overlapping(span).next().map(|e| e.id)
    }

    pub fn has_blocking_exception(&self, span: &Span) -> bool {
        self.blocking_exception(span).is_some()
    }

    /// Exceptions overlapping `range`, ordered by start.
    pub fn list(&self, range: &Span) -> Vec<AvailabilityException> {
        self.overlapping(range).cloned().collect()
    }
}

/// Patients keyed by surrogate id, with a unique phone index.
#[derive(Debug, Default, Clone)]
pub struct PatientRegistry {
    by_id: HashMap<PatientId, Patient>,
    by_phone: HashMap<String, PatientId>,
}

impl PatientRegistry {
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: PatientId) -> Option<&Patient> {
        self.by_id.get(&id)
    }

    pub fn find_by_phone(&self, phone: &str) -> Option<&Patient> {
        self.by_phone.get(phone).and_then(|id| self.by_id.get(id))
    }

    /// Insert or overwrite by id; the phone index follows.
    pub fn put(&mut self, patient: Patient) {
        if let Some(prev) = self.by_id.get(&patient.id)
            && prev.phone != patient.phone
        {
            self.by_phone.remove(&prev.phone);
        }
        self.by_phone.insert(patient.phone.clone(), patient.id);
        self.by_id.insert(patient.id, patient);
    }

    /// Patients in id order.
    pub fn sorted(&self) -> Vec<&Patient> {
        let mut all: Vec<&Patient> = self.by_id.values().collect();
        all.sort_by_key(|p| p.id);
        all
    }
}

/// Everything the scheduler guards with one lock.
#[derive(Debug, Clone)]
pub struct Ledgers {
    pub patients: PatientRegistry,
    pub appointments: AppointmentLedger,
    pub exceptions: AvailabilityLedger,
    next_patient: PatientId,
    next_appointment: AppointmentId,
    next_exception: ExceptionId,
}

impl Default for Ledgers {
    fn default() -> Self {
        Self {
            patients: PatientRegistry::default(),
            appointments: AppointmentLedger::default(),
            exceptions: AvailabilityLedger::default(),
            next_patient: 1,
            next_appointment: 1,
            next_exception: 1,
        }
    }
}

impl Ledgers {
    // Ids are peeked here and consumed by `apply`, so a rejected or failed
    // mutation never burns one.

    pub fn next_patient_id(&self) -> PatientId {
        self.next_patient
    }

    pub fn next_appointment_id(&self) -> AppointmentId {
        self.next_appointment
    }

    pub fn next_exception_id(&self) -> ExceptionId {
        self.next_exception
    }

    /// Apply an event. The caller holds the lock.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::PatientUpserted { id, phone, name, notes } => {
                self.patients.put(Patient {
                    id: *id,
                    phone: phone.clone(),
                    name: name.clone(),
                    notes: notes.clone(),
                });
                self.next_patient = self.next_patient.max(id + 1);
            }
            Event::AppointmentBooked { id, patient_id, span, note, created_at } => {
                self.appointments.insert(Appointment {
                    id: *id,
                    patient_id: *patient_id,
                    span: *span,
                    note: note.clone(),
                    created_at: *created_at,
                });
                self.next_appointment = self.next_appointment.max(id + 1);
            }
            Event::AppointmentRescheduled { id, span } => {
                self.appointments.update_interval(*id, *span);
            }
            Event::AppointmentCancelled { id } => {
                self.appointments.remove(*id);
            }
            Event::ExceptionAdded { id, span, reason } => {
                self.exceptions.insert(AvailabilityException {
                    id: *id,
                    span: *span,
                    reason: reason.clone(),
                });
                self.next_exception = self.next_exception.max(id + 1);
            }
            Event::ExceptionRemoved { id } => {
                self.exceptions.remove(*id);
            }
            Event::IdsReserved { next_patient, next_appointment, next_exception } => {
                self.next_patient = self.next_patient.max(*next_patient);
                self.next_appointment = self.next_appointment.max(*next_appointment);
                self.next_exception = self.next_exception.max(*next_exception);
            }
        }
    }

    /// Minimal event list that recreates this state, for WAL compaction.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = vec![Event::IdsReserved {
            next_patient: self.next_patient,
            next_appointment: self.next_appointment,
            next_exception: self.next_exception,
        }];
        for p in self.patients.sorted() {
            events.push(Event::PatientUpserted {
                id: p.id,
                phone: p.phone.clone(),
                name: p.name.clone(),
                notes: p.notes.clone(),
            });
        }
        for a in self.appointments.iter() {
            events.push(Event::AppointmentBooked {
                id: a.id,
                patient_id: a.patient_id,
                span: a.span,
                note: a.note.clone(),
                created_at: a.created_at,
            });
        }
        for e in self.exceptions.iter() {
            events.push(Event::ExceptionAdded {
                id: e.id,
                span: e.span,
                reason: e.reason.clone(),
            });
        }
        events
    }
}
