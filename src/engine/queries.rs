use chrono::{Duration, NaiveDate};

use crate::limits::*;
use crate::model::*;

use super::{Missing, Scheduler, SchedulerError};

impl Scheduler {
    pub async fn get_patient(&self, phone: &str) -> Result<Patient, SchedulerError> {
        let guard = self.store.read().await?;
        guard
            .patients
            .find_by_phone(phone.trim())
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound(Missing::Patient(phone.trim().to_string())))
    }

    /// A patient's appointments ordered by start. Empty for an unknown phone.
    pub async fn appointments_for_phone(
        &self,
        phone: &str,
    ) -> Result<Vec<Appointment>, SchedulerError> {
        let guard = self.store.read().await?;
        Ok(match guard.patients.find_by_phone(phone.trim()) {
            Some(p) => guard.appointments.list_by_patient(p.id),
            None => Vec::new(),
        })
    }

    pub async fn list_by_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<Appointment>, SchedulerError> {
        let guard = self.store.read().await?;
        Ok(guard.appointments.list_by_patient(patient_id))
    }

    pub async fn get_appointment(&self, id: AppointmentId) -> Result<Appointment, SchedulerError> {
        let guard = self.store.read().await?;
        guard
            .appointments
            .get(id)
            .cloned()
            .ok_or(SchedulerError::NotFound(Missing::Appointment(id)))
    }

    /// Blocks overlapping `range`, ordered by start.
    pub async fn list_exceptions(
        &self,
        range: Span,
    ) -> Result<Vec<AvailabilityException>, SchedulerError> {
        if range.duration() > Duration::days(MAX_QUERY_WINDOW_DAYS) {
            return Err(SchedulerError::LimitExceeded("query window too wide"));
        }
        let guard = self.store.read().await?;
        Ok(guard.exceptions.list(&range))
    }

    /// Blocks touching any part of `date`.
    pub async fn exceptions_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilityException>, SchedulerError> {
        let start = date.and_time(chrono::NaiveTime::MIN);
        let end = start.checked_add_signed(Duration::days(1)).ok_or_else(|| {
            SchedulerError::InvalidTime("Date is outside the supported calendar range.".into())
        })?;
        self.list_exceptions(Span::new(start, end)).await
    }

    pub fn health(&self) -> Health {
        Health {
            ok: true,
            office_open: self.hours.open(),
            office_close: self.hours.close(),
        }
    }
}
