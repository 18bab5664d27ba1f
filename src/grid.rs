//! Time grid: 30-minute slot quantization and the office-hours window.
//! Pure functions only.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::engine::SchedulerError;
use crate::model::{Instant, Span};

/// Fixed appointment length and grid step.
pub const SLOT_MINUTES: i64 = 30;

const OFF_GRID: &str = "Start time must align on 30-minute boundaries.";
const OUT_OF_RANGE: &str = "Date is outside the supported calendar range.";

const DEFAULT_OPEN: NaiveTime = NaiveTime::from_hms_opt(9, 0, 0).expect("valid constant");
const DEFAULT_CLOSE: NaiveTime = NaiveTime::from_hms_opt(17, 0, 0).expect("valid constant");

/// Daily window in which slots may exist. Same window every calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfficeHours {
    open: NaiveTime,
    close: NaiveTime,
}

impl Default for OfficeHours {
    fn default() -> Self {
        Self {
            open: DEFAULT_OPEN,
            close: DEFAULT_CLOSE,
        }
    }
}

impl OfficeHours {
    /// Both ends must sit on the grid and `open < close`.
    pub fn new(open: NaiveTime, close: NaiveTime) -> Result<Self, SchedulerError> {
        if !time_on_grid(open) || !time_on_grid(close) {
            return Err(SchedulerError::InvalidTime(format!(
                "office hours {open}-{close} must align on 30-minute boundaries"
            )));
        }
        if open >= close {
            return Err(SchedulerError::InvalidInput(format!(
                "office hours open {open} must be before close {close}"
            )));
        }
        Ok(Self { open, close })
    }

    /// Parse an `HH:MM` pair, e.g. `("09:00", "17:00")`.
    pub fn parse(open: &str, close: &str) -> Result<Self, SchedulerError> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|_| SchedulerError::InvalidTime(format!("bad office time: {s}")))
        };
        Self::new(parse(open)?, parse(close)?)
    }

    pub fn open(&self) -> NaiveTime {
        self.open
    }

    pub fn close(&self) -> NaiveTime {
        self.close
    }

    /// The window on a calendar day as a span.
    pub fn on(&self, date: NaiveDate) -> Span {
        Span::new(date.and_time(self.open), date.and_time(self.close))
    }
}

fn time_on_grid(t: NaiveTime) -> bool {
    (t.minute() == 0 || t.minute() == 30) && t.second() == 0 && t.nanosecond() == 0
}

pub fn is_on_grid(instant: Instant) -> bool {
    time_on_grid(instant.time())
}

/// `None` past the end of the calendar.
pub fn slot_end(start: Instant) -> Option<Instant> {
    start.checked_add_signed(Duration::minutes(SLOT_MINUTES))
}

/// Office hours are taken from `start`'s calendar date, so a span crossing
/// midnight is never inside them.
pub fn within_office_hours(start: Instant, end: Instant, hours: &OfficeHours) -> bool {
    let window = hours.on(start.date());
    start >= window.start && end <= window.end
}

/// Every slot from open to close on `date`, in order.
pub fn grid_slots(date: NaiveDate, hours: &OfficeHours) -> impl Iterator<Item = Span> + use<> {
    let window = hours.on(date);
    std::iter::successors(Some(window.start), |&t| slot_end(t))
        .map_while(move |t| slot_end(t).filter(|&end| end <= window.end).map(|end| Span::new(t, end)))
}

/// Validate a proposed appointment start and return its slot.
pub fn slot_at(start: Instant, hours: &OfficeHours) -> Result<Span, SchedulerError> {
    if !is_on_grid(start) {
        return Err(SchedulerError::InvalidTime(OFF_GRID.into()));
    }
    let end = slot_end(start).ok_or_else(|| SchedulerError::InvalidTime(OUT_OF_RANGE.into()))?;
    if !within_office_hours(start, end, hours) {
        return Err(SchedulerError::OutOfHours(Span::new(start, end)));
    }
    Ok(Span::new(start, end))
}

const INSTANT_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 local date-time.
pub fn parse_instant(s: &str) -> Result<Instant, SchedulerError> {
    let s = s.trim();
    INSTANT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| SchedulerError::InvalidTime(format!("invalid ISO-8601 date/time: {s}")))
}

/// Parse `YYYY-MM-DD`; a full date-time is accepted and its date kept.
pub fn parse_date(s: &str) -> Result<NaiveDate, SchedulerError> {
    let trimmed = s.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| parse_instant(trimmed).map(|t| t.date()))
        .map_err(|_| SchedulerError::InvalidTime("Invalid date format. Use YYYY-MM-DD.".into()))
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    let key: String = name.trim().to_lowercase().chars().take(3).collect();
    match key.as_str() {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Next date on or after `reference` falling on the named weekday.
/// Only the first three letters count, so "Wednesday" and "wed" agree.
pub fn resolve_day_of_week(name: &str, reference: NaiveDate) -> Result<NaiveDate, SchedulerError> {
    let target = weekday_from_name(name)
        .ok_or_else(|| SchedulerError::InvalidInput("Invalid day of week".into()))?;
    let ahead = (7 + target.num_days_from_monday() as i64
        - reference.weekday().num_days_from_monday() as i64)
        % 7;
    reference
        .checked_add_signed(Duration::days(ahead))
        .ok_or_else(|| SchedulerError::InvalidTime(OUT_OF_RANGE.into()))
}

/// Human label, e.g. `09:00 AM - 09:30 AM`.
pub fn slot_label(span: &Span) -> String {
    format!("{} - {}", span.start.format("%I:%M %p"), span.end.format("%I:%M %p"))
}
