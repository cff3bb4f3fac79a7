//! Birth-date parsing, format conversion, and age derivation.
//!
//! Members edit dates in the display form `M/D/YYYY` (padding optional). The profile
//! backend expects the zero-padded `MM/dd/yyyy` form.

use chrono::{Datelike, Local, NaiveDate};

/// chrono format string matching the backend's `MM/dd/yyyy` contract.
pub const BACKEND_DATE_FORMAT: &str = "%m/%d/%Y";

/// Birth years before this are treated as typos rather than real members.
pub const EARLIEST_BIRTH_YEAR: i32 = 1900;

/// Reasons a birth date entry cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BirthDateError {
    #[error("Enter your birthday as MM/DD/YYYY")]
    Unparsable,
    #[error("Enter a valid calendar date")]
    InvalidCalendarDate,
    #[error("Birthday cannot be in the future")]
    InFuture,
    #[error("Birthday must be in 1900 or later")]
    TooEarly,
}

/// Source of "today" for age math, injectable so tests stay deterministic.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Clock backed by the local system date.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock pinned to a single date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Parse a date typed in display form. Accepts `2/8/1957` and `02/08/1957`.
pub fn parse_display_date(raw: &str) -> Result<NaiveDate, BirthDateError> {
    parse_slashed(raw, false)
}

/// Parse a date in the backend's strict zero-padded form.
pub fn parse_backend_date(raw: &str) -> Result<NaiveDate, BirthDateError> {
    parse_slashed(raw, true)
}

fn parse_slashed(raw: &str, strict_padding: bool) -> Result<NaiveDate, BirthDateError> {
    let parts: Vec<&str> = raw.trim().split('/').collect();
    let &[month, day, year] = parts.as_slice() else {
        return Err(BirthDateError::Unparsable);
    };

    let width_ok = |part: &str, min: usize, max: usize| {
        (min..=max).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
    };
    let min_width = if strict_padding { 2 } else { 1 };
    if !width_ok(month, min_width, 2) || !width_ok(day, min_width, 2) || !width_ok(year, 4, 4) {
        return Err(BirthDateError::Unparsable);
    }

    let month: u32 = month.parse().map_err(|_| BirthDateError::Unparsable)?;
    let day: u32 = day.parse().map_err(|_| BirthDateError::Unparsable)?;
    let year: i32 = year.parse().map_err(|_| BirthDateError::Unparsable)?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or(BirthDateError::InvalidCalendarDate)
}

/// Parse a birth date and reject dates after `today` or before [`EARLIEST_BIRTH_YEAR`].
pub fn parse_birth_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, BirthDateError> {
    let date = parse_display_date(raw)?;
    if date > today {
        return Err(BirthDateError::InFuture);
    }
    if date.year() < EARLIEST_BIRTH_YEAR {
        return Err(BirthDateError::TooEarly);
    }
    Ok(date)
}

pub fn to_backend_format(date: NaiveDate) -> String {
    date.format(BACKEND_DATE_FORMAT).to_string()
}

pub fn to_display_format(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.month(), date.day(), date.year())
}

/// Convert a display-form entry into the backend's zero-padded form.
pub fn display_to_backend(raw: &str) -> Result<String, BirthDateError> {
    parse_display_date(raw).map(to_backend_format)
}

/// Convert a backend date string back into display form.
pub fn backend_to_display(raw: &str) -> Result<String, BirthDateError> {
    parse_backend_date(raw).map(to_display_format)
}

/// Whole years elapsed between `birth` and `today`, or `None` for a future birth date.
///
/// A birthday that has not yet occurred this year (by month and day) counts one year fewer.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    if birth > today {
        return None;
    }
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// Age derived from a display-form entry; unusable input yields no age.
pub fn derive_age(raw: &str, today: NaiveDate) -> Option<u32> {
    parse_birth_date(raw, today)
        .ok()
        .and_then(|birth| age_on(birth, today))
}
