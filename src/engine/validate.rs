use chrono::{NaiveDate, NaiveTime};

use crate::model::Span;

use super::EngineError;

/// A parsed room request: a date plus a non-empty time-of-day span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomWindow {
    pub date: NaiveDate,
    pub span: Span,
}

impl RoomWindow {
    /// Parse wire values in order: date, start, end, then `end > start`.
    pub fn parse(date: &str, start: &str, end: &str) -> Result<Self, EngineError> {
        let date = parse_date(date)?;
        let start = parse_time(start)?;
        let end = parse_time(end)?;
        let span = Span::try_new(start, end).ok_or(EngineError::InvalidTimeRange)?;
        Ok(Self { date, span })
    }
}

/// Strict `yyyy-MM-dd`.
pub fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    let b = s.as_bytes();
    let shaped = b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit());
    if !shaped {
        return Err(EngineError::InvalidDateFormat(s.to_string()));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| EngineError::InvalidDateFormat(s.to_string()))
}

/// Strict `HH:mm`.
pub fn parse_time(s: &str) -> Result<NaiveTime, EngineError> {
    let b = s.as_bytes();
    let shaped = b.len() == 5
        && b[2] == b':'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 2 || c.is_ascii_digit());
    if !shaped {
        return Err(EngineError::InvalidTimeFormat(s.to_string()));
    }
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| EngineError::InvalidTimeFormat(s.to_string()))
}
