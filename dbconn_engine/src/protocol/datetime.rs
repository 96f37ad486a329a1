//! Calendar cracking and packing for the temporal kinds.
//!
//! Native layouts: DATETIME is `i32` days since 1900-01-01 followed by `u32`
//! ticks of 1/300 s, SMALLDATETIME `u16` days + `u16` minutes, DATE `i32` days,
//! TIME `i32` ticks, BIGDATETIME `u64` microseconds since 0000-01-01 and
//! BIGTIME `u64` microseconds since midnight. Epoch values are UTC.

use super::numeric::read_le;
use crate::error::{DbError, Result};
use crate::protocol::types::{LogicalType, NativeType};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const TICKS_PER_SECOND: u64 = 300;
const MICROS_PER_DAY: u64 = 86_400_000_000;

/// A cracked calendar record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRec {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millisecond: u32,
    /// Sub-millisecond remainder, only carried by the BIG* layouts.
    pub microsecond: u32,
}

impl DateRec {
    pub fn from_naive(dt: NaiveDateTime) -> Self {
        let micros = dt.nanosecond() / 1000;
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            millisecond: micros / 1000,
            microsecond: micros % 1000,
        }
    }

    pub fn to_naive(&self) -> Result<NaiveDateTime> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or_else(|| {
            DbError::Validation(format!(
                "invalid calendar date {:04}-{:02}-{:02}",
                self.year, self.month, self.day
            ))
        })?;
        let time = NaiveTime::from_hms_micro_opt(
            self.hour,
            self.minute,
            self.second,
            self.millisecond * 1000 + self.microsecond,
        )
        .ok_or_else(|| {
            DbError::Validation(format!(
                "invalid time of day {:02}:{:02}:{:02}.{:03}",
                self.hour, self.minute, self.second, self.millisecond
            ))
        })?;
        Ok(date.and_time(time))
    }

    /// `YYYYMMDD`
    pub fn date_value(&self) -> i32 {
        self.year * 10_000 + (self.month as i32) * 100 + self.day as i32
    }

    /// `HHMMSS.mmm`
    pub fn time_value(&self) -> f64 {
        f64::from(self.hour * 10_000 + self.minute * 100 + self.second)
            + f64::from(self.millisecond) / 1000.0
    }

    pub fn epoch_seconds(&self) -> Result<i64> {
        Ok(self.to_naive()?.and_utc().timestamp())
    }

    pub fn from_date_value(value: i32) -> Result<Self> {
        let rec = Self {
            year: value / 10_000,
            month: ((value / 100) % 100) as u32,
            day: (value % 100) as u32,
            ..Self::midnight_base()
        };
        rec.to_naive()?;
        Ok(rec)
    }

    pub fn from_time_value(value: f64) -> Result<Self> {
        if !(0.0..240_000.0).contains(&value) {
            return Err(DbError::Validation(format!("time value {} out of range", value)));
        }
        let whole = value.trunc() as u32;
        let millisecond = (((value - value.trunc()) * 1000.0 + 0.5).floor() as u32).min(999);
        let rec = Self {
            hour: whole / 10_000,
            minute: (whole / 100) % 100,
            second: whole % 100,
            millisecond,
            ..Self::midnight_base()
        };
        rec.to_naive()?;
        Ok(rec)
    }

    pub fn from_epoch(seconds: i64) -> Result<Self> {
        let dt = DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| DbError::Validation(format!("epoch {} out of range", seconds)))?;
        Ok(Self::from_naive(dt.naive_utc()))
    }

    fn midnight_base() -> Self {
        Self {
            year: 1900,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            millisecond: 0,
            microsecond: 0,
        }
    }
}

fn base_1900() -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(1900, 1, 1).ok_or_else(|| DbError::Internal("calendar base".to_string()))
}

fn base_year_zero() -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(0, 1, 1).ok_or_else(|| DbError::Internal("calendar base".to_string()))
}

fn shift_days(base: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        base.checked_add_days(Days::new(days as u64))
    } else {
        base.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

fn time_from_micros(micros: u64) -> Option<NaiveTime> {
    let secs = (micros / 1_000_000) as u32;
    let sub = (micros % 1_000_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, sub * 1000)
}

/// Cracks a native temporal buffer into a calendar record.
pub fn crack(native: NativeType, bytes: &[u8], requested: LogicalType) -> Result<DateRec> {
    let corrupt = || DbError::mismatch_with(requested, native, "corrupt temporal value");
    let base = base_1900()?;
    let dt = match native {
        NativeType::DateTime => {
            let days = i32::from_le_bytes(read_le::<4>(bytes, requested, native)?);
            let ticks = u32::from_le_bytes(read_le::<4>(&bytes[4.min(bytes.len())..], requested, native)?);
            let micros = (u64::from(ticks) * 1_000_000 + TICKS_PER_SECOND / 2) / TICKS_PER_SECOND;
            let micros = (micros / 1000) * 1000;
            let date = shift_days(base, i64::from(days)).ok_or_else(corrupt)?;
            date.and_time(time_from_micros(micros).ok_or_else(corrupt)?)
        }
        NativeType::SmallDateTime => {
            let days = u16::from_le_bytes(read_le::<2>(bytes, requested, native)?);
            let minutes = u16::from_le_bytes(read_le::<2>(&bytes[2.min(bytes.len())..], requested, native)?);
            let date = shift_days(base, i64::from(days)).ok_or_else(corrupt)?;
            let time = NaiveTime::from_num_seconds_from_midnight_opt(u32::from(minutes) * 60, 0)
                .ok_or_else(corrupt)?;
            date.and_time(time)
        }
        NativeType::Date => {
            let days = i32::from_le_bytes(read_le::<4>(bytes, requested, native)?);
            shift_days(base, i64::from(days))
                .ok_or_else(corrupt)?
                .and_time(NaiveTime::MIN)
        }
        NativeType::Time => {
            let ticks = i32::from_le_bytes(read_le::<4>(bytes, requested, native)?);
            let ticks = u64::try_from(ticks).map_err(|_| corrupt())?;
            let millis = (ticks * 1000 + TICKS_PER_SECOND / 2) / TICKS_PER_SECOND;
            base.and_time(time_from_micros(millis * 1000).ok_or_else(corrupt)?)
        }
        NativeType::BigDateTime => {
            let micros = u64::from_le_bytes(read_le::<8>(bytes, requested, native)?);
            let date = shift_days(base_year_zero()?, (micros / MICROS_PER_DAY) as i64)
                .ok_or_else(corrupt)?;
            date.and_time(time_from_micros(micros % MICROS_PER_DAY).ok_or_else(corrupt)?)
        }
        NativeType::BigTime => {
            let micros = u64::from_le_bytes(read_le::<8>(bytes, requested, native)?);
            base.and_time(time_from_micros(micros % MICROS_PER_DAY).ok_or_else(corrupt)?)
        }
        other => return Err(DbError::mismatch(requested, other)),
    };
    Ok(DateRec::from_naive(dt))
}

/// Packs a calendar record into a native temporal layout.
pub fn pack(native: NativeType, rec: &DateRec, requested: LogicalType) -> Result<Vec<u8>> {
    let dt = rec.to_naive()?;
    let base = base_1900()?;
    let days = (dt.date() - base).num_days();
    let micros_of_day = u64::from(dt.time().num_seconds_from_midnight()) * 1_000_000
        + u64::from(dt.time().nanosecond() / 1000);
    let out_of_range = || DbError::mismatch_with(requested, native, "date out of range");
    match native {
        NativeType::DateTime => {
            let days = i32::try_from(days).map_err(|_| out_of_range())?;
            let ticks = (micros_of_day * TICKS_PER_SECOND + 500_000) / 1_000_000;
            let mut out = days.to_le_bytes().to_vec();
            out.extend_from_slice(&(ticks as u32).to_le_bytes());
            Ok(out)
        }
        NativeType::SmallDateTime => {
            let days = u16::try_from(days).map_err(|_| out_of_range())?;
            let minutes = (micros_of_day / 60_000_000) as u16;
            let mut out = days.to_le_bytes().to_vec();
            out.extend_from_slice(&minutes.to_le_bytes());
            Ok(out)
        }
        NativeType::Date => {
            let days = i32::try_from(days).map_err(|_| out_of_range())?;
            Ok(days.to_le_bytes().to_vec())
        }
        NativeType::Time => {
            let ticks = (micros_of_day * TICKS_PER_SECOND + 500_000) / 1_000_000;
            Ok((ticks as i32).to_le_bytes().to_vec())
        }
        NativeType::BigDateTime => {
            let days = (dt.date() - base_year_zero()?).num_days();
            let days = u64::try_from(days).map_err(|_| out_of_range())?;
            Ok((days * MICROS_PER_DAY + micros_of_day).to_le_bytes().to_vec())
        }
        NativeType::BigTime => Ok(micros_of_day.to_le_bytes().to_vec()),
        other => Err(DbError::mismatch(requested, other)),
    }
}

/// `2024-01-05` from `20240105`
pub fn format_date(value: i32) -> Result<String> {
    let rec = DateRec::from_date_value(value)?;
    Ok(format!("{:04}-{:02}-{:02}", rec.year, rec.month, rec.day))
}

/// `10:15:30.250` from `101530.25`
pub fn format_time(value: f64) -> Result<String> {
    let rec = DateRec::from_time_value(value)?;
    Ok(format!(
        "{:02}:{:02}:{:02}.{:03}",
        rec.hour, rec.minute, rec.second, rec.millisecond
    ))
}

/// `2024-01-05 10:15:30` from epoch seconds (UTC)
pub fn format_datetime(epoch: i64) -> Result<String> {
    let rec = DateRec::from_epoch(epoch)?;
    Ok(format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        rec.year, rec.month, rec.day, rec.hour, rec.minute, rec.second
    ))
}

/// Date and/or time parts found in a textual temporal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalText {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl TemporalText {
    pub fn to_rec(&self) -> DateRec {
        let date = self
            .date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default());
        DateRec::from_naive(date.and_time(self.time.unwrap_or(NaiveTime::MIN)))
    }
}

/// Parses `YYYY-MM-DD`, `HH:MM:SS[.fff]` or `YYYY-MM-DD[ T]HH:MM:SS[.fff]`.
pub fn parse_text(text: &str) -> Option<TemporalText> {
    let text = text.trim();
    let (date_part, time_part) = match text.find(|c: char| c == ' ' || c == 'T') {
        Some(pos) => (Some(&text[..pos]), Some(text[pos + 1..].trim())),
        None if text.contains(':') => (None, Some(text)),
        None => (Some(text), None),
    };
    let date = match date_part {
        Some(d) => Some(NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()?),
        None => None,
    };
    let time = match time_part {
        Some(t) => Some(
            NaiveTime::parse_from_str(t, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
                .ok()?,
        ),
        None => None,
    };
    Some(TemporalText { date, time })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> DateRec {
        DateRec {
            year: y,
            month: mo,
            day: d,
            hour: h,
            minute: mi,
            second: s,
            millisecond: ms,
            microsecond: 0,
        }
    }

    #[test]
    fn test_date_and_time_values() {
        let r = rec(2024, 1, 5, 10, 15, 30, 250);
        assert_eq!(r.date_value(), 20240105);
        assert!((r.time_value() - 101530.25).abs() < 1e-9);
    }

    #[test]
    fn test_epoch_is_utc() {
        let r = rec(1970, 1, 2, 0, 0, 0, 0);
        assert_eq!(r.epoch_seconds().unwrap(), 86_400);
        let back = DateRec::from_epoch(86_400).unwrap();
        assert_eq!(back.date_value(), 19700102);
    }

    #[test]
    fn test_from_date_value_rejects_invalid_dates() {
        assert!(DateRec::from_date_value(20240230).is_err());
        assert_eq!(DateRec::from_date_value(20240229).unwrap().day, 29);
    }

    #[test]
    fn test_from_time_value_rounds_milliseconds() {
        let r = DateRec::from_time_value(235959.9996).unwrap();
        assert_eq!((r.hour, r.minute, r.second, r.millisecond), (23, 59, 59, 999));
        let r = DateRec::from_time_value(101530.2504).unwrap();
        assert_eq!(r.millisecond, 250);
        assert!(DateRec::from_time_value(246000.0).is_err());
        assert!(DateRec::from_time_value(-1.0).is_err());
    }

    #[test]
    fn test_datetime_pack_crack() {
        let r = rec(2001, 9, 11, 8, 46, 40, 500);
        let bytes = pack(NativeType::DateTime, &r, LogicalType::DateTime).unwrap();
        assert_eq!(bytes.len(), 8);
        let back = crack(NativeType::DateTime, &bytes, LogicalType::DateTime).unwrap();
        assert_eq!(back.date_value(), 20010911);
        assert_eq!((back.hour, back.minute, back.second), (8, 46, 40));
        assert_eq!(back.millisecond, 500);
    }

    #[test]
    fn test_smalldatetime_drops_seconds() {
        let r = rec(2010, 6, 1, 12, 30, 45, 0);
        let bytes = pack(NativeType::SmallDateTime, &r, LogicalType::DateTime).unwrap();
        let back = crack(NativeType::SmallDateTime, &bytes, LogicalType::DateTime).unwrap();
        assert_eq!((back.hour, back.minute, back.second), (12, 30, 0));
    }

    #[test]
    fn test_date_and_time_layouts() {
        let r = rec(1899, 12, 31, 0, 0, 0, 0);
        let bytes = pack(NativeType::Date, &r, LogicalType::Date).unwrap();
        assert_eq!(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), -1);
        assert_eq!(
            crack(NativeType::Date, &bytes, LogicalType::Date).unwrap().date_value(),
            18991231
        );

        let t = rec(1900, 1, 1, 1, 0, 0, 0);
        let bytes = pack(NativeType::Time, &t, LogicalType::Time).unwrap();
        assert_eq!(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 3600 * 300);
    }

    #[test]
    fn test_big_layouts_keep_microseconds() {
        let mut r = rec(2020, 2, 29, 23, 59, 59, 123);
        r.microsecond = 456;
        let bytes = pack(NativeType::BigDateTime, &r, LogicalType::DateTime).unwrap();
        let back = crack(NativeType::BigDateTime, &bytes, LogicalType::DateTime).unwrap();
        assert_eq!(back, r);

        let bytes = pack(NativeType::BigTime, &r, LogicalType::Time).unwrap();
        let back = crack(NativeType::BigTime, &bytes, LogicalType::Time).unwrap();
        assert_eq!((back.hour, back.millisecond, back.microsecond), (23, 123, 456));
    }

    #[test]
    fn test_crack_short_buffer_is_mismatch() {
        let err = crack(NativeType::DateTime, &[1, 2, 3], LogicalType::DateTime).unwrap_err();
        assert!(matches!(err, DbError::TypeMismatch { .. }));
    }

    #[test]
    fn test_text_formats() {
        assert_eq!(format_date(20240105).unwrap(), "2024-01-05");
        assert_eq!(format_time(101530.25).unwrap(), "10:15:30.250");
        assert_eq!(format_datetime(0).unwrap(), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_parse_text_variants() {
        let d = parse_text("2024-01-05").unwrap();
        assert!(d.date.is_some() && d.time.is_none());

        let t = parse_text("10:15:30.250").unwrap();
        assert!(t.date.is_none() && t.time.is_some());
        assert_eq!(t.to_rec().millisecond, 250);

        let dt = parse_text("2024-01-05 10:15:30").unwrap();
        assert_eq!(dt.to_rec().date_value(), 20240105);
        assert!(parse_text("2024-01-05T10:15:30").is_some());

        assert!(parse_text("hello").is_none());
        assert!(parse_text("2024-13-01").is_none());
    }
}
