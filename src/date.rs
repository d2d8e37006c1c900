//! PDF date strings.
//!
//! Signature dictionaries carry their signing time as a PDF date string
//! (ISO 32000-1:2008, Section 7.9.4). This codec accepts a deliberately strict
//! subset of that grammar:
//!
//! ```text
//! [D:]YYYYMMDDHHmmSS[(+|-)HH'mm' | (+|-)HHmm]
//! ```
//!
//! Every field is fixed width. Partial dates, separators, whitespace and the
//! `Z` zone designator are rejected. A date with a zone suffix carries an
//! explicit UTC offset; a date without one is local time.

use crate::error::{Error, Result};
use chrono::{
    DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike,
};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref PDF_DATE: Regex = Regex::new(
        r"^(?:D:)?([0-9]{4})([0-9]{2})([0-9]{2})([0-9]{2})([0-9]{2})([0-9]{2})(?:([+-])([0-9]{2})(?:'([0-9]{2})'|([0-9]{2})))?$"
    )
    .expect("PDF date pattern is valid");
}

/// A timestamp decoded from (or destined for) a PDF date string.
///
/// Precision is one second. `offset` is `None` when the string had no zone
/// suffix, which means the value is in the local time of whoever reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfDate {
    datetime: NaiveDateTime,
    offset: Option<FixedOffset>,
}

impl PdfDate {
    /// Create a date with an explicit UTC offset.
    pub fn with_offset(datetime: NaiveDateTime, offset: FixedOffset) -> Self {
        Self {
            datetime: truncate_to_seconds(datetime),
            offset: Some(offset),
        }
    }

    /// Create a date in local time.
    pub fn local(datetime: NaiveDateTime) -> Self {
        Self {
            datetime: truncate_to_seconds(datetime),
            offset: None,
        }
    }

    /// Current local time, recorded with the zone's offset.
    pub fn now() -> Self {
        Self::from(Local::now())
    }

    /// Wall-clock date and time as written in the string.
    pub fn naive(&self) -> NaiveDateTime {
        self.datetime
    }

    /// UTC offset, or `None` for local time.
    pub fn offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// Whether the date is in local time.
    pub fn is_local(&self) -> bool {
        self.offset.is_none()
    }

    /// Resolve to an absolute point in time.
    ///
    /// Local dates are interpreted in the machine's time zone. A local time
    /// that does not exist (skipped by a DST change) takes the offset in
    /// effect at the same UTC instant.
    pub fn to_datetime(&self) -> Result<DateTime<FixedOffset>> {
        let offset = match self.offset {
            Some(offset) => offset,
            None => Local
                .offset_from_local_datetime(&self.datetime)
                .earliest()
                .map(|o| o.fix())
                .unwrap_or_else(|| Local.offset_from_utc_datetime(&self.datetime).fix()),
        };
        offset
            .from_local_datetime(&self.datetime)
            .single()
            .ok_or_else(|| Error::Format(format!("{} has no single instant", self.format())))
    }

    /// Encode as `D:YYYYMMDDHHmmSS` with an `+HH'mm'` suffix when the date
    /// carries an offset.
    pub fn format(&self) -> String {
        let dt = &self.datetime;
        let mut out = format!(
            "D:{:04}{:02}{:02}{:02}{:02}{:02}",
            dt.year(),
            dt.month(),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second()
        );
        if let Some(offset) = self.offset {
            let seconds = offset.local_minus_utc();
            let sign = if seconds < 0 { '-' } else { '+' };
            let minutes = seconds.unsigned_abs() / 60;
            out.push_str(&format!("{}{:02}'{:02}'", sign, minutes / 60, minutes % 60));
        }
        out
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for PdfDate {
    fn from(value: DateTime<Tz>) -> Self {
        let offset = value.offset().fix();
        Self::with_offset(value.naive_local(), offset)
    }
}

impl fmt::Display for PdfDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for PdfDate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_pdf_date(Some(s))
    }
}

/// Parse a PDF date string.
///
/// # Errors
///
/// - `Error::InvalidArgument` when `text` is `None`
/// - `Error::Format` when the text does not match the grammar or names a
///   day, time or offset that does not exist (month 13, second 60, ...)
///
/// # Examples
///
/// ```
/// use pdf_signet::date::parse_pdf_date;
///
/// let date = parse_pdf_date(Some("D:20230527014059+02'00'")).unwrap();
/// assert_eq!(date.offset().unwrap().local_minus_utc(), 7200);
/// assert!(parse_pdf_date(Some("20230527")).is_err());
/// ```
pub fn parse_pdf_date(text: Option<&str>) -> Result<PdfDate> {
    let text =
        text.ok_or_else(|| Error::InvalidArgument("PDF date text is required".to_string()))?;

    let caps = PDF_DATE
        .captures(text)
        .ok_or_else(|| Error::Format(format!("'{}' does not match D:YYYYMMDDHHmmSS[+HH'mm']", text)))?;

    let field = |i: usize| -> u32 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    let datetime = NaiveDate::from_ymd_opt(field(1) as i32, field(2), field(3))
        .and_then(|date| date.and_hms_opt(field(4), field(5), field(6)))
        .ok_or_else(|| Error::Format(format!("'{}' is not a valid calendar time", text)))?;

    let Some(sign) = caps.get(7) else {
        return Ok(PdfDate::local(datetime));
    };

    let hours = field(8);
    let minutes = if caps.get(9).is_some() { field(9) } else { field(10) };
    if hours > 23 || minutes > 59 {
        return Err(Error::Format(format!("'{}' has an out of range UTC offset", text)));
    }
    let mut seconds = (hours * 3600 + minutes * 60) as i32;
    if sign.as_str() == "-" {
        seconds = -seconds;
    }
    let offset = FixedOffset::east_opt(seconds)
        .ok_or_else(|| Error::Format(format!("'{}' has an out of range UTC offset", text)))?;

    Ok(PdfDate::with_offset(datetime, offset))
}

/// Format a timestamp as a PDF date string.
pub fn format_pdf_date(date: &PdfDate) -> String {
    date.format()
}

fn truncate_to_seconds(datetime: NaiveDateTime) -> NaiveDateTime {
    datetime.with_nanosecond(0).unwrap_or(datetime)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    // ========================================================================
    // Accepted forms
    // ========================================================================

    #[test]
    fn test_parse_without_prefix_or_zone() {
        let date = parse_pdf_date(Some("20230527014059")).unwrap();
        assert_eq!(date.naive(), naive(2023, 5, 27, 1, 40, 59));
        assert!(date.is_local());
    }

    #[test]
    fn test_parse_apostrophe_zone() {
        let date = parse_pdf_date(Some("D:20230527014059+02'00'")).unwrap();
        assert_eq!(date.naive(), naive(2023, 5, 27, 1, 40, 59));
        assert_eq!(date.offset(), FixedOffset::east_opt(7200));
    }

    #[test]
    fn test_parse_compact_zone() {
        let date = parse_pdf_date(Some("D:20230527014059+0200")).unwrap();
        assert_eq!(date.offset(), FixedOffset::east_opt(7200));
    }

    #[test]
    fn test_parse_negative_zone_without_prefix() {
        let date = parse_pdf_date(Some("20230527014059-03'00'")).unwrap();
        assert_eq!(date.offset(), FixedOffset::west_opt(3 * 3600));
    }

    #[test]
    fn test_parse_half_hour_zone() {
        let date = parse_pdf_date(Some("D:20230527211515+05'30'")).unwrap();
        assert_eq!(date.offset(), FixedOffset::east_opt(5 * 3600 + 30 * 60));
    }

    #[test]
    fn test_parse_end_of_century() {
        let date = parse_pdf_date(Some("D:20991231235959+00'00'")).unwrap();
        assert_eq!(date.naive(), naive(2099, 12, 31, 23, 59, 59));
        assert_eq!(date.offset(), FixedOffset::east_opt(0));
    }

    #[test]
    fn test_offset_instant() {
        let date = parse_pdf_date(Some("D:20230527014059+02'00'")).unwrap();
        let instant = date.to_datetime().unwrap();
        assert_eq!(instant.naive_utc(), naive(2023, 5, 26, 23, 40, 59));
    }

    // ========================================================================
    // Rejected forms
    // ========================================================================

    #[test]
    fn test_none_is_invalid_argument() {
        assert!(matches!(parse_pdf_date(None), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_empty_and_fragments() {
        for text in ["", "  ", "D", "D:", "20230527", "d:20230527014059"] {
            assert!(
                matches!(parse_pdf_date(Some(text)), Err(Error::Format(_))),
                "accepted {:?}",
                text
            );
        }
    }

    #[test]
    fn test_rejects_out_of_range_fields() {
        for text in [
            "D:20231327014059",
            "D:20230532014059",
            "D:20230527244059",
            "D:20230527016059",
            "D:20230527014060",
            "D:20230230120000",
        ] {
            assert!(parse_pdf_date(Some(text)).is_err(), "accepted {:?}", text);
        }
    }

    #[test]
    fn test_rejects_whitespace() {
        for text in [
            "D: 20230527014059",
            "2023 05 27 01 40 59",
            "D:20230527014059 +02'00'",
            " D:20230527014059",
            "D:20230527014059\n",
        ] {
            assert!(
                matches!(parse_pdf_date(Some(text)), Err(Error::Format(_))),
                "accepted {:?}",
                text
            );
        }
    }

    #[test]
    fn test_rejects_malformed_zone() {
        for text in [
            "D:20230527014059Z",
            "D:20230527014059+02'00",
            "D:20230527014059+02",
            "D:20230527014059+2400",
            "D:20230527014059+0260",
        ] {
            assert!(parse_pdf_date(Some(text)).is_err(), "accepted {:?}", text);
        }
    }

    #[test]
    fn test_rejects_non_ascii_digits() {
        assert!(parse_pdf_date(Some("D:٢٠٢٣0527014059")).is_err());
    }

    // ========================================================================
    // Formatting
    // ========================================================================

    #[test]
    fn test_format_with_offset() {
        let date = PdfDate::with_offset(
            naive(2023, 5, 27, 1, 40, 59),
            FixedOffset::west_opt(3 * 3600 + 30 * 60).unwrap(),
        );
        assert_eq!(date.format(), "D:20230527014059-03'30'");
        assert_eq!(date.to_string(), date.format());
    }

    #[test]
    fn test_format_local() {
        let date = PdfDate::local(naive(2024, 2, 29, 12, 0, 0));
        assert_eq!(format_pdf_date(&date), "D:20240229120000");
    }

    #[test]
    fn test_round_trip_variants() {
        for text in ["D:20230527014059+0200", "20230527014059", "D:20991231235959+00'00'"] {
            let date: PdfDate = text.parse().unwrap();
            let again: PdfDate = date.format().parse().unwrap();
            assert_eq!(date, again);
        }
    }

    #[test]
    fn test_now_has_offset_and_no_subseconds() {
        let now = PdfDate::now();
        assert!(!now.is_local());
        assert_eq!(now.naive().nanosecond(), 0);
    }
}
