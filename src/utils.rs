use crate::error::{LeaseError, Result};
use chrono::{Datelike, NaiveDate};

/// Round to two decimal places with half-away-from-zero semantics.
/// All amounts handed across the report boundary go through this.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff
}

/// Add `months` to a date, clamping the day to the target month's length
/// (e.g. Jan 31 + 1 month = Feb 28/29).
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

pub fn parse_iso_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        LeaseError::DateError(format!("Invalid date '{}'. Expected YYYY-MM-DD", raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(1234.5649), 1234.56);
        assert_eq!(round_cents(1234.565), 1234.57);
        assert_eq!(round_cents(-0.005), -0.01);
    }

    #[test]
    fn test_months_between() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(months_between(start, end), 23);

        let same = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(months_between(same, same), 0);
    }

    #[test]
    fn test_add_months_clamps_day() {
        let jan31 = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(
            add_months(jan31, 1),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            add_months(jan31, 13),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );

        let nov15 = NaiveDate::from_ymd_opt(2023, 11, 15).unwrap();
        assert_eq!(
            add_months(nov15, 2),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(
            parse_iso_date(" 2024-01-01 ").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert!(parse_iso_date("01/01/2024").is_err());
        assert!(parse_iso_date("not a date").is_err());
    }
}
