//! Risk-free rate resolution from a daily treasury maturity curve.
//!
//! The curve source hands back one row per business day with a rate per
//! tabulated maturity. Resolution is deterministic: step back to the nearest
//! prior business day, then read the exact column or linearly interpolate
//! between the two bracketing maturities.

use crate::error::{LeaseError, Result};
use crate::schema::IbrSummary;
use chrono::{Datelike, Days, NaiveDate};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Maturities (in months) tabulated by the treasury daily yield curve.
pub const SUPPORTED_MATURITIES: [f64; 14] = [
    1.0, 1.5, 2.0, 3.0, 4.0, 6.0, 12.0, 24.0, 36.0, 60.0, 84.0, 120.0, 240.0, 360.0,
];

/// Column labels used by the curve data source, positionally aligned with
/// [`SUPPORTED_MATURITIES`].
pub const MATURITY_LABELS: [&str; 14] = [
    "1 Mo", "1.5 Mo", "2 Mo", "3 Mo", "4 Mo", "6 Mo", "1 Yr", "2 Yr", "3 Yr", "5 Yr", "7 Yr",
    "10 Yr", "20 Yr", "30 Yr",
];

/// One business day of the yield curve: (maturity_months, rate) pairs sorted
/// by maturity. Columns the source omitted are simply absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveRow {
    pub date: NaiveDate,
    pub rates: Vec<(f64, f64)>,
}

impl CurveRow {
    pub fn new(date: NaiveDate, mut rates: Vec<(f64, f64)>) -> Self {
        rates.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { date, rates }
    }

    pub fn rate_at(&self, maturity: f64) -> Option<f64> {
        self.rates
            .iter()
            .find(|(m, _)| (*m - maturity).abs() < 1e-9)
            .map(|(_, r)| *r)
    }
}

/// External collaborator producing the curve table for one calendar year.
pub trait CurveSource {
    fn curve_for_year(&self, year: i32) -> Result<Vec<CurveRow>>;
}

/// Resolved rate plus the curve row actually used, so callers can report when
/// the reference date fell on a non-business day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveResolution {
    /// Annual rate as a percentage.
    pub rate: f64,
    /// The business day whose row supplied the rate.
    pub curve_date: NaiveDate,
    pub row: CurveRow,
}

pub struct YieldCurveResolver<S: CurveSource> {
    source: S,
}

impl<S: CurveSource> YieldCurveResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Resolve the rate for `term_months` as of `reference_date`.
    ///
    /// Fetches the reference year and the prior year so a January lookup can
    /// still step backward across the year boundary. The table is scoped to
    /// this call and discarded afterwards.
    pub fn resolve(&self, reference_date: NaiveDate, term_months: f64) -> Result<CurveResolution> {
        let mut table = self.source.curve_for_year(reference_date.year())?;
        table.extend(self.source.curve_for_year(reference_date.year() - 1)?);

        if table.is_empty() {
            return Err(LeaseError::CurveUnavailable(format!(
                "Curve table empty for {} and prior year",
                reference_date.year()
            )));
        }

        let earliest = table
            .iter()
            .map(|row| row.date)
            .min()
            .ok_or_else(|| LeaseError::CurveUnavailable("Curve table empty".to_string()))?;

        // Curve tables omit weekends and holidays: walk backward to the
        // nearest tabulated day, bounded by the earliest date we hold.
        let mut date = reference_date;
        let row = loop {
            if let Some(row) = table.iter().find(|row| row.date == date) {
                break row;
            }
            if date <= earliest {
                return Err(LeaseError::CurveUnavailable(format!(
                    "No curve row on or before {} (table starts {})",
                    reference_date, earliest
                )));
            }
            date = date
                .checked_sub_days(Days::new(1))
                .ok_or_else(|| LeaseError::DateError("Date underflow".to_string()))?;
        };

        if row.date != reference_date {
            info!(
                "No curve row for {}; using prior business day {}",
                reference_date, row.date
            );
        }

        let rate = interpolate_rate(&row.rates, term_months)?;
        debug!(
            "Resolved rate {:.2}% for {} months as of {}",
            rate, term_months, row.date
        );

        Ok(CurveResolution {
            rate,
            curve_date: row.date,
            row: row.clone(),
        })
    }

    /// Convenience wrapper producing the IBR presentation row alongside the
    /// resolved rate.
    pub fn resolve_with_summary(
        &self,
        commencement_date: NaiveDate,
        end_date: NaiveDate,
        term_months: f64,
    ) -> Result<(CurveResolution, IbrSummary)> {
        let resolution = self.resolve(commencement_date, term_months)?;
        let summary = IbrSummary::new(commencement_date, end_date, resolution.rate);
        Ok((resolution, summary))
    }
}

/// Exact column when the term matches a tabulated maturity; otherwise linear
/// interpolation between the bracketing maturities, clamped at both ends.
pub fn interpolate_rate(rates: &[(f64, f64)], term_months: f64) -> Result<f64> {
    if rates.is_empty() {
        return Err(LeaseError::CurveUnavailable(
            "Curve row has no tabulated maturities".to_string(),
        ));
    }

    if let Some((_, rate)) = rates.iter().find(|(m, _)| (*m - term_months).abs() < 1e-9) {
        return Ok(*rate);
    }

    let (min_m, min_rate) = rates[0];
    if term_months < min_m {
        return Ok(min_rate);
    }
    let (max_m, max_rate) = rates[rates.len() - 1];
    if term_months > max_m {
        return Ok(max_rate);
    }

    for pair in rates.windows(2) {
        let (lower_m, lower_r) = pair[0];
        let (upper_m, upper_r) = pair[1];
        if term_months > lower_m && term_months < upper_m {
            return Ok(lower_r + (term_months - lower_m) * (upper_r - lower_r) / (upper_m - lower_m));
        }
    }

    // Unreachable for sorted input, but the type demands an answer.
    Ok(max_rate)
}

/// Parse the treasury department's daily yield curve CSV: a `Date` column in
/// `MM/DD/YYYY` format and one label-keyed column per maturity. Unknown
/// columns are ignored; blank cells are skipped.
pub fn parse_treasury_csv(data: &str) -> Result<Vec<CurveRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.as_bytes());

    let headers = reader.headers()?.clone();
    let date_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("Date"))
        .ok_or_else(|| LeaseError::CurveUnavailable("Curve CSV has no Date column".to_string()))?;

    let mut columns: Vec<(usize, f64)> = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        if let Some(pos) = MATURITY_LABELS.iter().position(|l| *l == header.trim()) {
            columns.push((idx, SUPPORTED_MATURITIES[pos]));
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let date_raw = record.get(date_idx).unwrap_or("").trim();
        let date = match NaiveDate::parse_from_str(date_raw, "%m/%d/%Y") {
            Ok(d) => d,
            Err(_) => continue,
        };

        let mut rates = Vec::with_capacity(columns.len());
        for &(idx, maturity) in &columns {
            if let Some(cell) = record.get(idx) {
                if let Ok(rate) = cell.trim().parse::<f64>() {
                    rates.push((maturity, rate));
                }
            }
        }
        if !rates.is_empty() {
            rows.push(CurveRow::new(date, rates));
        }
    }

    Ok(rows)
}

#[cfg(feature = "treasury")]
pub use fetch::TreasuryCurveSource;

#[cfg(feature = "treasury")]
mod fetch {
    use super::{parse_treasury_csv, CurveRow, CurveSource};
    use crate::error::{LeaseError, Result};
    use std::time::Duration;

    const TREASURY_BASE_URL: &str =
        "https://home.treasury.gov/resource-center/data-chart-center/interest-rates/daily-treasury-rates.csv";

    /// Fetches the daily treasury yield curve CSV for a year. Idempotent and
    /// safe to retry; failures surface as `CurveUnavailable`.
    pub struct TreasuryCurveSource {
        client: reqwest::blocking::Client,
        base_url: String,
    }

    impl TreasuryCurveSource {
        pub fn new(timeout: Duration) -> Result<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?;
            Ok(Self {
                client,
                base_url: TREASURY_BASE_URL.to_string(),
            })
        }

        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = base_url.into();
            self
        }
    }

    impl CurveSource for TreasuryCurveSource {
        fn curve_for_year(&self, year: i32) -> Result<Vec<CurveRow>> {
            let url = format!(
                "{}/{}/all?type=daily_treasury_yield_curve&field_tdr_date_value={}&page&_format=csv",
                self.base_url, year, year
            );
            let response = self.client.get(&url).send().map_err(|e| {
                LeaseError::CurveUnavailable(format!("Treasury fetch for {} failed: {}", year, e))
            })?;
            if !response.status().is_success() {
                return Err(LeaseError::CurveUnavailable(format!(
                    "Treasury fetch for {} returned status {}",
                    year,
                    response.status()
                )));
            }
            let body = response.text().map_err(|e| {
                LeaseError::CurveUnavailable(format!("Treasury body read failed: {}", e))
            })?;
            parse_treasury_csv(&body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct SyntheticSource {
        years: BTreeMap<i32, Vec<CurveRow>>,
    }

    impl CurveSource for SyntheticSource {
        fn curve_for_year(&self, year: i32) -> Result<Vec<CurveRow>> {
            Ok(self.years.get(&year).cloned().unwrap_or_default())
        }
    }

    fn full_row(date: NaiveDate, base: f64) -> CurveRow {
        let rates = SUPPORTED_MATURITIES
            .iter()
            .enumerate()
            .map(|(i, &m)| (m, base + i as f64 * 0.1))
            .collect();
        CurveRow::new(date, rates)
    }

    fn source_with_days(days: &[(i32, u32, u32, f64)]) -> SyntheticSource {
        let mut years: BTreeMap<i32, Vec<CurveRow>> = BTreeMap::new();
        for &(y, m, d, base) in days {
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            years.entry(y).or_default().push(full_row(date, base));
        }
        SyntheticSource { years }
    }

    #[test]
    fn test_exact_maturity_lookup() {
        let source = source_with_days(&[(2024, 1, 2, 4.0)]);
        let resolver = YieldCurveResolver::new(source);
        let reference = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        // 24 months is index 7 in the supported set: 4.0 + 0.7.
        let resolution = resolver.resolve(reference, 24.0).unwrap();
        assert!((resolution.rate - 4.7).abs() < 1e-9);
        assert_eq!(resolution.curve_date, reference);
    }

    #[test]
    fn test_interpolation_between_maturities() {
        let rates = vec![(12.0, 4.0), (24.0, 5.0)];
        // Midpoint of the bracket.
        assert!((interpolate_rate(&rates, 18.0).unwrap() - 4.5).abs() < 1e-9);
        // Quarter point.
        assert!((interpolate_rate(&rates, 15.0).unwrap() - 4.25).abs() < 1e-9);
    }

    #[test]
    fn test_interpolation_monotonic_for_increasing_curve() {
        let rates: Vec<(f64, f64)> = SUPPORTED_MATURITIES
            .iter()
            .enumerate()
            .map(|(i, &m)| (m, 3.0 + i as f64 * 0.25))
            .collect();

        let mut last = f64::NEG_INFINITY;
        let mut term = 1.0;
        while term <= 360.0 {
            let rate = interpolate_rate(&rates, term).unwrap();
            assert!(
                rate >= last,
                "rate decreased at term {} ({} < {})",
                term,
                rate,
                last
            );
            last = rate;
            term += 2.5;
        }
    }

    #[test]
    fn test_clamping_at_curve_ends() {
        let rates = vec![(1.0, 3.0), (360.0, 5.0)];
        assert_eq!(interpolate_rate(&rates, 0.25).unwrap(), 3.0);
        assert_eq!(interpolate_rate(&rates, 600.0).unwrap(), 5.0);
    }

    #[test]
    fn test_backward_step_to_business_day() {
        // Jan 6 2024 is a Saturday; nearest prior row is Friday Jan 5.
        let source = source_with_days(&[(2024, 1, 4, 4.0), (2024, 1, 5, 4.2)]);
        let resolver = YieldCurveResolver::new(source);

        let saturday = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        let resolution = resolver.resolve(saturday, 12.0).unwrap();
        assert_eq!(
            resolution.curve_date,
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        );
        // 12 months is index 6: 4.2 + 0.6.
        assert!((resolution.rate - 4.8).abs() < 1e-9);
    }

    #[test]
    fn test_year_boundary_falls_back_to_prior_year() {
        let source = source_with_days(&[(2023, 12, 29, 3.9)]);
        let resolver = YieldCurveResolver::new(source);

        let new_years_day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let resolution = resolver.resolve(new_years_day, 12.0).unwrap();
        assert_eq!(
            resolution.curve_date,
            NaiveDate::from_ymd_opt(2023, 12, 29).unwrap()
        );
    }

    #[test]
    fn test_empty_table_is_curve_unavailable() {
        let source = SyntheticSource {
            years: BTreeMap::new(),
        };
        let resolver = YieldCurveResolver::new(source);
        let result = resolver.resolve(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), 12.0);
        assert!(matches!(result, Err(LeaseError::CurveUnavailable(_))));
    }

    #[test]
    fn test_reference_before_table_start_is_curve_unavailable() {
        let source = source_with_days(&[(2024, 6, 3, 4.0)]);
        let resolver = YieldCurveResolver::new(source);
        let result = resolver.resolve(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), 12.0);
        assert!(matches!(result, Err(LeaseError::CurveUnavailable(_))));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let source = source_with_days(&[(2024, 1, 4, 4.0), (2024, 1, 5, 4.2)]);
        let resolver = YieldCurveResolver::new(source);
        let reference = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();

        let first = resolver.resolve(reference, 30.0).unwrap();
        let second = resolver.resolve(reference, 30.0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_treasury_csv() {
        let data = "Date,1 Mo,2 Mo,3 Mo,6 Mo,1 Yr,2 Yr,3 Yr,5 Yr,7 Yr,10 Yr,20 Yr,30 Yr\n\
            01/02/2024,5.55,5.56,5.47,5.26,4.80,4.33,4.09,3.93,3.95,3.95,4.25,4.08\n\
            01/03/2024,5.54,5.55,5.46,5.24,4.81,4.33,4.09,3.91,3.92,3.91,4.22,4.05\n";
        let rows = parse_treasury_csv(data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(rows[0].rate_at(1.0), Some(5.55));
        assert_eq!(rows[0].rate_at(12.0), Some(4.80));
        assert_eq!(rows[0].rate_at(360.0), Some(4.08));
        // 1.5 Mo and 4 Mo are absent from this vintage of the table.
        assert_eq!(rows[0].rate_at(1.5), None);
    }

    #[test]
    fn test_parse_treasury_csv_skips_blank_cells_and_bad_dates() {
        let data = "Date,1 Mo,1 Yr\n\
            01/02/2024,,4.80\n\
            bad-date,5.0,5.0\n\
            01/03/2024,5.54,4.81\n";
        let rows = parse_treasury_csv(data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rate_at(1.0), None);
        assert_eq!(rows[0].rate_at(12.0), Some(4.80));
    }
}
