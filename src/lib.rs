//! # Lease Schedule Builder
//!
//! A library for turning commercial lease documents into ASC 842 amortization
//! schedules: PDF text extraction, tolerant validation of model-extracted
//! terms, risk-free rate resolution from the treasury yield curve, and a
//! deterministic liability/right-of-use roll-forward.
//!
//! ## Core Concepts
//!
//! - **Extraction Cascade**: Ordered PDF text backends; the first non-empty
//!   result wins and carries a provenance tag
//! - **Tolerant Validation**: Model output is untrusted free text; validators
//!   always return a structurally complete record with per-field provenance
//! - **Curve Resolution**: Risk-free rate read from the daily treasury curve,
//!   stepping back to the nearest business day and interpolating by maturity
//! - **Amortization**: A pure roll-forward where classification decides cost
//!   recognition (finance straight-line vs. operating single-line plug)
//!
//! ## Example
//!
//! ```rust,ignore
//! use lease_schedule_builder::*;
//! use chrono::NaiveDate;
//! use std::collections::BTreeMap;
//!
//! let mut dates = LeaseDates::default();
//! dates.commencement_date = NaiveDate::from_ymd_opt(2024, 1, 1);
//! for i in 0..24 {
//!     dates.payment_schedule.insert(
//!         add_months(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), i),
//!         1000.0,
//!     );
//! }
//!
//! let rate = DiscountRate {
//!     annual_rate: 6.0,
//!     source: RateSource::LeaseImplicit,
//! };
//! let schedule = build_lease_schedule(
//!     &dates,
//!     Classification::Operating,
//!     &rate,
//!     &ScheduleOptions::default(),
//! )
//! .unwrap();
//! write_schedule_csv(&schedule, std::io::stdout()).unwrap();
//! ```

pub mod amortization;
pub mod curve;
pub mod error;
pub mod extraction;
pub mod report;
pub mod schema;
pub mod utils;
pub mod validate;

#[cfg(feature = "openai")]
pub mod llm;

pub use amortization::{
    AmortizationEngine, AmortizationRow, LeaseSchedule, PaymentTiming, ScheduleInputs,
    ScheduleSummary,
};
pub use curve::{
    interpolate_rate, parse_treasury_csv, CurveResolution, CurveRow, CurveSource,
    YieldCurveResolver, MATURITY_LABELS, SUPPORTED_MATURITIES,
};
pub use error::{LeaseError, Result};
pub use extraction::{ExtractedDocument, ExtractionMethod, TextBackend, TextExtractionCascade};
pub use report::write_schedule_csv;
pub use schema::*;
pub use utils::*;
pub use validate::{
    extract_classification, parse_rate_response, strip_code_fences, validate_lease_dates,
    validate_lease_terms, FieldOrigin, ValidationReport,
};

use chrono::NaiveDate;
use log::info;

/// Optional balance-sheet adjustments applied when measuring the initial
/// right-of-use asset.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOptions {
    pub initial_direct_costs: f64,
    pub incentives: f64,
    pub prepaid_rent: f64,
    pub payment_timing: PaymentTiming,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            initial_direct_costs: 0.0,
            incentives: 0.0,
            prepaid_rent: 0.0,
            payment_timing: PaymentTiming::Beginning,
        }
    }
}

/// Build the amortization schedule for a validated lease record.
///
/// The measurement date is the commencement date when stated, then the term
/// start, then the first payment date. A record with no usable date fails
/// with [`LeaseError::DateError`]; an empty payment schedule is legitimate
/// and produces an empty schedule.
pub fn build_lease_schedule(
    dates: &LeaseDates,
    classification: Classification,
    discount_rate: &DiscountRate,
    options: &ScheduleOptions,
) -> Result<LeaseSchedule> {
    let measurement_date = measurement_date(dates)?;
    let end_date = dates
        .end_date
        .or_else(|| dates.payment_schedule.keys().last().copied())
        .unwrap_or(measurement_date);

    info!(
        "Building {} schedule: {} payments from {} at {:.2}%",
        classification.as_str(),
        dates.term_months(),
        measurement_date,
        discount_rate.annual_rate
    );

    let inputs = ScheduleInputs {
        measurement_date,
        end_date,
        annual_rate: discount_rate.annual_rate,
        classification,
        payments: dates.payment_schedule.clone(),
        initial_direct_costs: options.initial_direct_costs,
        incentives: options.incentives,
        prepaid_rent: options.prepaid_rent,
        payment_timing: options.payment_timing,
    };

    Ok(AmortizationEngine::new(inputs).build())
}

fn measurement_date(dates: &LeaseDates) -> Result<NaiveDate> {
    dates
        .commencement_date
        .or(dates.start_date)
        .or_else(|| dates.payment_schedule.keys().next().copied())
        .ok_or_else(|| {
            LeaseError::DateError(
                "Lease record has no commencement, start, or payment date".to_string(),
            )
        })
}
