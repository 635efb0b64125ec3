//! Orchestration of the extraction passes: classification, dates, discount
//! rate, then each terms schema in turn. Every model response goes through the
//! tolerant validators, so one bad completion degrades the record instead of
//! failing the run.

use crate::curve::{CurveResolution, CurveSource, YieldCurveResolver};
use crate::error::Result;
use crate::llm::client::OpenAiClient;
use crate::llm::prompts;
use crate::schema::{
    Classification, DiscountRate, IbrSummary, LeaseDates, LeaseTerms, RateSource,
    ADDITIONAL_TERMS_SCHEMA, DETAILS_SCHEMA, FINANCIALS_SCHEMA, OPTIONS_SCHEMA,
};
use crate::validate::{
    extract_classification, parse_rate_response, validate_lease_dates, validate_lease_terms,
    ValidationReport,
};
use log::{info, warn};
use std::collections::BTreeMap;

pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Everything the model-driven passes produced for one lease, with per-pass
/// validation reports preserved for audit.
#[derive(Debug, Clone)]
pub struct LeaseAnalysis {
    pub classification: Classification,
    pub dates: LeaseDates,
    pub discount_rate: DiscountRate,
    /// Terms grouped by schema name ("details", "options", ...).
    pub terms: BTreeMap<String, LeaseTerms>,
    pub reports: BTreeMap<String, ValidationReport>,
    /// Present only when the rate came from the curve.
    pub curve_resolution: Option<CurveResolution>,
    pub ibr: Option<IbrSummary>,
}

impl LeaseAnalysis {
    /// True when any pass fell back past strict parsing.
    pub fn degraded(&self) -> bool {
        self.reports.values().any(ValidationReport::degraded)
    }
}

pub struct LeaseAnalyst {
    client: OpenAiClient,
    model: String,
}

impl LeaseAnalyst {
    pub fn new(client: OpenAiClient) -> Self {
        Self {
            client,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Run the full extraction pipeline over already-extracted lease text.
    ///
    /// The discount rate policy: a positive model-stated rate wins as the
    /// lease-implicit rate; otherwise the risk-free curve is resolved at the
    /// commencement date for the payment term.
    pub async fn analyze<S: CurveSource>(
        &self,
        lease_text: &str,
        curve_source: &S,
    ) -> Result<LeaseAnalysis> {
        let mut reports = BTreeMap::new();

        let raw = self
            .client
            .complete(
                &self.model,
                prompts::SYSTEM_PROMPT,
                &prompts::classification_prompt(lease_text),
            )
            .await?;
        let (classification, report) = extract_classification(&raw);
        info!("Lease classified as {}", classification.as_str());
        reports.insert("classification".to_string(), report);

        let raw = self
            .client
            .complete(
                &self.model,
                prompts::SYSTEM_PROMPT,
                &prompts::dates_prompt(lease_text),
            )
            .await?;
        let (dates, report) = validate_lease_dates(&raw);
        info!(
            "Extracted {} payment dates ({} total)",
            dates.term_months(),
            dates.total_payments()
        );
        reports.insert("dates".to_string(), report);

        let raw = self
            .client
            .complete(
                &self.model,
                prompts::SYSTEM_PROMPT,
                &prompts::discount_rate_prompt(lease_text, classification),
            )
            .await?;
        let stated_rate = parse_rate_response(&raw);
        let (discount_rate, curve_resolution, ibr) =
            self.settle_discount_rate(stated_rate, &dates, curve_source)?;

        let mut terms = BTreeMap::new();
        for schema in [
            &DETAILS_SCHEMA,
            &OPTIONS_SCHEMA,
            &FINANCIALS_SCHEMA,
            &ADDITIONAL_TERMS_SCHEMA,
        ] {
            let raw = self
                .client
                .complete(
                    &self.model,
                    prompts::SYSTEM_PROMPT,
                    &prompts::terms_prompt(schema, lease_text),
                )
                .await?;
            let (schema_terms, report) = validate_lease_terms(&raw, schema);
            reports.insert(format!("terms.{}", schema.name), report);
            terms.insert(schema.name.to_string(), schema_terms);
        }

        Ok(LeaseAnalysis {
            classification,
            dates,
            discount_rate,
            terms,
            reports,
            curve_resolution,
            ibr,
        })
    }

    fn settle_discount_rate<S: CurveSource>(
        &self,
        stated_rate: Option<f64>,
        dates: &LeaseDates,
        curve_source: &S,
    ) -> Result<(DiscountRate, Option<CurveResolution>, Option<IbrSummary>)> {
        if let Some(rate) = stated_rate {
            if rate > 0.0 {
                info!("Using lease-implicit discount rate {:.2}%", rate);
                return Ok((
                    DiscountRate {
                        annual_rate: rate,
                        source: RateSource::LeaseImplicit,
                    },
                    None,
                    None,
                ));
            }
        } else {
            warn!("No numeric rate in model response; falling back to the curve");
        }

        let reference = dates
            .commencement_date
            .or(dates.start_date)
            .or_else(|| dates.payment_schedule.keys().next().copied())
            .ok_or_else(|| {
                crate::error::LeaseError::CurveUnavailable(
                    "No commencement date to resolve a curve rate against".to_string(),
                )
            })?;
        let end = dates
            .end_date
            .or_else(|| dates.payment_schedule.keys().last().copied())
            .unwrap_or(reference);
        let term_months = dates.term_months() as f64;

        let resolver = YieldCurveResolver::new(ByRefSource(curve_source));
        let (resolution, ibr) = resolver.resolve_with_summary(reference, end, term_months)?;
        info!(
            "Using curve rate {:.2}% as of {}",
            resolution.rate, resolution.curve_date
        );

        Ok((
            DiscountRate {
                annual_rate: resolution.rate,
                source: RateSource::CurveInterpolated,
            },
            Some(resolution),
            Some(ibr),
        ))
    }
}

/// Adapter so a borrowed source can back the owned-source resolver.
struct ByRefSource<'a, S: CurveSource>(&'a S);

impl<S: CurveSource> CurveSource for ByRefSource<'_, S> {
    fn curve_for_year(&self, year: i32) -> Result<Vec<crate::curve::CurveRow>> {
        self.0.curve_for_year(year)
    }
}
