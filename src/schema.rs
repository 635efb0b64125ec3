use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    #[schemars(
        description = "Operating lease: single-line straight-line lease cost over the term (ASC 842-20-25-6)"
    )]
    Operating,

    #[schemars(
        description = "Finance lease: separate interest accretion and right-of-use amortization (ASC 842-20-25-5)"
    )]
    Finance,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Operating => "OPERATING",
            Classification::Finance => "FINANCE",
        }
    }
}

/// Key dates and the contractual payment schedule extracted from a lease.
///
/// Every field is null-capable: the validator fills in whatever it could
/// recover and leaves the rest `None` rather than failing the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LeaseDates {
    #[schemars(description = "Lease term start date (YYYY-MM-DD)")]
    pub start_date: Option<NaiveDate>,

    #[schemars(description = "Lease term end date (YYYY-MM-DD)")]
    pub end_date: Option<NaiveDate>,

    #[schemars(
        description = "Commencement date: the date the lessee gains access to the asset, which may precede the term start"
    )]
    pub commencement_date: Option<NaiveDate>,

    #[schemars(description = "Lease execution or signing date")]
    pub execution_date: Option<NaiveDate>,

    #[schemars(
        description = "Every contractual payment date mapped to its amount, with any escalations already applied. Chronological order."
    )]
    pub payment_schedule: BTreeMap<NaiveDate, f64>,
}

impl LeaseDates {
    pub fn total_payments(&self) -> f64 {
        self.payment_schedule.values().sum()
    }

    pub fn term_months(&self) -> usize {
        self.payment_schedule.len()
    }
}

/// One extracted lease term with its supporting evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Attribute {
    #[schemars(description = "The extracted value, or null when the lease is silent")]
    pub value: Option<String>,

    #[schemars(description = "Verbatim supporting text from the lease document")]
    pub proof: Option<String>,

    #[schemars(description = "Lease section or page number the value came from")]
    pub section_reference: Option<String>,

    #[schemars(description = "Monetary amount where the term carries one (e.g. a deposit)")]
    pub amount: Option<f64>,
}

impl Attribute {
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.proof.is_none()
            && self.section_reference.is_none()
            && self.amount.is_none()
    }
}

/// A validated set of named lease terms. Every field declared by the schema
/// that produced it is present, even if all sub-values are null.
pub type LeaseTerms = BTreeMap<String, Attribute>;

/// Declares which named fields a terms extraction must produce.
#[derive(Debug, Clone)]
pub struct TermsSchema {
    pub name: &'static str,
    pub fields: &'static [TermField],
}

#[derive(Debug, Clone)]
pub struct TermField {
    pub name: &'static str,
    /// Whether the model is asked for a monetary `amount` alongside the text value.
    pub has_amount: bool,
}

const fn field(name: &'static str) -> TermField {
    TermField {
        name,
        has_amount: false,
    }
}

const fn amount_field(name: &'static str) -> TermField {
    TermField {
        name,
        has_amount: true,
    }
}

pub const DETAILS_SCHEMA: TermsSchema = TermsSchema {
    name: "details",
    fields: &[
        field("Address"),
        field("Lessee"),
        field("Lessor"),
        field("Premise Description"),
    ],
};

pub const OPTIONS_SCHEMA: TermsSchema = TermsSchema {
    name: "options",
    fields: &[
        field("Purchase Option"),
        field("Renewal Option"),
        field("Break Option"),
        amount_field("Security Deposit"),
        amount_field("Prepaid Rent"),
    ],
};

pub const FINANCIALS_SCHEMA: TermsSchema = TermsSchema {
    name: "financials",
    fields: &[
        field("Payment Due Date"),
        field("Rent Payments"),
        field("Rent Escalations"),
        amount_field("Percentage Rent"),
    ],
};

pub const ADDITIONAL_TERMS_SCHEMA: TermsSchema = TermsSchema {
    name: "additional_terms",
    fields: &[
        field("Taxes and Insurance"),
        amount_field("Brokerage Commissions"),
        amount_field("Lease Incentives"),
        amount_field("Rent Concessions"),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateSource {
    /// Rate stated in (or readily determinable from) the lease itself.
    LeaseImplicit,
    /// Risk-free rate interpolated from the treasury maturity curve.
    CurveInterpolated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscountRate {
    /// Annual rate as a percentage (e.g. 6.0 for 6%).
    pub annual_rate: f64,
    pub source: RateSource,
}

impl DiscountRate {
    pub fn monthly_decimal(&self) -> f64 {
        self.annual_rate / 100.0 / 12.0
    }
}

/// Incremental borrowing rate summary presented alongside the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IbrSummary {
    pub commencement_date: NaiveDate,
    pub end_date: NaiveDate,
    pub remaining_term_years: f64,
    pub risk_free_rate: f64,
    pub company_risk_premium: f64,
    pub incremental_borrowing_rate: f64,
}

impl IbrSummary {
    pub fn new(commencement_date: NaiveDate, end_date: NaiveDate, risk_free_rate: f64) -> Self {
        let remaining_term_years =
            (end_date - commencement_date).num_days() as f64 / 365.0;
        // Risk premium is an entity-level input; zero until the caller supplies one.
        let company_risk_premium = 0.0;
        Self {
            commencement_date,
            end_date,
            remaining_term_years,
            risk_free_rate,
            company_risk_premium,
            incremental_borrowing_rate: risk_free_rate + company_risk_premium,
        }
    }
}
