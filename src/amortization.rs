//! ASC 842 amortization schedule and balance roll-forward.
//!
//! The engine is a pure calculator: one linear fold over the payment
//! schedule, each row depending only on the previous one. Classification
//! decides cost recognition -- finance leases amortize the right-of-use asset
//! straight-line over the remaining term, operating leases recognize the
//! contractual payment as a single-line expense and plug the asset reduction
//! so interest plus amortization nets to the level payment.

use crate::schema::Classification;
use crate::utils::round_cents;
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentTiming {
    /// Payments due at the start of each period (annuity-due).
    Beginning,
    /// Payments due at the end of each period.
    Ending,
}

/// Everything the engine needs to build a schedule. Value object; the engine
/// never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleInputs {
    pub measurement_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Annual discount rate as a percentage (e.g. 6.0 for 6%).
    pub annual_rate: f64,
    pub classification: Classification,
    /// Contractual payments in chronological order.
    pub payments: BTreeMap<NaiveDate, f64>,
    pub initial_direct_costs: f64,
    pub incentives: f64,
    pub prepaid_rent: f64,
    pub payment_timing: PaymentTiming,
}

impl ScheduleInputs {
    pub fn monthly_rate(&self) -> f64 {
        self.annual_rate / 100.0 / 12.0
    }
}

/// One period of the roll-forward.
/// Invariant: `ending_liability = beginning_liability + accretion - payment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationRow {
    pub period: usize,
    pub date: NaiveDate,
    pub beginning_liability: f64,
    pub accretion: f64,
    pub payment: f64,
    pub present_value_of_payment: f64,
    pub ending_liability: f64,
    pub beginning_rou: f64,
    pub rou_amortization: f64,
    pub ending_rou: f64,
    pub current_liability: f64,
    pub noncurrent_liability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub initial_liability: f64,
    pub initial_rou: f64,
    pub total_payments: f64,
    pub total_accretion: f64,
    pub total_rou_amortization: f64,
    /// Set when inputs fall outside the expected sign range (negative rate or
    /// payments). The arithmetic still runs; the caller decides what to do.
    pub suspect: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseSchedule {
    pub rows: Vec<AmortizationRow>,
    pub summary: ScheduleSummary,
}

pub struct AmortizationEngine {
    inputs: ScheduleInputs,
}

impl AmortizationEngine {
    pub fn new(inputs: ScheduleInputs) -> Self {
        Self { inputs }
    }

    pub fn build(&self) -> LeaseSchedule {
        let inputs = &self.inputs;
        let monthly_rate = inputs.monthly_rate();
        let n = inputs.payments.len();

        let suspect =
            monthly_rate < 0.0 || inputs.payments.values().any(|&amount| amount < 0.0);
        if suspect {
            warn!(
                "Schedule inputs outside expected sign range (rate {}%, {} payments); flagging result as suspect",
                inputs.annual_rate, n
            );
        }

        // Degenerate but legitimate: no payments, no schedule.
        if n == 0 {
            return LeaseSchedule {
                rows: Vec::new(),
                summary: ScheduleSummary {
                    initial_liability: 0.0,
                    initial_rou: 0.0,
                    total_payments: 0.0,
                    total_accretion: 0.0,
                    total_rou_amortization: 0.0,
                    suspect,
                },
            };
        }

        let schedule: Vec<(NaiveDate, f64)> =
            inputs.payments.iter().map(|(d, a)| (*d, *a)).collect();

        // Present value of each payment, discounted from period 0.
        let present_values: Vec<f64> = schedule
            .iter()
            .enumerate()
            .map(|(i, (_, amount))| amount / (1.0 + monthly_rate).powi(i as i32))
            .collect();
        let initial_liability: f64 = present_values.iter().sum();
        let initial_rou = initial_liability + inputs.initial_direct_costs - inputs.incentives
            + inputs.prepaid_rent;

        debug!(
            "Initial liability {:.2}, initial ROU {:.2} over {} periods",
            initial_liability, initial_rou, n
        );

        // First pass: liability and ROU roll-forward.
        let mut rows: Vec<AmortizationRow> = Vec::with_capacity(n);
        let mut liability = initial_liability;
        let mut rou = initial_rou;

        for (i, &(date, payment)) in schedule.iter().enumerate() {
            let accretion = match inputs.payment_timing {
                PaymentTiming::Beginning => (liability - payment) * monthly_rate,
                PaymentTiming::Ending => liability * monthly_rate,
            };
            let ending_liability = liability + accretion - payment;

            let remaining_periods = (n - i) as f64;
            let rou_amortization = match inputs.classification {
                Classification::Finance => rou / remaining_periods,
                // Single-line expense equals the contractual payment; the
                // asset reduction is the plug that makes interest plus
                // amortization net to the level payment.
                Classification::Operating => payment - accretion,
            };
            let ending_rou = rou - rou_amortization;

            rows.push(AmortizationRow {
                period: i,
                date,
                beginning_liability: liability,
                accretion,
                payment,
                present_value_of_payment: round_cents(present_values[i]),
                ending_liability,
                beginning_rou: rou,
                rou_amortization,
                ending_rou,
                current_liability: 0.0,
                noncurrent_liability: 0.0,
            });

            liability = ending_liability;
            rou = ending_rou;
        }

        // Second pass: current portion is the liability paydown over the next
        // twelve periods, clamped so concessions never push it negative.
        for i in 0..n {
            let window_paydown: f64 = rows
                .iter()
                .skip(i + 1)
                .take(12)
                .map(|row| row.payment - row.accretion)
                .sum();
            let ending = rows[i].ending_liability;
            let current = window_paydown.clamp(0.0, ending.max(0.0));
            rows[i].current_liability = current;
            rows[i].noncurrent_liability = ending - current;
        }

        let summary = ScheduleSummary {
            initial_liability,
            initial_rou,
            total_payments: schedule.iter().map(|(_, a)| a).sum(),
            total_accretion: rows.iter().map(|r| r.accretion).sum(),
            total_rou_amortization: rows.iter().map(|r| r.rou_amortization).sum(),
            suspect,
        };

        LeaseSchedule { rows, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::add_months;

    fn monthly_payments(
        start: NaiveDate,
        months: usize,
        amount: f64,
    ) -> BTreeMap<NaiveDate, f64> {
        (0..months)
            .map(|i| (add_months(start, i as i32), amount))
            .collect()
    }

    fn inputs(
        classification: Classification,
        payments: BTreeMap<NaiveDate, f64>,
        annual_rate: f64,
        timing: PaymentTiming,
    ) -> ScheduleInputs {
        ScheduleInputs {
            measurement_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            annual_rate,
            classification,
            payments,
            initial_direct_costs: 0.0,
            incentives: 0.0,
            prepaid_rent: 0.0,
            payment_timing: timing,
        }
    }

    #[test]
    fn test_single_payment_round_trip() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let schedule = AmortizationEngine::new(inputs(
            Classification::Operating,
            monthly_payments(start, 1, 2500.0),
            6.0,
            PaymentTiming::Beginning,
        ))
        .build();

        // Period 0 is undiscounted.
        assert_eq!(schedule.summary.initial_liability, 2500.0);
        assert_eq!(schedule.rows.len(), 1);
        assert_eq!(schedule.rows[0].present_value_of_payment, 2500.0);
        assert!(schedule.rows[0].ending_liability.abs() < 1e-9);
    }

    #[test]
    fn test_operating_example_24_months_at_6_percent() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let payments = monthly_payments(start, 24, 1000.0);
        let built = inputs(
            Classification::Operating,
            payments,
            6.0,
            PaymentTiming::Beginning,
        );
        assert!((built.monthly_rate() - 0.005).abs() < 1e-12);

        let schedule = AmortizationEngine::new(built).build();

        // Expected liability from the PV formula itself.
        let expected: f64 = (0..24).map(|i| 1000.0 / 1.005_f64.powi(i)).sum();
        assert!((schedule.summary.initial_liability - expected).abs() < 1e-6);

        // Operating plug: payment == accretion + asset reduction, every period.
        for row in &schedule.rows {
            assert!(
                (row.payment - (row.accretion + row.rou_amortization)).abs() < 1e-9,
                "plug identity broken in period {}",
                row.period
            );
        }

        // Liability fully extinguished by the final payment.
        let last = schedule.rows.last().unwrap();
        assert!(last.ending_liability.abs() < 1e-6);
        assert!(last.ending_rou.abs() < 1e-6);
    }

    #[test]
    fn test_row_invariant_and_pv_conservation() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut payments = monthly_payments(start, 36, 850.0);
        // Uneven tail payment.
        payments.insert(add_months(start, 36), 425.0);

        let schedule = AmortizationEngine::new(inputs(
            Classification::Finance,
            payments,
            4.8,
            PaymentTiming::Ending,
        ))
        .build();

        for row in &schedule.rows {
            let expected_ending = row.beginning_liability + row.accretion - row.payment;
            assert!(
                (row.ending_liability - expected_ending).abs() < 1e-9,
                "roll-forward broken in period {}",
                row.period
            );
        }

        let pv_sum: f64 = schedule
            .rows
            .iter()
            .map(|r| r.present_value_of_payment)
            .sum();
        let tolerance = 0.01 * schedule.rows.len() as f64;
        assert!((pv_sum - schedule.summary.initial_liability).abs() <= tolerance);
    }

    #[test]
    fn test_finance_straight_line_rou() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let schedule = AmortizationEngine::new(inputs(
            Classification::Finance,
            monthly_payments(start, 12, 1000.0),
            6.0,
            PaymentTiming::Beginning,
        ))
        .build();

        // beginning_rou / remaining gives a constant charge when nothing else
        // moves the asset.
        let first_charge = schedule.rows[0].rou_amortization;
        for row in &schedule.rows {
            assert!(
                (row.rou_amortization - first_charge).abs() < 1e-9,
                "finance amortization not straight-line in period {}",
                row.period
            );
        }
        assert!(schedule.rows.last().unwrap().ending_rou.abs() < 1e-9);
        assert!(
            (schedule.summary.total_rou_amortization - schedule.summary.initial_rou).abs() < 1e-9
        );
    }

    #[test]
    fn test_payment_timing_changes_accretion() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let payments = monthly_payments(start, 12, 1000.0);

        let due = AmortizationEngine::new(inputs(
            Classification::Operating,
            payments.clone(),
            6.0,
            PaymentTiming::Beginning,
        ))
        .build();
        let arrears = AmortizationEngine::new(inputs(
            Classification::Operating,
            payments,
            6.0,
            PaymentTiming::Ending,
        ))
        .build();

        let r = 0.005;
        let beg = due.rows[0].beginning_liability;
        assert!((due.rows[0].accretion - (beg - 1000.0) * r).abs() < 1e-9);
        let beg = arrears.rows[0].beginning_liability;
        assert!((arrears.rows[0].accretion - beg * r).abs() < 1e-9);
    }

    #[test]
    fn test_current_noncurrent_split() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let schedule = AmortizationEngine::new(inputs(
            Classification::Operating,
            monthly_payments(start, 24, 1000.0),
            6.0,
            PaymentTiming::Beginning,
        ))
        .build();

        for row in &schedule.rows {
            assert!(
                (row.current_liability + row.noncurrent_liability - row.ending_liability).abs()
                    < 1e-9
            );
            assert!(row.current_liability >= 0.0);
        }

        // With 12 or fewer periods left, everything remaining is current.
        let row_12 = &schedule.rows[12];
        assert!((row_12.current_liability - row_12.ending_liability).abs() < 1e-6);
        assert!(row_12.noncurrent_liability.abs() < 1e-6);

        // Early in the term some liability extends past the 12-period window.
        assert!(schedule.rows[0].noncurrent_liability > 0.0);
    }

    #[test]
    fn test_empty_payments_is_degenerate_not_error() {
        let schedule = AmortizationEngine::new(inputs(
            Classification::Operating,
            BTreeMap::new(),
            6.0,
            PaymentTiming::Beginning,
        ))
        .build();

        assert!(schedule.rows.is_empty());
        assert_eq!(schedule.summary.initial_liability, 0.0);
        assert!(!schedule.summary.suspect);
    }

    #[test]
    fn test_negative_inputs_flagged_suspect_not_failed() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut payments = monthly_payments(start, 6, 1000.0);
        // Rent concession modeled as a negative payment.
        payments.insert(add_months(start, 2), -500.0);

        let schedule = AmortizationEngine::new(inputs(
            Classification::Operating,
            payments,
            6.0,
            PaymentTiming::Beginning,
        ))
        .build();

        assert!(schedule.summary.suspect);
        assert_eq!(schedule.rows.len(), 6);

        let negative_rate = AmortizationEngine::new(inputs(
            Classification::Operating,
            monthly_payments(start, 6, 1000.0),
            -1.0,
            PaymentTiming::Beginning,
        ))
        .build();
        assert!(negative_rate.summary.suspect);
    }

    #[test]
    fn test_rou_adjustments() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut input = inputs(
            Classification::Finance,
            monthly_payments(start, 12, 1000.0),
            6.0,
            PaymentTiming::Beginning,
        );
        input.initial_direct_costs = 2000.0;
        input.incentives = 500.0;
        input.prepaid_rent = 1000.0;

        let schedule = AmortizationEngine::new(input).build();
        let expected_rou = schedule.summary.initial_liability + 2000.0 - 500.0 + 1000.0;
        assert!((schedule.summary.initial_rou - expected_rou).abs() < 1e-9);
        assert!((schedule.rows[0].beginning_rou - expected_rou).abs() < 1e-9);
    }
}
