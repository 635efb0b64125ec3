//! Report sink: flattens a schedule into CSV for the spreadsheet template.
//! Formatting to cents happens here and nowhere earlier, so the numbers
//! handed over match the engine's output exactly.

use crate::amortization::LeaseSchedule;
use crate::error::Result;
use crate::utils::round_cents;
use std::io::Write;

const HEADER: [&str; 12] = [
    "Period",
    "Date",
    "Beginning Liability",
    "Accretion",
    "Payment",
    "PV of Payment",
    "Ending Liability",
    "Beginning ROU",
    "ROU Amortization",
    "Ending ROU",
    "Current Liability",
    "Noncurrent Liability",
];

pub fn write_schedule_csv<W: Write>(schedule: &LeaseSchedule, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(HEADER)?;

    for row in &schedule.rows {
        csv_writer.write_record([
            row.period.to_string(),
            row.date.format("%Y-%m-%d").to_string(),
            format_cents(row.beginning_liability),
            format_cents(row.accretion),
            format_cents(row.payment),
            format_cents(row.present_value_of_payment),
            format_cents(row.ending_liability),
            format_cents(row.beginning_rou),
            format_cents(row.rou_amortization),
            format_cents(row.ending_rou),
            format_cents(row.current_liability),
            format_cents(row.noncurrent_liability),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

fn format_cents(value: f64) -> String {
    format!("{:.2}", round_cents(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amortization::{AmortizationEngine, PaymentTiming, ScheduleInputs};
    use crate::schema::Classification;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    #[test]
    fn test_csv_matches_engine_output() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut payments = BTreeMap::new();
        for i in 0..3 {
            payments.insert(crate::utils::add_months(start, i), 1000.0);
        }
        let schedule = AmortizationEngine::new(ScheduleInputs {
            measurement_date: start,
            end_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            annual_rate: 6.0,
            classification: Classification::Operating,
            payments,
            initial_direct_costs: 0.0,
            incentives: 0.0,
            prepaid_rent: 0.0,
            payment_timing: PaymentTiming::Beginning,
        })
        .build();

        let mut out = Vec::new();
        write_schedule_csv(&schedule, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Period,Date,Beginning Liability"));
        assert!(lines[1].starts_with("0,2024-01-01,"));

        // The payment column reproduces the engine's value exactly.
        let first_row: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(first_row[4], "1000.00");
    }

    #[test]
    fn test_empty_schedule_writes_header_only() {
        let schedule = AmortizationEngine::new(ScheduleInputs {
            measurement_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            annual_rate: 6.0,
            classification: Classification::Operating,
            payments: BTreeMap::new(),
            initial_direct_costs: 0.0,
            incentives: 0.0,
            prepaid_rent: 0.0,
            payment_timing: PaymentTiming::Beginning,
        })
        .build();

        let mut out = Vec::new();
        write_schedule_csv(&schedule, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
