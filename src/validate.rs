//! Tolerant validation of free-text model output.
//!
//! The language model is supposed to return JSON but is treated as an
//! untrusted collaborator: everything here accepts arbitrary text and always
//! returns a structurally complete record. Recovery happens in stages --
//! code-fence stripping, strict JSON, a balanced-brace retry, then per-field
//! regex scraping -- and every field records which stage produced it.

use crate::schema::{Attribute, Classification, LeaseDates, LeaseTerms, TermsSchema};
use crate::utils::round_cents;
use chrono::NaiveDate;
use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Which recovery stage produced a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOrigin {
    /// Present and well-typed in strictly parsed JSON.
    Parsed,
    /// Present but wrong type; a coercion succeeded.
    Coerced,
    /// Recovered by regex scraping after JSON parsing failed.
    Recovered,
    /// Absent or unrecoverable; set to the null sentinel.
    Defaulted,
}

/// Per-field provenance plus the warning stream for one validation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub origins: BTreeMap<String, FieldOrigin>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn record(&mut self, field: &str, origin: FieldOrigin) {
        self.origins.insert(field.to_string(), origin);
    }

    fn push_warning(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    /// True when any field fell back past strict parsing.
    pub fn degraded(&self) -> bool {
        !self.warnings.is_empty()
            || self
                .origins
                .values()
                .any(|o| matches!(o, FieldOrigin::Recovered | FieldOrigin::Defaulted))
    }
}

/// Strip enclosing Markdown code fences, with or without a language tag.
/// Text outside the fences (e.g. "Sure! Here you go:") is discarded.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```") {
        let mut body = &trimmed[start + 3..];
        // Skip a language tag ("json", "JSON") when one follows the fence.
        let tag_len = body
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .count();
        if tag_len > 0 && body[tag_len..].starts_with(|c: char| c.is_whitespace()) {
            body = &body[tag_len..];
        }
        if let Some(end) = body.rfind("```") {
            return body[..end].trim().to_string();
        }
        return body.trim().to_string();
    }
    trimmed.to_string()
}

/// Locate the first balanced `{...}` span, tracking string literals so braces
/// inside quoted values do not confuse the depth counter.
fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fence-strip then strict-parse; on failure retry on the first balanced
/// object span only.
fn parse_lenient(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fences(raw);
    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Some(value);
    }
    let span = first_balanced_object(&cleaned)?;
    serde_json::from_str::<Value>(span).ok()
}

fn static_regex(pattern: &str) -> Option<Regex> {
    Regex::new(pattern).ok()
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("null") {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Coerce a JSON value to a monetary amount, stripping currency symbols and
/// thousands separators from string forms ("$1,250.00" -> 1250.0).
fn coerce_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
}

fn coerce_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?;
    NaiveDate::parse_from_str(s.trim().trim_matches(|c| c == '\'' || c == '"'), "%Y-%m-%d").ok()
}

const DATE_FIELDS: [&str; 4] = [
    "start_date",
    "end_date",
    "commencement_date",
    "execution_date",
];

/// Validate a dates/payments response into a [`LeaseDates`] record.
/// Never fails: missing or malformed fields come back as null with a
/// `Defaulted` origin and a warning.
pub fn validate_lease_dates(raw: &str) -> (LeaseDates, ValidationReport) {
    let mut report = ValidationReport::default();
    let mut dates = LeaseDates::default();

    if let Some(parsed) = parse_lenient(raw) {
        for field in DATE_FIELDS {
            match parsed.get(field) {
                Some(Value::Null) | None => {
                    report.record(field, FieldOrigin::Defaulted);
                    if parsed.get(field).is_none() {
                        report.push_warning(format!("Field '{}' missing from response", field));
                    }
                }
                Some(value) => match coerce_date(value) {
                    Some(date) => {
                        set_date_field(&mut dates, field, date);
                        report.record(field, FieldOrigin::Parsed);
                    }
                    None => {
                        report.record(field, FieldOrigin::Defaulted);
                        report.push_warning(format!(
                            "Field '{}' is not a YYYY-MM-DD date: {}",
                            field, value
                        ));
                    }
                },
            }
        }

        let payments_value = parsed
            .get("payment_schedule")
            .or_else(|| parsed.get("payment_dates"));
        match payments_value {
            Some(Value::Object(map)) => {
                dates.payment_schedule = validate_payment_pairs(map, &mut report);
                report.record("payment_schedule", FieldOrigin::Parsed);
            }
            Some(Value::Array(items)) => {
                // Older prompt shape: a bare list of dates with no amounts.
                report.push_warning(
                    "payment_schedule returned as a list; amounts default to 0.00".to_string(),
                );
                for item in items {
                    if let Some(date) = coerce_date(item) {
                        dates.payment_schedule.insert(date, 0.0);
                    }
                }
                report.record("payment_schedule", FieldOrigin::Coerced);
            }
            _ => {
                report.record("payment_schedule", FieldOrigin::Defaulted);
                report.push_warning("payment_schedule missing or not an object".to_string());
            }
        }

        return (dates, report);
    }

    // JSON recovery failed entirely; scrape what we can.
    report.push_warning("Response was not parseable JSON; falling back to regex".to_string());
    scrape_dates_from_text(raw, &mut report)
        .map(|scraped| (scraped, report))
        .unwrap_or_else(|| {
            let mut report = ValidationReport::default();
            for field in DATE_FIELDS {
                report.record(field, FieldOrigin::Defaulted);
            }
            report.record("payment_schedule", FieldOrigin::Defaulted);
            report.push_warning("No recognizable fields in response".to_string());
            (LeaseDates::default(), report)
        })
}

fn set_date_field(dates: &mut LeaseDates, field: &str, value: NaiveDate) {
    match field {
        "start_date" => dates.start_date = Some(value),
        "end_date" => dates.end_date = Some(value),
        "commencement_date" => dates.commencement_date = Some(value),
        "execution_date" => dates.execution_date = Some(value),
        _ => {}
    }
}

fn validate_payment_pairs(
    map: &serde_json::Map<String, Value>,
    report: &mut ValidationReport,
) -> BTreeMap<NaiveDate, f64> {
    let mut schedule = BTreeMap::new();
    for (key, value) in map {
        let date = match NaiveDate::parse_from_str(key.trim(), "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => {
                report.push_warning(format!("Dropping payment with invalid date key '{}'", key));
                continue;
            }
        };
        let amount = match coerce_amount(value) {
            Some(a) => a,
            None => {
                report.push_warning(format!(
                    "Dropping payment on {} with non-numeric amount {}",
                    date, value
                ));
                continue;
            }
        };
        if amount < 0.0 {
            report.push_warning(format!("Negative payment amount {} on {}", amount, date));
        }
        schedule.insert(date, round_cents(amount));
    }
    schedule
}

fn scrape_dates_from_text(raw: &str, report: &mut ValidationReport) -> Option<LeaseDates> {
    let mut dates = LeaseDates::default();
    let mut found_any = false;

    for field in DATE_FIELDS {
        let pattern = format!(r#"{}['"\s:]*['"]?(\d{{4}}-\d{{2}}-\d{{2}})"#, field);
        let re = static_regex(&pattern)?;
        if let Some(caps) = re.captures(raw) {
            if let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") {
                set_date_field(&mut dates, field, date);
                report.record(field, FieldOrigin::Recovered);
                found_any = true;
                continue;
            }
        }
        report.record(field, FieldOrigin::Defaulted);
    }

    // Payment pairs inside a best-effort braced span following the key.
    let span_re = static_regex(
        r#"payment_(?:schedule|dates)['"\s:]*\{([\s\S]*?)\}"#,
    )?;
    if let Some(caps) = span_re.captures(raw) {
        let pair_re = static_regex(
            r#"['"]?(\d{4}-\d{2}-\d{2})['"]?\s*:\s*(-?[0-9][0-9,]*\.?[0-9]*)"#,
        )?;
        for pair in pair_re.captures_iter(&caps[1]) {
            let date = NaiveDate::parse_from_str(&pair[1], "%Y-%m-%d").ok();
            let amount = pair[2].replace(',', "").parse::<f64>().ok();
            if let (Some(date), Some(amount)) = (date, amount) {
                dates.payment_schedule.insert(date, round_cents(amount));
                found_any = true;
            }
        }
    }
    if dates.payment_schedule.is_empty() {
        // Bracketed-list fallback: dates only, zero amounts.
        let list_re = static_regex(r#"payment_(?:schedule|dates)['"\s:]*\[([\s\S]*?)\]"#)?;
        if let Some(caps) = list_re.captures(raw) {
            let date_re = static_regex(r"\d{4}-\d{2}-\d{2}")?;
            for m in date_re.find_iter(&caps[1]) {
                if let Ok(date) = NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d") {
                    dates.payment_schedule.insert(date, 0.0);
                    found_any = true;
                }
            }
            if !dates.payment_schedule.is_empty() {
                report.push_warning(
                    "payment_schedule recovered as a date list; amounts default to 0.00"
                        .to_string(),
                );
            }
        }
    }
    report.record(
        "payment_schedule",
        if dates.payment_schedule.is_empty() {
            FieldOrigin::Defaulted
        } else {
            FieldOrigin::Recovered
        },
    );

    found_any.then_some(dates)
}

/// Validate a terms response against a declared schema. Every declared field
/// is present in the output, all-null when nothing was recoverable.
pub fn validate_lease_terms(raw: &str, schema: &TermsSchema) -> (LeaseTerms, ValidationReport) {
    let mut report = ValidationReport::default();
    let mut terms = LeaseTerms::new();

    let parsed = parse_lenient(raw);
    if parsed.is_none() {
        report.push_warning(format!(
            "Could not parse {} terms response; returning all-null fields",
            schema.name
        ));
    }

    for field in schema.fields {
        let entry = parsed.as_ref().and_then(|p| p.get(field.name));
        let attribute = match entry {
            Some(Value::Object(obj)) => {
                report.record(field.name, FieldOrigin::Parsed);
                Attribute {
                    value: obj.get("value").and_then(coerce_string),
                    proof: obj.get("proof").and_then(coerce_string),
                    section_reference: obj
                        .get("section_reference")
                        .or_else(|| obj.get("section"))
                        .and_then(coerce_string),
                    amount: if field.has_amount {
                        obj.get("amount").and_then(coerce_amount)
                    } else {
                        None
                    },
                }
            }
            Some(value) => {
                // Wrong shape: keep whatever scalar the model produced as the value.
                match coerce_string(value) {
                    Some(text) => {
                        report.record(field.name, FieldOrigin::Coerced);
                        report.push_warning(format!(
                            "Field '{}' was not an object; kept scalar as value",
                            field.name
                        ));
                        Attribute {
                            value: Some(text),
                            ..Attribute::default()
                        }
                    }
                    None => {
                        report.record(field.name, FieldOrigin::Defaulted);
                        Attribute::default()
                    }
                }
            }
            None => {
                report.record(field.name, FieldOrigin::Defaulted);
                if parsed.is_some() {
                    report.push_warning(format!(
                        "Field '{}' missing from {} response",
                        field.name, schema.name
                    ));
                }
                Attribute::default()
            }
        };
        terms.insert(field.name.to_string(), attribute);
    }

    (terms, report)
}

/// Extract the OPERATING/FINANCE label from a classification response.
///
/// Both-or-neither token hits fall back to the first whitespace-delimited
/// word; anything else defaults to Operating with a `Defaulted` origin so the
/// ambiguity is visible to the caller.
pub fn extract_classification(raw: &str) -> (Classification, ValidationReport) {
    let mut report = ValidationReport::default();
    let upper = raw.trim().to_uppercase();

    let has_finance = upper.contains("FINANCE");
    let has_operating = upper.contains("OPERATING");

    match (has_finance, has_operating) {
        (true, false) => {
            report.record("classification", FieldOrigin::Parsed);
            return (Classification::Finance, report);
        }
        (false, true) => {
            report.record("classification", FieldOrigin::Parsed);
            return (Classification::Operating, report);
        }
        _ => {}
    }

    let first_word = upper
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_ascii_alphabetic());
    match first_word {
        "FINANCE" => {
            report.record("classification", FieldOrigin::Coerced);
            (Classification::Finance, report)
        }
        "OPERATING" => {
            report.record("classification", FieldOrigin::Coerced);
            (Classification::Operating, report)
        }
        _ => {
            report.record("classification", FieldOrigin::Defaulted);
            report.push_warning(format!(
                "Could not extract a classification from '{}'; defaulting to OPERATING",
                raw.trim()
            ));
            (Classification::Operating, report)
        }
    }
}

/// Parse the model's implicit-rate answer. `Some(0.0)` means the lease has no
/// readily determinable rate and the curve should be used instead.
pub fn parse_rate_response(raw: &str) -> Option<f64> {
    let cleaned = strip_code_fences(raw);
    if let Ok(rate) = cleaned.trim().trim_end_matches('%').parse::<f64>() {
        return Some(rate);
    }
    let re = static_regex(r"-?\d+(?:\.\d+)?")?;
    re.find(&cleaned)?.as_str().parse::<f64>().ok()
}
