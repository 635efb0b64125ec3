//! Prompt builders for each extraction pass. The prompts ask for strict
//! output shapes; the validator layer is what actually enforces them.

use crate::schema::{Classification, TermsSchema};

pub const SYSTEM_PROMPT: &str = "You are a commercial lease accounting analyst. \
You answer only from the lease text provided, you never invent terms that are \
not in the document, and you follow the requested output format exactly.";

/// ASC 842-10-25-2 classification test. The five criteria are spelled out so
/// the model grades against the standard rather than its priors.
pub fn classification_prompt(lease_text: &str) -> String {
    format!(
        "Classify the lease below under ASC 842-10-25-2. It is a FINANCE lease \
if any one of these criteria is met, otherwise it is an OPERATING lease:\n\
(a) ownership of the underlying asset transfers to the lessee by the end of the term;\n\
(b) the lease grants a purchase option the lessee is reasonably certain to exercise;\n\
(c) the lease term is for the major part of the remaining economic life of the asset;\n\
(d) the present value of the lease payments equals or exceeds substantially all \
of the fair value of the asset;\n\
(e) the asset is so specialized it has no alternative use to the lessor at the end of the term.\n\n\
Respond with ONLY the single word OPERATING or FINANCE.\n\n\
LEASE TEXT:\n{}",
        lease_text
    )
}

/// Dates and the full contractual payment schedule, escalations applied.
pub fn dates_prompt(lease_text: &str) -> String {
    format!(
        "Extract the key dates and the complete payment schedule from the lease \
below. Apply any rent escalations so each payment carries its actual amount. \
Use null for any date the lease does not state.\n\n\
Respond with ONLY a JSON object of this exact shape:\n\
{{\n\
  \"start_date\": \"YYYY-MM-DD\",\n\
  \"end_date\": \"YYYY-MM-DD\",\n\
  \"commencement_date\": \"YYYY-MM-DD\",\n\
  \"execution_date\": \"YYYY-MM-DD\",\n\
  \"payment_schedule\": {{\"YYYY-MM-DD\": 1234.56}}\n\
}}\n\n\
LEASE TEXT:\n{}",
        lease_text
    )
}

/// Implicit discount rate, when the lease states one. Zero means the curve
/// decides instead.
pub fn discount_rate_prompt(lease_text: &str, classification: Classification) -> String {
    format!(
        "This is a {} lease. Determine the discount rate implicit in the lease, \
as an annual percentage, if and only if it is stated in or readily determinable \
from the lease text. Respond with ONLY a single number (e.g. 5.25). If the rate \
is not readily determinable, respond with 0.\n\n\
LEASE TEXT:\n{}",
        classification.as_str(),
        lease_text
    )
}

/// Terms extraction for one declared schema: each field as an object with
/// value, verbatim proof, section reference, and an amount where declared.
pub fn terms_prompt(schema: &TermsSchema, lease_text: &str) -> String {
    let mut template = String::from("{\n");
    for (i, field) in schema.fields.iter().enumerate() {
        template.push_str(&format!(
            "  \"{}\": {{\"value\": \"...\", \"proof\": \"...\", \"section_reference\": \"...\"",
            field.name
        ));
        if field.has_amount {
            template.push_str(", \"amount\": 1234.56");
        }
        template.push('}');
        if i + 1 < schema.fields.len() {
            template.push(',');
        }
        template.push('\n');
    }
    template.push('}');

    format!(
        "Extract the following {} terms from the lease below. For each field give \
the extracted value, a verbatim quote from the lease as proof, and the section \
or page reference. Use null for anything the lease does not address.\n\n\
Respond with ONLY a JSON object of this exact shape:\n{}\n\n\
LEASE TEXT:\n{}",
        schema.name, template, lease_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DETAILS_SCHEMA, OPTIONS_SCHEMA};

    #[test]
    fn test_classification_prompt_lists_criteria() {
        let prompt = classification_prompt("sample lease");
        assert!(prompt.contains("ASC 842-10-25-2"));
        assert!(prompt.contains("(e)"));
        assert!(prompt.contains("ONLY the single word OPERATING or FINANCE"));
        assert!(prompt.ends_with("sample lease"));
    }

    #[test]
    fn test_terms_prompt_includes_amount_only_where_declared() {
        let details = terms_prompt(&DETAILS_SCHEMA, "text");
        assert!(details.contains("\"Address\""));
        assert!(!details.contains("\"amount\""));

        let options = terms_prompt(&OPTIONS_SCHEMA, "text");
        assert!(options.contains("\"Security Deposit\""));
        assert!(options.contains("\"amount\""));
    }

    #[test]
    fn test_rate_prompt_names_classification() {
        let prompt = discount_rate_prompt("text", Classification::Finance);
        assert!(prompt.contains("FINANCE lease"));
    }
}
