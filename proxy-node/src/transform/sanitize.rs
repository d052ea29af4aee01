//! Sensitive-data redaction applied to response text and error messages
//! before they reach a client, independent of the operator-log redaction in
//! `core::sensitive`.

use regex::Regex;

/// Replaces matches in-place (leftmost, non-overlapping) for each pattern,
/// in the fixed order email, card, SSN, bearer token, api_key.
pub fn redact(text: &str) -> String {
    let email_re = Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("static regex");
    let card_re = Regex::new(r"\b(?:\d[ -]?){15}\d\b").expect("static regex");
    let ssn_re = Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("static regex");
    let bearer_re = Regex::new(r"Bearer\s+\S+").expect("static regex");
    let api_key_re = Regex::new(r"api_key=\S+").expect("static regex");

    let text = email_re.replace_all(text, "[EMAIL_REDACTED]");
    let text = card_re.replace_all(&text, "[CARD_REDACTED]");
    let text = ssn_re.replace_all(&text, "[SSN_REDACTED]");
    let text = bearer_re.replace_all(&text, "Bearer [TOKEN_REDACTED]");
    let text = api_key_re.replace_all(&text, "api_key=[KEY_REDACTED]");
    text.into_owned()
}
