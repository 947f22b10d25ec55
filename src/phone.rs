//! US-centric phone number helpers.
//!
//! Inbound numbers arrive in E.164 from the vendor, but tenant rows created by
//! staff or imported from spreadsheets may carry 10- or 11-digit forms. Lookups
//! try every form so legacy rows still match and get backfilled.

fn digits(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn is_e164ish(input: &str) -> bool {
    match input.strip_prefix('+') {
        Some(rest) => (8..=15).contains(&rest.len()) && rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Normalize a phone number to E.164.
///
/// Returns `None` when the input cannot be interpreted as a US number and is
/// not already E.164.
pub fn normalize_us_phone(input: &str) -> Option<String> {
    if input.is_empty() {
        return None;
    }
    if is_e164ish(input) {
        return Some(input.to_string());
    }
    let d = digits(input);
    match d.len() {
        11 if d.starts_with('1') => Some(format!("+{d}")),
        10 => Some(format!("+1{d}")),
        _ => None,
    }
}

/// Forms a stored tenant phone may take for the same E.164 number.
pub fn alt_forms_for_lookup(e164ish: &str) -> Vec<String> {
    let mut out = vec![e164ish.to_string()];
    let d = digits(e164ish);
    if d.len() == 11 && d.starts_with('1') {
        for form in [d.clone(), d[1..].to_string()] {
            if !out.contains(&form) {
                out.push(form);
            }
        }
    }
    out
}
