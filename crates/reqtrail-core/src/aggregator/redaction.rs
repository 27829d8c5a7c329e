//! Redaction of sensitive request parameters.
//!
//! Names are compared as whole, case-sensitive strings. A matching key has
//! its value replaced by `REDACTION_TOKEN`, whatever its type; every other
//! entry passes through unchanged. Nested maps and lists of maps are walked.

use crate::record::{FieldValue, Fields};
use crate::utils::config::REDACTION_TOKEN;
use std::collections::BTreeSet;

/// Redact `params` in place, returning how many values were replaced
pub fn redact_parameters(params: &mut Fields, sensitive: &BTreeSet<String>) -> usize {
    if sensitive.is_empty() {
        return 0;
    }

    let mut redacted = 0;
    for (key, value) in params.iter_mut() {
        if sensitive.contains(key.as_str()) {
            *value = FieldValue::from(REDACTION_TOKEN);
            redacted += 1;
        } else {
            redacted += redact_value(value, sensitive);
        }
    }
    redacted
}

fn redact_value(value: &mut FieldValue, sensitive: &BTreeSet<String>) -> usize {
    match value {
        FieldValue::Map(nested) => redact_parameters(nested, sensitive),
        FieldValue::List(items) => items
            .iter_mut()
            .map(|item| redact_value(item, sensitive))
            .sum(),
        _ => 0,
    }
}
