//! Record extraction

use tracing::trace;

use crate::record::Record;
use crate::template::{Repeat, Template};

/// Run `template` over `raw_text` and return records in text order
///
/// For every line the first applicable rule that matches produces a record.
/// A `One` rule stops applying after its first match. Output depends only on
/// the inputs.
#[must_use]
pub fn extract(raw_text: &str, template: &Template) -> Vec<Record> {
    let mut filldown: Vec<Option<String>> = vec![None; template.values.len()];
    let mut fired = vec![false; template.rules.len()];
    let mut records = Vec::new();

    for line in raw_text.lines() {
        for (idx, rule) in template.rules.iter().enumerate() {
            if rule.repeat == Repeat::One && fired[idx] {
                continue;
            }
            let Some(caps) = rule.pattern.captures(line) else {
                continue;
            };
            fired[idx] = true;

            let mut record = Record::with_fields(template.header());
            for (vi, value) in template.values.iter().enumerate() {
                if let Some(m) = caps.name(&value.name) {
                    record.set(value.name.as_str(), m.as_str());
                    if value.filldown {
                        filldown[vi] = Some(m.as_str().to_string());
                    }
                } else if let Some(previous) = &filldown[vi] {
                    record.set(value.name.as_str(), previous.as_str());
                }
            }

            let complete = template
                .values
                .iter()
                .all(|v| !v.required || !record.get(&v.name).is_empty());

            if complete {
                records.push(record);
            } else {
                trace!(template = template.name(), line, "dropping record missing required value");
            }
            break;
        }
    }

    records
}

impl Template {
    /// Convenience wrapper around [`extract`]
    #[must_use]
    pub fn extract(&self, raw_text: &str) -> Vec<Record> {
        extract(raw_text, self)
    }
}
