//! Extracted record type

use std::collections::BTreeMap;

/// One row produced by a rule match: field name → value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    /// Create a record with every field set to the empty string
    pub fn with_fields<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            fields: names
                .into_iter()
                .map(|n| (n.to_string(), String::new()))
                .collect(),
        }
    }

    /// Set a field value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Field value, or `""` when unset or undeclared
    #[must_use]
    pub fn get(&self, name: &str) -> &str {
        self.fields.get(name).map_or("", String::as_str)
    }

    /// First non-empty value among `names`
    #[must_use]
    pub fn first_of(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .map(|n| self.get(n).trim())
            .find(|v| !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_is_empty() {
        let record = Record::with_fields(["HOSTNAME"]);
        assert_eq!(record.get("HOSTNAME"), "");
        assert_eq!(record.get("SERIAL"), "");
    }

    #[test]
    fn test_first_of_skips_blank_values() {
        let record: Record = [("HARDWARE", "  "), ("PID", "WS-C2960-24TT-L")]
            .into_iter()
            .collect();
        assert_eq!(record.first_of(&["HARDWARE", "PID"]), Some("WS-C2960-24TT-L"));
        assert_eq!(record.first_of(&["SERIAL"]), None);
    }
}
