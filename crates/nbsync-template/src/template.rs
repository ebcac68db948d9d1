//! Template grammar and compiler

use std::fmt::Write;
use std::path::Path;

use regex::Regex;

use crate::error::TemplateError;

const START_STATE: &str = "Start";

/// A declared capture field
#[derive(Debug, Clone)]
pub struct ValueDef {
    /// Field name, used as the record key
    pub name: String,
    /// Regex including its enclosing parentheses
    pub regex: String,
    /// Keep the last captured value for later records
    pub filldown: bool,
    /// Drop records where this field is empty
    pub required: bool,
}

/// How often a rule may contribute a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// One record per matching line
    Many,
    /// Only the first matching line contributes a record
    One,
}

/// A compiled line rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) pattern: Regex,
    pub(crate) repeat: Repeat,
    pub(crate) fields: Vec<String>,
    line: usize,
}

impl Rule {
    /// Repeat policy
    #[must_use]
    pub fn repeat(&self) -> Repeat {
        self.repeat
    }

    /// Names of the values this rule captures
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Source line the rule was declared on
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }
}

/// A compiled extraction template
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    pub(crate) values: Vec<ValueDef>,
    pub(crate) rules: Vec<Rule>,
}

impl Template {
    /// Parse and compile a template
    ///
    /// # Errors
    /// Returns `TemplateError` describing the first malformed line.
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self, TemplateError> {
        let mut values: Vec<ValueDef> = Vec::new();
        let mut rules = Vec::new();
        let mut in_start = false;

        for (idx, raw) in source.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let indented = raw.starts_with(char::is_whitespace);

            if !indented {
                if let Some(rest) = trimmed.strip_prefix("Value ") {
                    if in_start {
                        return Err(TemplateError::RuleOutsideState { line });
                    }
                    let value = parse_value(rest, line)?;
                    if values.iter().any(|v| v.name == value.name) {
                        return Err(TemplateError::DuplicateValue {
                            line,
                            name: value.name,
                        });
                    }
                    values.push(value);
                } else if trimmed == START_STATE && !in_start {
                    in_start = true;
                } else {
                    return Err(TemplateError::UnsupportedState {
                        line,
                        state: trimmed.to_string(),
                    });
                }
                continue;
            }

            if !in_start {
                return Err(TemplateError::RuleOutsideState { line });
            }

            rules.push(parse_rule(trimmed, line, &values)?);
        }

        if !in_start {
            return Err(TemplateError::MissingStart);
        }
        if rules.is_empty() {
            return Err(TemplateError::NoRules);
        }

        Ok(Self {
            name: name.into(),
            values,
            rules,
        })
    }

    /// Read and compile a template file
    ///
    /// # Errors
    /// Returns `TemplateError::Io` if the file cannot be read, or the parse
    /// error wrapped with the file path.
    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let display = path.display().to_string();
        let source = std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
            path: display.clone(),
            message: e.to_string(),
        })?;
        Self::parse(display.clone(), &source).map_err(|e| e.in_file(display))
    }

    /// Template name (file path for file-backed templates)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared field names in declaration order
    pub fn header(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|v| v.name.as_str())
    }

    /// Compiled rules in evaluation order
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

fn parse_value(rest: &str, line: usize) -> Result<ValueDef, TemplateError> {
    let rest = rest.trim();
    let open = rest
        .find('(')
        .ok_or(TemplateError::UnparenthesisedValue { line })?;
    let (head, regex) = (rest[..open].trim(), rest[open..].trim_end());

    if !regex.ends_with(')') {
        return Err(TemplateError::UnparenthesisedValue { line });
    }

    let mut words: Vec<&str> = head.split_whitespace().collect();
    let name = words.pop().ok_or_else(|| TemplateError::InvalidValueName {
        line,
        name: String::new(),
    })?;

    if !is_valid_name(name) {
        return Err(TemplateError::InvalidValueName {
            line,
            name: name.to_string(),
        });
    }

    let mut filldown = false;
    let mut required = false;
    for option in words.iter().flat_map(|w| w.split(',')).filter(|o| !o.is_empty()) {
        match option {
            "Filldown" => filldown = true,
            "Required" => required = true,
            other => {
                return Err(TemplateError::UnknownOption {
                    line,
                    option: other.to_string(),
                });
            }
        }
    }

    Regex::new(regex).map_err(|e| TemplateError::ValueRegex {
        line,
        message: e.to_string(),
    })?;

    Ok(ValueDef {
        name: name.to_string(),
        regex: regex.to_string(),
        filldown,
        required,
    })
}

fn parse_rule(text: &str, line: usize, values: &[ValueDef]) -> Result<Rule, TemplateError> {
    let (pattern, repeat) = match text.rsplit_once(" -> ") {
        Some((pattern, action)) => {
            let repeat = match action.trim() {
                "Many" | "Record" => Repeat::Many,
                "One" => Repeat::One,
                other => {
                    return Err(TemplateError::UnknownAction {
                        line,
                        action: other.to_string(),
                    });
                }
            };
            (pattern.trim_end(), repeat)
        }
        None => (text, Repeat::Many),
    };

    if !pattern.starts_with('^') {
        return Err(TemplateError::RuleNotAnchored { line });
    }

    let (expanded, fields) = expand_pattern(pattern, line, values)?;

    let pattern = Regex::new(&expanded).map_err(|e| TemplateError::RuleRegex {
        line,
        message: e.to_string(),
    })?;

    Ok(Rule {
        pattern,
        repeat,
        fields,
        line,
    })
}

/// Replace `${NAME}` with the value's named group and `$$` with `$`.
fn expand_pattern(
    pattern: &str,
    line: usize,
    values: &[ValueDef],
) -> Result<(String, Vec<String>), TemplateError> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut fields = Vec::new();
    let mut rest = pattern;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("$$") {
            out.push('$');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("${") {
            let close = after.find('}').ok_or_else(|| TemplateError::RuleRegex {
                line,
                message: "unterminated ${".to_string(),
            })?;
            let name = &after[..close];
            let value = values.iter().find(|v| v.name == name).ok_or_else(|| {
                TemplateError::UndeclaredValue {
                    line,
                    name: name.to_string(),
                }
            })?;
            let _ = write!(out, "(?P<{}>{})", value.name, value.regex);
            fields.push(value.name.clone());
            rest = &after[close + 1..];
        } else {
            out.push('$');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);

    Ok((out, fields))
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
