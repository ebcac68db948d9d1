//! Error types for nbsync-template

use thiserror::Error;

/// Errors raised while loading or compiling a template
///
/// All of these are configuration errors: they abort the run before any
/// device is polled.
#[derive(Error, Debug, Clone)]
pub enum TemplateError {
    /// Template file could not be read
    #[error("cannot read template {path}: {message}")]
    Io { path: String, message: String },

    /// Error inside a named template file
    #[error("{path}: {source}")]
    InFile {
        path: String,
        #[source]
        source: Box<TemplateError>,
    },

    #[error("line {line}: unknown value option '{option}'")]
    UnknownOption { line: usize, option: String },

    #[error("line {line}: invalid value name '{name}'")]
    InvalidValueName { line: usize, name: String },

    #[error("line {line}: value '{name}' declared twice")]
    DuplicateValue { line: usize, name: String },

    #[error("line {line}: value regex must be enclosed in parentheses")]
    UnparenthesisedValue { line: usize },

    #[error("line {line}: invalid value regex: {message}")]
    ValueRegex { line: usize, message: String },

    #[error("line {line}: rule outside of the Start state")]
    RuleOutsideState { line: usize },

    #[error("line {line}: unsupported state '{state}' (only Start is supported)")]
    UnsupportedState { line: usize, state: String },

    #[error("line {line}: rule must start with '^'")]
    RuleNotAnchored { line: usize },

    #[error("line {line}: rule references undeclared value '{name}'")]
    UndeclaredValue { line: usize, name: String },

    #[error("line {line}: unknown rule action '{action}'")]
    UnknownAction { line: usize, action: String },

    #[error("line {line}: invalid rule regex: {message}")]
    RuleRegex { line: usize, message: String },

    #[error("template has no Start state")]
    MissingStart,

    #[error("template has no rules")]
    NoRules,
}

impl TemplateError {
    /// Attach the template path to a parse error
    #[must_use]
    pub fn in_file(self, path: impl Into<String>) -> Self {
        TemplateError::InFile {
            path: path.into(),
            source: Box::new(self),
        }
    }
}
