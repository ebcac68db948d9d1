//! Template cache keyed by file path

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::TemplateError;
use crate::template::Template;

/// Loads each template file once and shares it between vendor profiles
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    base_dir: Option<PathBuf>,
    templates: HashMap<PathBuf, Arc<Template>>,
}

impl TemplateRegistry {
    /// Create an empty registry resolving relative paths against the
    /// working directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative template paths against `dir`
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Load (or return the cached) template at `path`
    ///
    /// # Errors
    /// Returns `TemplateError` if the file is missing or malformed.
    pub fn load(&mut self, path: &Path) -> Result<Arc<Template>, TemplateError> {
        let resolved = match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };

        if let Some(template) = self.templates.get(&resolved) {
            return Ok(Arc::clone(template));
        }

        let template = Arc::new(Template::from_file(&resolved)?);
        debug!(path = %resolved.display(), rules = template.rules().len(), "compiled template");
        self.templates.insert(resolved, Arc::clone(&template));
        Ok(template)
    }

    /// Register an in-memory template under a path key
    ///
    /// # Errors
    /// Returns `TemplateError` if the source is malformed.
    pub fn insert_source(
        &mut self,
        path: impl Into<PathBuf>,
        source: &str,
    ) -> Result<Arc<Template>, TemplateError> {
        let path = path.into();
        let name = path.display().to_string();
        let template =
            Arc::new(Template::parse(name.clone(), source).map_err(|e| e.in_file(name))?);
        self.templates.insert(path, Arc::clone(&template));
        Ok(template)
    }

    /// Number of distinct compiled templates
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether nothing has been loaded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
