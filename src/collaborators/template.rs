//! Variable substitution for collaborator command templates.

use std::collections::HashMap;
use std::path::Path;

/// Variable substitution context for collaborator commands.
///
/// Supports `{varname}` placeholders. Unknown placeholders are left as-is.
///
/// ```
/// use periodical_distiller::collaborators::TemplateContext;
/// use std::path::Path;
///
/// let ctx = TemplateContext::new()
///     .with_token("2026-01-29", "pdf")
///     .with_sip(Path::new("/sips/2026-01-29"));
///
/// assert_eq!(ctx.substitute("{sip_path}/articles"), "/sips/2026-01-29/articles");
/// assert_eq!(ctx.substitute("{stage}-{token_id}"), "pdf-2026-01-29");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `{token_id}` and `{stage}`.
    pub fn with_token(self, token_id: &str, stage: &str) -> Self {
        self.with_var("token_id", token_id).with_var("stage", stage)
    }

    /// Set `{pip_path}`.
    pub fn with_pip(self, pip_path: &Path) -> Self {
        self.with_var("pip_path", &pip_path.display().to_string())
    }

    /// Set `{sip_path}`.
    pub fn with_sip(self, sip_path: &Path) -> Self {
        self.with_var("sip_path", &sip_path.display().to_string())
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Substitute variables in a string.
    pub fn substitute(&self, template: &str) -> String {
        let mut result = template.to_string();
        for (key, value) in &self.vars {
            result = result.replace(&format!("{{{}}}", key), value);
        }
        result
    }

    pub fn substitute_all(&self, templates: &[String]) -> Vec<String> {
        templates.iter().map(|t| self.substitute(t)).collect()
    }
}
