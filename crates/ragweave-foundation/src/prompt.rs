//! Prompt 模板
//! Prompt templates
//!
//! Templates use `{{name}}` placeholders. Rendering is a single pass, so
//! placeholder-like text inside a substituted value is left as is.

use ragweave_kernel::error::RagError;
use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    // The pattern is a literal.
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder pattern")
});

/// Prompt 模板错误
/// Prompt template errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    /// 变量未提供
    /// Variable not provided
    #[error("Required variable not provided: {0}")]
    MissingVariable(String),
}

impl From<PromptError> for RagError {
    fn from(err: PromptError) -> Self {
        RagError::InvalidInput(err.to_string())
    }
}

pub type PromptResult<T> = Result<T, PromptError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    content: String,
}

impl PromptTemplate {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// 提取模板变量
    /// Extract template variables, sorted and without duplicates
    pub fn variables(&self) -> Vec<String> {
        PLACEHOLDER
            .captures_iter(&self.content)
            .map(|cap| cap[1].to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// 渲染模板
    /// Render template
    ///
    /// Every placeholder must have a value.
    pub fn render(&self, vars: &[(&str, &str)]) -> PromptResult<String> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();

        let mut missing = BTreeSet::new();
        for cap in PLACEHOLDER.captures_iter(&self.content) {
            if !map.contains_key(&cap[1]) {
                missing.insert(cap[1].to_string());
            }
        }
        if !missing.is_empty() {
            return Err(PromptError::MissingVariable(
                missing.into_iter().collect::<Vec<_>>().join(", "),
            ));
        }

        Ok(PLACEHOLDER
            .replace_all(&self.content, |cap: &Captures<'_>| {
                map.get(&cap[1]).copied().unwrap_or_default().to_string()
            })
            .into_owned())
    }
}

impl From<&str> for PromptTemplate {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}

impl From<String> for PromptTemplate {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let template = PromptTemplate::new("{{userMessage}}\n\nAnswer using:\n{{contents}}");
        let out = template
            .render(&[("userMessage", "Can I cancel?"), ("contents", "Yes.")])
            .unwrap();
        assert_eq!(out, "Can I cancel?\n\nAnswer using:\nYes.");
    }

    #[test]
    fn test_missing_variables_reported_together() {
        let template = PromptTemplate::new("{{b}} {{a}} {{ b }}");
        assert_eq!(template.variables(), vec!["a", "b"]);
        assert_eq!(
            template.render(&[]),
            Err(PromptError::MissingVariable("a, b".into()))
        );
    }

    #[test]
    fn test_values_are_not_rendered_again() {
        let template = PromptTemplate::new("Query: {{it}}");
        let out = template.render(&[("it", "what does {{it}} mean?")]).unwrap();
        assert_eq!(out, "Query: what does {{it}} mean?");
    }
}
