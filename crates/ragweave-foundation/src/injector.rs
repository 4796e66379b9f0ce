//! Prompt augmentation

use crate::prompt::PromptTemplate;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{ContentInjector, Query, ScoredContent};
use std::fmt::Write as _;
use tracing::warn;

pub const DEFAULT_INJECTION_PROMPT: &str =
    "{{userMessage}}\n\nAnswer using the following information:\n{{contents}}";

const ALLOWED_VARIABLES: [&str; 2] = ["userMessage", "contents"];

/// Appends the retained content beneath the user's message.
///
/// When metadata keys are configured each item is written as a
/// `content: ...` line followed by one `key: value` line per key present on
/// the item. Items are separated by blank lines.
#[derive(Debug, Clone)]
pub struct DefaultContentInjector {
    prompt: PromptTemplate,
    metadata_keys: Vec<String>,
}

impl Default for DefaultContentInjector {
    fn default() -> Self {
        Self {
            prompt: PromptTemplate::new(DEFAULT_INJECTION_PROMPT),
            metadata_keys: Vec::new(),
        }
    }
}

impl DefaultContentInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the template. Only `{{userMessage}}` and `{{contents}}` may
    /// appear in it.
    pub fn with_prompt(mut self, prompt: impl Into<PromptTemplate>) -> RagResult<Self> {
        let prompt = prompt.into();
        if let Some(unknown) = prompt
            .variables()
            .into_iter()
            .find(|v| !ALLOWED_VARIABLES.contains(&v.as_str()))
        {
            return Err(RagError::Configuration(format!(
                "injection template uses unknown variable '{unknown}'"
            )));
        }
        self.prompt = prompt;
        Ok(self)
    }

    #[must_use]
    pub fn with_metadata_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    fn format_content(&self, content: &ScoredContent) -> String {
        if self.metadata_keys.is_empty() {
            return content.text.clone();
        }
        let mut out = format!("content: {}", content.text);
        for key in &self.metadata_keys {
            if let Some(value) = content.metadata.get(key) {
                let _ = write!(out, "\n{key}: {value}");
            }
        }
        out
    }
}

impl ContentInjector for DefaultContentInjector {
    fn inject(&self, query: &Query, contents: &[ScoredContent]) -> String {
        if contents.is_empty() {
            return query.text().to_string();
        }
        let formatted = contents
            .iter()
            .map(|c| self.format_content(c))
            .collect::<Vec<_>>()
            .join("\n\n");

        match self
            .prompt
            .render(&[("userMessage", query.text()), ("contents", &formatted)])
        {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(error = %err, "injection template failed, sending the query alone");
                query.text().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents() -> Vec<ScoredContent> {
        vec![
            ScoredContent::new("Reservations can be cancelled free of charge.", 0.9)
                .with_metadata("file_name", "miles-of-smiles-terms-of-use.txt")
                .with_metadata("index", 2),
            ScoredContent::new("Cancellations within 24 hours are charged.", 0.8)
                .with_metadata("file_name", "miles-of-smiles-terms-of-use.txt"),
        ]
    }

    #[test]
    fn test_plain_injection() {
        let prompt = DefaultContentInjector::new()
            .inject(&Query::new("Can I cancel my reservation?"), &contents());
        assert_eq!(
            prompt,
            "Can I cancel my reservation?\n\nAnswer using the following information:\n\
             Reservations can be cancelled free of charge.\n\n\
             Cancellations within 24 hours are charged."
        );
    }

    #[test]
    fn test_metadata_lines_follow_each_item() {
        let prompt = DefaultContentInjector::new()
            .with_metadata_keys(["file_name", "index"])
            .inject(&Query::new("Can I cancel?"), &contents());
        assert!(prompt.ends_with(
            "content: Reservations can be cancelled free of charge.\n\
             file_name: miles-of-smiles-terms-of-use.txt\n\
             index: 2\n\n\
             content: Cancellations within 24 hours are charged.\n\
             file_name: miles-of-smiles-terms-of-use.txt"
        ));
    }

    #[test]
    fn test_no_content_passes_query_through() {
        let query = Query::new("Hi");
        assert_eq!(DefaultContentInjector::new().inject(&query, &[]), "Hi");
    }

    #[test]
    fn test_unknown_template_variable_rejected() {
        let err = DefaultContentInjector::new()
            .with_prompt("{{question}} {{contents}}")
            .unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }
}
