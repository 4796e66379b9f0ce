//! Language-model generated metadata filters
//!
//! [`LanguageModelSqlFilterBuilder`] describes the metadata as a SQL table,
//! asks a chat model to answer the user's question with a `SELECT`
//! statement, and turns the statement's `WHERE` clause into a [`Filter`].
//! Every failure along the way is reported as
//! [`RagError::FilterGeneration`] so that retrievers fall back to an
//! unfiltered search.

use super::parser::parse_where_clause;
use crate::prompt::PromptTemplate;
use async_trait::async_trait;
use ragweave_kernel::error::{RagError, RagResult};
use ragweave_kernel::rag::{ChatModel, Filter, FilterProvider, Query};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_SQL_FILTER_PROMPT: &str = "\
### Instructions:
Convert the question into a SQL query against the database schema below.
- Read the question and the schema word by word before answering.
- Use only the columns defined in the schema.
- Answer with a single SELECT statement and nothing else.

### Input:
Generate a SQL query that answers the question `{{query}}`.
The query will run on a database whose schema is:
{{create_table_statement}}

### Response:
Here is the SQL query that answers the question `{{query}}`:
```sql
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: String,
    pub description: Option<String>,
}

/// The metadata keys of a store, described as one SQL table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn column(mut self, name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        self.columns.push(ColumnDefinition {
            name: name.into(),
            sql_type: sql_type.into(),
            description: None,
        });
        self
    }

    #[must_use]
    pub fn described_column(
        mut self,
        name: impl Into<String>,
        sql_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.columns.push(ColumnDefinition {
            name: name.into(),
            sql_type: sql_type.into(),
            description: Some(description.into()),
        });
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn create_table_statement(&self) -> String {
        let mut out = format!("CREATE TABLE {} (\n", self.name);
        for (i, column) in self.columns.iter().enumerate() {
            let _ = write!(out, "    {} {}", column.name, column.sql_type);
            if let Some(description) = &column.description {
                let _ = write!(out, " COMMENT '{}'", description.replace('\'', "''"));
            }
            out.push_str(if i + 1 < self.columns.len() { ",\n" } else { "\n" });
        }
        out.push(')');
        out
    }
}

fn referenced_keys(filter: &Filter, out: &mut Vec<String>) {
    match filter {
        Filter::Eq { key, .. }
        | Filter::Ne { key, .. }
        | Filter::Gt { key, .. }
        | Filter::Gte { key, .. }
        | Filter::Lt { key, .. }
        | Filter::Lte { key, .. }
        | Filter::In { key, .. }
        | Filter::NotIn { key, .. }
        | Filter::Contains { key, .. } => out.push(key.clone()),
        Filter::And { left, right } | Filter::Or { left, right } => {
            referenced_keys(left, out);
            referenced_keys(right, out);
        }
        Filter::Not { inner } => referenced_keys(inner, out),
    }
}

pub struct LanguageModelSqlFilterBuilder {
    chat_model: Arc<dyn ChatModel>,
    table: TableDefinition,
    prompt: PromptTemplate,
}

impl LanguageModelSqlFilterBuilder {
    pub fn new(chat_model: Arc<dyn ChatModel>, table: TableDefinition) -> Self {
        Self {
            chat_model,
            table,
            prompt: PromptTemplate::new(DEFAULT_SQL_FILTER_PROMPT),
        }
    }

    /// Replaces the prompt. It may use `{{query}}` and
    /// `{{create_table_statement}}`.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<PromptTemplate>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Generates the filter for one query.
    pub async fn build(&self, query: &Query) -> RagResult<Option<Filter>> {
        let statement = self.table.create_table_statement();
        let prompt = self
            .prompt
            .render(&[
                ("query", query.text()),
                ("create_table_statement", &statement),
            ])
            .map_err(|e| RagError::FilterGeneration(e.to_string()))?;

        let sql = self
            .chat_model
            .complete(&prompt)
            .await
            .map_err(|e| RagError::FilterGeneration(format!("model call failed: {e}")))?;
        debug!(sql = %sql.trim(), "generated SQL");

        let filter = parse_where_clause(&sql)
            .map_err(|e| RagError::FilterGeneration(format!("{e} in `{}`", sql.trim())))?;

        if let Some(filter) = &filter {
            let mut keys = Vec::new();
            referenced_keys(filter, &mut keys);
            if let Some(unknown) = keys.iter().find(|k| !self.table.has_column(k)) {
                return Err(RagError::FilterGeneration(format!(
                    "column '{unknown}' is not part of table {}",
                    self.table.name
                )));
            }
        }
        Ok(filter)
    }
}

#[async_trait]
impl FilterProvider for LanguageModelSqlFilterBuilder {
    async fn filter_for(&self, query: &Query) -> RagResult<Option<Filter>> {
        self.build(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragweave_kernel::rag::{ChatRequest, ChatResponse};

    struct CannedSql(&'static str);

    #[async_trait]
    impl ChatModel for CannedSql {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn chat(&self, request: ChatRequest) -> RagResult<ChatResponse> {
            assert!(request.messages[0].content.contains("CREATE TABLE movies"));
            Ok(ChatResponse {
                text: self.0.to_string(),
                model: None,
            })
        }
    }

    fn movies() -> TableDefinition {
        TableDefinition::new("movies")
            .described_column("genre", "VARCHAR", "one of: [comedy, drama, action]")
            .column("year", "INT")
    }

    #[test]
    fn test_create_table_statement() {
        assert_eq!(
            movies().create_table_statement(),
            "CREATE TABLE movies (\n    genre VARCHAR COMMENT 'one of: [comedy, drama, action]',\n    year INT\n)"
        );
    }

    #[tokio::test]
    async fn test_generated_filter() {
        let builder = LanguageModelSqlFilterBuilder::new(
            Arc::new(CannedSql(
                "SELECT * FROM movies WHERE genre = 'action' AND year BETWEEN 1990 AND 1999",
            )),
            movies(),
        );
        let filter = builder
            .filter_for(&Query::new("Recommend a good action movie from the 90s."))
            .await
            .unwrap();
        assert_eq!(
            filter,
            Some(Filter::eq("genre", "action").and(Filter::between("year", 1990, 1999)))
        );
    }

    #[tokio::test]
    async fn test_unparseable_answer_is_filter_generation_error() {
        let builder = LanguageModelSqlFilterBuilder::new(
            Arc::new(CannedSql("Die Hard is a great choice!")),
            movies(),
        );
        let err = builder.build(&Query::new("anything")).await.unwrap_err();
        assert!(matches!(err, RagError::FilterGeneration(_)));
    }

    #[tokio::test]
    async fn test_unknown_column_rejected() {
        let builder = LanguageModelSqlFilterBuilder::new(
            Arc::new(CannedSql("SELECT * FROM movies WHERE rating > 8")),
            movies(),
        );
        let err = builder.build(&Query::new("best rated?")).await.unwrap_err();
        assert!(matches!(err, RagError::FilterGeneration(_)));
    }
}
