use async_trait::async_trait;

use crate::config::GeminiConfig;
use crate::error::EngineError;
use crate::llm::{extract_sql, GeminiClient};
use crate::models::DatabaseSchema;

/// Port: turns a natural-language question (plus schema and, on retry, the
/// previous failed attempt) into a single SQL statement.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        schema: &DatabaseSchema,
        context: Option<&str>,
        previous_attempt: Option<&str>,
        error_feedback: Option<&str>,
    ) -> Result<String, EngineError>;
}

/// Default Gemini-backed implementation, grounded on
/// `pg_mcp.services.sql_generator.SQLGenerator` and the teacher's
/// `RefinerAgent::generate_corrected_sql` prompt-building shape.
pub struct GeminiSqlGenerator {
    client: GeminiClient,
}

impl GeminiSqlGenerator {
    pub fn new(config: GeminiConfig) -> Self {
        GeminiSqlGenerator {
            client: GeminiClient::new(config),
        }
    }

    fn system_instruction() -> &'static str {
        "You are a PostgreSQL expert. Given a database schema and a \
         question, respond with exactly one read-only SELECT statement \
         that answers the question. Wrap the statement in a ```sql code \
         block and do not include any commentary."
    }

    fn build_prompt(
        &self,
        question: &str,
        schema: &DatabaseSchema,
        context: Option<&str>,
        previous_attempt: Option<&str>,
        error_feedback: Option<&str>,
    ) -> String {
        let mut prompt = format!("Schema:\n{}\n\nQuestion: {question}\n", format_schema(schema));
        if let Some(context) = context {
            prompt.push_str(&format!("\nAdditional context: {context}\n"));
        }
        if let (Some(attempt), Some(error)) = (previous_attempt, error_feedback) {
            prompt.push_str(&format!(
                "\nA previous attempt failed:\n{attempt}\n\nError: {error}\n\
                 Produce a corrected statement.\n"
            ));
        }
        prompt
    }
}

#[async_trait]
impl SqlGenerator for GeminiSqlGenerator {
    async fn generate(
        &self,
        question: &str,
        schema: &DatabaseSchema,
        context: Option<&str>,
        previous_attempt: Option<&str>,
        error_feedback: Option<&str>,
    ) -> Result<String, EngineError> {
        let prompt = self.build_prompt(question, schema, context, previous_attempt, error_feedback);
        let response = self
            .client
            .generate(Self::system_instruction(), &prompt, 0.1, false)
            .await?;
        extract_sql(&response)
            .ok_or_else(|| EngineError::LlmError("no SQL statement found in LLM response".to_string()))
    }
}

fn format_schema(schema: &DatabaseSchema) -> String {
    let mut out = String::new();
    for table in &schema.tables {
        out.push_str(&format!("{}.{}(", table.schema_name, table.table_name));
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.data_type))
            .collect();
        out.push_str(&columns.join(", "));
        out.push_str(")\n");
    }
    out
}
