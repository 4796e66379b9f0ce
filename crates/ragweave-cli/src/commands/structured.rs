//! `structured-output`: a typed record pulled out of free text

use crate::CliError;
use crate::context::CliContext;
use crate::output;
use ragweave_foundation::{JsonObjectSchema, StructuredOutputExtractor};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_PASSAGE: &str = "John is 42 years old and lives an independent life.
He stands 1.75 meters tall and carries himself with confidence.
Currently unmarried, he enjoys the freedom to focus on his personal goals and interests.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub age: i64,
    pub height: f64,
    pub married: bool,
}

pub fn person_schema() -> JsonObjectSchema {
    JsonObjectSchema::new("Person")
        .description("A person described in the text")
        .string("name")
        .integer("age")
        .described("height", "number", "height in meters")
        .boolean("married")
}

pub async fn run(ctx: &CliContext, text: Option<&str>) -> Result<(), CliError> {
    let passage = text.unwrap_or(DEFAULT_PASSAGE);
    let extractor = StructuredOutputExtractor::new(ctx.chat_model()?);
    let schema = person_schema();

    let prompt = format!("Extract the person described in the following text.\n\n{passage}");
    let value = extractor.extract_value(&prompt, &schema).await?;
    let person: Person = serde_json::from_value(value.clone())?;

    info!("Output: {value}");
    info!("Person: {person:?}");
    println!("{}", serde_json::to_string_pretty(&value)?);
    output::done(&format!(
        "{} is {} years old, {} m tall, {}",
        person.name,
        person.age,
        person.height,
        if person.married { "married" } else { "not married" }
    ));
    Ok(())
}
