//! Demo: the correction loop against a scripted provider.
//!
//! The mock answers with prose first, then with a wrongly typed field, and
//! only then with valid JSON. Each attempt is logged through `tracing`.
//!
//! Run with: `cargo run --example extract_person`

use llm_validator::backend::MockProvider;
use llm_validator::{RetryConfig, StructuredValidator, TypedSchema, ValidateOptions};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Person {
    name: String,
    age: u32,
    email: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mock = Arc::new(MockProvider::new(vec![
        "Sure, John is thirty years old!",
        r#"{"name": "John", "age": "thirty"}"#,
        "```json\n{\"name\": \"John\", \"age\": 30, \"email\": \"john@example.com\"}\n```",
    ]));

    let validator = StructuredValidator::builder()
        .provider("mock", mock.clone())
        .retry(RetryConfig::new(3).with_initial_backoff(Duration::from_millis(100)))
        .log_responses(true)
        .build();

    let schema = TypedSchema::<Person>::new([
        ("name", "required|string"),
        ("age", "required|integer|min:0"),
        ("email", "nullable|email"),
    ]);

    let result = validator
        .validate(
            "Extract the person from: John (john@example.com) is 30 years old.",
            &schema,
            &ValidateOptions::default(),
        )
        .await?;

    for attempt in result.attempts() {
        println!(
            "attempt {}: json_valid={} schema_valid={} errors={:?}",
            attempt.attempt(),
            attempt.json_valid(),
            attempt.schema_valid(),
            attempt.validation_errors()
        );
    }
    println!("tokens used: {}", result.usage().total_tokens);

    let person = result.into_data()?;
    println!("{} is {} ({:?})", person.name, person.age, person.email);

    println!("\nCorrection prompt sent on attempt 2:\n{}", mock.prompts()[1]);
    Ok(())
}
