//! Legacy record extraction.
//!
//! The primary path sends the legacy text and target schema to an AI backend
//! and expects a JSON array of records back. Whenever that path is disabled
//! or fails, the positional tokenizer in [`basic_extract`] produces the rows.

use crate::openrouter::{CompletionBackend, Message};
use crate::schema::{ExtractedRecord, SchemaField};
use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

pub const INCOMPLETE_REQUEST: &str =
    "Please provide legacy data and a complete schema with field names.";

const TITLE_PREFIX_CHARS: usize = 40;

const SYSTEM_PROMPT: &str =
    "You convert legacy text records into JSON. Reply with a single JSON array of objects and nothing else.";

/// Which path produced the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    Ai,
    Basic,
}

#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub records: Vec<ExtractedRecord>,
    pub mode: ExtractionMode,
}

/// Extraction orchestrator: AI first when configured, tokenizer otherwise.
#[derive(Clone, Default)]
pub struct Extractor {
    backend: Option<Arc<dyn CompletionBackend>>,
}

impl Extractor {
    /// Tokenizer only.
    pub fn basic() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub async fn extract(&self, legacy_data: &str, schema: &[SchemaField]) -> Extraction {
        let Some(backend) = &self.backend else {
            return Extraction {
                records: basic_extract(legacy_data, schema),
                mode: ExtractionMode::Basic,
            };
        };

        match self.extract_with_ai(backend.as_ref(), legacy_data, schema).await {
            Ok(records) => {
                info!(
                    "AI extraction via {} produced {} records",
                    backend.name(),
                    records.len()
                );
                Extraction {
                    records,
                    mode: ExtractionMode::Ai,
                }
            }
            Err(e) => {
                warn!("AI extraction failed, using basic tokenizer: {:#}", e);
                Extraction {
                    records: basic_extract(legacy_data, schema),
                    mode: ExtractionMode::Basic,
                }
            }
        }
    }

    async fn extract_with_ai(
        &self,
        backend: &dyn CompletionBackend,
        legacy_data: &str,
        schema: &[SchemaField],
    ) -> Result<Vec<ExtractedRecord>> {
        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(build_prompt(legacy_data, schema)),
        ];

        debug!(
            "Calling {} for extraction ({} chars, {} fields)",
            backend.name(),
            legacy_data.len(),
            schema.len()
        );
        let response = backend.complete(messages).await?;
        debug!("Raw AI response length: {} chars", response.len());

        parse_ai_records(&response).context("Failed to parse AI extraction response")
    }
}

/// Reject requests the dashboard would never send: no text, no schema, or a
/// schema with an unnamed field.
pub fn validate_request(legacy_data: &str, schema: &[SchemaField]) -> Result<(), &'static str> {
    if legacy_data.trim().is_empty()
        || schema.is_empty()
        || schema.iter().any(|f| f.name.trim().is_empty())
    {
        return Err(INCOMPLETE_REQUEST);
    }
    Ok(())
}

fn token_separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"\s*[-,|]\s*|\s+").expect("separator regex is valid"))
}

/// Positional tokenizer.
///
/// Each non-empty line becomes one record. Tokens are split on `-`, `,`, `|`
/// (with surrounding whitespace) or whitespace runs, and assigned to schema
/// fields by index. Missing tokens become `""`; surplus tokens are dropped.
/// Fields with a blank name are skipped but still consume their index.
pub fn basic_extract(legacy_data: &str, schema: &[SchemaField]) -> Vec<ExtractedRecord> {
    let separator = token_separator();

    legacy_data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let parts: Vec<&str> = separator.split(line).filter(|p| !p.is_empty()).collect();
            let mut record = ExtractedRecord::new();
            for (i, field) in schema.iter().enumerate() {
                let key = field.name.trim();
                if key.is_empty() {
                    continue;
                }
                let value = parts.get(i).copied().unwrap_or("");
                record.insert(key.to_string(), Value::String(value.to_string()));
            }
            record
        })
        .collect()
}

/// Instruction prompt for the AI path.
pub fn build_prompt(legacy_data: &str, schema: &[SchemaField]) -> String {
    let schema_description = schema
        .iter()
        .map(|field| format!("- \"{}\": {}", field.name, field.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an expert data extraction AI. Your task is to analyze the provided legacy text data and convert it into a structured JSON format based on the given schema.

**Instructions:**
1. Read the "LEGACY DATA" block carefully.
2. Use the "EXTRACTION SCHEMA" to understand the required fields and their meanings.
3. Extract the information for each record.
4. Format the output as a single, valid JSON array of objects. Each object in the array represents a single record.
5. The keys in your output JSON objects MUST EXACTLY MATCH the "name" values from the schema.

---
**LEGACY DATA:**
---
{}
---

**EXTRACTION SCHEMA:**
---
{}
---

**OUTPUT (JSON Array only):**"#,
        legacy_data, schema_description
    )
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```(?:json)?\s*\n?(.*?)\n?\s*```$").expect("fence regex is valid")
    })
}

/// Parse the AI reply into records.
///
/// Accepts a JSON array of objects, or a single object (treated as one
/// record). An optional surrounding Markdown code fence is stripped first.
pub fn parse_ai_records(response: &str) -> Result<Vec<ExtractedRecord>> {
    let trimmed = response.trim();
    let json_str = code_fence()
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed);

    let parsed: Value = serde_json::from_str(json_str).with_context(|| {
        format!(
            "Invalid JSON syntax: {}",
            json_str.chars().take(200).collect::<String>()
        )
    })?;

    match parsed {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(record) => Ok(record),
                _ => bail!("Element {} of the JSON array is not an object", i),
            })
            .collect(),
        Value::Object(record) => Ok(vec![record]),
        _ => bail!("AI response was not a JSON array"),
    }
}

/// Default history title: the first line of the first 40 characters, plus "...".
pub fn history_title(legacy_data: &str) -> String {
    let prefix: String = legacy_data.chars().take(TITLE_PREFIX_CHARS).collect();
    let first_line = prefix.split('\n').next().unwrap_or_default();
    format!("{}...", first_line)
}
