//! CSV and JSON downloads of extracted records.

use crate::schema::ExtractedRecord;
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const BOM: &str = "\u{FEFF}";
const FALLBACK_STEM: &str = "extracted-data";

/// Render records as CSV with a UTF-8 BOM.
///
/// Columns come from `headers`, or from the first record's keys when
/// `headers` is empty. Rows are `\n`-separated with no trailing newline.
pub fn to_csv(records: &[ExtractedRecord], headers: &[String]) -> Result<String> {
    let columns: Vec<String> = if headers.is_empty() {
        records
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    } else {
        headers.to_vec()
    };

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(csv_line(&columns)?);
    for record in records {
        let row = columns
            .iter()
            .map(|c| cell_text(record.get(c)))
            .collect::<Vec<_>>();
        lines.push(csv_line(&row)?);
    }

    Ok(format!("{}{}", BOM, lines.join("\n")))
}

/// One CSV line without terminator. Cells are quoted only when they hold a
/// quote, comma or line break, so a lone empty cell stays empty.
fn csv_line(fields: &[String]) -> Result<String> {
    if fields.iter().all(String::is_empty) && fields.len() <= 1 {
        return Ok(String::new());
    }

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(fields)
        .context("Failed to write CSV row")?;

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))?;
    let line = String::from_utf8(bytes).context("CSV output was not UTF-8")?;
    Ok(line.strip_suffix('\n').unwrap_or(&line).to_string())
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Pretty JSON with two-space indentation.
pub fn to_json(records: &[ExtractedRecord]) -> Result<String> {
    serde_json::to_string_pretty(records).context("Failed to serialize records")
}

/// Filesystem-safe download name derived from a title.
pub fn file_stem(title: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"(?i)[^a-z0-9]+").expect("stem regex is valid"));
    let stem = re.replace_all(title, "-").to_lowercase();
    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    }
}
