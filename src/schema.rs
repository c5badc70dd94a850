//! Domain types shared by the HTTP layer and the stores.
//!
//! API JSON is camelCase and identifiers serialize as `_id`, which is what the
//! dashboard client reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One extracted row: target field name -> scalar value.
pub type ExtractedRecord = serde_json::Map<String, Value>;

/// A target field in the user's extraction schema.
///
/// Missing keys deserialize as empty strings so that incomplete fields reach
/// the request validators instead of failing JSON extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub company_name: String,
    pub company_domain: Option<String>,
    pub contact_name: String,
    pub accepted_terms_at: Option<DateTime<Utc>>,
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub company_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_domain: Option<String>,
    pub contact_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_terms_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            company_name: user.company_name.clone(),
            company_domain: user.company_domain.clone(),
            contact_name: user.contact_name.clone(),
            accepted_terms_at: user.accepted_terms_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
}

impl ProfilePatch {
    pub fn validate(&self) -> Result<(), String> {
        if self.company_name.as_deref().is_some_and(is_blank) {
            return Err("companyName is required".to_string());
        }
        if self.contact_name.as_deref().is_some_and(is_blank) {
            return Err("contactName is required".to_string());
        }
        Ok(())
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.company_name {
            user.company_name = name.clone();
        }
        if let Some(domain) = &self.company_domain {
            user.company_domain = Some(domain.clone());
        }
        if let Some(contact) = &self.contact_name {
            user.contact_name = contact.clone();
        }
    }
}

// ============================================================================
// History
// ============================================================================

/// A saved extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user: Uuid,
    pub company_name: String,
    pub title: String,
    pub timestamp: String,
    pub legacy_data: String,
    pub schema: Vec<SchemaField>,
    pub extracted_data: Vec<ExtractedRecord>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/history`. Every field is required; they are optional
/// here so a missing one maps to a 400 rather than a deserialization error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryInput {
    pub title: Option<String>,
    pub timestamp: Option<String>,
    pub legacy_data: Option<String>,
    pub schema: Option<Vec<SchemaField>>,
    pub extracted_data: Option<Vec<ExtractedRecord>>,
}

impl HistoryInput {
    /// Returns `None` when a required field is missing or empty.
    pub fn into_item(self, user: Uuid, company_name: &str) -> Option<HistoryItem> {
        let title = self.title.filter(|t| !t.is_empty())?;
        let timestamp = self.timestamp.filter(|t| !t.is_empty())?;
        let legacy_data = self.legacy_data.filter(|l| !l.is_empty())?;
        Some(HistoryItem {
            id: Uuid::new_v4(),
            user,
            company_name: company_name.to_string(),
            title,
            timestamp,
            legacy_data,
            schema: self.schema?,
            extracted_data: self.extracted_data?,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<SchemaField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<Vec<ExtractedRecord>>,
}

impl HistoryPatch {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.as_deref().is_some_and(str::is_empty) {
            return Err("title is required".to_string());
        }
        if self.timestamp.as_deref().is_some_and(str::is_empty) {
            return Err("timestamp is required".to_string());
        }
        if self.legacy_data.as_deref().is_some_and(str::is_empty) {
            return Err("legacyData is required".to_string());
        }
        if let Some(schema) = &self.schema {
            validate_schema_fields(schema)?;
        }
        Ok(())
    }

    pub fn apply(&self, item: &mut HistoryItem) {
        if let Some(title) = &self.title {
            item.title = title.clone();
        }
        if let Some(timestamp) = &self.timestamp {
            item.timestamp = timestamp.clone();
        }
        if let Some(legacy_data) = &self.legacy_data {
            item.legacy_data = legacy_data.clone();
        }
        if let Some(schema) = &self.schema {
            item.schema = schema.clone();
        }
        if let Some(extracted) = &self.extracted_data {
            item.extracted_data = extracted.clone();
        }
    }
}

/// Every stored schema field needs an id and a name.
pub fn validate_schema_fields(schema: &[SchemaField]) -> Result<(), String> {
    for (i, field) in schema.iter().enumerate() {
        if field.id.is_empty() {
            return Err(format!("schema.{}.id is required", i));
        }
        if field.name.is_empty() {
            return Err(format!("schema.{}.name is required", i));
        }
    }
    Ok(())
}

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user: Uuid,
    pub company_name: String,
    pub title: String,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    pub title: Option<String>,
    pub content: Option<Value>,
    pub file_name: Option<String>,
    pub key_points: Option<Vec<String>>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl DocumentInput {
    /// Returns `None` unless the title is non-empty and the content truthy.
    pub fn into_document(self, user: Uuid, company_name: &str) -> Option<Document> {
        let title = self.title.filter(|t| !t.is_empty())?;
        let content = self.content.filter(is_truthy)?;
        let now = Utc::now();
        Some(Document {
            id: Uuid::new_v4(),
            user,
            company_name: company_name.to_string(),
            title,
            content,
            file_name: self.file_name,
            key_points: self.key_points.unwrap_or_default(),
            notes: self.notes.unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_points: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl DocumentPatch {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.as_deref().is_some_and(str::is_empty) {
            return Err("title is required".to_string());
        }
        if self.content.as_ref().is_some_and(|c| !is_truthy(c)) {
            return Err("content is required".to_string());
        }
        Ok(())
    }

    pub fn apply(&self, doc: &mut Document) {
        if let Some(title) = &self.title {
            doc.title = title.clone();
        }
        if let Some(content) = &self.content {
            doc.content = content.clone();
        }
        if let Some(file_name) = &self.file_name {
            doc.file_name = Some(file_name.clone());
        }
        if let Some(key_points) = &self.key_points {
            doc.key_points = key_points.clone();
        }
        if let Some(notes) = &self.notes {
            doc.notes = notes.clone();
        }
        if let Some(tags) = &self.tags {
            doc.tags = tags.clone();
        }
        doc.updated_at = Utc::now();
    }
}

/// JSON truthiness: null, false, 0 and "" are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
