//! Supabase (PostgREST) store.
//!
//! Expects three tables: `users`, `history_items` and `documents`, with
//! snake_case columns matching the row types at the bottom of this file.
//! `schema`, `extracted_data` and `content` are `jsonb`.

use super::Store;
use crate::schema::{
    Document, DocumentPatch, ExtractedRecord, HistoryItem, HistoryPatch, ProfilePatch,
    SchemaField, User,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const USERS: &str = "users";
const HISTORY: &str = "history_items";
const DOCUMENTS: &str = "documents";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Supabase client configuration.
#[derive(Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    service_role_key: String,
    ready: Arc<AtomicBool>,
}

impl SupabaseStore {
    pub fn new(base_url: impl Into<String>, service_role_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            service_role_key: service_role_key.into(),
            ready: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Check connectivity and update the readiness flag.
    pub async fn probe(&self) -> Result<()> {
        let result = self
            .select::<IdOnly>(USERS, &[("select", "id".to_string()), ("limit", "1".to_string())])
            .await
            .map(|_| ());

        let was_ready = self.ready.swap(result.is_ok(), Ordering::SeqCst);
        match (&result, was_ready) {
            (Ok(()), false) => info!("Connected to Supabase at {}", self.base_url),
            (Err(e), true) => warn!("Lost Supabase connection: {:#}", e),
            _ => {}
        }
        result
    }

    /// Probe until the first success, waiting `retry` between attempts.
    pub async fn connect(&self, retry: Duration) {
        while let Err(e) = self.probe().await {
            warn!(
                "Supabase connection failed; retrying in {}s: {:#}",
                retry.as_secs(),
                e
            );
            tokio::time::sleep(retry).await;
        }
    }

    /// Re-probe forever so the readiness gate follows the database.
    pub fn spawn_health_probe(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let _ = store.probe().await;
            }
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        self.client
            .request(method, url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
    }

    async fn rows<T: DeserializeOwned>(resp: Response, what: &str) -> Result<Vec<T>> {
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Supabase {} failed: {} - {}", what, status, text));
        }
        resp.json()
            .await
            .with_context(|| format!("Failed to parse Supabase {} response", what))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let resp = self.request(Method::GET, table).query(query).send().await?;
        Self::rows(resp, &format!("GET {}", table)).await
    }

    async fn insert<T: Serialize + DeserializeOwned>(&self, table: &str, row: &T) -> Result<T> {
        let resp = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        Self::rows::<T>(resp, &format!("insert into {}", table))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Supabase insert into {} returned no row", table))
    }

    async fn update<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &Value,
    ) -> Result<Option<T>> {
        let resp = self
            .request(Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(filters)
            .json(body)
            .send()
            .await?;
        Ok(Self::rows(resp, &format!("update {}", table))
            .await?
            .into_iter()
            .next())
    }

    async fn delete(&self, table: &str, filters: &[(&str, String)]) -> Result<bool> {
        let resp = self
            .request(Method::DELETE, table)
            .header("Prefer", "return=representation")
            .query(filters)
            .send()
            .await?;
        let deleted: Vec<IdOnly> = Self::rows(resp, &format!("delete from {}", table)).await?;
        debug!("Deleted {} row(s) from {}", deleted.len(), table);
        Ok(!deleted.is_empty())
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

fn scoped(company: &str, id: Uuid) -> [(&'static str, String); 2] {
    [("id", eq(id)), ("company_name", eq(company))]
}

#[async_trait::async_trait]
impl Store for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn insert_user(&self, user: User) -> Result<User> {
        let row = self.insert(USERS, &UserRow::from(user)).await?;
        Ok(row.into())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let rows: Vec<UserRow> = self
            .select(USERS, &[("email", eq(email)), ("limit", "1".to_string())])
            .await?;
        Ok(rows.into_iter().next().map(User::from))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let rows: Vec<UserRow> = self.select(USERS, &[("id", eq(id))]).await?;
        Ok(rows.into_iter().next().map(User::from))
    }

    async fn update_user_profile(&self, id: Uuid, patch: &ProfilePatch) -> Result<Option<User>> {
        let mut body = Map::new();
        if let Some(v) = &patch.company_name {
            body.insert("company_name".into(), json!(v));
        }
        if let Some(v) = &patch.company_domain {
            body.insert("company_domain".into(), json!(v));
        }
        if let Some(v) = &patch.contact_name {
            body.insert("contact_name".into(), json!(v));
        }
        if body.is_empty() {
            return self.find_user(id).await;
        }
        let row: Option<UserRow> = self
            .update(USERS, &[("id", eq(id))], &Value::Object(body))
            .await?;
        Ok(row.map(User::from))
    }

    async fn list_history(&self, company: &str) -> Result<Vec<HistoryItem>> {
        let rows: Vec<HistoryRow> = self
            .select(
                HISTORY,
                &[
                    ("company_name", eq(company)),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(HistoryItem::from).collect())
    }

    async fn get_history(&self, company: &str, id: Uuid) -> Result<Option<HistoryItem>> {
        let rows: Vec<HistoryRow> = self.select(HISTORY, &scoped(company, id)).await?;
        Ok(rows.into_iter().next().map(HistoryItem::from))
    }

    async fn insert_history(&self, item: HistoryItem) -> Result<HistoryItem> {
        let row = self.insert(HISTORY, &HistoryRow::from(item)).await?;
        Ok(row.into())
    }

    async fn update_history(
        &self,
        company: &str,
        id: Uuid,
        patch: &HistoryPatch,
    ) -> Result<Option<HistoryItem>> {
        let mut body = Map::new();
        if let Some(v) = &patch.title {
            body.insert("title".into(), json!(v));
        }
        if let Some(v) = &patch.timestamp {
            body.insert("timestamp".into(), json!(v));
        }
        if let Some(v) = &patch.legacy_data {
            body.insert("legacy_data".into(), json!(v));
        }
        if let Some(v) = &patch.schema {
            body.insert("schema".into(), serde_json::to_value(v)?);
        }
        if let Some(v) = &patch.extracted_data {
            body.insert("extracted_data".into(), serde_json::to_value(v)?);
        }
        if body.is_empty() {
            return self.get_history(company, id).await;
        }
        let row: Option<HistoryRow> = self
            .update(HISTORY, &scoped(company, id), &Value::Object(body))
            .await?;
        Ok(row.map(HistoryItem::from))
    }

    async fn delete_history(&self, company: &str, id: Uuid) -> Result<bool> {
        self.delete(HISTORY, &scoped(company, id)).await
    }

    async fn list_documents(&self, company: &str) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = self
            .select(
                DOCUMENTS,
                &[
                    ("company_name", eq(company)),
                    ("order", "updated_at.desc".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn insert_document(&self, doc: Document) -> Result<Document> {
        let row = self.insert(DOCUMENTS, &DocumentRow::from(doc)).await?;
        Ok(row.into())
    }

    async fn update_document(
        &self,
        company: &str,
        id: Uuid,
        patch: &DocumentPatch,
    ) -> Result<Option<Document>> {
        let mut body = Map::new();
        if let Some(v) = &patch.title {
            body.insert("title".into(), json!(v));
        }
        if let Some(v) = &patch.content {
            body.insert("content".into(), v.clone());
        }
        if let Some(v) = &patch.file_name {
            body.insert("file_name".into(), json!(v));
        }
        if let Some(v) = &patch.key_points {
            body.insert("key_points".into(), json!(v));
        }
        if let Some(v) = &patch.notes {
            body.insert("notes".into(), json!(v));
        }
        if let Some(v) = &patch.tags {
            body.insert("tags".into(), json!(v));
        }
        body.insert("updated_at".into(), json!(Utc::now()));

        let row: Option<DocumentRow> = self
            .update(DOCUMENTS, &scoped(company, id), &Value::Object(body))
            .await?;
        Ok(row.map(Document::from))
    }

    async fn delete_document(&self, company: &str, id: Uuid) -> Result<bool> {
        self.delete(DOCUMENTS, &scoped(company, id)).await
    }
}

// ============================================================================
// Supabase row types
// ============================================================================

#[derive(Debug, Deserialize)]
struct IdOnly {
    #[allow(dead_code)]
    id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    company_name: String,
    company_domain: Option<String>,
    contact_name: String,
    accepted_terms_at: Option<DateTime<Utc>>,
}

impl From<User> for UserRow {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            password_hash: u.password_hash,
            created_at: u.created_at,
            company_name: u.company_name,
            company_domain: u.company_domain,
            contact_name: u.contact_name,
            accepted_terms_at: u.accepted_terms_at,
        }
    }
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            created_at: r.created_at,
            company_name: r.company_name,
            company_domain: r.company_domain,
            contact_name: r.contact_name,
            accepted_terms_at: r.accepted_terms_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryRow {
    id: Uuid,
    user_id: Uuid,
    company_name: String,
    title: String,
    timestamp: String,
    legacy_data: String,
    schema: Vec<SchemaField>,
    extracted_data: Vec<ExtractedRecord>,
    created_at: DateTime<Utc>,
}

impl From<HistoryItem> for HistoryRow {
    fn from(h: HistoryItem) -> Self {
        Self {
            id: h.id,
            user_id: h.user,
            company_name: h.company_name,
            title: h.title,
            timestamp: h.timestamp,
            legacy_data: h.legacy_data,
            schema: h.schema,
            extracted_data: h.extracted_data,
            created_at: h.created_at,
        }
    }
}

impl From<HistoryRow> for HistoryItem {
    fn from(r: HistoryRow) -> Self {
        Self {
            id: r.id,
            user: r.user_id,
            company_name: r.company_name,
            title: r.title,
            timestamp: r.timestamp,
            legacy_data: r.legacy_data,
            schema: r.schema,
            extracted_data: r.extracted_data,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DocumentRow {
    id: Uuid,
    user_id: Uuid,
    company_name: String,
    title: String,
    content: Value,
    file_name: Option<String>,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Document> for DocumentRow {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            user_id: d.user,
            company_name: d.company_name,
            title: d.title,
            content: d.content,
            file_name: d.file_name,
            key_points: d.key_points,
            notes: d.notes,
            tags: d.tags,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

impl From<DocumentRow> for Document {
    fn from(r: DocumentRow) -> Self {
        Self {
            id: r.id,
            user: r.user_id,
            company_name: r.company_name,
            title: r.title,
            content: r.content,
            file_name: r.file_name,
            key_points: r.key_points,
            notes: r.notes,
            tags: r.tags,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
