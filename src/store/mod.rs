//! Persistence for users, extraction history and saved documents.
//!
//! History and documents are always addressed together with the owning
//! company name, so one company can never read or change another's rows.

pub mod memory;
pub mod supabase;

use crate::schema::{
    Document, DocumentPatch, HistoryItem, HistoryPatch, ProfilePatch, User,
};
use anyhow::Result;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Whether the backend is reachable.
    fn is_ready(&self) -> bool;

    // Users
    async fn insert_user(&self, user: User) -> Result<User>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn update_user_profile(&self, id: Uuid, patch: &ProfilePatch) -> Result<Option<User>>;

    // History, newest first
    async fn list_history(&self, company: &str) -> Result<Vec<HistoryItem>>;
    async fn get_history(&self, company: &str, id: Uuid) -> Result<Option<HistoryItem>>;
    async fn insert_history(&self, item: HistoryItem) -> Result<HistoryItem>;
    async fn update_history(
        &self,
        company: &str,
        id: Uuid,
        patch: &HistoryPatch,
    ) -> Result<Option<HistoryItem>>;
    async fn delete_history(&self, company: &str, id: Uuid) -> Result<bool>;

    // Documents, most recently updated first
    async fn list_documents(&self, company: &str) -> Result<Vec<Document>>;
    async fn insert_document(&self, doc: Document) -> Result<Document>;
    async fn update_document(
        &self,
        company: &str,
        id: Uuid,
        patch: &DocumentPatch,
    ) -> Result<Option<Document>>;
    async fn delete_document(&self, company: &str, id: Uuid) -> Result<bool>;
}
