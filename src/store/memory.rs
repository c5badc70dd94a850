//! In-memory store. Used when no database is configured, and in tests.

use super::Store;
use crate::schema::{
    Document, DocumentPatch, HistoryItem, HistoryPatch, ProfilePatch, User,
};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    history: HashMap<Uuid, HistoryItem>,
    documents: HashMap<Uuid, Document>,
}

/// `RwLock`-guarded tables shared across handlers.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn insert_user(&self, user: User) -> Result<User> {
        let mut tables = self.write();
        if tables.users.values().any(|u| u.email == user.email) {
            bail!("duplicate email: {}", user.email);
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.read().users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.read().users.get(&id).cloned())
    }

    async fn update_user_profile(&self, id: Uuid, patch: &ProfilePatch) -> Result<Option<User>> {
        let mut tables = self.write();
        Ok(tables.users.get_mut(&id).map(|user| {
            patch.apply(user);
            user.clone()
        }))
    }

    async fn list_history(&self, company: &str) -> Result<Vec<HistoryItem>> {
        let mut items: Vec<HistoryItem> = self
            .read()
            .history
            .values()
            .filter(|h| h.company_name == company)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn get_history(&self, company: &str, id: Uuid) -> Result<Option<HistoryItem>> {
        Ok(self
            .read()
            .history
            .get(&id)
            .filter(|h| h.company_name == company)
            .cloned())
    }

    async fn insert_history(&self, item: HistoryItem) -> Result<HistoryItem> {
        self.write().history.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_history(
        &self,
        company: &str,
        id: Uuid,
        patch: &HistoryPatch,
    ) -> Result<Option<HistoryItem>> {
        let mut tables = self.write();
        Ok(tables
            .history
            .get_mut(&id)
            .filter(|h| h.company_name == company)
            .map(|item| {
                patch.apply(item);
                item.clone()
            }))
    }

    async fn delete_history(&self, company: &str, id: Uuid) -> Result<bool> {
        let mut tables = self.write();
        let owned = tables
            .history
            .get(&id)
            .is_some_and(|h| h.company_name == company);
        if owned {
            tables.history.remove(&id);
        }
        Ok(owned)
    }

    async fn list_documents(&self, company: &str) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .read()
            .documents
            .values()
            .filter(|d| d.company_name == company)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(docs)
    }

    async fn insert_document(&self, doc: Document) -> Result<Document> {
        self.write().documents.insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn update_document(
        &self,
        company: &str,
        id: Uuid,
        patch: &DocumentPatch,
    ) -> Result<Option<Document>> {
        let mut tables = self.write();
        Ok(tables
            .documents
            .get_mut(&id)
            .filter(|d| d.company_name == company)
            .map(|doc| {
                patch.apply(doc);
                doc.clone()
            }))
    }

    async fn delete_document(&self, company: &str, id: Uuid) -> Result<bool> {
        let mut tables = self.write();
        let owned = tables
            .documents
            .get(&id)
            .is_some_and(|d| d.company_name == company);
        if owned {
            tables.documents.remove(&id);
        }
        Ok(owned)
    }
}
