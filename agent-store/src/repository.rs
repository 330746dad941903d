//! Custom tool persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use agent_primitives::{CustomToolId, ToolStatus};

use crate::error::{StoreError, StoreResult};
use crate::record::{CustomTool, ToolAuthor};

/// Criteria narrowing [`CustomToolRepository::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolFilter {
    status: Option<ToolStatus>,
    created_by: Option<ToolAuthor>,
    user_id: Option<String>,
}

impl ToolFilter {
    /// Filter matching every record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts results to a status.
    #[must_use]
    pub fn with_status(mut self, status: ToolStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts results to an author.
    #[must_use]
    pub fn with_author(mut self, author: ToolAuthor) -> Self {
        self.created_by = Some(author);
        self
    }

    /// Restricts results to records visible to `user_id`.
    #[must_use]
    pub fn visible_to(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns `true` when `tool` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, tool: &CustomTool) -> bool {
        self.status.is_none_or(|status| tool.status == status)
            && self.created_by.is_none_or(|author| tool.created_by == author)
            && tool.visible_to(self.user_id.as_deref())
    }
}

/// Durable storage for custom tool records.
///
/// Names are unique across the store. Implementations must make `create`
/// fail with [`StoreError::Conflict`] rather than overwrite.
#[async_trait]
pub trait CustomToolRepository: Send + Sync {
    /// Fetches a record by id.
    async fn get(&self, id: CustomToolId) -> StoreResult<Option<CustomTool>>;

    /// Fetches a record by its unique name.
    async fn get_by_name(&self, name: &str) -> StoreResult<Option<CustomTool>>;

    /// Inserts a new record.
    async fn create(&self, tool: CustomTool) -> StoreResult<CustomTool>;

    /// Replaces an existing record, stamping `updated_at`.
    async fn update(&self, tool: CustomTool) -> StoreResult<CustomTool>;

    /// Removes a record. Returns `false` when nothing was stored under `id`.
    async fn delete(&self, id: CustomToolId) -> StoreResult<bool>;

    /// Lists records matching `filter`, ordered by name.
    async fn list(&self, filter: &ToolFilter) -> StoreResult<Vec<CustomTool>>;

    /// Increments the usage counter of a record.
    async fn record_usage(&self, id: CustomToolId) -> StoreResult<()>;
}

/// Repository keeping every record in process memory.
#[derive(Debug, Default)]
pub struct InMemoryToolRepository {
    records: RwLock<HashMap<CustomToolId, CustomTool>>,
}

impl InMemoryToolRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CustomToolRepository for InMemoryToolRepository {
    async fn get(&self, id: CustomToolId) -> StoreResult<Option<CustomTool>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> StoreResult<Option<CustomTool>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|tool| tool.name == name)
            .cloned())
    }

    async fn create(&self, tool: CustomTool) -> StoreResult<CustomTool> {
        let mut guard = self.records.write().await;
        if guard
            .values()
            .any(|existing| existing.name == tool.name || existing.id == tool.id)
        {
            return Err(StoreError::Conflict { name: tool.name });
        }
        debug!(tool = %tool.name, id = %tool.id, "stored custom tool");
        guard.insert(tool.id, tool.clone());
        Ok(tool)
    }

    async fn update(&self, mut tool: CustomTool) -> StoreResult<CustomTool> {
        let mut guard = self.records.write().await;
        if !guard.contains_key(&tool.id) {
            return Err(StoreError::NotFound { id: tool.id });
        }
        if guard
            .values()
            .any(|existing| existing.id != tool.id && existing.name == tool.name)
        {
            return Err(StoreError::Conflict { name: tool.name });
        }
        tool.updated_at = Utc::now();
        guard.insert(tool.id, tool.clone());
        Ok(tool)
    }

    async fn delete(&self, id: CustomToolId) -> StoreResult<bool> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn list(&self, filter: &ToolFilter) -> StoreResult<Vec<CustomTool>> {
        let guard = self.records.read().await;
        let mut tools: Vec<CustomTool> = guard
            .values()
            .filter(|tool| filter.matches(tool))
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    async fn record_usage(&self, id: CustomToolId) -> StoreResult<()> {
        let mut guard = self.records.write().await;
        let tool = guard.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        tool.usage_count = tool.usage_count.saturating_add(1);
        Ok(())
    }
}
