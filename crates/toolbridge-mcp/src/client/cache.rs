//! Per-surface list caches.

use tokio::sync::RwLock;
use toolbridge_core::{ListKind, Prompt, Resource, Tool};

/// Cached result of one list operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ListCache<T> {
    #[default]
    Unfetched,
    Populated(Vec<T>),
    /// The server does not support this surface.
    KnownEmpty,
}

impl<T: Clone> ListCache<T> {
    /// Cached items, or `None` when the server must be asked.
    pub fn cached(&self) -> Option<Vec<T>> {
        match self {
            Self::Unfetched => None,
            Self::Populated(items) => Some(items.clone()),
            Self::KnownEmpty => Some(Vec::new()),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ListCaches {
    pub tools: RwLock<ListCache<Tool>>,
    pub prompts: RwLock<ListCache<Prompt>>,
    pub resources: RwLock<ListCache<Resource>>,
}

impl ListCaches {
    pub async fn invalidate(&self, kind: ListKind) {
        match kind {
            ListKind::Tools => *self.tools.write().await = ListCache::Unfetched,
            ListKind::Prompts => *self.prompts.write().await = ListCache::Unfetched,
            ListKind::Resources => *self.resources.write().await = ListCache::Unfetched,
        }
    }

    pub async fn clear(&self) {
        for kind in [ListKind::Tools, ListKind::Prompts, ListKind::Resources] {
            self.invalidate(kind).await;
        }
    }
}
