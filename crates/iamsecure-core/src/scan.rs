//! Paginated batch traversal shared by the per-user checks.
//!
//! The scanner walks the cursor-paginated user listing one page at a time and
//! splits each page into fixed-size batches. Every user in a batch is inspected
//! on its own task; the next batch starts only once the whole current batch is
//! done, so no more than `batch_size` inspections hit the directory at once
//! regardless of the page size the provider chooses.

use crate::checker::CheckError;
use crate::config::ConfigError;
use crate::directory::{Identity, IdentityDirectory};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

pub const DEFAULT_USER_BATCH_SIZE: usize = 10;

/// Per-user logic plugged into [`PaginatedBatchScanner`].
#[async_trait]
pub trait IdentityInspector: Send + Sync + 'static {
    type Finding: Send + 'static;

    /// Inspect one user. An `Err` aborts the whole scan.
    async fn inspect(
        &self,
        directory: &dyn IdentityDirectory,
        identity: &Identity,
    ) -> Result<Vec<Self::Finding>, CheckError>;
}

#[derive(Debug, Clone, Copy)]
pub struct PaginatedBatchScanner {
    batch_size: usize,
}

impl Default for PaginatedBatchScanner {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_USER_BATCH_SIZE,
        }
    }
}

impl PaginatedBatchScanner {
    pub fn new(batch_size: usize) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        Ok(Self { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Traverse every page and collect the findings of all inspections.
    ///
    /// Findings keep page order and batch order; inside a batch they follow
    /// completion order.
    pub async fn scan<I: IdentityInspector>(
        &self,
        directory: Arc<dyn IdentityDirectory>,
        inspector: Arc<I>,
    ) -> Result<Vec<I::Finding>, CheckError> {
        let mut findings = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_number = 0usize;

        loop {
            let page = directory
                .list_identities(cursor.take())
                .await
                .map_err(|e| CheckError::directory("list_identities", e))?;
            page_number += 1;
            debug!(
                page = page_number,
                users = page.identities.len(),
                has_more = page.has_more,
                "scanning user page"
            );

            let next = page.continuation();

            for batch in page.identities.chunks(self.batch_size) {
                findings.extend(self.run_batch(&directory, &inspector, batch).await?);
            }

            match next {
                Some(next_cursor) => cursor = Some(next_cursor),
                None => break,
            }
        }

        Ok(findings)
    }

    async fn run_batch<I: IdentityInspector>(
        &self,
        directory: &Arc<dyn IdentityDirectory>,
        inspector: &Arc<I>,
        batch: &[Identity],
    ) -> Result<Vec<I::Finding>, CheckError> {
        let mut tasks = JoinSet::new();

        for identity in batch {
            let directory = Arc::clone(directory);
            let inspector = Arc::clone(inspector);
            let identity = identity.clone();
            tasks.spawn(async move { inspector.inspect(directory.as_ref(), &identity).await });
        }

        let mut findings = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            // Dropping `tasks` on an early return aborts the rest of the batch.
            let inspected = joined.map_err(|e| CheckError::Task(e.to_string()))?;
            findings.extend(inspected?);
        }

        Ok(findings)
    }
}
