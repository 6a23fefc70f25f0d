//! Concurrent search pool
//!
//! Runs independent searches (one per relay request) on the tokio runtime,
//! bounded by a semaphore, sharing one cancellation token.

use super::{CancellationCheckpoint, HashcashSearch, SearchParams, DEFAULT_CHECKPOINT_INTERVAL};
use crate::{Error, Result, Solution};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Bounded pool of concurrent searches
#[derive(Debug, Clone)]
pub struct SearchPool {
    concurrency: usize,
}

impl SearchPool {
    /// Create a pool; a concurrency of 0 uses the number of CPUs
    pub fn new(concurrency: usize) -> Self {
        let concurrency = if concurrency == 0 {
            num_cpus::get()
        } else {
            concurrency
        };
        Self { concurrency }
    }

    /// Maximum number of searches running at once
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run all searches, returning results in input order
    ///
    /// A search yields `None` when `cancellation` fires before it finishes.
    pub async fn run(
        &self,
        searches: Vec<SearchParams>,
        cancellation: CancellationToken,
    ) -> Result<Vec<Option<Solution>>> {
        info!(
            "Running {} hashcash searches with concurrency {}",
            searches.len(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(searches.len());

        for (index, mut params) in searches.into_iter().enumerate() {
            if params.checkpoint_interval().is_none() {
                params = params.with_checkpoint_interval(DEFAULT_CHECKPOINT_INTERVAL)?;
            }
            let semaphore = semaphore.clone();
            let cancellation = cancellation.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                if cancellation.is_cancelled() {
                    return None;
                }
                debug!("Search {} started", index);
                let mut checkpoint = CancellationCheckpoint::new(cancellation);
                HashcashSearch::new(params).run(Some(&mut checkpoint)).await
            }));
        }

        join_all(handles)
            .await
            .into_iter()
            .map(|result| result.map_err(|e| Error::invalid_state(format!("Search task failed: {e}"))))
            .collect()
    }
}

impl Default for SearchPool {
    fn default() -> Self {
        Self::new(0)
    }
}
