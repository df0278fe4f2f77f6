//! Fan-out/fan-in fetch batches that merge into the aggregate store.
//!
//! A batch spawns one task per request and reaps outcomes as they complete. Every outcome is
//! drained, even after a failure has been seen, and every successful body is decoded and routed
//! into the store. The batch still fails as a whole if any request failed; callers discard the
//! evaluation in that case rather than use whatever merged.

use super::group::TaskGroup;
use super::{FetchOutcome, FetchRequest, Fetcher};
use crate::aggregate::{AggregateStore, SharedStore};
use crate::config::CdsConfig;
use crate::dispatch::dispatch;
use crate::{CdsError, CdsResult};
use fhir::{decode_payload, FhirError};
use std::sync::Arc;

/// Handles shared by every batch of one evaluation.
#[derive(Clone)]
pub struct Orchestrator {
    fetcher: Arc<dyn Fetcher>,
    cfg: Arc<CdsConfig>,
    store: SharedStore,
    patient_id: Arc<str>,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        cfg: Arc<CdsConfig>,
        store: SharedStore,
        patient_id: &str,
    ) -> Self {
        Self {
            fetcher,
            cfg,
            store,
            patient_id: Arc::from(patient_id),
        }
    }

    pub fn config(&self) -> &CdsConfig {
        &self.cfg
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    /// Run one mutation pass over the store under a single lock acquisition.
    pub fn mutate<R>(&self, pass: impl FnOnce(&mut AggregateStore, &CdsConfig) -> R) -> R {
        let mut store = self.store.lock();
        pass(&mut store, &self.cfg)
    }

    /// Fetch every request concurrently and merge the successful bodies.
    ///
    /// # Arguments
    ///
    /// * `group` - Resource category name, used in logs and errors.
    /// * `requests` - The batch. An empty batch succeeds immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CdsError::BatchFailed`] if any fetch failed or any task did not complete, after
    /// all siblings have been drained and merged. If every fetch succeeded but a body could not
    /// be decoded, returns [`CdsError::Fhir`] with the first decode error.
    pub async fn run_batch(&self, group: &'static str, requests: Vec<FetchRequest>) -> CdsResult<()> {
        let total = requests.len();
        let mut tasks = TaskGroup::new(group);

        for request in requests {
            let fetcher = Arc::clone(&self.fetcher);
            tasks.spawn(async move { Ok(fetcher.fetch(&request).await) });
        }

        let mut failed = 0;
        let mut decode_error: Option<FhirError> = None;

        while let Some(result) = tasks.next().await {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    failed += 1;
                    tracing::error!(patient = %self.patient_id, group, error = %e, "fetch task did not complete");
                    continue;
                }
            };

            match outcome {
                FetchOutcome::Body(body) => {
                    if let Err(e) = self.merge(group, &body) {
                        tracing::error!(patient = %self.patient_id, group, error = %e, "failed to decode response");
                        decode_error.get_or_insert(e);
                    }
                }
                FetchOutcome::Failed(failure) => {
                    failed += 1;
                    tracing::error!(patient = %self.patient_id, group, error = %failure, "fetch failed");
                }
            }
        }

        if failed > 0 {
            return Err(CdsError::BatchFailed {
                group,
                failed,
                total,
            });
        }
        if let Some(e) = decode_error {
            return Err(CdsError::Fhir(e));
        }

        tracing::debug!(patient = %self.patient_id, group, requests = total, "batch complete");
        Ok(())
    }

    /// Decode outside the lock, route under it.
    fn merge(&self, group: &'static str, body: &[u8]) -> Result<(), FhirError> {
        let resources = decode_payload(body)?;
        let counts = self.mutate(|store, cfg| dispatch(store, resources, cfg));
        tracing::trace!(group, routed = counts.routed, dropped = counts.dropped, "merged payload");
        Ok(())
    }
}
