//! Structured task groups.
//!
//! A [`TaskGroup`] owns a set of spawned tasks. Tasks are never cancelled because a sibling
//! failed: [`TaskGroup::join_all`] waits for every task before reporting, so nothing outlives the
//! group and groups nest by simply awaiting an inner group inside an outer task.

use crate::{CdsError, CdsResult};
use std::future::Future;
use tokio::task::JoinSet;
use tracing::Instrument;

pub struct TaskGroup<T> {
    name: &'static str,
    tasks: JoinSet<CdsResult<T>>,
    spawned: usize,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tasks: JoinSet::new(),
            spawned: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of tasks spawned so far.
    pub fn len(&self) -> usize {
        self.spawned
    }

    pub fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    /// Spawn a task into the group, inside a span named after the group.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = CdsResult<T>> + Send + 'static,
    {
        let span = tracing::info_span!("task_group", group = self.name);
        self.tasks.spawn(task.instrument(span));
        self.spawned += 1;
    }

    /// Next finished task, in completion order. `None` once every task has been reaped.
    ///
    /// A task that panicked or was aborted is reported as [`CdsError::TaskJoin`].
    pub async fn next(&mut self) -> Option<CdsResult<T>> {
        let joined = self.tasks.join_next().await?;
        Some(joined.unwrap_or_else(|e| {
            Err(CdsError::TaskJoin {
                group: self.name,
                reason: e.to_string(),
            })
        }))
    }

    /// Wait for every task, then return all results in completion order.
    pub async fn join(mut self) -> Vec<CdsResult<T>> {
        let mut results = Vec::with_capacity(self.spawned);
        while let Some(result) = self.next().await {
            results.push(result);
        }
        results
    }

    /// Wait for every task, then return their values or the first error observed.
    ///
    /// # Errors
    ///
    /// Returns the first task error in completion order. Later errors are logged.
    pub async fn join_all(self) -> CdsResult<Vec<T>> {
        let name = self.name;
        let mut values = Vec::new();
        let mut first_error = None;

        for result in self.join().await {
            match result {
                Ok(value) => values.push(value),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => tracing::warn!(group = name, error = %e, "additional task failure"),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(values),
        }
    }
}
