//! Batched queries over a single provider.
//!
//! Two strategies share one contract: the returned [`ResultSet`] holds one
//! entry per prompt, in input order. Sequential runs stop at the first
//! failure. Concurrent runs let every prompt settle and then report all
//! failures together as [`LLMError::Batch`].

use crate::config::constants::{defaults, providers};
use crate::llm::provider::{
    BatchError, BatchFailure, LLMError, LLMProvider, ModelParameters, Query, QueryResult,
    ResultSet,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// How a batch is scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    #[default]
    Sequential,
    Concurrent,
}

type Slot = Option<Result<String, LLMError>>;

pub struct BatchRunner {
    provider: Arc<dyn LLMProvider>,
    max_concurrency: usize,
}

impl BatchRunner {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_concurrency: defaults::MAX_CONCURRENCY,
        }
    }

    /// Worker pool size for concurrent runs; zero is treated as one
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub async fn run(
        &self,
        strategy: ExecutionStrategy,
        prompts: &[String],
        system_prompt: Option<&str>,
        model: &str,
        parameters: Option<&ModelParameters>,
    ) -> Result<ResultSet, LLMError> {
        match strategy {
            ExecutionStrategy::Sequential => {
                self.sequential(prompts, system_prompt, model, parameters)
                    .await
            }
            ExecutionStrategy::Concurrent => {
                self.concurrent(prompts, system_prompt, model, parameters)
                    .await
            }
        }
    }

    /// One prompt at a time; the first error is returned unchanged
    pub async fn sequential(
        &self,
        prompts: &[String],
        system_prompt: Option<&str>,
        model: &str,
        parameters: Option<&ModelParameters>,
    ) -> Result<ResultSet, LLMError> {
        info!(
            provider = self.provider.name(),
            model,
            prompts = prompts.len(),
            "running sequential batch"
        );

        let mut results = Vec::with_capacity(prompts.len());
        for (index, prompt) in prompts.iter().enumerate() {
            let query = build_query(model, prompt, system_prompt, parameters);
            debug!(index, "sending prompt");
            let reply = self.provider.query_with(&query).await?;
            results.push(QueryResult::new(prompt.clone(), reply));
        }

        Ok(results)
    }

    /// Bounded worker pool writing into an index-addressed buffer
    pub async fn concurrent(
        &self,
        prompts: &[String],
        system_prompt: Option<&str>,
        model: &str,
        parameters: Option<&ModelParameters>,
    ) -> Result<ResultSet, LLMError> {
        info!(
            provider = self.provider.name(),
            model,
            prompts = prompts.len(),
            workers = self.max_concurrency,
            "running concurrent batch"
        );

        let slots: Arc<Mutex<Vec<Slot>>> = Arc::new(Mutex::new(
            std::iter::repeat_with(|| None).take(prompts.len()).collect(),
        ));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(prompts.len());

        for (index, prompt) in prompts.iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|err| worker_error(format!("worker pool closed: {err}")))?;
            let provider = Arc::clone(&self.provider);
            let slots = Arc::clone(&slots);
            let query = build_query(model, prompt, system_prompt, parameters);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                debug!(index, "sending prompt");
                let outcome = provider.query_with(&query).await;
                slots.lock()[index] = Some(outcome);
            });
            handles.push((index, handle));
        }

        for (index, handle) in handles {
            if let Err(err) = handle.await {
                slots.lock()[index] = Some(Err(worker_error(format!("worker task failed: {err}"))));
            }
        }

        let settled = std::mem::take(&mut *slots.lock());
        collect_slots(prompts, settled)
    }
}

fn build_query(
    model: &str,
    prompt: &str,
    system_prompt: Option<&str>,
    parameters: Option<&ModelParameters>,
) -> Query {
    Query::new(model, prompt)
        .with_system_prompt(system_prompt.map(str::to_string))
        .with_parameters(parameters.copied())
}

fn worker_error(message: String) -> LLMError {
    LLMError::Provider {
        provider: providers::BATCH_RUNNER.to_string(),
        status: None,
        message,
        payload: None,
    }
}

/// Pair every settled slot with its prompt, or aggregate the failures
fn collect_slots(prompts: &[String], settled: Vec<Slot>) -> Result<ResultSet, LLMError> {
    let total = prompts.len();
    let mut results = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for (index, (prompt, slot)) in prompts.iter().zip(settled).enumerate() {
        match slot {
            Some(Ok(reply)) => results.push(QueryResult::new(prompt.clone(), reply)),
            Some(Err(error)) => failures.push(BatchFailure {
                index,
                prompt: prompt.clone(),
                error,
            }),
            None => failures.push(BatchFailure {
                index,
                prompt: prompt.clone(),
                error: worker_error("worker finished without a result".to_string()),
            }),
        }
    }

    if failures.is_empty() {
        Ok(results)
    } else {
        Err(LLMError::Batch(BatchError { total, failures }))
    }
}
