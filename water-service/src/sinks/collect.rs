use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Gathers accepted records in memory for a one-shot job to pick up after
/// the pipeline finishes.
pub struct CollectSink<T> {
    records: Arc<Mutex<Vec<T>>>,
    rejected: Arc<Mutex<usize>>,
}

impl<T> Clone for CollectSink<T> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            rejected: self.rejected.clone(),
        }
    }
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            rejected: Arc::new(Mutex::new(0)),
        }
    }
}

impl<T> CollectSink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.records.lock().await)
    }

    pub async fn rejected(&self) -> usize {
        *self.rejected.lock().await
    }
}

#[async_trait::async_trait]
impl<T: Send + 'static> Sink<T> for CollectSink<T> {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static,
    {
        while let Some(item) = input.next().await {
            match item {
                Ok(env) => self.records.lock().await.push(env.payload),
                Err(PipelineError::Transform(e)) => {
                    tracing::debug!(error = %e, "record rejected upstream");
                    *self.rejected.lock().await += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
