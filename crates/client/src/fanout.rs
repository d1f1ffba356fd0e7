//! Per-server fan-out with results kept in server order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::server::BlobServer;

/// Outcome of one server's task.
#[derive(Debug)]
pub enum Slot<T> {
    Done(T),
    /// The task panicked or was aborted.
    Failed(String),
    /// Still running when the batch was cancelled. The task was detached and
    /// its result is discarded.
    Detached,
}

/// Cancellation scope for the batches one coordinator runs.
///
/// Batches started while the current token is live share it. Once it is
/// cancelled the next batch gets a fresh token, so a cancel only reaches
/// work already in flight. Clones share the scope.
#[derive(Debug, Clone, Default)]
pub struct BatchCancel {
    current: Arc<Mutex<CancellationToken>>,
}

impl BatchCancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for the batches in flight, or for the next one to start.
    pub fn token(&self) -> CancellationToken {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_cancelled() {
            *current = CancellationToken::new();
        }
        current.clone()
    }
}

/// Runs `job` for every server on its own task, with no limit on how many
/// run at once.
///
/// The returned slots line up with `servers`. A panic in one task only
/// fills that task's slot; siblings keep running. When `cancel` fires,
/// whatever finished is kept and the rest are [`Slot::Detached`].
pub async fn fan_out<T, F, Fut>(
    servers: &[Arc<dyn BlobServer>],
    cancel: &CancellationToken,
    job: F,
) -> Vec<Slot<T>>
where
    T: Send + 'static,
    F: Fn(Arc<dyn BlobServer>) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let mut slots: Vec<Slot<T>> = servers.iter().map(|_| Slot::Detached).collect();
    let mut pending = servers.len();

    let mut set = JoinSet::new();
    let mut index_of = HashMap::with_capacity(servers.len());
    for (index, server) in servers.iter().enumerate() {
        let handle = set.spawn(job(Arc::clone(server)));
        index_of.insert(handle.id(), index);
    }

    while pending > 0 {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(pending, "fan-out cancelled, detaching remaining tasks");
                set.detach_all();
                break;
            }
            joined = set.join_next_with_id() => joined,
        };

        match joined {
            Some(Ok((id, value))) => {
                if let Some(&index) = index_of.get(&id) {
                    slots[index] = Slot::Done(value);
                }
            }
            Some(Err(e)) => {
                if let Some(&index) = index_of.get(&e.id()) {
                    error!(server = %servers[index].endpoint(), error = %e, "server task failed");
                    slots[index] = Slot::Failed(e.to_string());
                }
            }
            None => break,
        }
        pending -= 1;
    }

    slots
}
