use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

/// Detached work (statement sends, progress saves) owned by one session.
///
/// Callers never wait on these; `flush` exists for shutdown and tests.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` on the current runtime. Outside a runtime the task is dropped.
    pub fn spawn<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(handle) = Handle::try_current() else {
            warn!(task = label, "no async runtime; background task dropped");
            return;
        };
        let join = handle.spawn(task);
        match self.handles.lock() {
            Ok(mut handles) => {
                handles.retain(|handle| !handle.is_finished());
                handles.push(join);
            }
            Err(err) => warn!(task = label, error = %err, "task list poisoned; task left untracked"),
        }
    }

    /// Number of tasks not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.handles
            .lock()
            .map(|handles| handles.iter().filter(|handle| !handle.is_finished()).count())
            .unwrap_or_default()
    }

    /// Waits for every task spawned so far, including ones spawned while waiting.
    pub async fn flush(&self) {
        loop {
            let drained: Vec<JoinHandle<()>> = match self.handles.lock() {
                Ok(mut handles) => handles.drain(..).collect(),
                Err(_) => return,
            };
            if drained.is_empty() {
                return;
            }
            for handle in drained {
                if let Err(err) = handle.await {
                    warn!(error = %err, "background task failed");
                }
            }
        }
    }
}
