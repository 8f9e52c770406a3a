//! Ordered, named registry of logout hooks owned by the host.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use tracing::debug;

/// Logout hook; resolves to `true` to continue the chain or `false` when the
/// hook has taken over the rest of the teardown.
pub type SessionTask = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// Ordered logout task registry.
#[derive(Clone, Default)]
pub struct LogoutTasks {
    tasks: Arc<Mutex<Vec<(String, SessionTask)>>>,
}

impl LogoutTasks {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` under `name`; an existing task with the same name is
    /// replaced in place and keeps its position.
    pub fn add_task(&self, name: impl Into<String>, task: SessionTask) {
        let name = name.into();
        let mut tasks = self.lock();
        if let Some(slot) = tasks.iter_mut().find(|(existing, _)| *existing == name) {
            slot.1 = task;
        } else {
            tasks.push((name, task));
        }
    }

    /// Registered task names, in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Run the tasks in order, stopping at the first that returns `false`.
    ///
    /// Returns `true` when every task asked the chain to continue.
    pub async fn execute(&self) -> bool {
        let tasks: Vec<(String, SessionTask)> = self.lock().clone();
        for (name, task) in tasks {
            if !task().await {
                debug!(task = %name, "logout task stopped the chain");
                return false;
            }
            debug!(task = %name, "logout task completed");
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, SessionTask)>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for LogoutTasks {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LogoutTasks")
            .field("names", &self.names())
            .finish()
    }
}
