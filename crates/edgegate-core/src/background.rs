//! Detached work that outlives the response.
//!
//! Handlers register task factories on the [`BackgroundTasks`] collector found in the request
//! extensions. The adapter drains the collector once the response has been produced and hands
//! each task to the host (`wait_until` on Workers, a detached blocking worker on tokio). Task
//! outcomes are never observed by the client.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{FutureExt, LocalBoxFuture};

/// Builds a background future. The factory crosses threads; the future it returns need not.
pub type TaskFactory = Box<dyn FnOnce() -> LocalBoxFuture<'static, ()> + Send>;

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<Vec<TaskFactory>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task to run after the response is returned.
    pub fn register<F, Fut>(&self, factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.lock().push(Box::new(move || factory().boxed_local()));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take every queued task, leaving the collector empty.
    pub fn drain(&self) -> Vec<TaskFactory> {
        std::mem::take(&mut *self.lock())
    }

    /// Run every queued task to completion, one after another.
    pub async fn run_all(&self) {
        for task in self.drain() {
            task().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TaskFactory>> {
        // A panicking task factory never holds the lock, so a poisoned queue is still consistent.
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundTasks")
            .field("pending", &self.len())
            .finish()
    }
}

/// Detach `factory` on `tasks` when a collector is attached, otherwise run it before returning.
pub async fn detach<F, Fut>(tasks: Option<&BackgroundTasks>, factory: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + 'static,
{
    match tasks {
        Some(tasks) => tasks.register(factory),
        None => factory().await,
    }
}
