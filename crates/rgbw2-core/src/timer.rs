// ── Debounce timer ──
//
// A cancellable one-shot timer backed by a spawned tokio task. At most one
// schedule is live at a time; scheduling again cancels the previous one.
// Every schedule gets a generation number so a callback that already woke
// up can tell whether it has been superseded before acting.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct DebounceTimer {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the future built by `f` after `delay`, replacing any pending
    /// schedule. `f` receives the generation of this schedule; pass it back
    /// to [`fire()`](Self::fire) from the callback.
    pub fn schedule<F, Fut>(&mut self, delay: Duration, f: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let task = f(generation);
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
        generation
    }

    /// Cancel the pending schedule, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Claim the timer from its own callback.
    ///
    /// Returns `false` if the schedule identified by `generation` was
    /// cancelled or replaced after its task woke up.
    pub fn fire(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        // Dropping the handle detaches rather than aborts the running task.
        self.handle = None;
        self.generation = self.generation.wrapping_add(1);
        true
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
