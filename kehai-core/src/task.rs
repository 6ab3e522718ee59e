use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handle for a long-lived background loop (scheduler, reorder task).
///
/// Lifecycle contract:
/// - Prefer calling [`stop`](TaskHandle::stop) to request a graceful shutdown and await completion.
/// - Call [`abort`](TaskHandle::abort) for immediate, non-graceful termination.
/// - If dropped without an explicit shutdown, a best-effort stop signal is sent
///   and the underlying task is then aborted. The task may not observe the
///   stop signal before abort.
#[derive(Debug)]
pub struct TaskHandle {
    inner: Option<JoinHandle<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl TaskHandle {
    /// Create a new `TaskHandle`.
    ///
    /// Parameters:
    /// - `inner`: the spawned task driving the loop.
    /// - `stop_tx`: a one-shot used to request a graceful stop.
    #[must_use]
    pub const fn new(inner: JoinHandle<()>, stop_tx: oneshot::Sender<()>) -> Self {
        Self {
            inner: Some(inner),
            stop_tx: Some(stop_tx),
        }
    }

    /// Gracefully stop the underlying task and await its completion.
    ///
    /// Sends the stop signal if still available, then awaits the task. Any
    /// errors from the task are ignored.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(inner) = self.inner.take() {
            let _ = inner.await;
        }
    }

    /// Force-abort the underlying task without waiting for completion.
    ///
    /// Prefer [`stop`](Self::stop) when possible to allow a clean tick finish.
    pub fn abort(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.abort();
        }
    }

    /// Whether the underlying task has completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(h) = self.inner.take()
            && !h.is_finished()
        {
            h.abort();
        }
    }
}
