//! Delivery of async results
//!
//! Cache I/O runs on the tokio blocking pool; callbacks are handed to a
//! [`CompletionContext`] so they always run somewhere the caller chose,
//! never on the I/O threads.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error};

pub type CompletionTask = Box<dyn FnOnce() + Send + 'static>;

/// Where completion callbacks run
pub trait CompletionContext: Send + Sync {
    fn dispatch(&self, task: CompletionTask);
}

/// Runs callbacks one at a time on a dedicated thread.
///
/// A panicking callback is logged and does not stop later callbacks. The
/// thread exits once every handle to the context is dropped.
pub struct CompletionThread {
    sender: mpsc::Sender<CompletionTask>,
}

impl CompletionThread {
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<CompletionTask>();
        let name = name.into();

        thread::Builder::new().name(name.clone()).spawn(move || {
            for task in receiver {
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!(thread = %name, "Completion callback panicked");
                }
            }
            debug!(thread = %name, "Completion thread stopped");
        })?;

        Ok(Self { sender })
    }
}

impl CompletionContext for CompletionThread {
    fn dispatch(&self, task: CompletionTask) {
        if self.sender.send(task).is_err() {
            error!("Completion thread is gone, dropping callback");
        }
    }
}

/// Lets the caller drain callbacks on its own task or event loop
impl CompletionContext for UnboundedSender<CompletionTask> {
    fn dispatch(&self, task: CompletionTask) {
        if self.send(task).is_err() {
            debug!("Completion receiver closed, dropping callback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_completion_thread_runs_tasks_off_caller_thread() {
        let context = CompletionThread::spawn("test-completion").unwrap();
        let (tx, rx) = mpsc::channel();
        let caller = thread::current().id();

        context.dispatch(Box::new(move || {
            let name = thread::current().name().map(str::to_string);
            tx.send((thread::current().id(), name)).unwrap();
        }));

        let (id, name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(id, caller);
        assert_eq!(name.as_deref(), Some("test-completion"));
    }

    #[test]
    fn test_completion_thread_survives_panicking_callback() {
        let context = CompletionThread::spawn("test-completion-panic").unwrap();
        let (tx, rx) = mpsc::channel();

        context.dispatch(Box::new(|| panic!("callback failure")));
        context.dispatch(Box::new(move || tx.send("still running").unwrap()));

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            "still running"
        );
    }

    #[test]
    fn test_completion_thread_preserves_order() {
        let context = CompletionThread::spawn("test-completion-order").unwrap();
        let (tx, rx) = mpsc::channel();

        for i in 0..10 {
            let tx = tx.clone();
            context.dispatch(Box::new(move || tx.send(i).unwrap()));
        }

        let received: Vec<i32> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_channel_context_hands_tasks_to_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<CompletionTask>();
        let (result_tx, result_rx) = mpsc::channel();

        tx.dispatch(Box::new(move || result_tx.send(42).unwrap()));

        let task = rx.recv().await.unwrap();
        task();
        assert_eq!(result_rx.recv().unwrap(), 42);
    }
}
