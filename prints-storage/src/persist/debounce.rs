//! Leading and trailing debounce with a maximum wait.
//!
//! The first call of a burst runs immediately. Later calls within `wait`
//! of each other collapse into one trailing run with the latest payload,
//! and a continuous burst still runs at least once every `max_wait`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

type Action<T> = Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

enum Command<T> {
    Call(T),
    Flush(oneshot::Sender<()>),
    Cancel,
}

/// Handle to a debounce task. Dropping every handle flushes the pending
/// payload and stops the task.
pub struct Debouncer<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawn the debounce task on the current runtime.
    pub fn spawn<F, Fut>(wait: Duration, max_wait: Duration, action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: Action<T> = Arc::new(
            move |payload| -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(action(payload)) },
        );
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(rx, wait, max_wait.max(wait), action));
        Self { commands, task }
    }

    /// Schedule `payload`.
    pub fn call(&self, payload: T) {
        if self.commands.send(Command::Call(payload)).is_err() {
            debug!("Debounce task stopped, dropping call");
        }
    }

    /// Run the pending payload now, if any, and wait for it to finish.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Drop the pending payload.
    pub fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel);
    }

    /// Stop the task after flushing the pending payload.
    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.task.await;
    }
}

struct Burst<T> {
    pending: Option<T>,
    /// Trailing edge: `wait` after the latest call.
    deadline: Instant,
    /// Forced run: `max_wait` after the last run.
    max_deadline: Instant,
}

async fn run<T: Send + 'static>(
    mut rx: mpsc::UnboundedReceiver<Command<T>>,
    wait: Duration,
    max_wait: Duration,
    action: Action<T>,
) {
    let mut burst: Option<Burst<T>> = None;

    loop {
        let next_wake = burst
            .as_ref()
            .map(|b| b.deadline.min(b.max_deadline));

        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Call(payload)) => {
                    let now = Instant::now();
                    match burst.as_mut() {
                        None => {
                            action(payload).await;
                            burst = Some(Burst {
                                pending: None,
                                deadline: now + wait,
                                max_deadline: now + max_wait,
                            });
                        }
                        Some(active) => {
                            active.pending = Some(payload);
                            active.deadline = now + wait;
                        }
                    }
                }
                Some(Command::Flush(done)) => {
                    if let Some(payload) = burst.take().and_then(|b| b.pending) {
                        action(payload).await;
                    }
                    let _ = done.send(());
                }
                Some(Command::Cancel) => {
                    burst = None;
                }
                None => {
                    if let Some(payload) = burst.take().and_then(|b| b.pending) {
                        action(payload).await;
                    }
                    break;
                }
            },
            _ = sleep_until(next_wake.unwrap_or_else(Instant::now)), if next_wake.is_some() => {
                let now = Instant::now();
                if let Some(mut active) = burst.take() {
                    if let Some(payload) = active.pending.take() {
                        action(payload).await;
                    }
                    if now < active.deadline {
                        // Forced by max wait while calls keep arriving.
                        active.max_deadline = now + max_wait;
                        burst = Some(active);
                    }
                }
            }
        }
    }
}
