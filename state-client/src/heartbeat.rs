//! Client heartbeat loop.
//!
//! Sends a liveness probe, waits for its pong, sleeps, repeats. Every
//! `start()` mints a new generation token; a loop only keeps going while the
//! token it captured is still current, so restarting or stopping never leaves
//! two loops probing at once.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::ClientError;

/// Cancellable heartbeat task.
#[derive(Debug)]
pub struct Heartbeat {
    generation: watch::Sender<u64>,
    delay: watch::Sender<Option<Duration>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Heartbeat {
    /// Create a stopped heartbeat with the given probe delay.
    pub fn new(delay: Option<Duration>) -> Self {
        Self {
            generation: watch::channel(0).0,
            delay: watch::channel(delay).0,
            task: Mutex::new(None),
        }
    }

    /// Start (or restart) the loop.
    ///
    /// `probe` performs one round trip and returns its latency. A failed
    /// probe ends the loop.
    pub fn start<F, Fut>(&self, probe: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Duration, ClientError>> + Send + 'static,
    {
        let token = self.mint();
        let generation = self.generation.subscribe();
        let delay = self.delay.subscribe();
        let handle = tokio::spawn(run(token, generation, delay, probe));

        if let Some(previous) = self.lock_task().replace(handle) {
            previous.abort();
        }
    }

    /// Invalidate the running loop and hand back its task.
    ///
    /// The loop exits at its next check; await the handle to be sure no
    /// probe is in flight.
    pub fn cancel(&self) -> Option<JoinHandle<()>> {
        self.mint();
        self.lock_task().take()
    }

    /// Invalidate the running loop and wait for it to finish.
    pub async fn stop(&self) {
        if let Some(handle) = self.cancel() {
            let _ = handle.await;
        }
    }

    /// Change the probe delay. `None` pauses probing until a delay is set.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.delay.send_replace(delay);
    }

    /// Current probe delay.
    pub fn delay(&self) -> Option<Duration> {
        *self.delay.borrow()
    }

    /// Check if a loop task is alive.
    pub fn is_running(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn mint(&self) -> u64 {
        self.generation.send_modify(|generation| *generation += 1);
        *self.generation.borrow()
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_task().take() {
            handle.abort();
        }
    }
}

async fn run<F, Fut>(
    token: u64,
    mut generation: watch::Receiver<u64>,
    mut delay: watch::Receiver<Option<Duration>>,
    mut probe: F,
) where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<Duration, ClientError>> + Send,
{
    tracing::debug!("Heartbeat {} started", token);

    while *generation.borrow() == token {
        let current = *delay.borrow_and_update();
        let Some(pause) = current else {
            // Paused
            tokio::select! {
                changed = delay.changed() => if changed.is_err() { break },
                changed = generation.changed() => if changed.is_err() { break },
            }
            continue;
        };

        match probe().await {
            Ok(rtt) => tracing::trace!("Heartbeat {} round trip {:?}", token, rtt),
            Err(e) => {
                tracing::debug!("Heartbeat {} probe failed: {}", token, e);
                break;
            }
        }

        if *generation.borrow() != token {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            changed = generation.changed() => if changed.is_err() { break },
        }
    }

    tracing::debug!("Heartbeat {} stopped", token);
}
