//! Cancellable periodic task on a dedicated OS thread.
//!
//! Ticks are scheduled against absolute deadlines (start, start + P,
//! start + 2P, ...) so the rate does not drift with tick duration. The
//! first tick runs immediately. The thread sleeps on a crossbeam stop
//! channel, which makes `stop()` wake it at once instead of waiting for
//! the next deadline.

use crate::graph::error::{GraphError, GraphResult};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// Information handed to the tick callback.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// Zero-based tick number.
    pub index: u64,
    /// Wall time since the previous tick started (the period for the first tick).
    pub measured: Duration,
    /// Configured period.
    pub period: Duration,
    /// When the tick was due.
    pub deadline: Instant,
}

/// How the thread waits between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Sleep until the next deadline.
    Paced,
    /// Run ticks back to back, only checking for stop requests.
    Free,
}

/// A running periodic thread.
pub struct PeriodicTask {
    name: String,
    stop_tx: Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
}

impl PeriodicTask {
    /// Spawn the thread and start ticking.
    ///
    /// The callback returns `ControlFlow::Break` to end the loop on its own.
    pub fn spawn<F>(name: &str, period: Duration, pacing: Pacing, mut tick: F) -> GraphResult<Self>
    where
        F: FnMut(Tick) -> ControlFlow<()> + Send + 'static,
    {
        if period.is_zero() && pacing == Pacing::Paced {
            return Err(GraphError::InvalidParameter(format!(
                "period of '{}' must be greater than zero",
                name
            )));
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));

        let thread_running = running.clone();
        let thread_ticks = ticks.clone();
        let handle = thread::Builder::new()
            .name(format!("fieldnet-{}", name))
            .spawn(move || {
                run_loop(period, pacing, &stop_rx, &thread_ticks, &mut tick);
                thread_running.store(false, Ordering::Release);
            })
            .map_err(|e| {
                GraphError::ThreadLifecycle(format!("failed to spawn thread for '{}': {}", name, e))
            })?;

        Ok(Self {
            name: name.to_string(),
            stop_tx,
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
            running,
            ticks,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the loop thread is still ticking.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Whether the caller is running on this task's own thread.
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Request shutdown and wait for the thread to finish.
    ///
    /// Returns only once the thread has exited, so no tick is in flight
    /// afterwards. Missing `timeout` is an error: the thread is left
    /// detached and teardown can't be guaranteed. Stopping an already
    /// stopped task is a no-op.
    pub fn stop(&self, timeout: Duration) -> GraphResult<()> {
        if self.is_current_thread() {
            return Err(GraphError::ThreadLifecycle(format!(
                "'{}' cannot be stopped from its own thread",
                self.name
            )));
        }
        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };

        // Full means a stop request is already queued.
        let _ = self.stop_tx.try_send(());

        // JoinHandle has no timed join; join on a helper thread and wait for
        // its report instead.
        let (done_tx, done_rx) = bounded(1);
        thread::Builder::new()
            .name(format!("fieldnet-{}-join", self.name))
            .spawn(move || {
                let _ = done_tx.send(handle.join().is_ok());
            })
            .map_err(|e| {
                GraphError::ThreadLifecycle(format!("failed to join '{}': {}", self.name, e))
            })?;

        match done_rx.recv_timeout(timeout) {
            Ok(true) => Ok(()),
            Ok(false) => Err(GraphError::ThreadLifecycle(format!(
                "thread of '{}' panicked",
                self.name
            ))),
            Err(RecvTimeoutError::Timeout) => Err(GraphError::ThreadLifecycle(format!(
                "'{}' did not stop within {:?}",
                self.name, timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(GraphError::ThreadLifecycle(format!(
                "join helper for '{}' disconnected",
                self.name
            ))),
        }
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .finish()
    }
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}

fn run_loop<F>(
    period: Duration,
    pacing: Pacing,
    stop_rx: &Receiver<()>,
    ticks: &AtomicU64,
    tick: &mut F,
) where
    F: FnMut(Tick) -> ControlFlow<()>,
{
    let mut deadline = Instant::now();
    let mut previous: Option<Instant> = None;
    let mut index = 0u64;

    loop {
        match pacing {
            Pacing::Paced => match stop_rx.recv_deadline(deadline) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            },
            Pacing::Free => {
                if stop_requested(stop_rx) {
                    break;
                }
            }
        }

        let started = Instant::now();
        let measured = previous.map_or(period, |p| started.duration_since(p));
        previous = Some(started);

        let flow = tick(Tick {
            index,
            measured,
            period,
            deadline,
        });
        index += 1;
        ticks.store(index, Ordering::Release);
        if flow.is_break() {
            break;
        }

        deadline = next_deadline(deadline, period, Instant::now());
    }
}

/// First slot after `previous` that is not already in the past.
fn next_deadline(previous: Instant, period: Duration, now: Instant) -> Instant {
    let next = previous + period;
    if next >= now || period.is_zero() {
        return next;
    }
    // Overran: skip the missed slots rather than bursting to catch up.
    let behind = now.duration_since(next).as_nanos();
    let phase = behind % period.as_nanos();
    now + period - Duration::from_nanos(u64::try_from(phase).unwrap_or(u64::MAX))
}
