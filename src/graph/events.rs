//! Notifications for external observers.
//!
//! Editors, plotters and loggers watch the network through [`NetworkEvent`]s
//! delivered over bounded crossbeam channels or through
//! [`NetworkObserver`] callbacks. Delivery never blocks the scheduler: a
//! full channel drops the event and a disconnected one is pruned.

use crate::graph::id::ElementId;
use crate::graph::slot::DataRole;
use crate::graph::step::StepState;
use crate::graph::validity::Validity;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Events emitted by the network.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    /// A slot's validity moved to a new state.
    ValidityChanged {
        element: ElementId,
        role: DataRole,
        slot: String,
        from: Validity,
        to: Validity,
    },

    /// A step settled in a different state than before.
    StepStateChanged {
        element: ElementId,
        from: StepState,
        to: StepState,
    },

    /// A step's compute returned an error or panicked.
    ComputeFailed {
        element: ElementId,
        step: String,
        message: String,
    },

    /// A step was reached again by a feedback edge and will run next wave.
    StepDeferred { element: ElementId, origin: ElementId },

    WaveStarted { origin: ElementId, wave: u64 },

    WaveFinished {
        origin: ElementId,
        wave: u64,
        computed: usize,
        duration: Duration,
    },

    LoopStarted { element: ElementId, period: Duration },

    LoopStopped { element: ElementId, ticks: u64 },
}

/// Callback interface for in-process observers.
pub trait NetworkObserver: Send + Sync {
    fn on_event(&self, event: &NetworkEvent);
}

/// Fan-out of network events to channel subscribers and observers.
pub struct EventBus {
    capacity: usize,
    subscribers: Mutex<Vec<Sender<NetworkEvent>>>,
    observers: Mutex<Vec<Arc<dyn NetworkObserver>>>,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Open a new bounded subscription.
    pub fn subscribe(&self) -> Receiver<NetworkEvent> {
        let (tx, rx) = bounded(self.capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn add_observer(&self, observer: Arc<dyn NetworkObserver>) {
        self.observers.lock().push(observer);
    }

    /// Whether anyone is listening; lets hot paths skip building events.
    pub fn is_observed(&self) -> bool {
        !self.subscribers.lock().is_empty() || !self.observers.lock().is_empty()
    }

    /// Number of events dropped because a subscriber was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn emit(&self, event: NetworkEvent) {
        let observers = self.observers.lock().clone();
        for observer in &observers {
            if catch_unwind(AssertUnwindSafe(|| observer.on_event(&event))).is_err() {
                tracing::error!("Observer panicked while handling {:?}", event);
            }
        }

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Event subscriber full, dropping {:?}", event);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
