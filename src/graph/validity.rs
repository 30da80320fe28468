//! Slot validity state machine.
//!
//! Validity is an explicit four-state machine driven by the outcome of the
//! owning step's compute. The transition table below is the only place that
//! decides the next state, so it can be tested without running a network.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Classification of a slot's current content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Validity {
    #[default]
    Unknown = 0,
    Valid = 1,
    Warning = 2,
    Error = 3,
}

impl Validity {
    const ALL: [Validity; 4] = [
        Validity::Unknown,
        Validity::Valid,
        Validity::Warning,
        Validity::Error,
    ];

    fn from_u8(raw: u8) -> Self {
        Self::ALL.get(raw as usize).copied().unwrap_or(Validity::Error)
    }

    /// Severity rank used when aggregating several slots: Error > Warning > Unknown > Valid.
    fn severity(self) -> u8 {
        match self {
            Validity::Valid => 0,
            Validity::Unknown => 1,
            Validity::Warning => 2,
            Validity::Error => 3,
        }
    }

    /// The more severe of two states.
    pub fn worst(self, other: Validity) -> Validity {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Aggregate an iterator of states; an empty iterator is `Valid`.
    pub fn worst_of(states: impl IntoIterator<Item = Validity>) -> Validity {
        states.into_iter().fold(Validity::Valid, Validity::worst)
    }

    pub fn is_error(self) -> bool {
        self == Validity::Error
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validity::Unknown => write!(f, "unknown"),
            Validity::Valid => write!(f, "valid"),
            Validity::Warning => write!(f, "warning"),
            Validity::Error => write!(f, "error"),
        }
    }
}

/// Events that move a slot through the validity machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValidityEvent {
    /// Compute finished cleanly.
    Computed = 0,
    /// Compute finished but reported a warning.
    ComputedWithWarning = 1,
    /// Compute returned an error or panicked.
    ComputeFailed = 2,
    /// Mandatory inputs were missing or in error, compute was skipped.
    InputsInvalid = 3,
    /// Step was reset or the slot's data was replaced.
    Reset = 4,
}

use Validity::{Error as E, Unknown as U, Valid as V, Warning as W};

/// `TRANSITIONS[state][event]`.
const TRANSITIONS: [[Validity; 5]; 4] = [
    //            Computed  Warned  Failed  InputsInvalid  Reset
    /* Unknown */ [V, W, E, E, U],
    /* Valid   */ [V, W, E, E, U],
    /* Warning */ [V, W, E, E, U],
    /* Error   */ [V, W, E, E, U],
];

/// Next state for `state` under `event`.
pub fn transition(state: Validity, event: ValidityEvent) -> Validity {
    TRANSITIONS[state as usize][event as usize]
}

/// Lock-free cell holding a [`Validity`], shared between the writing step
/// and any number of observers.
#[derive(Debug, Default)]
pub struct AtomicValidity(AtomicU8);

impl AtomicValidity {
    pub fn new(state: Validity) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> Validity {
        Validity::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: Validity) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Apply `event` and return `(previous, next)`.
    pub fn apply(&self, event: ValidityEvent) -> (Validity, Validity) {
        let mut previous = self.load();
        loop {
            let next = transition(previous, event);
            match self.0.compare_exchange_weak(
                previous as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return (previous, next),
                Err(actual) => previous = Validity::from_u8(actual),
            }
        }
    }
}
