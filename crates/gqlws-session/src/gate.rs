//! One-shot handshake latch.
//!
//! The inbound `connection_init` path and the timeout watchdog race on the
//! same atomic. Each side flips the latch out of [`GateState::Pending`] with a
//! single compare-exchange, so exactly one of them wins.

use std::sync::atomic::{AtomicU8, Ordering};

/// Handshake progress. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum GateState {
    /// No `connection_init` yet.
    Pending = 0,
    /// `connection_init` accepted; the init hook is running.
    Initializing = 1,
    /// `connection_ack` sent.
    Acknowledged = 2,
    /// The timeout fired before any `connection_init`.
    TimedOut = 3,
}

impl GateState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Initializing,
            2 => Self::Acknowledged,
            _ => Self::TimedOut,
        }
    }
}

/// Atomic one-way latch guarding the handshake.
#[derive(Debug)]
pub struct InitGate {
    state: AtomicU8,
}

impl InitGate {
    /// A gate in [`GateState::Pending`].
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(GateState::Pending as u8),
        }
    }

    fn transition(&self, from: GateState, to: GateState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Pending → Initializing. Returns whether this call flipped the latch.
    ///
    /// A `false` return means a previous init (or the timeout) already won.
    pub fn try_begin(&self) -> bool {
        self.transition(GateState::Pending, GateState::Initializing)
    }

    /// Initializing → Acknowledged. Returns `false` if the gate was not
    /// initializing.
    pub fn acknowledge(&self) -> bool {
        self.transition(GateState::Initializing, GateState::Acknowledged)
    }

    /// Pending → TimedOut. Returns whether this call flipped the latch.
    pub fn try_expire(&self) -> bool {
        self.transition(GateState::Pending, GateState::TimedOut)
    }

    /// Current state.
    pub fn state(&self) -> GateState {
        GateState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether `connection_ack` has been sent.
    pub fn is_acknowledged(&self) -> bool {
        self.state() == GateState::Acknowledged
    }
}

impl Default for InitGate {
    fn default() -> Self {
        Self::new()
    }
}
