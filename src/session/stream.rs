//! Logical stream state and sequence bookkeeping.

use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::error::{Result, TunnelError};

/// Stream lifecycle state.
///
/// The registry stores whatever state it is given; legality of a
/// transition is decided by the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Open,
    Active,
    HalfClosed,
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamState::Open => "open",
            StreamState::Active => "active",
            StreamState::HalfClosed => "half_closed",
            StreamState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct StreamInner {
    state: StreamState,
    seq_num: u32,
    ack_num: u32,
    updated_at: Instant,
}

/// A multiplexed stream within a session.
#[derive(Debug)]
pub struct Stream {
    id: u32,
    created_at: Instant,
    inner: Mutex<StreamInner>,
}

impl Stream {
    /// Create a stream in `Open` with zeroed counters.
    pub fn new(id: u32) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            inner: Mutex::new(StreamInner {
                state: StreamState::Open,
                seq_num: 0,
                ack_num: 0,
                updated_at: now,
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn updated_at(&self) -> Instant {
        self.lock().updated_at
    }

    pub fn state(&self) -> StreamState {
        self.lock().state
    }

    pub fn set_state(&self, state: StreamState) {
        let mut inner = self.lock();
        if inner.state != state {
            tracing::trace!(stream_id = self.id, from = %inner.state, to = %state, "Stream state change");
        }
        inner.state = state;
        inner.updated_at = Instant::now();
    }

    pub fn is_closed(&self) -> bool {
        self.state() == StreamState::Closed
    }

    /// Fails with `StreamClosed` once the stream has been closed.
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TunnelError::StreamClosed);
        }
        Ok(())
    }

    /// Next sequence number that will be issued.
    pub fn seq_num(&self) -> u32 {
        self.lock().seq_num
    }

    /// Highest acknowledged sequence number seen.
    pub fn ack_num(&self) -> u32 {
        self.lock().ack_num
    }

    /// Issue the current sequence number and advance it.
    pub fn next_seq_num(&self) -> u32 {
        let mut inner = self.lock();
        let seq = inner.seq_num;
        inner.seq_num = seq.wrapping_add(1);
        inner.updated_at = Instant::now();
        seq
    }

    /// Raise the acknowledgment number. Stale or duplicate acks are ignored.
    ///
    /// Returns whether the value advanced.
    pub fn update_ack_num(&self, ack: u32) -> bool {
        let mut inner = self.lock();
        if ack <= inner.ack_num {
            return false;
        }
        inner.ack_num = ack;
        inner.updated_at = Instant::now();
        true
    }

    fn lock(&self) -> MutexGuard<'_, StreamInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
