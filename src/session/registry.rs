//! Session registry: a session and the streams it owns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{Result, TunnelError};
use crate::observability::metrics;
use crate::session::stream::{Stream, StreamState};

/// A logical tunnel session.
///
/// The stream map and the session clock are locked separately from each
/// stream's own fields, so work on different streams does not contend.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    created_at: Instant,
    updated_at: Mutex<Instant>,
    max_streams: Option<usize>,
    streams: RwLock<HashMap<u32, Arc<Stream>>>,
}

impl Session {
    /// Create a session with a fresh random id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            updated_at: Mutex::new(now),
            max_streams: None,
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Bound the number of streams `open_stream` will create.
    pub fn with_max_streams(mut self, max_streams: usize) -> Self {
        self.max_streams = Some(max_streams);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn updated_at(&self) -> Instant {
        *self.updated_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset the idle clock.
    pub fn touch(&self) {
        *self.updated_at.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time since the last touch or stream access.
    pub fn idle_for(&self) -> Duration {
        self.updated_at().elapsed()
    }

    /// True once the session has been idle for longer than `timeout`.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }

    /// Get stream `id`, creating it in `Open` if absent.
    pub fn get_stream(&self, id: u32) -> Arc<Stream> {
        self.touch();
        if let Some(stream) = self.read().get(&id) {
            return stream.clone();
        }

        self.write()
            .entry(id)
            .or_insert_with(|| {
                tracing::trace!(session_id = %self.id, stream_id = id, "Stream created");
                metrics::record_stream_delta(1);
                Arc::new(Stream::new(id))
            })
            .clone()
    }

    /// Like [`get_stream`](Self::get_stream), but refuses to create a stream
    /// past the session's limit.
    pub fn open_stream(&self, id: u32) -> Result<Arc<Stream>> {
        self.touch();
        if let Some(stream) = self.read().get(&id) {
            return Ok(stream.clone());
        }

        let mut streams = self.write();
        if let Some(stream) = streams.get(&id) {
            return Ok(stream.clone());
        }
        if let Some(max) = self.max_streams {
            if streams.len() >= max {
                tracing::debug!(session_id = %self.id, max_streams = max, "Stream limit reached");
                return Err(TunnelError::MaxStreamsReached(max));
            }
        }

        let stream = Arc::new(Stream::new(id));
        streams.insert(id, stream.clone());
        metrics::record_stream_delta(1);
        Ok(stream)
    }

    /// Look up stream `id` without creating it.
    pub fn get_existing_stream(&self, id: u32) -> Option<Arc<Stream>> {
        self.touch();
        self.read().get(&id).cloned()
    }

    /// Look up stream `id`, failing with `StreamNotFound`.
    pub fn existing_stream(&self, id: u32) -> Result<Arc<Stream>> {
        self.get_existing_stream(id).ok_or(TunnelError::StreamNotFound(id))
    }

    /// Forget stream `id`. A later `get_stream` starts from zero.
    pub fn remove_stream(&self, id: u32) -> Option<Arc<Stream>> {
        self.touch();
        let removed = self.write().remove(&id);
        if removed.is_some() {
            metrics::record_stream_delta(-1);
        }
        removed
    }

    pub fn stream_count(&self) -> usize {
        self.read().len()
    }

    pub fn stream_ids(&self) -> Vec<u32> {
        self.read().keys().copied().collect()
    }

    /// Mark every stream closed and drop them from the session.
    pub fn close_all_streams(&self) -> usize {
        let drained: Vec<Arc<Stream>> = self.write().drain().map(|(_, s)| s).collect();
        for stream in &drained {
            stream.set_state(StreamState::Closed);
        }
        if !drained.is_empty() {
            metrics::record_stream_delta(-(drained.len() as isize));
        }
        drained.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<u32, Arc<Stream>>> {
        self.streams.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<u32, Arc<Stream>>> {
        self.streams.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let remaining = self.streams.get_mut().map_or(0, |streams| streams.len());
        if remaining > 0 {
            metrics::record_stream_delta(-(remaining as isize));
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
