//! Live SSE stream registry.
//!
//! A GET on the endpoint opens a [`LiveStream`]: a queue the dispatcher
//! feeds from `push_event` and the engine drains through the response's
//! pull callback. Terminating a session closes its streams, which the pull
//! callback turns into a terminal chunk.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug)]
pub(crate) struct LiveStream {
    pub id: u64,
    pub queue: Mutex<VecDeque<String>>,
    pub closed: AtomicBool,
}

impl LiveStream {
    pub(crate) fn pop(&self) -> Option<String> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// session id -> open streams.
#[derive(Debug, Default)]
pub(crate) struct StreamRegistry {
    streams: Mutex<HashMap<String, Vec<Arc<LiveStream>>>>,
    next_id: AtomicU64,
}

impl StreamRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn open(&self, session_id: &str) -> Arc<LiveStream> {
        let stream = Arc::new(LiveStream {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            queue: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        });
        self.streams
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push(Arc::clone(&stream));
        debug!(session_id, stream = stream.id, "live stream opened");
        stream
    }

    /// Feed a formatted event to every open stream of a session.
    pub(crate) fn push(&self, session_id: &str, payload: &str) {
        let streams = self.streams.lock();
        if let Some(list) = streams.get(session_id) {
            for stream in list {
                stream.queue.lock().push_back(payload.to_string());
            }
        }
    }

    /// Close and forget every stream of a session.
    pub(crate) fn close_session(&self, session_id: &str) {
        if let Some(list) = self.streams.lock().remove(session_id) {
            for stream in &list {
                stream.closed.store(true, Ordering::Release);
            }
            debug!(session_id, count = list.len(), "live streams closed");
        }
    }

    /// Forget one stream (its connection ended).
    pub(crate) fn remove(&self, session_id: &str, stream_id: u64) {
        let mut streams = self.streams.lock();
        if let Some(list) = streams.get_mut(session_id) {
            list.retain(|s| s.id != stream_id);
            if list.is_empty() {
                streams.remove(session_id);
            }
        }
    }

    pub(crate) fn stream_count(&self, session_id: &str) -> usize {
        self.streams
            .lock()
            .get(session_id)
            .map_or(0, |list| list.len())
    }
}
