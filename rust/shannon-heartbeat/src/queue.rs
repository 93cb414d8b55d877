//! Per-thread message serialization.
//!
//! One agent session processes a conversation thread at a time. The first
//! message for an idle thread claims it; messages arriving while the claim is
//! held are buffered and drained in arrival order by the claim holder.
//!
//! ```rust,ignore
//! if queue.try_claim(&root_id) {
//!     process(message).await;
//!     while let Some(next) = queue.dequeue(&root_id) {
//!         process(next).await;
//!     }
//!     // `None` released the claim.
//! } else {
//!     queue.enqueue(&root_id, message);
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;

use parking_lot::Mutex;

struct ThreadEntry<T> {
    claimed: bool,
    buffer: VecDeque<T>,
}

impl<T> Default for ThreadEntry<T> {
    fn default() -> Self {
        Self {
            claimed: false,
            buffer: VecDeque::new(),
        }
    }
}

/// Claim flag plus FIFO buffer per thread key.
pub struct ThreadMessageQueue<T> {
    threads: Mutex<HashMap<String, ThreadEntry<T>>>,
}

impl<T> fmt::Debug for ThreadMessageQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let threads = self.threads.lock();
        f.debug_struct("ThreadMessageQueue")
            .field("threads", &threads.len())
            .finish()
    }
}

impl<T> Default for ThreadMessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ThreadMessageQueue<T> {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
        }
    }

    /// Take exclusive ownership of `key` if nobody holds it.
    pub fn try_claim(&self, key: &str) -> bool {
        let mut threads = self.threads.lock();
        let entry = threads.entry(key.to_string()).or_default();
        if entry.claimed {
            return false;
        }
        entry.claimed = true;
        tracing::debug!(thread = key, "Claimed thread");
        true
    }

    /// Buffer `payload` for `key`, whatever the claim state.
    pub fn enqueue(&self, key: &str, payload: T) {
        let mut threads = self.threads.lock();
        let entry = threads.entry(key.to_string()).or_default();
        entry.buffer.push_back(payload);
        tracing::debug!(thread = key, pending = entry.buffer.len(), "Buffered message");
    }

    /// Pop the oldest buffered payload, or release the claim when empty.
    ///
    /// `None` is the end-of-work signal: the key is claimable again from the
    /// moment it is returned.
    pub fn dequeue(&self, key: &str) -> Option<T> {
        let mut threads = self.threads.lock();
        let entry = threads.get_mut(key)?;
        if let Some(payload) = entry.buffer.pop_front() {
            return Some(payload);
        }
        threads.remove(key);
        tracing::debug!(thread = key, "Thread drained, claim released");
        None
    }

    /// Clear the claim and drop anything buffered for `key`.
    pub fn release(&self, key: &str) {
        let mut threads = self.threads.lock();
        if let Some(entry) = threads.remove(key) {
            tracing::debug!(thread = key, dropped = entry.buffer.len(), "Released thread");
        }
    }

    pub fn is_claimed(&self, key: &str) -> bool {
        self.threads.lock().get(key).is_some_and(|entry| entry.claimed)
    }

    /// Number of buffered payloads for `key`.
    pub fn pending(&self, key: &str) -> usize {
        self.threads.lock().get(key).map_or(0, |entry| entry.buffer.len())
    }
}
