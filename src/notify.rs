//! User-facing error toasts. The API gateway pushes one for every failed
//! call; the page polls for whatever is still visible.

use super::config;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

#[derive(Clone, Debug)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    /// Whatever the failing call had to say, pretty-printed for the "View
    /// Details" disclosure.
    pub details: String,
    created_at: Instant,
}

pub struct Notifications {
    ttl: Duration,
    max_visible: usize,
    next_id: AtomicU64,
    queue: Mutex<VecDeque<Notification>>,
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new(config::NOTIFICATION_TTL, config::NOTIFICATION_MAX_VISIBLE)
    }
}

impl Notifications {
    pub fn new(ttl: Duration, max_visible: usize) -> Self {
        Self {
            ttl,
            max_visible,
            next_id: AtomicU64::new(1),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, message: impl Into<String>, details: impl Into<String>) {
        let notification = Notification {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            message: message.into(),
            details: details.into(),
            created_at: Instant::now(),
        };
        let mut queue = self.lock();
        queue.push_back(notification);
        while queue.len() > self.max_visible {
            queue.pop_front();
        }
    }

    /// Notifications that have not timed out yet, oldest first. Expired
    /// ones are dropped as a side effect.
    pub fn visible(&self) -> Vec<Notification> {
        let ttl = self.ttl;
        let mut queue = self.lock();
        queue.retain(|n| n.created_at.elapsed() < ttl);
        queue.iter().cloned().collect()
    }

    pub fn dismiss(&self, id: u64) {
        self.lock().retain(|n| n.id != id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Notification>> {
        // A panic while holding this lock can't leave the queue in a bad
        // state, so poisoning is ignored.
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}
