//! Transient status messages
//!
//! Every action outcome and background failure is reported here exactly
//! once. Messages expire on their own; presentation either polls
//! [`Notifier::active`] or follows [`Notifier::subscribe`].

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Oldest messages are evicted past this many
pub const QUEUE_CAPACITY: usize = 32;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Configuration problems stay up longer
pub const CONFIG_ERROR_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Level::Info => "info",
            Level::Success => "success",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub level: Level,
    pub text: String,
    pub expires_at: Instant,
}

impl Notification {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Queue {
    next_id: u64,
    items: VecDeque<Notification>,
}

pub struct Notifier {
    ttl: Duration,
    queue: Mutex<Queue>,
    feed: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl Notifier {
    pub fn new(ttl: Duration) -> Self {
        let (feed, _) = broadcast::channel(QUEUE_CAPACITY);
        Self {
            ttl,
            queue: Mutex::new(Queue {
                next_id: 1,
                items: VecDeque::with_capacity(QUEUE_CAPACITY),
            }),
            feed,
        }
    }

    pub fn push(&self, level: Level, text: impl Into<String>) -> Notification {
        self.push_for(level, text, self.ttl)
    }

    pub fn push_for(&self, level: Level, text: impl Into<String>, ttl: Duration) -> Notification {
        let notification = {
            let mut queue = self.queue.lock();
            let notification = Notification {
                id: queue.next_id,
                level,
                text: text.into(),
                expires_at: Instant::now() + ttl,
            };
            queue.next_id += 1;
            if queue.items.len() == QUEUE_CAPACITY {
                queue.items.pop_front();
            }
            queue.items.push_back(notification.clone());
            notification
        };

        match level {
            Level::Error => log::error!("❌ {}", notification.text),
            Level::Warning => log::warn!("⚠️ {}", notification.text),
            Level::Success => log::info!("✅ {}", notification.text),
            Level::Info => log::info!("ℹ️ {}", notification.text),
        }
        // nobody listening is fine
        let _ = self.feed.send(notification.clone());
        notification
    }

    pub fn info(&self, text: impl Into<String>) -> Notification {
        self.push(Level::Info, text)
    }

    pub fn success(&self, text: impl Into<String>) -> Notification {
        self.push(Level::Success, text)
    }

    pub fn warning(&self, text: impl Into<String>) -> Notification {
        self.push(Level::Warning, text)
    }

    pub fn error(&self, text: impl Into<String>) -> Notification {
        self.push(Level::Error, text)
    }

    /// Unexpired messages, oldest first
    pub fn active(&self) -> Vec<Notification> {
        let now = Instant::now();
        let mut queue = self.queue.lock();
        queue.items.retain(|n| !n.is_expired(now));
        queue.items.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.queue.lock().items.clear();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.feed.subscribe()
    }
}
