//! # Structural Event Feed
//!
//! Creation/deletion notifications for published instances.
//!
//! Two delivery modes:
//! - **Immediate**: each event is delivered as it is emitted
//! - **Buffered**: events are held for a window (default: 5 s) and delivered
//!   together, in emission order, at the end of each window
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Namespace ──emit()──► ┌───────────────┐                                │
//! │  (publish/revoke)      │  Feed pump    │    ┌──────────────────────┐    │
//! │                        │  (own task)   │───►│ subscriber (filter)  │    │
//! │                        │               │    │ unbounded channel    │    │
//! │                        │  pending: Vec │───►│ subscriber (filter)  │    │
//! │                        └───────────────┘    └──────────────────────┘    │
//! │                                                                         │
//! │  Consumers subscribe once, then enumerate existing instances: events    │
//! │  for instances created before the subscription are not replayed.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info};

use crate::schema::EntityKind;

// =============================================================================
// Constants
// =============================================================================

/// Default buffering window in milliseconds.
pub const DEFAULT_FEED_WINDOW_MS: u64 = 5_000;

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceEventKind {
    Created,
    Deleted,
}

/// One structural notification.
///
/// Identifier and parent travel as plain strings; the parent is empty for
/// top-level hardware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEvent {
    pub kind: InstanceEventKind,
    pub class: EntityKind,
    pub identifier: String,
    pub parent: String,
}

// =============================================================================
// Feed Mode
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    /// Deliver each event as it is emitted.
    Immediate,

    /// Hold events for a window, then deliver them together.
    /// Default mode.
    #[default]
    Buffered,
}

impl std::fmt::Display for FeedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedMode::Immediate => write!(f, "immediate"),
            FeedMode::Buffered => write!(f, "buffered"),
        }
    }
}

impl std::str::FromStr for FeedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(FeedMode::Immediate),
            "buffered" => Ok(FeedMode::Buffered),
            other => Err(format!("unknown feed mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub mode: FeedMode,
    /// Buffering window (only used in Buffered mode).
    pub window: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            mode: FeedMode::Buffered,
            window: Duration::from_millis(DEFAULT_FEED_WINDOW_MS),
        }
    }
}

impl FeedConfig {
    pub fn immediate() -> Self {
        FeedConfig {
            mode: FeedMode::Immediate,
            window: Duration::ZERO,
        }
    }

    pub fn buffered(window_ms: u64) -> Self {
        FeedConfig {
            mode: FeedMode::Buffered,
            window: Duration::from_millis(window_ms),
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

struct Subscriber {
    classes: Vec<EntityKind>,
    tx: mpsc::UnboundedSender<InstanceEvent>,
}

/// Receiving end of a feed subscription.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<InstanceEvent>,
}

impl Subscription {
    /// Next event, or `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<InstanceEvent> {
        self.rx.recv().await
    }

    /// Next already-delivered event, if any.
    pub fn try_recv(&mut self) -> Option<InstanceEvent> {
        self.rx.try_recv().ok()
    }
}

// =============================================================================
// Event Feed
// =============================================================================

enum FeedCommand {
    Emit(InstanceEvent),
    Flush,
}

/// Handle to a running feed. Clones share the same pump.
#[derive(Clone)]
pub struct EventFeed {
    cmd_tx: mpsc::UnboundedSender<FeedCommand>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventFeed {
    /// Spawns the feed pump. Must be called inside a Tokio runtime.
    ///
    /// The pump delivers what is pending and exits once every handle is
    /// dropped.
    pub fn start(config: FeedConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let subscribers = Arc::new(Mutex::new(Vec::new()));

        let pump = FeedPump {
            config,
            subscribers: Arc::clone(&subscribers),
            pending: Vec::new(),
        };
        tokio::spawn(async move {
            pump.run(cmd_rx).await;
        });

        EventFeed {
            cmd_tx,
            subscribers,
        }
    }

    /// Queues an event for delivery.
    pub fn emit(&self, event: InstanceEvent) {
        if self.cmd_tx.send(FeedCommand::Emit(event)).is_err() {
            debug!("Event feed pump gone; event dropped");
        }
    }

    /// Delivers pending events now instead of at the end of the window.
    pub fn flush(&self) {
        let _ = self.cmd_tx.send(FeedCommand::Flush);
    }

    /// Subscribes to events of the given classes.
    pub fn subscribe(&self, classes: &[EntityKind]) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                classes: classes.to_vec(),
                tx,
            });
        Subscription { rx }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }
}

struct FeedPump {
    config: FeedConfig,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    pending: Vec<InstanceEvent>,
}

impl FeedPump {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<FeedCommand>) {
        info!(mode = %self.config.mode, window_ms = self.config.window.as_millis() as u64, "Event feed started");

        let buffered = self.config.mode == FeedMode::Buffered;
        let mut window = interval(self.config.window.max(Duration::from_millis(1)));

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(FeedCommand::Emit(event)) => {
                        self.pending.push(event);
                        if !buffered {
                            self.deliver();
                        }
                    }
                    Some(FeedCommand::Flush) => self.deliver(),
                    None => {
                        self.deliver();
                        break;
                    }
                },
                _ = window.tick(), if buffered => {
                    self.deliver();
                }
            }
        }

        info!("Event feed stopped");
    }

    /// Hands every pending event to matching subscribers and prunes closed
    /// ones.
    fn deliver(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.pending);
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);

        subscribers.retain(|subscriber| {
            for event in events.iter().filter(|e| subscriber.classes.contains(&e.class)) {
                if subscriber.tx.send(event.clone()).is_err() {
                    return false;
                }
            }
            true
        });
        debug!(events = events.len(), subscribers = subscribers.len(), "Feed window delivered");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
