//! # Monitor Agent
//!
//! Engine-side owning context: one task owns the [`HardwareTree`] and its
//! [`PublishMirror`], so tree mutation and publication never interleave.
//!
//! ## Command Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  MonitorHandle ──command──► ┌────────────────────────────────────┐      │
//! │  (engine callbacks,         │  agent task                        │      │
//! │   host rescans, UI)         │                                    │      │
//! │                             │  1. apply command to HardwareTree  │      │
//! │  interval ──tick──────────► │  2. drain tree outbox              │      │
//! │  (update_interval)          │  3. PublishMirror::apply per event │      │
//! │                             │  4. broadcast TreeNotice           │      │
//! │                             └────────────────────────────────────┘      │
//! │                                                                         │
//! │  Close: tree.close() ─► drained into the mirror ─► dispose()           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use hwmirror_core::{HardwareCategory, Identifier};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{MirrorError, MirrorResult};
use crate::publish::{InstanceRegistry, PublishMirror};
use crate::tree::{HardwareTree, TreeEvent, TreeEventKind};

const NOTICE_CAPACITY: usize = 256;

// =============================================================================
// Configuration and Notices
// =============================================================================

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Period of the sensor update walk.
    pub update_interval: Duration,
    /// Command channel capacity.
    pub command_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            update_interval: Duration::from_millis(1_000),
            command_buffer: 256,
        }
    }
}

/// Lightweight record of a tree change, broadcast after publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNotice {
    pub kind: TreeEventKind,
    pub identifier: Identifier,
}

impl From<&TreeEvent> for TreeNotice {
    fn from(event: &TreeEvent) -> Self {
        TreeNotice {
            kind: event.kind(),
            identifier: event.identifier().clone(),
        }
    }
}

// =============================================================================
// Commands and Handle
// =============================================================================

#[derive(Debug)]
enum MonitorCommand {
    AddHardware {
        identifier: Identifier,
        parent: Option<Identifier>,
        reply: oneshot::Sender<bool>,
    },
    RemoveHardware {
        identifier: Identifier,
        parent: Option<Identifier>,
        reply: oneshot::Sender<bool>,
    },
    AddSensor {
        parent: Identifier,
        identifier: Identifier,
        reply: oneshot::Sender<bool>,
    },
    RemoveSensor {
        parent: Identifier,
        identifier: Identifier,
        reply: oneshot::Sender<bool>,
    },
    Update,
    SetCategory {
        category: HardwareCategory,
        enabled: bool,
    },
    SetHardwareName {
        identifier: Identifier,
        name: String,
    },
    SetSensorName {
        identifier: Identifier,
        name: String,
    },
    ListHardware(oneshot::Sender<Vec<Identifier>>),
    Report(oneshot::Sender<String>),
    Close(oneshot::Sender<()>),
}

/// Handle for driving a running monitor agent.
#[derive(Clone)]
pub struct MonitorHandle {
    cmd_tx: mpsc::Sender<MonitorCommand>,
    notices_tx: broadcast::Sender<TreeNotice>,
}

impl MonitorHandle {
    async fn send(&self, cmd: MonitorCommand) -> MirrorResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| MirrorError::ChannelError("Monitor agent channel closed".into()))
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> MonitorCommand) -> MirrorResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| MirrorError::ShuttingDown)
    }

    /// Tree changes, after they were published.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeNotice> {
        self.notices_tx.subscribe()
    }

    /// Engine reported new hardware. Returns whether the tree took it.
    pub async fn add_hardware(&self, identifier: Identifier, parent: Option<Identifier>) -> MirrorResult<bool> {
        self.request(|reply| MonitorCommand::AddHardware {
            identifier,
            parent,
            reply,
        })
        .await
    }

    pub async fn remove_hardware(&self, identifier: Identifier, parent: Option<Identifier>) -> MirrorResult<bool> {
        self.request(|reply| MonitorCommand::RemoveHardware {
            identifier,
            parent,
            reply,
        })
        .await
    }

    pub async fn add_sensor(&self, parent: Identifier, identifier: Identifier) -> MirrorResult<bool> {
        self.request(|reply| MonitorCommand::AddSensor {
            parent,
            identifier,
            reply,
        })
        .await
    }

    pub async fn remove_sensor(&self, parent: Identifier, identifier: Identifier) -> MirrorResult<bool> {
        self.request(|reply| MonitorCommand::RemoveSensor {
            parent,
            identifier,
            reply,
        })
        .await
    }

    /// Refreshes sensor values now instead of waiting for the next tick.
    pub async fn update(&self) -> MirrorResult<()> {
        self.send(MonitorCommand::Update).await
    }

    pub async fn set_category(&self, category: HardwareCategory, enabled: bool) -> MirrorResult<()> {
        self.send(MonitorCommand::SetCategory { category, enabled }).await
    }

    pub async fn set_hardware_name(&self, identifier: Identifier, name: String) -> MirrorResult<()> {
        self.send(MonitorCommand::SetHardwareName { identifier, name }).await
    }

    pub async fn set_sensor_name(&self, identifier: Identifier, name: String) -> MirrorResult<()> {
        self.send(MonitorCommand::SetSensorName { identifier, name }).await
    }

    /// Identifiers of the top-level hardware the tree tracks.
    pub async fn list_hardware(&self) -> MirrorResult<Vec<Identifier>> {
        self.request(MonitorCommand::ListHardware).await
    }

    pub async fn report(&self) -> MirrorResult<String> {
        self.request(MonitorCommand::Report).await
    }

    /// Closes the tree, revokes everything and stops the agent.
    pub async fn close(&self) -> MirrorResult<()> {
        self.request(MonitorCommand::Close).await
    }
}

// =============================================================================
// Agent
// =============================================================================

pub struct MonitorAgent<R: InstanceRegistry> {
    tree: HardwareTree,
    registry: R,
    config: MonitorConfig,
}

impl<R: InstanceRegistry + Send + 'static> MonitorAgent<R> {
    /// The tree is opened and published when the agent starts.
    pub fn new(tree: HardwareTree, registry: R, config: MonitorConfig) -> Self {
        MonitorAgent {
            tree,
            registry,
            config,
        }
    }

    /// Spawns the agent task and returns a handle.
    pub fn start(self) -> MonitorHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.command_buffer.max(1));
        let (notices_tx, _) = broadcast::channel(NOTICE_CAPACITY);

        let MonitorAgent {
            mut tree,
            registry,
            config,
        } = self;

        tree.open();
        let opened = tree.drain_events();
        let publisher = PublishMirror::new(registry, &tree.visible_snapshots());
        for event in &opened {
            let _ = notices_tx.send(TreeNotice::from(event));
        }

        let task = MonitorTask {
            tree,
            publisher,
            notices_tx: notices_tx.clone(),
        };
        tokio::spawn(async move {
            task.run(cmd_rx, config.update_interval).await;
        });

        MonitorHandle { cmd_tx, notices_tx }
    }
}

struct MonitorTask<R: InstanceRegistry> {
    tree: HardwareTree,
    publisher: PublishMirror<R>,
    notices_tx: broadcast::Sender<TreeNotice>,
}

impl<R: InstanceRegistry> MonitorTask<R> {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<MonitorCommand>, update_interval: Duration) {
        info!(
            hardware = self.tree.hardware().len(),
            published = self.publisher.len(),
            "Monitor agent started"
        );

        let mut ticker = interval(update_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("All monitor handles dropped");
                        break;
                    };
                    if !self.handle(cmd) {
                        return;
                    }
                    self.sync();
                }
                _ = ticker.tick() => self.tree.update(),
            }
        }

        self.shutdown();
    }

    /// Applies one command. Returns false once the agent has shut down.
    fn handle(&mut self, cmd: MonitorCommand) -> bool {
        match cmd {
            MonitorCommand::AddHardware {
                identifier,
                parent,
                reply,
            } => {
                let _ = reply.send(self.tree.add_hardware(&identifier, parent.as_ref()));
            }
            MonitorCommand::RemoveHardware {
                identifier,
                parent,
                reply,
            } => {
                let _ = reply.send(self.tree.remove_hardware(&identifier, parent.as_ref()));
            }
            MonitorCommand::AddSensor {
                parent,
                identifier,
                reply,
            } => {
                let _ = reply.send(self.tree.add_sensor(&parent, &identifier));
            }
            MonitorCommand::RemoveSensor {
                parent,
                identifier,
                reply,
            } => {
                let _ = reply.send(self.tree.remove_sensor(&parent, &identifier));
            }
            MonitorCommand::Update => self.tree.update(),
            MonitorCommand::SetCategory { category, enabled } => {
                self.tree.set_category(category, enabled)
            }
            MonitorCommand::SetHardwareName { identifier, name } => {
                if !self.tree.set_hardware_name(&identifier, &name) {
                    debug!(hardware = %identifier, "Rename of unknown hardware ignored");
                }
            }
            MonitorCommand::SetSensorName { identifier, name } => {
                if !self.tree.set_sensor_name(&identifier, &name) {
                    debug!(sensor = %identifier, "Rename of unknown sensor ignored");
                }
            }
            MonitorCommand::ListHardware(reply) => {
                let ids = self
                    .tree
                    .hardware()
                    .iter()
                    .map(|h| h.identifier().clone())
                    .collect();
                let _ = reply.send(ids);
            }
            MonitorCommand::Report(reply) => {
                let _ = reply.send(self.tree.report());
            }
            MonitorCommand::Close(reply) => {
                self.shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    /// Projects queued tree events into the mirror, then notifies.
    fn sync(&mut self) {
        for event in self.tree.drain_events() {
            self.publisher.apply(&event);
            let _ = self.notices_tx.send(TreeNotice::from(&event));
        }
    }

    fn shutdown(&mut self) {
        info!("Monitor agent shutting down");
        self.tree.close();
        self.sync();
        self.publisher.dispose();
        info!("Monitor agent stopped");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{HardwareDescription, SensorDescription, StaticEngine};
    use crate::feed::{EventFeed, FeedConfig};
    use crate::namespace::Namespace;
    use hwmirror_core::{CategoryFlags, HardwareType, SensorType, Settings};
    use std::sync::Arc;

    fn id(text: &str) -> Identifier {
        Identifier::parse(text).unwrap()
    }

    fn disk(index: u32) -> HardwareDescription {
        let hdd = id(&format!("/hdd/{index}"));
        HardwareDescription::new(hdd.clone(), "Samsung SSD", HardwareType::HDD)
            .with_sensor(SensorDescription::new(&hdd, "Temperature", SensorType::Temperature, 0))
    }

    fn start(engine: &Arc<StaticEngine>) -> (MonitorHandle, Namespace) {
        let tree = HardwareTree::new(engine.clone(), Settings::in_memory(), CategoryFlags::all());
        let namespace = Namespace::new(EventFeed::start(FeedConfig::immediate()));
        let handle = MonitorAgent::new(tree, namespace.clone(), MonitorConfig::default()).start();
        (handle, namespace)
    }

    #[tokio::test]
    async fn test_start_publishes_existing_hardware() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(disk(0));
        let (handle, namespace) = start(&engine);

        assert!(namespace.contains(&id("/hdd/0")));
        assert!(namespace.contains(&id("/hdd/0/temperature/0")));
        assert_eq!(handle.list_hardware().await.unwrap(), vec![id("/hdd/0")]);
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_publish_and_notify() {
        let engine = Arc::new(StaticEngine::new());
        let (handle, namespace) = start(&engine);
        let mut notices = handle.subscribe();

        engine.insert_hardware(disk(1));
        assert!(handle.add_hardware(id("/hdd/1"), None).await.unwrap());
        assert!(!handle.add_hardware(id("/hdd/1"), None).await.unwrap());

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.kind, TreeEventKind::HardwareAdded);
        assert_eq!(notice.identifier, id("/hdd/1"));
        assert!(namespace.contains(&id("/hdd/1/temperature/0")));

        handle.set_category(HardwareCategory::Storage, false).await.unwrap();
        assert!(handle.report().await.unwrap().is_empty());
        assert!(!namespace.contains(&id("/hdd/1")));
        assert_eq!(notices.recv().await.unwrap().kind, TreeEventKind::HardwareRemoved);

        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_revokes_everything() {
        let engine = Arc::new(StaticEngine::new());
        engine.insert_hardware(disk(0));
        let (handle, namespace) = start(&engine);

        handle.close().await.unwrap();
        assert!(namespace.is_empty());
        assert!(handle.report().await.is_err());
    }
}
