//! Owning task for a [`RemoteMirror`].
//!
//! ```text
//!  EventFeed ──► listener task ──Event──┐
//!                                       ▼
//!  RemoteMirrorHandle ──commands──► agent task (owns RemoteMirror)
//!                                       │  update() every interval
//!                                       ▼
//!                          broadcast<RemoteEvent> ──► observers
//! ```
//!
//! The listener only holds a weak sender, so dropping every handle stops
//! the agent even while the feed is alive.

use std::sync::Arc;
use std::time::Duration;

use hwmirror_core::{HardwareCategory, Identifier};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::{RemoteEvent, RemoteMirror, RemoteTreeView};
use crate::error::{MirrorError, MirrorResult};
use crate::feed::{InstanceEvent, Subscription};
use crate::schema::EntityKind;
use crate::source::InstanceSource;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub update_interval: Duration,
    pub command_buffer: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            update_interval: Duration::from_millis(1_000),
            command_buffer: 256,
        }
    }
}

type Reply<T> = oneshot::Sender<T>;

enum RemoteCommand {
    Open(Reply<()>),
    Event(InstanceEvent),
    Update,
    SetCategory {
        category: HardwareCategory,
        enabled: bool,
    },
    SetHardwareName {
        identifier: Identifier,
        name: String,
        reply: Reply<MirrorResult<()>>,
    },
    SetSensorName {
        identifier: Identifier,
        name: String,
        reply: Reply<MirrorResult<()>>,
    },
    Report {
        identifier: Identifier,
        reply: Reply<MirrorResult<String>>,
    },
    ResetMin(Identifier),
    ResetMax(Identifier),
    SetParameterValue {
        identifier: Identifier,
        value: f32,
        reply: Reply<MirrorResult<()>>,
    },
    SetParameterDefault {
        identifier: Identifier,
        reply: Reply<MirrorResult<()>>,
    },
    SetControlDefault {
        identifier: Identifier,
        reply: Reply<MirrorResult<()>>,
    },
    SetControlSoftware {
        identifier: Identifier,
        value: f32,
        reply: Reply<MirrorResult<()>>,
    },
    Snapshot(Reply<RemoteTreeView>),
    Close(Reply<()>),
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for driving a running remote mirror.
#[derive(Clone)]
pub struct RemoteMirrorHandle {
    cmd_tx: mpsc::Sender<RemoteCommand>,
    events_tx: broadcast::Sender<RemoteEvent>,
}

impl RemoteMirrorHandle {
    async fn send(&self, cmd: RemoteCommand) -> MirrorResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| MirrorError::ChannelError("Remote mirror channel closed".into()))
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> RemoteCommand) -> MirrorResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| MirrorError::ShuttingDown)
    }

    /// Structural notifications from the mirror.
    pub fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events_tx.subscribe()
    }

    /// Subscribes to the feed, then enumerates the source.
    pub async fn open(&self) -> MirrorResult<()> {
        self.request(RemoteCommand::Open).await
    }

    /// Feeds one event by hand (the listener does this for feed events).
    pub async fn handle_event(&self, event: InstanceEvent) -> MirrorResult<()> {
        self.send(RemoteCommand::Event(event)).await
    }

    /// Polls values now instead of waiting for the next tick.
    pub async fn update(&self) -> MirrorResult<()> {
        self.send(RemoteCommand::Update).await
    }

    pub async fn set_category(&self, category: HardwareCategory, enabled: bool) -> MirrorResult<()> {
        self.send(RemoteCommand::SetCategory { category, enabled }).await
    }

    pub async fn set_hardware_name(&self, identifier: Identifier, name: String) -> MirrorResult<()> {
        self.request(|reply| RemoteCommand::SetHardwareName {
            identifier,
            name,
            reply,
        })
        .await?
    }

    /// Engine report of one remote hardware.
    pub async fn report(&self, identifier: Identifier) -> MirrorResult<String> {
        self.request(|reply| RemoteCommand::Report { identifier, reply })
            .await?
    }

    pub async fn set_sensor_name(&self, identifier: Identifier, name: String) -> MirrorResult<()> {
        self.request(|reply| RemoteCommand::SetSensorName {
            identifier,
            name,
            reply,
        })
        .await?
    }

    pub async fn reset_min(&self, identifier: Identifier) -> MirrorResult<()> {
        self.send(RemoteCommand::ResetMin(identifier)).await
    }

    pub async fn reset_max(&self, identifier: Identifier) -> MirrorResult<()> {
        self.send(RemoteCommand::ResetMax(identifier)).await
    }

    pub async fn set_parameter_value(&self, identifier: Identifier, value: f32) -> MirrorResult<()> {
        self.request(|reply| RemoteCommand::SetParameterValue {
            identifier,
            value,
            reply,
        })
        .await?
    }

    pub async fn set_parameter_default(&self, identifier: Identifier) -> MirrorResult<()> {
        self.request(|reply| RemoteCommand::SetParameterDefault { identifier, reply })
            .await?
    }

    pub async fn set_control_default(&self, identifier: Identifier) -> MirrorResult<()> {
        self.request(|reply| RemoteCommand::SetControlDefault { identifier, reply })
            .await?
    }

    pub async fn set_control_software(&self, identifier: Identifier, value: f32) -> MirrorResult<()> {
        self.request(|reply| RemoteCommand::SetControlSoftware {
            identifier,
            value,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> MirrorResult<RemoteTreeView> {
        self.request(RemoteCommand::Snapshot).await
    }

    /// Closes the mirror (storing histories) and stops the agent.
    pub async fn close(&self) -> MirrorResult<()> {
        self.request(RemoteCommand::Close).await
    }
}

// =============================================================================
// Agent
// =============================================================================

pub struct RemoteMirrorAgent<S: InstanceSource> {
    mirror: RemoteMirror<S>,
    config: RemoteConfig,
    events_tx: broadcast::Sender<RemoteEvent>,
    listener: Option<JoinHandle<()>>,
}

impl<S: InstanceSource> RemoteMirrorAgent<S> {
    pub fn new(mirror: RemoteMirror<S>, config: RemoteConfig) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        RemoteMirrorAgent {
            mirror,
            config,
            events_tx,
            listener: None,
        }
    }

    /// Spawns the agent task and returns a handle.
    pub fn start(self) -> RemoteMirrorHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.command_buffer.max(1));
        let events_tx = self.events_tx.clone();
        let weak_tx = cmd_tx.downgrade();

        tokio::spawn(async move {
            self.run(cmd_rx, weak_tx).await;
        });

        RemoteMirrorHandle { cmd_tx, events_tx }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<RemoteCommand>, weak_tx: mpsc::WeakSender<RemoteCommand>) {
        info!(interval_ms = self.config.update_interval.as_millis() as u64, "Remote mirror agent started");

        let mut ticker = interval(self.config.update_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("All remote mirror handles dropped");
                        break;
                    };
                    let keep_running = self.handle(cmd, &weak_tx);
                    self.publish_events();
                    if !keep_running {
                        break;
                    }
                }
                _ = ticker.tick(), if self.mirror.is_open() => {
                    self.mirror.update();
                }
            }
        }

        self.mirror.close();
        self.publish_events();
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        info!("Remote mirror agent stopped");
    }

    /// Applies one command. Returns false when the agent should stop.
    fn handle(&mut self, cmd: RemoteCommand, weak_tx: &mpsc::WeakSender<RemoteCommand>) -> bool {
        match cmd {
            RemoteCommand::Open(reply) => {
                if !self.mirror.is_open() {
                    let subscription = self
                        .mirror
                        .source()
                        .subscribe(&[EntityKind::Hardware, EntityKind::Sensor]);
                    self.listener = Some(tokio::spawn(listen(subscription, weak_tx.clone())));
                    self.mirror.open();
                }
                let _ = reply.send(());
            }
            RemoteCommand::Event(event) => self.mirror.handle_event(&event),
            RemoteCommand::Update => self.mirror.update(),
            RemoteCommand::SetCategory { category, enabled } => {
                self.mirror.set_category(category, enabled)
            }
            RemoteCommand::SetHardwareName {
                identifier,
                name,
                reply,
            } => {
                let _ = reply.send(self.mirror.set_hardware_name(&identifier, &name));
            }
            RemoteCommand::Report { identifier, reply } => {
                let _ = reply.send(self.mirror.report(&identifier));
            }
            RemoteCommand::SetSensorName {
                identifier,
                name,
                reply,
            } => {
                let _ = reply.send(self.mirror.set_sensor_name(&identifier, &name));
            }
            RemoteCommand::ResetMin(identifier) => {
                if let Err(e) = self.mirror.reset_min(&identifier) {
                    debug!(sensor = %identifier, error = %e, "Reset min ignored");
                }
            }
            RemoteCommand::ResetMax(identifier) => {
                if let Err(e) = self.mirror.reset_max(&identifier) {
                    debug!(sensor = %identifier, error = %e, "Reset max ignored");
                }
            }
            RemoteCommand::SetParameterValue {
                identifier,
                value,
                reply,
            } => {
                let _ = reply.send(self.mirror.set_parameter_value(&identifier, value));
            }
            RemoteCommand::SetParameterDefault { identifier, reply } => {
                let _ = reply.send(self.mirror.set_parameter_default(&identifier));
            }
            RemoteCommand::SetControlDefault { identifier, reply } => {
                let _ = reply.send(self.mirror.set_control_default(&identifier));
            }
            RemoteCommand::SetControlSoftware {
                identifier,
                value,
                reply,
            } => {
                let _ = reply.send(self.mirror.set_control_software(&identifier, value));
            }
            RemoteCommand::Snapshot(reply) => {
                let _ = reply.send(self.mirror.snapshot());
            }
            RemoteCommand::Close(reply) => {
                info!("Remote mirror agent shutting down");
                self.mirror.close();
                self.publish_events();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn publish_events(&mut self) {
        for event in self.mirror.drain_events() {
            // No receivers is fine.
            let _ = self.events_tx.send(event);
        }
    }
}

/// Forwards feed events to the agent until the feed or the agent is gone.
async fn listen(mut subscription: Subscription, weak_tx: mpsc::WeakSender<RemoteCommand>) {
    while let Some(event) = subscription.recv().await {
        let Some(tx) = weak_tx.upgrade() else {
            break;
        };
        if tx.send(RemoteCommand::Event(event)).await.is_err() {
            break;
        }
    }
    debug!("Remote feed listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{HardwareDescription, SensorDescription, StaticEngine};
    use crate::feed::{EventFeed, FeedConfig};
    use crate::namespace::Namespace;
    use crate::publish::PublishMirror;
    use crate::tree::HardwareTree;
    use hwmirror_core::{CategoryFlags, HardwareType, SensorType, Settings};

    fn id(text: &str) -> Identifier {
        Identifier::parse(text).unwrap()
    }

    async fn next_event(rx: &mut broadcast::Receiver<RemoteEvent>) -> RemoteEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no remote event in time")
            .unwrap()
    }

    #[tokio::test]
    async fn test_feed_events_reach_remote_observers() {
        let engine = Arc::new(StaticEngine::new());
        let mut tree = HardwareTree::new(engine.clone(), Settings::in_memory(), CategoryFlags::all());
        tree.open();
        let namespace = Namespace::new(EventFeed::start(FeedConfig::immediate()));
        let mut publisher = PublishMirror::new(namespace.clone(), &tree.visible_snapshots());

        let mirror = RemoteMirror::new(Arc::new(namespace), Settings::in_memory(), CategoryFlags::all());
        let handle = RemoteMirrorAgent::new(mirror, RemoteConfig::default()).start();
        let mut events = handle.subscribe();
        handle.open().await.unwrap();

        let ram = id("/ram");
        engine.insert_hardware(
            HardwareDescription::new(ram.clone(), "Generic Memory", HardwareType::RAM)
                .with_sensor(SensorDescription::new(&ram, "Memory", SensorType::Load, 0)),
        );
        tree.add_hardware(&ram, None);
        for event in tree.drain_events() {
            publisher.apply(&event);
        }

        assert_eq!(next_event(&mut events).await, RemoteEvent::HardwareAdded(ram.clone()));

        let view = handle.snapshot().await.unwrap();
        assert_eq!(view.hardware.len(), 1);
        assert_eq!(view.hardware[0].sensors[0].name, "Memory");

        handle.set_hardware_name(ram.clone(), "DIMMs".into()).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().hardware[0].name, "DIMMs");
        assert!(handle.report(ram.clone()).await.is_ok());
        assert!(handle.report(id("/hdd/9")).await.unwrap_err().is_transient());

        publisher.dispose();
        assert_eq!(
            next_event(&mut events).await,
            RemoteEvent::SensorRemoved {
                hardware: ram.clone(),
                sensor: id("/ram/load/0"),
            }
        );
        assert_eq!(next_event(&mut events).await, RemoteEvent::HardwareRemoved(ram));

        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_actions_on_unknown_instances_fail() {
        let namespace = Namespace::new(EventFeed::start(FeedConfig::immediate()));
        let mirror = RemoteMirror::new(Arc::new(namespace), Settings::in_memory(), CategoryFlags::all());
        let handle = RemoteMirrorAgent::new(mirror, RemoteConfig::default()).start();
        handle.open().await.unwrap();

        let err = handle
            .set_parameter_value(id("/lpc/0/fan/0/parameter/offset"), 1.0)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(handle.snapshot().await.unwrap().hardware.is_empty());
        handle.close().await.unwrap();
    }
}
