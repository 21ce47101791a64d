//! Stream broadcaster
//!
//! Fans supervisor events out to any number of attached consumers. Each
//! connection has its own bounded queue and delivery is `try_send`, so a slow
//! or vanished consumer only ever loses its own events and the publisher never
//! waits. Spectrum frames are rate limited per connection; a frame arriving
//! inside the window replaces whatever frame is already waiting for the slot.

use chrono::Utc;
use shared::logging::Component;
use shared::{component_debug, component_info, SweepEvent};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use supervisor::EventSink;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::config::BroadcasterConfig;

/// Consumer end of one attachment. Dropping it detaches.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: String,
    events: mpsc::Receiver<SweepEvent>,
    broadcaster: Weak<StreamBroadcaster>,
}

impl ConnectionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next event; `None` once the broadcaster has dropped this connection
    pub async fn recv(&mut self) -> Option<SweepEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SweepEvent> {
        self.events.try_recv().ok()
    }

    pub fn detach(&self) {
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster.detach(&self.id);
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Producer-side state for one consumer
#[derive(Debug)]
struct ClientConnection {
    sender: mpsc::Sender<SweepEvent>,
    connected_at: Instant,
    /// Last successful delivery
    last_activity_at: Instant,
    last_frame_at: Option<Instant>,
    pending_frame: Option<SweepEvent>,
    flush: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl ClientConnection {
    fn stop_timers(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
        if let Some(task) = self.flush.take() {
            task.abort();
        }
    }
}

enum Delivery {
    Sent,
    /// Queue full, event lost for this consumer only
    Dropped,
    /// Spectrum frame parked until the throttle window opens
    Held,
    Closed,
}

pub struct StreamBroadcaster {
    config: BroadcasterConfig,
    connections: Mutex<HashMap<String, ClientConnection>>,
    dropped: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    this: Weak<StreamBroadcaster>,
}

impl std::fmt::Debug for StreamBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBroadcaster")
            .field("connections", &self.connection_count())
            .field("dropped", &self.dropped_events())
            .finish()
    }
}

/// Spawn on the ambient runtime if there is one
fn spawn_task<F>(task: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::runtime::Handle::try_current()
        .ok()
        .map(|runtime| runtime.spawn(task))
}

impl StreamBroadcaster {
    pub fn new(config: BroadcasterConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            connections: Mutex::new(HashMap::new()),
            dropped: AtomicU64::new(0),
            sweeper: Mutex::new(None),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<String, ClientConnection>> {
        self.connections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sweeper(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.sweeper.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a consumer. Its `connected` event is already queued.
    pub fn attach(&self) -> ConnectionHandle {
        let id = format!("sse-{}", Uuid::new_v4().simple());
        let (sender, events) = mpsc::channel(self.config.queue_capacity);
        let now = Instant::now();

        let _ = sender.try_send(SweepEvent::Connected {
            connection_id: id.clone(),
            timestamp: Utc::now(),
        });

        let connection = ClientConnection {
            sender,
            connected_at: now,
            last_activity_at: now,
            last_frame_at: None,
            pending_frame: None,
            flush: None,
            heartbeat: self.spawn_heartbeat(&id),
        };

        let count = {
            let mut connections = self.connections();
            connections.insert(id.clone(), connection);
            connections.len()
        };
        component_info!(Component::Broadcaster, "🔗 Consumer {} attached ({} connected)", id, count);

        ConnectionHandle {
            id,
            events,
            broadcaster: self.this.clone(),
        }
    }

    /// Remove a connection and cancel its timers. Idempotent.
    pub fn detach(&self, id: &str) -> bool {
        let mut connections = self.connections();
        Self::remove_locked(&mut connections, id, "detached")
    }

    fn remove_locked(connections: &mut HashMap<String, ClientConnection>, id: &str, reason: &str) -> bool {
        match connections.remove(id) {
            Some(mut connection) => {
                connection.stop_timers();
                component_info!(
                    Component::Broadcaster,
                    "🔌 Consumer {} {} ({} connected)",
                    id,
                    reason,
                    connections.len()
                );
                true
            }
            None => false,
        }
    }

    /// Deliver to every attached connection without waiting on any of them
    pub fn broadcast(&self, event: SweepEvent) {
        let throttled = event.is_high_frequency();
        let mut connections = self.connections();
        let mut closed = Vec::new();

        for (id, connection) in connections.iter_mut() {
            let delivery = if throttled {
                self.offer_frame(id, connection, event.clone())
            } else {
                self.deliver(connection, event.clone())
            };
            if matches!(delivery, Delivery::Closed) {
                closed.push(id.clone());
            }
        }

        for id in closed {
            Self::remove_locked(&mut connections, &id, "closed");
        }
    }

    /// Deliver to one connection; false if it is gone or its queue is full
    pub fn send_to(&self, id: &str, event: SweepEvent) -> bool {
        let mut connections = self.connections();
        let Some(connection) = connections.get_mut(id) else {
            return false;
        };
        match self.deliver(connection, event) {
            Delivery::Sent => true,
            Delivery::Closed => {
                Self::remove_locked(&mut connections, id, "closed");
                false
            }
            Delivery::Dropped | Delivery::Held => false,
        }
    }

    fn deliver(&self, connection: &mut ClientConnection, event: SweepEvent) -> Delivery {
        match connection.sender.try_send(event) {
            Ok(()) => {
                connection.last_activity_at = Instant::now();
                Delivery::Sent
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    fn offer_frame(&self, id: &str, connection: &mut ClientConnection, frame: SweepEvent) -> Delivery {
        let now = Instant::now();
        match connection.last_frame_at {
            Some(last) if now < last + self.config.spectrum_throttle => {
                if connection.pending_frame.replace(frame).is_some() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                if connection.flush.is_none() {
                    connection.flush = self.spawn_flush(id, last + self.config.spectrum_throttle);
                }
                Delivery::Held
            }
            _ => {
                connection.pending_frame = None;
                connection.last_frame_at = Some(now);
                self.deliver(connection, frame)
            }
        }
    }

    fn spawn_flush(&self, id: &str, at: Instant) -> Option<JoinHandle<()>> {
        let this = self.this.clone();
        let id = id.to_string();
        spawn_task(async move {
            sleep_until(at).await;
            if let Some(broadcaster) = this.upgrade() {
                broadcaster.flush_frame(&id);
            }
        })
    }

    fn flush_frame(&self, id: &str) {
        let mut connections = self.connections();
        let Some(connection) = connections.get_mut(id) else {
            return;
        };
        connection.flush = None;
        let Some(frame) = connection.pending_frame.take() else {
            return;
        };
        connection.last_frame_at = Some(Instant::now());
        if let Delivery::Closed = self.deliver(connection, frame) {
            Self::remove_locked(&mut connections, id, "closed");
        }
    }

    fn spawn_heartbeat(&self, id: &str) -> Option<JoinHandle<()>> {
        let this = self.this.clone();
        let id = id.to_string();
        let period = self.config.heartbeat_interval;
        spawn_task(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(broadcaster) = this.upgrade() else {
                    break;
                };
                if !broadcaster.heartbeat(&id) {
                    break;
                }
            }
        })
    }

    fn heartbeat(&self, id: &str) -> bool {
        let mut connections = self.connections();
        let Some(connection) = connections.get_mut(id) else {
            return false;
        };
        let event = SweepEvent::Heartbeat {
            connection_id: id.to_string(),
            uptime_ms: connection.connected_at.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        };
        match self.deliver(connection, event) {
            Delivery::Closed => {
                Self::remove_locked(&mut connections, id, "closed");
                false
            }
            _ => true,
        }
    }

    /// Drop connections with no successful delivery inside the ceiling.
    /// Returns how many were removed.
    pub fn sweep_inactive(&self) -> usize {
        let ceiling = self.config.inactivity_timeout;
        let now = Instant::now();
        let mut connections = self.connections();
        let stale: Vec<String> = connections
            .iter()
            .filter(|(_, c)| c.sender.is_closed() || now.duration_since(c.last_activity_at) > ceiling)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            Self::remove_locked(&mut connections, id, "timed out");
        }
        stale.len()
    }

    /// Run `sweep_inactive` on the configured interval until shutdown
    pub fn start_sweeper(&self) {
        let this = self.this.clone();
        let period = self.config.sweep_interval;
        let task = spawn_task(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(broadcaster) = this.upgrade() else {
                    break;
                };
                let removed = broadcaster.sweep_inactive();
                if removed > 0 {
                    component_debug!(Component::Broadcaster, "🧹 Swept {} inactive consumers", removed);
                }
            }
        });

        if let Some(previous) = std::mem::replace(&mut *self.sweeper(), task) {
            previous.abort();
        }
    }

    /// Stop the sweeper and drop every connection
    pub fn shutdown(&self) {
        if let Some(task) = self.sweeper().take() {
            task.abort();
        }
        let mut connections = self.connections();
        for (_, mut connection) in connections.drain() {
            connection.stop_timers();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    pub fn connection_ids(&self) -> Vec<String> {
        self.connections().keys().cloned().collect()
    }

    /// Events lost to full queues or superseded spectrum frames
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for StreamBroadcaster {
    fn publish(&self, event: SweepEvent) {
        self.broadcast(event);
    }
}
