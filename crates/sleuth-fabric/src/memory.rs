//! An in-process fabric.
//!
//! [`MemoryHub`] is a bus connecting every node created from it. Nodes see
//! `Enter` events for each other once started, `Exit` when a node stops,
//! `Leave` when a node departs a shared group, and `Whisper` for
//! point-to-point payloads. It backs the integration tests and is a usable
//! substrate for co-located services in a single process.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;
use uuid::Uuid;

use crate::{EventKind, Fabric, FabricError, FabricEvent, Result, Whisperer};

/// Interfaces the memory fabric can bind. Anything else fails at start,
/// matching gossip substrates that defer adapter resolution to start-up.
const ROUTABLE_INTERFACES: [&str; 3] = ["", "lo", "localhost"];

#[derive(Default)]
struct HubState {
    nodes: HashMap<String, HubNode>,
}

struct HubNode {
    name: String,
    headers: HashMap<String, String>,
    groups: HashSet<String>,
    events: UnboundedSender<FabricEvent>,
}

/// The shared bus. Cloning is cheap; all clones address the same network.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new, unstarted node on this hub.
    pub fn node(&self) -> MemoryFabric {
        let uuid = Uuid::new_v4().simple().to_string();
        let name = uuid[..8].to_string();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        MemoryFabric {
            hub: Arc::clone(&self.state),
            uuid,
            name,
            local: Mutex::new(LocalState::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }
}

#[derive(Default)]
struct LocalState {
    port: u16,
    interface: String,
    headers: HashMap<String, String>,
    started: bool,
}

/// One node on a [`MemoryHub`].
pub struct MemoryFabric {
    hub: Arc<Mutex<HubState>>,
    uuid: String,
    name: String,
    local: Mutex<LocalState>,
    events_tx: UnboundedSender<FabricEvent>,
    events_rx: Mutex<Option<UnboundedReceiver<FabricEvent>>>,
}

fn enter_event(name: &str, headers: HashMap<String, String>) -> FabricEvent {
    FabricEvent {
        kind: EventKind::Enter,
        name: name.to_string(),
        headers,
        message: Vec::new(),
    }
}

fn membership_event(kind: EventKind, name: &str) -> FabricEvent {
    FabricEvent {
        kind,
        name: name.to_string(),
        headers: HashMap::new(),
        message: Vec::new(),
    }
}

#[async_trait]
impl Whisperer for MemoryFabric {
    async fn whisper(&self, node: &str, payload: Vec<u8>) -> Result<()> {
        if !self.local.lock().unwrap().started {
            return Err(FabricError::NotStarted);
        }
        let hub = self.hub.lock().unwrap();
        let target = hub
            .nodes
            .get(node)
            .ok_or_else(|| FabricError::UnknownPeer(node.to_string()))?;
        // A receiver dropped mid-delivery is indistinguishable from a peer
        // that exited; the payload is simply lost.
        let _ = target.events.send(FabricEvent {
            kind: EventKind::Whisper,
            name: self.name.clone(),
            headers: HashMap::new(),
            message: payload,
        });
        Ok(())
    }
}

#[async_trait]
impl Fabric for MemoryFabric {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn uuid(&self) -> String {
        self.uuid.clone()
    }

    async fn set_port(&self, port: u16) -> Result<()> {
        let mut local = self.local.lock().unwrap();
        if local.started {
            return Err(FabricError::AlreadyStarted);
        }
        local.port = port;
        Ok(())
    }

    async fn set_interface(&self, interface: &str) -> Result<()> {
        let mut local = self.local.lock().unwrap();
        if local.started {
            return Err(FabricError::AlreadyStarted);
        }
        local.interface = interface.to_string();
        Ok(())
    }

    async fn set_header(&self, key: &str, value: &str) -> Result<()> {
        let mut local = self.local.lock().unwrap();
        if local.started {
            return Err(FabricError::AlreadyStarted);
        }
        local.headers.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let headers = {
            let mut local = self.local.lock().unwrap();
            if local.started {
                return Err(FabricError::AlreadyStarted);
            }
            if !ROUTABLE_INTERFACES.contains(&local.interface.as_str()) {
                return Err(FabricError::UnknownInterface(local.interface.clone()));
            }
            local.started = true;
            local.headers.clone()
        };

        let mut hub = self.hub.lock().unwrap();
        for other in hub.nodes.values() {
            let _ = other.events.send(enter_event(&self.name, headers.clone()));
            let _ = self
                .events_tx
                .send(enter_event(&other.name, other.headers.clone()));
        }
        hub.nodes.insert(
            self.uuid.clone(),
            HubNode {
                name: self.name.clone(),
                headers,
                groups: HashSet::new(),
                events: self.events_tx.clone(),
            },
        );
        debug!(node = %self.name, "memory fabric node started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        {
            let mut local = self.local.lock().unwrap();
            if !local.started {
                return Err(FabricError::NotStarted);
            }
            local.started = false;
        }
        let mut hub = self.hub.lock().unwrap();
        hub.nodes.remove(&self.uuid);
        for other in hub.nodes.values() {
            let _ = other.events.send(membership_event(EventKind::Exit, &self.name));
        }
        debug!(node = %self.name, "memory fabric node stopped");
        Ok(())
    }

    async fn join(&self, group: &str) -> Result<()> {
        let mut hub = self.hub.lock().unwrap();
        let node = hub
            .nodes
            .get_mut(&self.uuid)
            .ok_or(FabricError::NotStarted)?;
        node.groups.insert(group.to_string());
        Ok(())
    }

    async fn leave(&self, group: &str) -> Result<()> {
        let mut hub = self.hub.lock().unwrap();
        let departed = hub
            .nodes
            .get_mut(&self.uuid)
            .ok_or(FabricError::NotStarted)?
            .groups
            .remove(group);
        if !departed {
            return Ok(());
        }
        for (uuid, other) in hub.nodes.iter() {
            if uuid != &self.uuid && other.groups.contains(group) {
                let _ = other.events.send(membership_event(EventKind::Leave, &self.name));
            }
        }
        Ok(())
    }

    fn take_events(&self) -> Option<UnboundedReceiver<FabricEvent>> {
        self.events_rx.lock().unwrap().take()
    }
}
