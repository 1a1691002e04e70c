//! The fabric: sleuth's group-gossip transport contract.
//!
//! A fabric node announces itself to the local network, joins named groups,
//! emits membership events (enter, exit, leave) and point-to-point payloads
//! (whispers), and can whisper bytes to any other node by address. Sleuth
//! consumes the fabric purely through the [`Fabric`] trait, so any gossip
//! substrate that can satisfy it will do; this crate also ships
//! [`memory::MemoryHub`], an in-process implementation used by tests and
//! single-host deployments.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors surfaced by fabric implementations. Sleuth wraps these in its own
/// coded error type at each call site.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("fabric node is not started")]
    NotStarted,

    #[error("fabric node is already started")]
    AlreadyStarted,

    #[error("unknown interface: {0}")]
    UnknownInterface(String),

    #[error("unknown peer node: {0}")]
    UnknownPeer(String),

    #[error("event stream already taken")]
    EventsTaken,
}

pub type Result<T> = std::result::Result<T, FabricError>;

/// The kind of a fabric event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A node appeared on the network. Carries the node's headers.
    Enter,
    /// A node disappeared from the network.
    Exit,
    /// A node left a group this node belongs to.
    Leave,
    /// A point-to-point payload addressed to this node.
    Whisper,
}

/// A single event from the fabric's gossip stream.
#[derive(Debug, Clone)]
pub struct FabricEvent {
    pub kind: EventKind,
    /// Short name of the peer the event concerns.
    pub name: String,
    /// Announce headers; populated for `Enter` events only.
    pub headers: HashMap<String, String>,
    /// Payload bytes; populated for `Whisper` events only.
    pub message: Vec<u8>,
}

impl FabricEvent {
    /// Looks up an announce header by key.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

/// Point-to-point delivery. Split from [`Fabric`] so components that only
/// send (the response writer) can be exercised against substitute
/// implementations.
#[async_trait]
pub trait Whisperer: Send + Sync {
    /// Delivers `payload` to the node with the given fabric address.
    async fn whisper(&self, node: &str, payload: Vec<u8>) -> Result<()>;
}

/// The full fabric capability set.
///
/// Configuration calls (`set_port`, `set_interface`, `set_header`) must be
/// issued before `start`. `take_events` hands over the event stream exactly
/// once; the caller owns the receiving side for the node's lifetime.
#[async_trait]
pub trait Fabric: Whisperer {
    /// Short public name attached to this node's events.
    fn name(&self) -> String;

    /// Fabric address other nodes use to whisper to this node.
    fn uuid(&self) -> String;

    async fn set_port(&self, port: u16) -> Result<()>;

    async fn set_interface(&self, interface: &str) -> Result<()>;

    async fn set_header(&self, key: &str, value: &str) -> Result<()>;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn join(&self, group: &str) -> Result<()>;

    async fn leave(&self, group: &str) -> Result<()>;

    /// Takes the event stream. Returns `None` on any call after the first.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<FabricEvent>>;
}
