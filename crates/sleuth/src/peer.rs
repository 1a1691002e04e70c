//! Peer records.

/// A remote member of the group and the service it offers.
///
/// Peers are immutable: one is created when a valid enter event arrives and
/// dropped when the member exits or leaves. Client-only members (no service
/// announced) never become peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Short identifier assigned by the fabric, stable for the peer's life.
    pub name: String,
    /// Fabric address used to whisper to this peer.
    pub node: String,
    /// Name of the service the peer offers.
    pub service: String,
    /// Free-form service version.
    pub version: String,
}
