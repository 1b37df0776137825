// Transport session for the wireless command link
//
// Disconnected -> Connected(notify off) <-> Connected(notify on)
// Inbound frames are accepted in either connected state; notifications only gate
// the outbound status path. One peer at a time.

use std::fmt;

use tracing::{debug, info, warn};

/// Opaque identifier of a connected client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerHandle(String);

impl PeerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Events delivered by the radio stack adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(PeerHandle),
    Disconnected(PeerHandle),
    FrameReceived(PeerHandle, Vec<u8>),
    SubscriptionChanged(PeerHandle, bool),
}

/// Result of a best-effort outbound send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Discarded,
}

/// Outbound side of the radio stack. Must not block.
pub trait Link: Send + Sync {
    /// Push a status frame to the peer
    fn transmit(&self, peer: &PeerHandle, text: &str);

    /// Start or stop announcing the vehicle to new clients
    fn set_discoverable(&self, discoverable: bool);
}

/// Client characteristic configuration value that enables notifications (little-endian)
pub const CCCD_NOTIFY: [u8; 2] = [0x01, 0x00];

/// Decode a subscription descriptor write: only the exact "notify" value enables
pub fn cccd_enables(value: &[u8]) -> bool {
    value == CCCD_NOTIFY
}

/// What a connection-level event did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    Connected,
    /// The connected peer left; the caller must put the motors in a safe state
    Disconnected,
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportSession {
    peer: Option<PeerHandle>,
    notifications_enabled: bool,
}

impl TransportSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }

    pub fn peer(&self) -> Option<&PeerHandle> {
        self.peer.as_ref()
    }

    pub fn connect(&mut self, peer: PeerHandle) -> SessionChange {
        if let Some(current) = &self.peer {
            warn!("Refusing {}: already connected to {}", peer, current);
            return SessionChange::Ignored;
        }
        info!("Device connected: {}", peer);
        self.peer = Some(peer);
        self.notifications_enabled = false;
        SessionChange::Connected
    }

    pub fn disconnect(&mut self, peer: &PeerHandle) -> SessionChange {
        if !self.is_current(peer) {
            debug!("Disconnect from unknown peer {} ignored", peer);
            return SessionChange::Ignored;
        }
        info!("Device disconnected: {}", peer);
        self.peer = None;
        self.notifications_enabled = false;
        SessionChange::Disconnected
    }

    /// Apply a subscription write. Ignored unless it comes from the connected peer.
    pub fn set_notifications(&mut self, peer: &PeerHandle, enabled: bool) {
        if !self.is_current(peer) {
            debug!("Subscription write from {} ignored", peer);
            return;
        }
        self.notifications_enabled = enabled;
        info!(
            "Notifications {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// True if a frame from `peer` should reach the dispatcher
    pub fn accepts_frame_from(&self, peer: &PeerHandle) -> bool {
        self.is_current(peer)
    }

    /// Send a status frame if the peer is connected and subscribed, else drop it
    pub fn send(&self, link: &dyn Link, text: &str) -> SendOutcome {
        match &self.peer {
            Some(peer) if self.notifications_enabled => {
                link.transmit(peer, text);
                SendOutcome::Sent
            }
            _ => {
                debug!("Status {:?} discarded (no subscribed peer)", text);
                SendOutcome::Discarded
            }
        }
    }

    fn is_current(&self, peer: &PeerHandle) -> bool {
        self.peer.as_ref() == Some(peer)
    }
}
