// Shared vehicle core
//
// Motion, watchdog and transport session live behind one lock. Two contexts drive it:
// the transport event handler and the periodic control tick. Neither blocks while
// holding the lock; outbound sends go through a non-blocking `Link`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::DriveConfig;
use crate::messages::RuntimeHealth;
use crate::motor::{MotionController, MotionState, RampProfile};
use crate::protocol::{Dispatcher, RoutingDecision};
use crate::transport::{Link, SendOutcome, SessionChange, TransportEvent, TransportSession};
use crate::watchdog::Watchdog;

struct CoreState {
    motion: MotionController,
    watchdog: Watchdog,
    session: TransportSession,
    last_activity: Instant,
}

impl CoreState {
    fn health(&self) -> RuntimeHealth {
        if !self.session.is_connected() {
            RuntimeHealth::Disconnected
        } else if self.watchdog.is_armed() {
            RuntimeHealth::Ok
        } else {
            RuntimeHealth::CmdStale
        }
    }
}

/// Result of one control tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub motion: MotionState,
    /// The watchdog fired on this tick and the motors were stopped
    pub expired: bool,
    pub health: RuntimeHealth,
}

/// Point-in-time copy of the whole core state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSnapshot {
    pub motion: MotionState,
    pub watchdog_armed: bool,
    pub watchdog_remaining: u32,
    pub connected: bool,
    pub notifications_enabled: bool,
    pub last_activity: Instant,
}

pub struct VehicleCore {
    state: Mutex<CoreState>,
    dispatcher: Dispatcher,
    link: Arc<dyn Link>,
}

impl VehicleCore {
    /// Build the core stopped and disconnected, and start advertising
    pub fn new(config: &DriveConfig, link: Arc<dyn Link>, now: Instant) -> Self {
        let state = CoreState {
            motion: MotionController::new(RampProfile::from_config(config)),
            watchdog: Watchdog::new(config.watchdog_ticks()),
            session: TransportSession::new(),
            last_activity: now,
        };
        link.set_discoverable(true);

        Self {
            state: Mutex::new(state),
            dispatcher: Dispatcher::from_config(config),
            link,
        }
    }

    // A panic elsewhere must not wedge the safety path, so recover poisoned locks
    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Single entry point for transport events
    ///
    /// Returns the routing decision for accepted inbound frames so the caller can hand
    /// delegated categories to their collaborators.
    pub fn handle_event(&self, event: TransportEvent, now: Instant) -> Option<RoutingDecision> {
        let mut state = self.lock();

        match event {
            TransportEvent::Connected(peer) => {
                if state.session.connect(peer) == SessionChange::Connected {
                    state.last_activity = now;
                    self.link.set_discoverable(false);
                }
                None
            }
            TransportEvent::Disconnected(peer) => {
                if state.session.disconnect(&peer) == SessionChange::Disconnected {
                    state.motion.stop();
                    state.watchdog.disarm();
                    warn!("Link lost, motors stopped");
                    self.link.set_discoverable(true);
                }
                None
            }
            TransportEvent::SubscriptionChanged(peer, enabled) => {
                state.session.set_notifications(&peer, enabled);
                None
            }
            TransportEvent::FrameReceived(peer, bytes) => {
                if !state.session.accepts_frame_from(&peer) {
                    debug!("Frame from {} dropped: not the connected peer", peer);
                    return None;
                }
                debug!("Command: {:02X?} from {}", bytes, peer);
                state.last_activity = now;

                let CoreState {
                    motion,
                    watchdog,
                    session,
                    ..
                } = &mut *state;
                let (decision, reply) = self.dispatcher.dispatch(&bytes, motion, watchdog, now);
                if let Some(text) = reply {
                    session.send(self.link.as_ref(), text);
                }
                Some(decision)
            }
        }
    }

    /// Periodic control tick: ramp progression, then watchdog
    pub fn tick(&self, now: Instant) -> TickReport {
        let mut state = self.lock();

        state.motion.tick(now);
        let expired = state.watchdog.tick();
        if expired {
            state.motion.stop();
            info!("Inactivity timeout - motors stopped");
        }

        TickReport {
            motion: state.motion.state(),
            expired,
            health: state.health(),
        }
    }

    /// Stop the motors and disarm the watchdog (shutdown path)
    pub fn halt(&self) -> MotionState {
        let mut state = self.lock();
        state.motion.stop();
        state.watchdog.disarm();
        state.motion.state()
    }

    /// Reset the watchdog and record activity without touching motion
    pub fn notify_activity(&self, now: Instant) {
        let mut state = self.lock();
        state.watchdog.reset();
        state.last_activity = now;
    }

    /// Best-effort status frame to the connected, subscribed peer
    pub fn send(&self, text: &str) -> SendOutcome {
        self.lock().session.send(self.link.as_ref(), text)
    }

    pub fn snapshot(&self) -> CoreSnapshot {
        let state = self.lock();
        CoreSnapshot {
            motion: state.motion.state(),
            watchdog_armed: state.watchdog.is_armed(),
            watchdog_remaining: state.watchdog.remaining_ticks(),
            connected: state.session.is_connected(),
            notifications_enabled: state.session.notifications_enabled(),
            last_activity: state.last_activity,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().session.is_connected()
    }

    pub fn last_activity(&self) -> Instant {
        self.lock().last_activity
    }

    /// Read-only handle for observers outside the core
    pub fn activity_view(self: &Arc<Self>) -> ActivityView {
        ActivityView {
            core: Arc::clone(self),
        }
    }
}

/// Read-only view of connection and activity, for the low-power observer
#[derive(Clone)]
pub struct ActivityView {
    core: Arc<VehicleCore>,
}

impl ActivityView {
    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    pub fn last_activity(&self) -> Instant {
        self.core.last_activity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{Direction, RampPhase};
    use crate::protocol::MotionCommand;
    use crate::transport::tests::RecordingLink;
    use crate::transport::PeerHandle;
    use std::time::Duration;

    fn setup() -> (Arc<VehicleCore>, Arc<RecordingLink>, Instant) {
        let link = Arc::new(RecordingLink::default());
        let t0 = Instant::now();
        let core = Arc::new(VehicleCore::new(&DriveConfig::default(), link.clone(), t0));
        (core, link, t0)
    }

    fn peer() -> PeerHandle {
        PeerHandle::new("phone")
    }

    fn frame(bytes: &[u8]) -> TransportEvent {
        TransportEvent::FrameReceived(peer(), bytes.to_vec())
    }

    fn connect_subscribed(core: &VehicleCore, now: Instant) {
        core.handle_event(TransportEvent::Connected(peer()), now);
        core.handle_event(TransportEvent::SubscriptionChanged(peer(), true), now);
    }

    #[test]
    fn test_frame_ignored_until_connected() {
        let (core, _link, t0) = setup();

        assert_eq!(core.handle_event(frame(&[0x01]), t0), None);
        let snapshot = core.snapshot();
        assert_eq!(snapshot.motion.ramp_phase, RampPhase::Idle);
        assert!(!snapshot.watchdog_armed);

        core.handle_event(TransportEvent::Connected(peer()), t0);
        let decision = core.handle_event(frame(&[0x01]), t0);
        assert_eq!(decision, Some(RoutingDecision::Motion(MotionCommand::Forward)));

        let snapshot = core.snapshot();
        assert_eq!(snapshot.motion.ramp_phase, RampPhase::Ramping);
        assert!(snapshot.watchdog_armed);
        assert_eq!(snapshot.watchdog_remaining, 30);
    }

    #[test]
    fn test_ack_requires_subscription() {
        let (core, link, t0) = setup();
        core.handle_event(TransportEvent::Connected(peer()), t0);
        core.handle_event(frame(&[0x02]), t0);
        assert!(link.texts().is_empty(), "nothing may be sent before subscribing");

        core.handle_event(TransportEvent::SubscriptionChanged(peer(), true), t0);
        core.handle_event(frame(&[0x02]), t0);
        assert_eq!(link.texts(), vec!["OK".to_string()]);
    }

    #[test]
    fn test_unknown_opcode_replies_error_without_state_change() {
        let (core, link, t0) = setup();
        connect_subscribed(&core, t0);
        core.handle_event(frame(&[0x03]), t0);
        core.tick(t0 + Duration::from_millis(10));
        let before = core.snapshot();

        let later = t0 + Duration::from_millis(20);
        core.handle_event(frame(&[0x99]), later);
        let after = core.snapshot();

        assert_eq!(link.texts().last().map(String::as_str), Some("ERR:Unknown"));
        assert_eq!(after.motion, before.motion);
        assert_eq!(after.watchdog_armed, before.watchdog_armed);
        assert_eq!(after.watchdog_remaining, before.watchdog_remaining);
    }

    #[test]
    fn test_watchdog_stops_motion_after_timeout() {
        let (core, _link, t0) = setup();
        connect_subscribed(&core, t0);
        core.handle_event(frame(&[0x03]), t0);

        let tick = Duration::from_millis(10);
        for i in 1..=30 {
            let report = core.tick(t0 + tick * i);
            assert!(!report.expired, "expired early at tick {}", i);
            assert_eq!(report.motion.left_duty, 200);
        }

        let report = core.tick(t0 + tick * 31);
        assert!(report.expired);
        assert!(report.motion.is_stopped());
        assert_eq!(report.health, RuntimeHealth::CmdStale);

        // Edge-triggered: no second expiry
        assert!(!core.tick(t0 + tick * 32).expired);
    }

    #[test]
    fn test_keepalive_holds_motion() {
        let (core, _link, t0) = setup();
        connect_subscribed(&core, t0);
        core.handle_event(frame(&[0x01]), t0);

        let tick = Duration::from_millis(10);
        for i in 1..=400u32 {
            let now = t0 + tick * i;
            if i % 20 == 0 {
                core.handle_event(frame(&[0x70]), now);
            }
            assert!(!core.tick(now).expired, "keepalives must hold the watchdog off");
        }

        let snapshot = core.snapshot();
        assert_eq!(snapshot.motion.ramp_phase, RampPhase::Latched);
        assert_eq!(snapshot.motion.left_duty, 255);
    }

    #[test]
    fn test_disconnect_during_ramp_forces_neutral() {
        let (core, link, t0) = setup();
        connect_subscribed(&core, t0);
        core.handle_event(frame(&[0x01]), t0);
        core.tick(t0 + Duration::from_millis(500));

        core.handle_event(TransportEvent::Disconnected(peer()), t0 + Duration::from_millis(510));

        let snapshot = core.snapshot();
        assert!(snapshot.motion.is_stopped());
        assert_eq!(snapshot.motion.left, Direction::Neutral);
        assert_eq!(snapshot.motion.right, Direction::Neutral);
        assert_eq!(snapshot.motion.ramp_phase, RampPhase::Idle);
        assert!(!snapshot.notifications_enabled);
        assert!(!snapshot.connected);
        assert!(!snapshot.watchdog_armed);

        // Advertising again: initial true, off on connect, back on after the drop
        let flags = link.discoverable.lock().map(|f| f.clone()).unwrap_or_default();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn test_reconnect_needs_fresh_command() {
        let (core, _link, t0) = setup();
        connect_subscribed(&core, t0);
        core.handle_event(frame(&[0x01]), t0);
        core.handle_event(TransportEvent::Disconnected(peer()), t0);
        core.handle_event(TransportEvent::Connected(peer()), t0);

        let report = core.tick(t0 + Duration::from_millis(100));
        assert!(report.motion.is_stopped());
        assert_eq!(report.health, RuntimeHealth::CmdStale);
        assert!(!core.snapshot().notifications_enabled);
    }

    #[test]
    fn test_second_peer_cannot_drive() {
        let (core, _link, t0) = setup();
        core.handle_event(TransportEvent::Connected(peer()), t0);
        let intruder = PeerHandle::new("other");
        core.handle_event(TransportEvent::Connected(intruder.clone()), t0);

        let decision = core.handle_event(TransportEvent::FrameReceived(intruder, vec![0x01]), t0);
        assert_eq!(decision, None);
        assert_eq!(core.snapshot().motion.ramp_phase, RampPhase::Idle);
    }

    #[test]
    fn test_notify_activity_resets_watchdog_only() {
        let (core, _link, t0) = setup();
        let later = t0 + Duration::from_secs(3);
        core.notify_activity(later);

        let snapshot = core.snapshot();
        assert!(snapshot.watchdog_armed);
        assert_eq!(snapshot.watchdog_remaining, 30);
        assert!(snapshot.motion.is_stopped());
        assert_eq!(core.activity_view().last_activity(), later);
    }

    #[test]
    fn test_activity_view_tracks_connection() {
        let (core, _link, t0) = setup();
        let view = core.activity_view();
        assert!(!view.is_connected());
        assert_eq!(view.last_activity(), t0);

        let later = t0 + Duration::from_secs(1);
        core.handle_event(TransportEvent::Connected(peer()), later);
        assert!(view.is_connected());
        assert_eq!(view.last_activity(), later);
    }

    #[test]
    fn test_health_states() {
        let (core, _link, t0) = setup();
        assert_eq!(core.tick(t0).health, RuntimeHealth::Disconnected);

        core.handle_event(TransportEvent::Connected(peer()), t0);
        assert_eq!(core.tick(t0).health, RuntimeHealth::CmdStale);

        core.handle_event(frame(&[0x70]), t0);
        assert_eq!(core.tick(t0).health, RuntimeHealth::Ok);
    }

    #[test]
    fn test_halt_stops_latched_motion() {
        let (core, _link, t0) = setup();
        connect_subscribed(&core, t0);
        core.handle_event(frame(&[0x01]), t0);
        core.tick(t0 + Duration::from_secs(3));
        assert_eq!(core.snapshot().motion.ramp_phase, RampPhase::Latched);

        let state = core.halt();
        assert!(state.is_stopped());
        assert_eq!(state.ramp_phase, RampPhase::Idle);
        assert!(!core.snapshot().watchdog_armed);
    }

    #[test]
    fn test_send_from_collaborator_is_gated() {
        let (core, link, t0) = setup();
        assert_eq!(core.send("VERSION:1"), SendOutcome::Discarded);
        connect_subscribed(&core, t0);
        assert_eq!(core.send("VERSION:1"), SendOutcome::Sent);
        assert_eq!(link.texts(), vec!["VERSION:1".to_string()]);
    }
}
