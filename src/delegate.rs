// Hand-off to external collaborators
//
// Indicator, network configuration and update management are not part of the
// core. Frames in those categories are routed here after the core has fed the
// watchdog, outside the core lock.

use tracing::{debug, info};

use crate::protocol::{DelegatedFrame, IndicatorCommand, MotionCommand, Opcode, RoutingDecision};
use crate::transport::SendOutcome;
use crate::vehicle::VehicleCore;

pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// External subsystems driven by delegated frames
pub trait Collaborators: Send + Sync {
    fn indicator(&self, cmd: IndicatorCommand);

    /// Network configuration opcodes (0x50-0x54). Returns the status reply, if any.
    fn network(&self, frame: &DelegatedFrame) -> Option<String>;

    /// Update management opcodes (0x60-0x63). Returns the status reply, if any.
    fn update(&self, frame: &DelegatedFrame) -> Option<String>;
}

/// Stand-in used when no network/update subsystem is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct Unattached;

impl Collaborators for Unattached {
    fn indicator(&self, cmd: IndicatorCommand) {
        info!("LED: {:?}", cmd);
    }

    fn network(&self, frame: &DelegatedFrame) -> Option<String> {
        debug!("Network opcode {:?} with no collaborator", frame.opcode);
        Some("WIFI:ERR:Unavailable".to_string())
    }

    fn update(&self, frame: &DelegatedFrame) -> Option<String> {
        let reply = match frame.opcode {
            Opcode::GetVersion => format!("VERSION:{}", FIRMWARE_VERSION),
            Opcode::GetInfo => format!("INFO:Zobo v{},WiFi:not_set", FIRMWARE_VERSION),
            other => {
                debug!("Update opcode {:?} with no collaborator", other);
                "OTA:ERR:Unavailable".to_string()
            }
        };
        Some(reply)
    }
}

/// Forward a routing decision to its collaborator and relay the reply
pub fn route(
    decision: &RoutingDecision,
    collaborators: &dyn Collaborators,
    core: &VehicleCore,
) -> Option<SendOutcome> {
    let reply = match decision {
        RoutingDecision::Indicator(cmd) => {
            collaborators.indicator(*cmd);
            None
        }
        RoutingDecision::Motion(MotionCommand::Stop) => {
            collaborators.indicator(IndicatorCommand::MainOff);
            None
        }
        RoutingDecision::Network(frame) => collaborators.network(frame),
        RoutingDecision::Update(frame) => collaborators.update(frame),
        _ => None,
    }?;

    Some(core.send(&status_text(&reply)))
}

/// Status frames are NUL-free ASCII
pub fn status_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii() && *c != '\0')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriveConfig;
    use crate::transport::tests::RecordingLink;
    use crate::transport::{PeerHandle, TransportEvent};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        indicators: Mutex<Vec<IndicatorCommand>>,
    }

    impl Collaborators for Recorder {
        fn indicator(&self, cmd: IndicatorCommand) {
            if let Ok(mut seen) = self.indicators.lock() {
                seen.push(cmd);
            }
        }

        fn network(&self, _frame: &DelegatedFrame) -> Option<String> {
            Some("WIFI:OK:Saved h\u{e9}me\0".to_string())
        }

        fn update(&self, _frame: &DelegatedFrame) -> Option<String> {
            None
        }
    }

    fn connected_core() -> (VehicleCore, Arc<RecordingLink>) {
        let link = Arc::new(RecordingLink::default());
        let now = Instant::now();
        let core = VehicleCore::new(&DriveConfig::default(), link.clone(), now);
        let peer = PeerHandle::new("phone");
        core.handle_event(TransportEvent::Connected(peer.clone()), now);
        core.handle_event(TransportEvent::SubscriptionChanged(peer, true), now);
        (core, link)
    }

    #[test]
    fn test_status_text_strips_nul_and_non_ascii() {
        assert_eq!(status_text("OK"), "OK");
        assert_eq!(status_text("WIFI:OK:h\u{e9}me\0"), "WIFI:OK:hme");
    }

    #[test]
    fn test_version_and_info_replies() {
        let (core, link) = connected_core();
        let decision = crate::protocol::Dispatcher::on_frame(&[0x62]);
        assert_eq!(route(&decision, &Unattached, &core), Some(SendOutcome::Sent));

        let decision = crate::protocol::Dispatcher::on_frame(&[0x63]);
        route(&decision, &Unattached, &core);

        let texts = link.texts();
        assert_eq!(texts[0], format!("VERSION:{}", FIRMWARE_VERSION));
        assert!(texts[1].starts_with("INFO:Zobo v"));
    }

    #[test]
    fn test_unattached_network_reports_unavailable() {
        let (core, link) = connected_core();
        let decision = crate::protocol::Dispatcher::on_frame(&[0x51]);
        route(&decision, &Unattached, &core);
        assert_eq!(link.texts(), vec!["WIFI:ERR:Unavailable".to_string()]);
    }

    #[test]
    fn test_collaborator_reply_sanitized() {
        let (core, link) = connected_core();
        let decision = crate::protocol::Dispatcher::on_frame(b"\x50h\0p\0");
        route(&decision, &Recorder::default(), &core);
        assert_eq!(link.texts(), vec!["WIFI:OK:Saved hme".to_string()]);
    }

    #[test]
    fn test_stop_turns_main_light_off() {
        let (core, link) = connected_core();
        let recorder = Recorder::default();

        route(&crate::protocol::Dispatcher::on_frame(&[0x02]), &recorder, &core);
        route(&crate::protocol::Dispatcher::on_frame(&[20]), &recorder, &core);
        assert_eq!(route(&RoutingDecision::Keepalive, &recorder, &core), None);

        let seen = recorder.indicators.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(seen, vec![IndicatorCommand::MainOff, IndicatorCommand::Red]);
        assert!(link.texts().is_empty(), "indicator hand-off sends nothing itself");
    }
}
