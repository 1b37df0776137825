// Zenoh adapter and control loop
//
// The wireless link is carried over zenoh:
//   <prefix>/link/peer/<id>   liveliness token per client (appears = connect, gone = disconnect)
//   <prefix>/link/<id>/rx     command frames from the client (raw bytes)
//   <prefix>/link/<id>/cccd   subscription descriptor writes (2 bytes, LE)
//   <prefix>/link/<id>/tx     status frames to the client
//   <prefix>/link/vehicle     liveliness token held while waiting for a client
//
// Two contexts share the core: an event task fed by the subscribers, and the
// fixed-rate control tick below. A third, slower task runs the idle observer.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, info, warn};
use zenoh::liveliness::LivelinessToken;
use zenoh::sample::SampleKind;

use crate::config::{
    DriveConfig, IDLE_POLL_MS, IDLE_TIMEOUT, KEY_HEALTH, KEY_PEER_PRESENCE, KEY_RT_MOTOR,
    KEY_VEHICLE_PRESENCE, OUTBOUND_QUEUE,
};
use crate::delegate::{self, Collaborators, Unattached};
use crate::idle::IdleMonitor;
use crate::messages::{MotorActuation, RuntimeHealth};
use crate::transport::{cccd_enables, Link, PeerHandle, TransportEvent};
use crate::vehicle::{TickReport, VehicleCore};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which subscription a sample arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Presence,
    Rx,
    Cccd,
}

/// Translate a zenoh sample into a transport event
///
/// Returns None for keys that do not belong to the link layout.
pub fn decode_sample(
    prefix: &str,
    channel: Channel,
    key: &str,
    present: bool,
    payload: &[u8],
) -> Option<TransportEvent> {
    match channel {
        Channel::Presence => {
            let id = key.strip_prefix(&format!("{}/{}/", prefix, KEY_PEER_PRESENCE))?;
            if id.is_empty() || id.contains('/') {
                return None;
            }
            let peer = PeerHandle::new(id);
            Some(if present {
                TransportEvent::Connected(peer)
            } else {
                TransportEvent::Disconnected(peer)
            })
        }
        Channel::Rx => {
            let peer = peer_for(prefix, key, "rx")?;
            present.then(|| TransportEvent::FrameReceived(peer, payload.to_vec()))
        }
        Channel::Cccd => {
            let peer = peer_for(prefix, key, "cccd")?;
            present.then(|| TransportEvent::SubscriptionChanged(peer, cccd_enables(payload)))
        }
    }
}

fn peer_for(prefix: &str, key: &str, leaf: &str) -> Option<PeerHandle> {
    let rest = key.strip_prefix(&format!("{}/link/", prefix))?;
    let id = rest.strip_suffix(&format!("/{}", leaf))?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(PeerHandle::new(id))
}

struct StatusFrame {
    peer: PeerHandle,
    text: String,
}

/// Non-blocking `Link` feeding the zenoh writer task
///
/// Status frames go through a bounded queue and may be dropped under load.
/// Discoverability is a watched value, so only the latest setting matters.
struct ZenohLink {
    status: mpsc::Sender<StatusFrame>,
    discoverable: watch::Sender<bool>,
}

impl ZenohLink {
    fn new(queue: usize) -> (Self, mpsc::Receiver<StatusFrame>, watch::Receiver<bool>) {
        let (status, status_rx) = mpsc::channel(queue);
        let (discoverable, discoverable_rx) = watch::channel(false);
        let link = Self {
            status,
            discoverable,
        };
        (link, status_rx, discoverable_rx)
    }
}

impl Link for ZenohLink {
    fn transmit(&self, peer: &PeerHandle, text: &str) {
        let msg = StatusFrame {
            peer: peer.clone(),
            text: text.to_string(),
        };
        if self.status.try_send(msg).is_err() {
            debug!("Outbound queue full, status {:?} dropped", text);
        }
    }

    fn set_discoverable(&self, discoverable: bool) {
        self.discoverable.send_replace(discoverable);
    }
}

async fn outbound_task(
    session: zenoh::Session,
    prefix: String,
    mut status: mpsc::Receiver<StatusFrame>,
    mut discoverable: watch::Receiver<bool>,
) {
    let mut advert: Option<LivelinessToken> = None;

    loop {
        tokio::select! {
            msg = status.recv() => {
                let Some(StatusFrame { peer, text }) = msg else {
                    break;
                };
                let key = format!("{}/link/{}/tx", prefix, peer);
                if let Err(e) = session.put(key.as_str(), text).await {
                    warn!("Failed to send status to {}: {}", peer, e);
                }
            }
            changed = discoverable.changed() => {
                if changed.is_err() {
                    break;
                }
                let wanted = *discoverable.borrow_and_update();
                advertise(&session, &prefix, &mut advert, wanted).await;
            }
        }
    }

    advertise(&session, &prefix, &mut advert, false).await;
}

async fn advertise(
    session: &zenoh::Session,
    prefix: &str,
    advert: &mut Option<LivelinessToken>,
    wanted: bool,
) {
    match (wanted, advert.take()) {
        (true, None) => {
            let key = format!("{}/{}", prefix, KEY_VEHICLE_PRESENCE);
            match session.liveliness().declare_token(key.as_str()).await {
                Ok(token) => {
                    info!("Advertising on {}", key);
                    *advert = Some(token);
                }
                Err(e) => warn!("Failed to advertise: {}", e),
            }
        }
        (false, Some(token)) => {
            if let Err(e) = token.undeclare().await {
                warn!("Failed to stop advertising: {}", e);
            }
            info!("Advertising stopped");
        }
        (_, current) => *advert = current,
    }
}

/// Serialized actuation and health for one control tick
fn tick_messages(report: &TickReport, idle: bool) -> Result<(String, String), serde_json::Error> {
    let health = match report.health {
        RuntimeHealth::Disconnected if idle => RuntimeHealth::Idle,
        other => other,
    };
    let actuation = serde_json::to_string(&MotorActuation::from(&report.motion))?;
    Ok((actuation, serde_json::to_string(&health)?))
}

/// Runtime settings from the command line
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub prefix: String,
    pub drive: DriveConfig,
}

pub async fn run(options: RuntimeOptions) -> Result<(), BoxError> {
    run_with(options, Arc::new(Unattached)).await
}

pub async fn run_with(
    options: RuntimeOptions,
    collaborators: Arc<dyn Collaborators>,
) -> Result<(), BoxError> {
    let RuntimeOptions { prefix, drive } = options;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let presence = session
        .liveliness()
        .declare_subscriber(format!("{}/{}/*", prefix, KEY_PEER_PRESENCE))
        // Replay clients whose token predates this session
        .history(true)
        .await?;
    let rx_frames = session
        .declare_subscriber(format!("{}/link/*/rx", prefix))
        .await?;
    let cccd_writes = session
        .declare_subscriber(format!("{}/link/*/cccd", prefix))
        .await?;
    let pub_motor = session
        .declare_publisher(format!("{}/{}", prefix, KEY_RT_MOTOR))
        .await?;
    let pub_health = session
        .declare_publisher(format!("{}/{}", prefix, KEY_HEALTH))
        .await?;

    let (link, status_rx, discoverable_rx) = ZenohLink::new(OUTBOUND_QUEUE);
    tokio::spawn(outbound_task(
        session.clone(),
        prefix.clone(),
        status_rx,
        discoverable_rx,
    ));

    let link = Arc::new(link);
    let core = Arc::new(VehicleCore::new(&drive, link, Instant::now()));

    // Transport event context
    let event_core = Arc::clone(&core);
    let event_prefix = prefix.clone();
    tokio::spawn(async move {
        loop {
            let (channel, sample) = tokio::select! {
                s = presence.recv_async() => (Channel::Presence, s),
                s = rx_frames.recv_async() => (Channel::Rx, s),
                s = cccd_writes.recv_async() => (Channel::Cccd, s),
            };
            let sample = match sample {
                Ok(sample) => sample,
                Err(e) => {
                    warn!("Link subscription closed: {}", e);
                    break;
                }
            };

            let payload = sample.payload().to_bytes();
            let Some(event) = decode_sample(
                &event_prefix,
                channel,
                sample.key_expr().as_str(),
                sample.kind() == SampleKind::Put,
                &payload,
            ) else {
                debug!("Ignoring sample on {}", sample.key_expr());
                continue;
            };

            if let Some(decision) = event_core.handle_event(event, Instant::now()) {
                delegate::route(&decision, collaborators.as_ref(), &event_core);
            }
        }
    });

    // Low-power observer
    let monitor = IdleMonitor::new(core.activity_view(), IDLE_TIMEOUT);
    let idle = monitor.flag();
    tokio::spawn(async move {
        let mut poll = interval(Duration::from_millis(IDLE_POLL_MS));
        loop {
            poll.tick().await;
            monitor.poll(Instant::now());
        }
    });

    let mut tick = interval(drive.tick_period());

    info!(
        "Runtime started: {}ms tick, {}ms watchdog, ramp {}->{} over {}ms",
        drive.tick_period_ms,
        drive.inactivity_ms,
        drive.ramp_floor,
        drive.ramp_ceiling,
        drive.ramp_duration_ms
    );
    info!("Listening on: {}/link/*", prefix);
    info!("Publishing to: {}/{}, {}/{}", prefix, KEY_RT_MOTOR, prefix, KEY_HEALTH);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutting down, stopping motors");
                let stopped = core.halt();
                let json = serde_json::to_string(&MotorActuation::from(&stopped))?;
                if let Err(e) = pub_motor.put(json).await {
                    warn!("Failed to publish final stop: {}", e);
                }
                return Ok(());
            }
        }

        // 1. Ramp + watchdog
        let report = core.tick(Instant::now());

        // 2. Publish actuation and health. A failed put is retried on the next tick;
        //    the watchdog keeps running either way.
        let (actuation_json, health_json) =
            match tick_messages(&report, idle.load(Ordering::Relaxed)) {
                Ok(messages) => messages,
                Err(e) => {
                    warn!("Failed to encode tick output: {}", e);
                    continue;
                }
            };
        if let Err(e) = pub_motor.put(actuation_json).await {
            warn!("Failed to publish actuation: {}", e);
        }
        if let Err(e) = pub_health.put(health_json).await {
            warn!("Failed to publish health: {}", e);
        }
    }
}
