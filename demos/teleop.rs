// Keyboard teleop over the zenoh link: W forward (ramped), S reverse, A/D turn,
// J/L steer in manual mode, space stop, 1-4 LED colours, V version, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

const PREFIX: &str = "zobo";
const PEER_ID: &str = "teleop";
const KEEPALIVE_MS: u64 = 100; // well inside the vehicle's 300 ms watchdog
const INPUT_TIMEOUT_MS: u64 = 250; // Stop after this much time with no movement input
const STEER_STEP: u8 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    // Print every status frame the vehicle sends back
    let _replies = session
        .declare_subscriber(format!("{}/link/{}/tx", PREFIX, PEER_ID))
        .callback(|sample| {
            let text = String::from_utf8_lossy(&sample.payload().to_bytes()).into_owned();
            info!("Vehicle: {}", text);
        })
        .await?;

    // Connect, then enable notifications
    let _presence = session
        .liveliness()
        .declare_token(format!("{}/link/peer/{}", PREFIX, PEER_ID))
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    session
        .put(format!("{}/link/{}/cccd", PREFIX, PEER_ID), vec![0x01u8, 0x00])
        .await?;

    let publisher = session
        .declare_publisher(format!("{}/link/{}/rx", PREFIX, PEER_ID))
        .await?;

    info!("Controls: W/S=forward/reverse, A/D=turn, J/L=steer, SPACE=stop, 1-4=LED, V=version, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut steer: u8 = 50;
    let mut moving = false;
    let mut last_movement_input = Instant::now();
    let mut last_sent = Instant::now();

    loop {
        let mut frame: Option<Vec<u8>> = None;

        // Poll for key with 20ms timeout
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => frame = Some(vec![0x01]),
                    KeyCode::Char('s') if pressed => frame = Some(vec![0x00]),
                    KeyCode::Char('d') if pressed => frame = Some(vec![0x03]),
                    KeyCode::Char('a') if pressed => frame = Some(vec![0x04]),

                    // Manual steering around the centre value
                    KeyCode::Char('j') if pressed => {
                        steer = steer.saturating_sub(STEER_STEP);
                        frame = Some(vec![0x05, steer]);
                    }
                    KeyCode::Char('l') if pressed => {
                        steer = steer.saturating_add(STEER_STEP).min(100);
                        frame = Some(vec![0x05, steer]);
                    }

                    KeyCode::Char(' ') if pressed => {
                        steer = 50;
                        frame = Some(vec![0x02]);
                    }

                    KeyCode::Char('1') if pressed => frame = Some(vec![10]),
                    KeyCode::Char('2') if pressed => frame = Some(vec![20]),
                    KeyCode::Char('3') if pressed => frame = Some(vec![30]),
                    KeyCode::Char('4') if pressed => frame = Some(vec![40]),
                    KeyCode::Char('v') if pressed => frame = Some(vec![0x62]),

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => {
                        publisher.put(vec![0x02u8]).await?;
                        break;
                    }

                    _ => {}
                }
            }
        }

        if let Some(bytes) = &frame {
            if matches!(bytes[0], 0x00..=0x05) && bytes[0] != 0x02 {
                moving = true;
                last_movement_input = Instant::now();
            }
        }

        // Stop once if no movement input for INPUT_TIMEOUT_MS
        if frame.is_none()
            && moving
            && last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS)
        {
            moving = false;
            frame = Some(vec![0x02]);
        }

        // Keep the link alive between commands
        if frame.is_none() && last_sent.elapsed() > Duration::from_millis(KEEPALIVE_MS) {
            frame = Some(vec![0x70]);
        }

        if let Some(bytes) = frame {
            publisher.put(bytes).await?;
            last_sent = Instant::now();
        }
    }

    Ok(())
}
