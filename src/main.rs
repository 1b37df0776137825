use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use zobo_drive_runtime::config::{DEFAULT_PREFIX, DriveConfig};
use zobo_drive_runtime::runtime::{self, RuntimeOptions};

#[derive(Parser, Debug)]
#[command(version, about = "Zobo drive runtime: link session, command dispatch, ramped motor control")]
struct Args {
    /// JSON drive configuration (defaults apply to omitted fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Key expression prefix for every link and status topic
    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// Do not acknowledge motion/indicator frames with "OK"
    #[arg(long)]
    no_ack: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();

    let mut drive = match &args.config {
        Some(path) => match DriveConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        },
        None => DriveConfig::default(),
    };
    if args.no_ack {
        drive.ack_commands = false;
    }

    let options = RuntimeOptions {
        prefix: args.prefix,
        drive,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
