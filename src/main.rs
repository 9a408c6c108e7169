use clap::Parser;
use tracing_subscriber::EnvFilter;

use auger_runtime::config::{DEFAULT_BAUDRATE, DEFAULT_DEVICE_ID};

/// Drive an auger sample-introduction instrument over a VMK serial link.
#[derive(Debug, Parser)]
struct Args {
    /// Serial port, e.g. /dev/ttyUSB0 or COM3
    port: String,

    /// Line speed
    #[arg(long, default_value_t = DEFAULT_BAUDRATE)]
    baud: u32,

    /// 3-bit device id on the shared line
    #[arg(long, default_value_t = DEFAULT_DEVICE_ID)]
    device_id: u8,
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    if let Err(e) = auger_runtime::runtime::run(&args.port, args.baud, args.device_id) {
        eprintln!("Runtime error: {e}");
        std::process::exit(1);
    }
}
