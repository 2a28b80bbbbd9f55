use clap::Parser;
use clap_derive::Parser;
use devlink::clock::{MonotonicClock, Timestamp};
use devlink::config::DeviceConfig;
use devlink::device::RemoteDevice;
use devlink::driver::run_device;
use devlink::handler::DeviceHandler;
use devlink::identity::DeviceIdentity;
use devlink::transport::AlwaysUp;
use devlink::transport::udp::UdpTransport;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, Level};

#[derive(Parser)]
struct Args {
    #[clap(long, default_value_t = 0x1234)]
    device_id: u64,

    #[clap(long, default_value = "demo")]
    device_type: String,

    #[clap(long, default_value_t = 5000)]
    local_port: u16,

    #[clap(long, default_value_t = 5001)]
    server_port: u16,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

/// echoes every command's first argument back as the response code
struct LoggingHandler;
impl DeviceHandler for LoggingHandler {
    fn on_link_connected(&mut self, now: Timestamp) {
        info!("link connected @ {:?}", now);
    }

    fn on_server_connected(&mut self, now: Timestamp) {
        info!("server connected @ {:?}", now);
    }

    fn on_server_disconnected(&mut self, now: Timestamp) {
        info!("server disconnected @ {:?}", now);
    }

    fn on_command(&mut self, command: u16, args: [u16; 4], payload: &[u8]) -> u16 {
        info!("command {}: {:?} {:?}", command, args, String::from_utf8_lossy(payload));
        args[0]
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let device = RemoteDevice::new(
        DeviceConfig::new(args.local_port, args.server_port),
        DeviceIdentity::new(args.device_id, args.device_type, 1),
        Box::new(UdpTransport::new()),
        Box::new(AlwaysUp),
        Box::new(MonotonicClock::new()),
        LoggingHandler,
    )?;

    let (send_shutdown, recv_shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = send_shutdown.send(true);
        }
    });

    run_device(device, Duration::from_millis(50), recv_shutdown).await?;
    Ok(())
}
