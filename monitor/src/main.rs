use clap::Parser;
use log::{error, info};
use monitor::monitor::ServerMonitor;
use monitor::sources::{FileLogSource, OfflineResolver};
use std::path::PathBuf;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Main-method of the application.
/// Parses command-line arguments, then polls the server log on a timer and
/// logs a JSON status snapshot whenever something changed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Path to the Valheim dedicated server log file
        #[clap(short, long)]
        log_path: PathBuf,
        /// Seconds between polls
        #[clap(short, long, default_value = "10")]
        interval: u64,
    }

    env_logger::init();

    // Parse command line arguments
    let args = Args::parse();

    let source = FileLogSource::new(&args.log_path);
    let mut server_monitor = ServerMonitor::new(Box::new(source), Box::new(OfflineResolver));
    info!(
        "Monitoring {} every {}s",
        args.log_path.display(),
        args.interval
    );

    let mut timer = interval(Duration::from_secs(args.interval));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                if server_monitor.poll() > 0 {
                    match serde_json::to_string(&server_monitor.status_snapshot()) {
                        Ok(status) => info!("Server status: {}", status),
                        Err(e) => error!("Failed to serialize status snapshot: {}", e),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    Ok(())
}
