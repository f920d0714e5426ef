use clap::Parser;
use log::{error, info};
use server::config::{GroupConfig, ServerConfig};
use server::network::{Server, ServerMessage};
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, then runs the party server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Maximum number of concurrent sessions
        #[clap(short, long, default_value = "256")]
        max_sessions: usize,
        /// Seconds of silence before a session is closed
        #[clap(short, long, default_value = "5")]
        timeout: u64,
        /// Ready check duration in milliseconds
        #[clap(long, default_value = "35000")]
        ready_check_ms: u64,
        /// Let players invite game masters
        #[clap(long)]
        allow_gm_group: bool,
        /// Let players of opposite teams group up
        #[clap(long)]
        allow_cross_faction: bool,
    }

    env_logger::init();

    let args = Args::parse();

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        max_sessions: args.max_sessions,
        session_timeout: Duration::from_secs(args.timeout),
        group: GroupConfig {
            allow_gm_group: args.allow_gm_group,
            allow_cross_faction: args.allow_cross_faction,
            ready_check_duration: Duration::from_millis(args.ready_check_ms),
        },
    };

    let mut server = Server::new(config).await?;

    // Handle shutdown gracefully
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            if shutdown.send(ServerMessage::Shutdown).is_err() {
                error!("Server loop already stopped");
            }
        }
    });

    server.run().await
}
