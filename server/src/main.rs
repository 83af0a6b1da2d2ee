use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use server::network::Server;
use server::transport;
use server::world::{World, WorldConfig};
use std::time::Duration;
use tokio::net::TcpListener;

// Command line arguments, each overridable from the environment
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Port for the HTTP health surface and WebSocket framing
    #[clap(short, long, env = "PORT", default_value = "3001")]
    port: u16,

    /// Port for the newline-delimited JSON fallback framing
    #[clap(long, env = "TCP_PORT", default_value = "3002")]
    tcp_port: u16,

    /// Monster simulation cadence (updates per second)
    #[clap(short, long, env = "TICK_HZ", default_value = "10")]
    tick_hz: u32,

    /// Seconds without a position report before a player is dropped
    #[clap(long, env = "PLAYER_TIMEOUT_SECS", default_value = "120")]
    player_timeout_secs: u64,

    /// Shared GM password; omitting it disables the GM surface entirely
    #[clap(long, env = "GM_PASSWORD")]
    gm_password: Option<String>,

    /// External URL to self-ping so free-tier hosts keep the process warm
    #[clap(long, env = "RENDER_EXTERNAL_URL")]
    render_external_url: Option<String>,

    /// "true" forces debug-level logging regardless of RUST_LOG
    #[clap(long, env = "DEBUG", default_value = "false")]
    debug: String,
}

const SELF_PING_INTERVAL: Duration = Duration::from_secs(600);

async fn run_self_ping(url: String) {
    let client = reqwest::Client::new();
    let mut interval = tokio::time::interval(SELF_PING_INTERVAL);
    // The first tick completes immediately; skip it so boot stays quiet.
    interval.tick().await;

    loop {
        interval.tick().await;
        match client.get(&url).send().await {
            Ok(response) => debug!("Self-ping {} -> {}", url, response.status()),
            Err(err) => warn!("Self-ping {} failed: {}", url, err),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.debug.eq_ignore_ascii_case("true") {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();

    info!(
        "Starting map server (ws/http port {}, tcp port {}, {} Hz tick)",
        args.port, args.tcp_port, args.tick_hz
    );
    if args.gm_password.is_none() {
        info!("GM_PASSWORD not set; GM surface disabled");
    }

    let config = WorldConfig {
        tick_hz: args.tick_hz,
        player_timeout_ms: args.player_timeout_secs * 1_000,
        gm_password: args.gm_password,
        ..Default::default()
    };

    let server = Server::new(World::new(config));
    let server_tx = server.handle();

    let http_listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    let tcp_listener = TcpListener::bind(("0.0.0.0", args.tcp_port)).await?;

    let http_tx = server_tx.clone();
    tokio::spawn(async move {
        if let Err(err) = transport::run_http(http_listener, http_tx).await {
            error!("HTTP listener failed: {}", err);
        }
    });

    let tcp_tx = server_tx.clone();
    tokio::spawn(async move {
        if let Err(err) = transport::run_tcp(tcp_listener, tcp_tx).await {
            error!("TCP listener failed: {}", err);
        }
    });

    if let Some(url) = args.render_external_url {
        info!("Self-ping enabled against {}", url);
        tokio::spawn(run_self_ping(url));
    }

    server.run().await;
    Ok(())
}
