//! # infohub
//!
//! Connects to the local IoT gateway, builds the sensor collection and logs
//! the JSON sensor report on a fixed interval until interrupted.
//!
//! ```bash
//! INFOHUB_GATEWAY_PASSWORD=0123456789abcdef infohub --gateway 192.168.1.20
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use infohub_core::{report, Gateway, GatewayConfigBuilder};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gateway IP address
    #[arg(short, long, env = "INFOHUB_GATEWAY_ADDR")]
    gateway: String,

    /// 16-character gateway password
    #[arg(short, long, env = "INFOHUB_GATEWAY_PASSWORD", hide_env_values = true)]
    password: String,

    /// Gateway UDP port
    #[arg(long, default_value_t = infohub_core::GATEWAY_PORT)]
    port: u16,

    /// Do not listen for multicast broadcasts
    #[arg(long)]
    no_multicast: bool,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = infohub_core::REQUEST_TIMEOUT_MS)]
    request_timeout_ms: u64,

    /// Seconds between sensor reports
    #[arg(long, default_value = "60")]
    report_interval: u64,

    /// Seconds to wait for in-flight events on shutdown (0 = don't wait)
    #[arg(long, default_value = "0")]
    drain_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::new(level.as_str())
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("infohub v{}", env!("CARGO_PKG_VERSION"));

    let mut builder = GatewayConfigBuilder::parse(&args.gateway, args.password.clone())?
        .with_port(args.port)
        .with_request_timeout_ms(args.request_timeout_ms);
    if args.no_multicast {
        builder = builder.without_multicast();
    }

    let gateway = Gateway::new(builder.build())?;
    gateway.start().await.context("gateway startup")?;

    let mut ticker = tokio::time::interval(Duration::from_secs(args.report_interval.max(1)));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let json = report::render(&gateway, chrono::Utc::now())?;
                info!(report = %json, "Sensor report");
            }
        }
    }

    info!("Shutdown signal caught, exiting");
    gateway.stop();
    if args.drain_timeout > 0 && !gateway.drain(Duration::from_secs(args.drain_timeout)).await {
        tracing::warn!("In-flight events still running at exit");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
