use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use nsqd_core::{logging, Config, TopologyRegistry};
use nsqd_lookup::run_lookup_router;

#[derive(Parser, Debug)]
#[command(name = "nsqd")]
#[command(about = "nsqd node announcing its topology to nsqlookupd", long_about = None)]
struct Args {
    /// Path to a TOML/YAML/JSON config file
    #[arg(long, env = "NSQD_CONFIG")]
    config: Option<String>,

    /// TCP listen address announced to lookupd peers
    #[arg(long)]
    tcp_address: Option<String>,

    /// lookupd TCP address (may be given multiple times)
    #[arg(long = "lookupd-tcp-address", value_name = "HOST:PORT")]
    lookupd_tcp_addresses: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Command line values win over file and environment
    fn apply(self, config: &mut Config) {
        if let Some(tcp_address) = self.tcp_address {
            config.tcp_address = tcp_address;
        }
        if !self.lookupd_tcp_addresses.is_empty() {
            config.lookupd_tcp_addresses = self.lookupd_tcp_addresses;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("nsqd starting...");
    info!("TCP address: {}", config.tcp_address);

    // 3. Topology shared with the lookup router
    let registry = Arc::new(TopologyRegistry::default());

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    // 4. Run the lookup router until shutdown
    let listen = config.tcp_socket_addr()?;
    let stats = run_lookup_router(
        listen,
        &config.lookupd_tcp_addresses,
        &config.lookup,
        registry,
        shutdown,
    )
    .await
    .map_err(|e| {
        error!("Lookup router failed to start: {}", e);
        anyhow::anyhow!("lookup router failed: {e}")
    })?;

    info!(
        heartbeats = stats.heartbeats,
        announcements = stats.announcements,
        resyncs = stats.resyncs,
        resyncs_deferred = stats.resyncs_deferred,
        commands_ok = stats.commands_ok,
        commands_failed = stats.commands_failed,
        "nsqd stopped"
    );

    Ok(())
}

/// Wait for SIGTERM or SIGINT/Ctrl+C
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
