use clap::Parser;
use miniredis::{Config, Server};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3490)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Path to the append-only file
    #[arg(short, long, default_value = "database.aof")]
    aof: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Create configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config {
            bind_addr: args.bind,
            port: args.port,
            aof_path: args.aof,
            log_level: args.log_level,
            ..Default::default()
        }
    };

    // Initialize tracing
    let log_level = if args.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(format!("miniredis={}", log_level))
        .init();

    info!(
        "Starting miniredis v{} on {}:{} (aof: {})",
        env!("CARGO_PKG_VERSION"),
        config.bind_addr,
        config.port,
        config.aof_path.display()
    );

    let mut server = Server::new(config)?;

    // Setup signal handlers for graceful shutdown
    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, shutting down gracefully...");
        shutdown.shutdown();
    })?;

    // Run the server
    if let Err(e) = server.run() {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
