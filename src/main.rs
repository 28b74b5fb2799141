// Main binary that starts the server
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use std::io::stderr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

use capstan_server::{run as run_server, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Capstan Deployment Orchestration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the capstan API server (default action).
    Serve(ServeArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0", env = "CAPSTAN_HOST")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "CAPSTAN_PORT")]
    port: u16,

    /// Directory for the deployment database.
    #[arg(long, default_value = "/var/lib/capstan", env = "CAPSTAN_DATA_DIR")]
    data_dir: PathBuf,

    /// Directory for per-deployment log files.
    #[arg(long, default_value = "/var/log/capstan", env = "CAPSTAN_LOG_DIR")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Respect RUST_LOG when set, fall back to verbose/info for our crates and
    // quiet the HTTP stack.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let default_directives = format!(
        "capstan={level},capstan_server={level},capstan_orchestrator={level},capstan_actions={level},capstan_providers={level},tower=warn,hyper=warn,reqwest=warn,mio=warn,want=warn",
        level = default_level
    );
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    registry()
        .with(filter)
        .with(fmt::layer().with_writer(stderr))
        .init();

    // Register a panic handler to ensure a clean exit.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        original_hook(panic_info);
        eprintln!("Exiting due to panic");
        std::process::exit(1);
    }));

    // Backup Ctrl+C handler. Only fires if the server's own handler does not
    // catch the signal.
    tokio::spawn(async {
        tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;
        if let Ok(()) = tokio::signal::ctrl_c().await {
            eprintln!("\nEmergency shutdown: Forcing exit after Ctrl+C");
            std::process::exit(130);
        }
    });

    let args = match cli.command {
        Some(Commands::Serve(args)) => args,
        // No subcommand starts the server with its defaults.
        None => ServeArgs::parse_from(["capstan"]),
    };

    info!("Starting capstan server - press Ctrl+C to stop");
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        data_dir: args.data_dir,
        log_dir: args.log_dir,
    };
    if let Err(e) = run_server(config).await {
        error!("Server failed to run: {:#}", e);
        eprintln!("Error running capstan server: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
