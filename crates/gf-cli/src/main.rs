use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use gf_config::GfConfig;
use gf_runtime::dispatch::{Dispatch, OutputMode};
use gf_runtime::lifecycle::{wait_for_signal, Reactor};
use gf_runtime::tracing_init::init_tracing;
use gf_runtime::DispatchResponse;

#[derive(Parser)]
#[command(name = "gfence", about = "in-memory geospatial fence server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the fence server and read commands from stdin, one per line,
    /// until EOF or a shutdown signal.
    Run {
        /// Path to the server's TOML config file.
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run(config).await,
    }
}

async fn run(config_path: PathBuf) -> Result<()> {
    let config_path = config_path
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("config path '{}': {e}", config_path.display()))?;
    let config = GfConfig::load(&config_path)?;
    let base_dir = config_path
        .parent()
        .expect("config path must have a parent directory");

    let _guard = init_tracing(&config.logging, base_dir)?;

    let reactor = Reactor::start(&config)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::info!(domain = "sys", listen = %config.server.listen, "fence server started");

    let server = reactor.server();
    let cancel = reactor.cancel_token();
    let stdin_cancel = cancel.clone();

    let stdin_task = tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            if tokens.is_empty() {
                continue;
            }
            if tokens[0].eq_ignore_ascii_case("QUIT") || tokens[0].eq_ignore_ascii_case("SHUTDOWN") {
                break;
            }
            let response = match server.dispatch(&tokens, OutputMode::Json) {
                Ok(DispatchResponse::Json(body)) => body,
                Ok(DispatchResponse::Resp(_)) => unreachable!("OutputMode::Json never returns Resp"),
                Err(e) => format!("{{\"ok\":false,\"err\":{:?}}}", e.to_string()),
            };
            let _ = writeln!(stdout, "{response}");
        }
        stdin_cancel.cancel();
    });

    tokio::select! {
        _ = wait_for_signal(cancel.clone()) => {}
        _ = stdin_task => {}
    }

    reactor.shutdown();
    reactor.wait().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}
