//! scenecast WebSocket server
//!
//! Serves one simulation session over WebSocket: clients send `start` /
//! `stop` text messages and receive one scene per text message.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;

use scenecast::{
    CapabilityRegistry, FileDescriptionSource, RecordingsInterpreter, SessionConfig, SessionError, SessionResult,
    SimulationSession, WsTransport,
};
use scenecast::capability::JsonFileRecordingReader;

/// Capability id of the built-in recordings interpreter.
const RECORDINGS_INTERPRETER_ID: &str = "recordings";

/// scenecast server - stream live simulation scenes over WebSocket
#[derive(Parser, Debug)]
#[command(name = "scenecast-server", version)]
struct Args {
    /// Session config file (TOML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Simulation description (.toml or .json); overrides the config file
    #[arg(long, short = 'd')]
    description: Option<PathBuf>,

    /// Address to listen on; overrides the config file
    #[arg(long, short = 'l')]
    listen: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Err(e) = run(Args::parse()).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> SessionResult<()> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(description) = args.description {
        config.description_path = Some(description);
    }
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let description_path = config
        .description_path
        .clone()
        .ok_or_else(|| SessionError::internal("no simulation description given (use --description or description_path)"))?;

    let registry = Arc::new(CapabilityRegistry::new());
    registry.register_interpreter(
        RECORDINGS_INTERPRETER_ID,
        Arc::new(RecordingsInterpreter::new(Arc::new(JsonFileRecordingReader))),
    )?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        description = %description_path.display(),
        tick_ms = config.tick_interval_ms,
        "scenecast server starting"
    );

    let listen_addr = config.listen_addr.clone();
    let session = Arc::new(SimulationSession::new(
        config,
        registry,
        Arc::new(FileDescriptionSource::new(description_path)),
    ));

    let transport = WsTransport::bind(listen_addr.as_str(), Arc::clone(&session)).await?;
    tracing::info!(addr = %transport.local_addr()?, "listening; press Ctrl+C to stop");
    transport
        .serve_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await;

    // Joins the producer and scheduler threads.
    tokio::task::spawn_blocking(move || session.shutdown())
        .await
        .map_err(|e| SessionError::internal(format!("shutdown task failed: {e}")))?;
    tracing::info!("shut down");
    Ok(())
}
