use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use race_client::{run_push_channel, spawn_engine, EngineClock, TcpRoundService};
use race_core::load_engine_config;
use tracing::info;

mod app;
mod ui;

use app::RaceApp;

#[derive(Clone)]
struct ChannelWriter {
    sender: Sender<String>,
}

impl std::io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(text) = String::from_utf8(buf.to_vec()) {
            let _ = self.sender.send(text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Lane race prediction client", long_about = None)]
struct Cli {
    /// Address of the server's push event stream.
    #[arg(long, default_value = "127.0.0.1:42000")]
    push_endpoint: String,
    /// Address for round and wager RPC calls.
    #[arg(long, default_value = "127.0.0.1:42001")]
    rpc_endpoint: String,
    /// Engine config JSON. Falls back to RACE_ENGINE_CONFIG_PATH, then the builtin.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Player name sent with every RPC call.
    #[arg(long, default_value = "guest")]
    player: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let (log_tx, log_rx) = mpsc::channel::<String>();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_writer(move || ChannelWriter {
            sender: log_tx.clone(),
        })
        .init();

    let cli = Cli::parse();
    let (config, source) = load_engine_config(cli.config.as_deref());
    info!(
        push = %cli.push_endpoint,
        rpc = %cli.rpc_endpoint,
        player = %cli.player,
        config = ?source,
        "client.starting"
    );

    let service = Arc::new(TcpRoundService::new(cli.rpc_endpoint, cli.player));
    let engine = spawn_engine(Arc::clone(&config), service, EngineClock::system());
    let push = tokio::spawn(run_push_channel(cli.push_endpoint, engine.inputs()));

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let state = engine.state();
    let inputs = engine.inputs();
    let ui_handle = std::thread::spawn(move || -> Result<()> {
        let app = RaceApp::new(state, inputs, config, shutdown_tx, log_rx)?;
        app.run()
    });

    let _ = tokio::task::spawn_blocking(move || shutdown_rx.recv()).await;
    info!("client.shutdown");
    push.abort();
    engine.shutdown();

    match ui_handle.join() {
        Ok(result) => result,
        Err(_) => Err(eyre!("ui thread panicked")),
    }
}
