mod auth;
mod catalog;
mod component;
mod context;
mod frame;
mod server;

use std::path::PathBuf;
use std::time::Duration;

use clap::{arg, Command};
use pluto_env::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::component::{Component, HeartbeatKeeper, Sweeper};
use crate::context::ApplicationContext;
use crate::frame::EventFrame;
use crate::server::run_server;

fn cli() -> Command {
    Command::new("pluto-hub")
        .about("Pluto Hub: ledger, contract escrow, and lobbies for game backends.")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .arg(arg!([config] "The path to config file"))
                .arg(arg!(-g <game> ... "The path to a game catalog json file").required(false)),
        )
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub async fn run(path: PathBuf, game_paths: Vec<String>) -> anyhow::Result<()> {
    let config = Config::from_path(&path).await;
    let hub_config = config
        .hub
        .ok_or_else(|| anyhow::anyhow!("Missing [hub] section in config"))?;

    // Keep the appender guard alive for the process lifetime.
    let _guard = match &hub_config.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "pluto-hub.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter()).init();
            None
        }
    };

    let context = ApplicationContext::try_new(hub_config)?;
    catalog::load_catalog(&context.storage, &game_paths).await?;

    let (sweeper, sweeper_ctx) = Sweeper::init(
        context.engine.clone(),
        context.lobby_manager.clone(),
        Duration::from_secs(context.config.sweep_interval_secs()),
    );
    let mut sweeper_handle = sweeper.start(sweeper_ctx);

    let (keeper, keeper_ctx) = HeartbeatKeeper::init(
        context.broadcaster.clone(),
        Duration::from_secs(context.config.heartbeat_interval_secs()),
    );
    let mut keeper_handle = keeper.start(keeper_ctx);

    let server_handle = run_server(context).await?;
    server_handle.stopped().await;

    info!("Server stopped, shutting down components");
    sweeper_handle.send(EventFrame::Shutdown).await;
    keeper_handle.send(EventFrame::Shutdown).await;
    sweeper_handle.wait().await;
    keeper_handle.wait().await;
    Ok(())
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("run", subcommand_matches)) => {
            let path: PathBuf = subcommand_matches
                .get_one::<String>("config")
                .map(Into::into)
                .unwrap_or_else(|| "config.toml".into());
            let game_paths: Vec<String> = subcommand_matches
                .get_many::<String>("game")
                .map(|paths| paths.cloned().collect())
                .unwrap_or_default();
            run(path, game_paths).await
        }
        _ => unreachable!(),
    }
}
