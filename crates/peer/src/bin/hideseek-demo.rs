//! Runs a host and a handful of wandering bot clients over the loopback
//! transport, logging the game as it plays out.

use std::time::Duration;

use clap::Parser;
use hideseek_peer::{
    ClientHandle, LoopbackNetwork, PeerConfig, PeerError, Wander, spawn_client, spawn_host,
};
use hideseek_session::{ClientSession, HostSession, Phase, SessionConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line interface for the loopback demo.
#[derive(Parser, Debug)]
#[command(name = "hideseek-demo")]
#[command(about = "Play a hide-and-seek session between in-process bots")]
struct Cli {
    /// Number of bot clients joining the host.
    #[arg(long, default_value = "3")]
    bots: u64,

    /// Seed for session codes, identities, layout and bot movement.
    #[arg(long, default_value = "7")]
    seed: u64,

    /// Length of the hiding phase in seconds.
    #[arg(long, default_value = "5")]
    hide_secs: u64,

    /// Total game length in seconds, counted from the start of hiding.
    #[arg(long, default_value = "30")]
    game_secs: u64,

    /// Movement tick rate.
    #[arg(long, default_value = "60")]
    tick_hz: u32,
}

#[tokio::main]
async fn main() -> Result<(), PeerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let session_config = SessionConfig {
        hide_duration: Duration::from_secs(cli.hide_secs),
        game_duration: Duration::from_secs(cli.game_secs),
        ..SessionConfig::default()
    };
    let peer_config = PeerConfig {
        tick_rate_hz: cli.tick_hz,
        ..PeerConfig::default()
    };

    let network = LoopbackNetwork::default();
    let host_session = HostSession::create("Host", session_config.clone(), cli.seed)?;
    let host = spawn_host(
        &network,
        host_session,
        Wander::new(cli.seed, 90),
        peer_config.clone(),
    )?;
    info!(code = host.code(), "hosting");

    let mut bots: Vec<ClientHandle> = Vec::new();
    for bot in 1..=cli.bots {
        let seed = cli.seed.wrapping_add(bot);
        let session = ClientSession::new(
            &format!("Bot {bot}"),
            host.code(),
            session_config.clone(),
            seed,
        )?;
        bots.push(spawn_client(&network, session, Wander::new(seed, 45), peer_config.clone()).await?);
    }

    let mut view = host.view();
    view.wait_for(|v| v.participants.len() as u64 == cli.bots + 1)
        .await
        .map_err(|_| PeerError::Stopped)?;
    host.start_game().await?;

    let ended = view
        .wait_for(|v| v.phase == Phase::Ended)
        .await
        .map_err(|_| PeerError::Stopped)?
        .clone();
    if let Some(result) = &ended.result {
        let winners: Vec<&str> = result.winners.iter().map(|p| p.name.as_str()).collect();
        info!(winners = ?winners, "{}", result.message());
    }

    for bot in bots {
        bot.leave().await?;
    }
    host.shutdown().await;
    Ok(())
}
