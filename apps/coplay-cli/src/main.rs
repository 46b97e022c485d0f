use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use rand::RngCore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

mod config;
mod console;
mod tally;

use coplay_core::{ClientId, SessionDescriptor};
use coplay_session::backoff::ReconnectPolicy;
use coplay_session::{
    ActionRelay, EventSink, RemotePlayClient, SessionConfig, SessionTransport, Store,
};
use coplay_transport_websocket::{WebSocketConnector, WebSocketLinkConfig};

use crate::config::CliConfig;
use crate::console::{parse_command, Command};
use crate::tally::{Tally, TallyAction};

type TallyClient = RemotePlayClient<WebSocketConnector, Tally, TallyAction>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a shared session and mirror its tally
    Join {
        /// Session to join
        session: String,
        /// Session secret
        #[arg(long, env = "COPLAY_SECRET", default_value = "")]
        secret: String,
        /// Overrides the configured client id
        #[arg(long)]
        client_id: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

fn resolve_client_id(configured: Option<String>) -> Result<ClientId, coplay_core::CoreError> {
    match configured {
        Some(raw) => ClientId::new(raw),
        None => {
            let mut bytes = [0u8; 4];
            rand::thread_rng().fill_bytes(&mut bytes);
            ClientId::new(format!("cli-{}", hex::encode(bytes)))
        }
    }
}

fn session_config(config: &CliConfig, client_id: ClientId) -> SessionConfig {
    let mut session = SessionConfig::new(config.base_url.clone(), client_id);
    session.heartbeat_interval = config.heartbeat_interval;
    session.num_players = config.num_players;
    session.rng_seed = config.rng_seed;
    session.reconnect = ReconnectPolicy {
        max_slot_idx: config.reconnect_max_slot_idx,
        ..ReconnectPolicy::default()
    };
    session
}

fn print_status(client: &TallyClient) {
    let transport = client.transport();
    let own = transport.client_key();
    println!(
        "{} as {} ({:?}, counter {})",
        transport
            .descriptor()
            .map_or("<none>", |d| d.session_id.as_str()),
        own,
        transport.state(),
        transport.event_counter(),
    );
    for peer in client.relay().connected_peers(&own) {
        println!("  peer {peer}");
    }
    let state = client.state();
    println!(
        "  total {} ({} pending), notes: {}",
        state.total,
        client.relay().store().ledger().len(),
        state.notes.join(" | ")
    );
}

fn execute(client: &mut TallyClient, command: Command) {
    let result = match command {
        Command::Adjust(delta) => client.call(tally::ADJUST, tally::adjust_args(delta)),
        Command::Note(text) => client.call(tally::NOTE, tally::note_args(&text)),
        Command::Status => {
            print_status(client);
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    if let Err(err) = result {
        warn!("dispatch failed: {err}");
    }
}

async fn run_join(config: CliConfig, descriptor: SessionDescriptor, client_id: ClientId) {
    let connector = WebSocketConnector::new(WebSocketLinkConfig {
        connect_timeout: config.connect_timeout,
        ..WebSocketLinkConfig::default()
    });
    let transport = SessionTransport::new(session_config(&config, client_id), connector);
    let relay = ActionRelay::new(Store::new(Tally::default(), tally::reduce), tally::registry());
    let mut client = RemotePlayClient::new(transport, relay);

    info!(session = %descriptor.session_id, base_url = %config.base_url, "joining session");
    client.connect(descriptor);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(config.tick_interval);
    let mut last_seen = client.state().clone();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                client.tick(Instant::now());
                for id in client.relay_mut().store_mut().drain_rejections() {
                    warn!(%id, "a peer acted first; local action rolled back");
                }
                if client.state() != &last_seen {
                    last_seen = client.state().clone();
                    info!(total = last_seen.total, notes = last_seen.notes.len(), "tally changed");
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Some(Command::Quit) => break,
                    Some(command) => execute(&mut client, command),
                    None => warn!("unrecognised input: {line:?} (try +N, -N, note <text>, status, quit)"),
                },
                Ok(None) => break,
                Err(err) => {
                    error!("stdin read failed: {err}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("leaving session");
    client.disconnect();
    client.tick(Instant::now());
}

#[tokio::main]
async fn main() {
    let filter = std::env::var("COPLAY_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let config = match CliConfig::new(cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Config => println!("{config:#?}"),
        Commands::Join {
            session,
            secret,
            client_id,
        } => {
            let descriptor = match SessionDescriptor::new(session, secret) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    error!("invalid session: {err}");
                    std::process::exit(2);
                }
            };
            let client_id = match resolve_client_id(client_id.or_else(|| config.client_id.clone()))
            {
                Ok(id) => id,
                Err(err) => {
                    error!("invalid client id: {err}");
                    std::process::exit(2);
                }
            };
            run_join(config, descriptor, client_id).await;
        }
    }
}
