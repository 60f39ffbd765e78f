//! Ballot - election ledger client

mod args;
mod render;

use ballot_core::{ClientConfig, ClientError, ElectionClient, Notification, Notifier};
use chrono::Utc;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Seeded elections open this long after creation
const SEED_START_DELAY_SECS: i64 = 3_600;
const SEED_DURATION_SECS: i64 = 7 * 86_400;

#[derive(Parser, Debug)]
#[command(name = "ballot")]
#[command(about = "Multi-election voting ledger client", version)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint of the wallet / node
    #[arg(long, value_name = "URL")]
    rpc: Option<String>,

    /// Election contract address
    #[arg(long, value_name = "ADDRESS")]
    contract: Option<String>,

    /// Election to act on (defaults to the newest)
    #[arg(short, long, value_name = "ID")]
    election: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// List all elections
    Elections,

    /// Show candidates, results and your voter status
    Show,

    /// Cast your vote
    Vote {
        /// Candidate id
        candidate: u64,
    },

    /// Add a candidate to a scheduled election
    AddCandidate { name: String },

    /// Remove a candidate from a scheduled election
    RemoveCandidate { candidate: u64 },

    /// Authorize an address to vote
    Authorize { address: String },

    /// Revoke an address's authorization
    Revoke { address: String },

    /// Create a new election (deployer only)
    Create {
        name: String,

        /// Start time: unix seconds, RFC 3339, "YYYY-MM-DD HH:MM" or +1h
        #[arg(long)]
        start: String,

        /// End time, same formats as --start
        #[arg(long)]
        end: String,
    },

    /// Start the selected election
    Start,

    /// End the selected election
    End,

    /// Create an initial election opening in one hour and running seven days
    Seed {
        #[arg(long, default_value = "Initial Election")]
        name: String,
    },

    /// Follow the selected election and print changes
    Watch {
        /// Refresh interval in seconds
        #[arg(short, long, default_value = "5")]
        interval: u64,
    },

    /// Print the active configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    config.apply_env_overrides()?;
    if let Some(rpc) = &cli.rpc {
        config.rpc_url = rpc.clone();
    }
    if let Some(contract) = &cli.contract {
        config.contract_address = Some(contract.parse()?);
    }

    if cli.command == Commands::Config {
        println!("# {}", ClientConfig::config_path().display());
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let notifier = Arc::new(Notifier::new(config.notification_ttl()));
    let mut feed = notifier.subscribe();

    let outcome = match ElectionClient::from_config(&config, notifier.clone()) {
        Ok(client) => run(&cli, &client, &mut feed).await,
        Err(e) => Err(e),
    };
    drain(&mut feed);

    if let Err(e) = outcome {
        log::debug!("command failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn drain(feed: &mut broadcast::Receiver<Notification>) {
    while let Ok(n) = feed.try_recv() {
        render::notification(&n);
    }
}

async fn run(
    cli: &Cli,
    client: &Arc<ElectionClient>,
    feed: &mut broadcast::Receiver<Notification>,
) -> Result<(), ClientError> {
    client.connect().await?;
    if let Some(id) = cli.election {
        client.select(id).await?;
    }
    let gateway = client.gateway();

    match &cli.command {
        Commands::Elections => {
            render::session(&client.session().snapshot(), client.is_admin());
            render::elections(&client.elections(), client.selected());
        }
        Commands::Show => show(client),
        Commands::Vote { candidate } => {
            gateway.vote(*candidate).await?;
            show(client);
        }
        Commands::AddCandidate { name } => {
            gateway.add_candidate(name).await?;
            show(client);
        }
        Commands::RemoveCandidate { candidate } => {
            gateway.remove_candidate(*candidate).await?;
            show(client);
        }
        Commands::Authorize { address } => {
            gateway.authorize_voter(address).await?;
            show(client);
        }
        Commands::Revoke { address } => {
            gateway.revoke_authorization(address).await?;
            show(client);
        }
        Commands::Create { name, start, end } => {
            let now = Utc::now().timestamp();
            let start = parse_time_arg(client, start, now)?;
            let end = parse_time_arg(client, end, now)?;
            gateway.create_election(name, start, end).await?;
            render::elections(&client.elections(), client.selected());
        }
        Commands::Start => {
            gateway.start_election().await?;
            show(client);
        }
        Commands::End => {
            gateway.end_election().await?;
            show(client);
        }
        Commands::Seed { name } => {
            let start = Utc::now().timestamp() + SEED_START_DELAY_SECS;
            gateway
                .create_election(name, start, start + SEED_DURATION_SECS)
                .await?;
            render::elections(&client.elections(), client.selected());
        }
        Commands::Watch { interval } => watch(client, *interval, feed).await?,
        Commands::Config => {}
    }
    Ok(())
}

fn parse_time_arg(client: &ElectionClient, raw: &str, now: i64) -> Result<i64, ClientError> {
    args::parse_time(raw, now).map_err(|e| {
        client.notifier().error(e.clone());
        ClientError::Config(ballot_core::ConfigError::Invalid {
            field: "time".to_string(),
            message: e,
        })
    })
}

fn show(client: &ElectionClient) {
    render::session(&client.session().snapshot(), client.is_admin());
    match client.snapshot() {
        Some(snapshot) => render::election(&snapshot, &client.capabilities()),
        None => println!("\n  {}\n", "No election selected".bright_black()),
    }
}

async fn watch(
    client: &Arc<ElectionClient>,
    interval: u64,
    feed: &mut broadcast::Receiver<Notification>,
) -> Result<(), ClientError> {
    client.spawn_sync();
    drain(feed);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    let mut last = None;

    println!("{}", "👀 Watching for changes (Ctrl+C to exit)".cyan().bold());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // failures are reported through the notifier
                let _ = client.refresh_all().await;
                let snapshot = client.snapshot();
                if snapshot != last {
                    show(client);
                    last = snapshot;
                }
            }
            Ok(n) = feed.recv() => render::notification(&n),
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    client.shutdown();
    Ok(())
}
