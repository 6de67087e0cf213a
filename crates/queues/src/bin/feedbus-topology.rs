//! feedbus-topology: inspect and guard the queue registry.
//!
//! # Usage
//!
//! ```bash
//! # Every queue, or one domain
//! feedbus-topology list
//! feedbus-topology list --domain feed --json
//!
//! # Name <-> routing key
//! feedbus-topology lookup UrlFetchCompleted
//! feedbus-topology resolve url.fetch.completed
//!
//! # Record what is deployed, then check the next build against it
//! feedbus-topology snapshot --output deploy/queues.json
//! feedbus-topology verify deploy/queues.json
//!
//! # Validate a deployment file
//! feedbus-topology check-config config/feedbus.toml
//! ```

use clap::{Parser, Subcommand};
use feedbus_queues::{
    verify_registry, FeedbusConfig, MessageBrokerQueue, QueueDomain, QueueEntry,
    RegistrySnapshot,
};

/// Inspect and guard the feed pipeline's queue registry.
#[derive(Parser, Debug)]
#[command(name = "feedbus-topology", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered queues.
    List {
        /// Only queues in this domain: url, feed or job.
        #[arg(long)]
        domain: Option<QueueDomain>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Print the routing key for a symbolic queue name.
    Lookup { name: String },
    /// Print the symbolic queue name for a routing key.
    Resolve { routing_key: String },
    /// Write the current registry as a JSON snapshot.
    Snapshot {
        /// Output path (stdout when omitted).
        #[arg(long, short)]
        output: Option<String>,
    },
    /// Compare a stored snapshot with the current registry.
    /// Fails when a routing key was removed or changed.
    Verify { snapshot: String },
    /// Validate a deployment TOML against the registry.
    CheckConfig { path: String },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    verify_registry()?;

    match cli.command {
        Command::List { domain, json } => list(domain, json),
        Command::Lookup { name } => {
            println!("{}", MessageBrokerQueue::from_name(&name)?.routing_key());
            Ok(())
        }
        Command::Resolve { routing_key } => {
            println!("{}", routing_key.parse::<MessageBrokerQueue>()?.name());
            Ok(())
        }
        Command::Snapshot { output } => {
            let snapshot = RegistrySnapshot::current();
            match output {
                Some(path) => {
                    snapshot.write_to(&path)?;
                    tracing::info!(path = %path, queues = snapshot.queues.len(), "snapshot written");
                }
                None => println!("{}", snapshot.to_json()?),
            }
            Ok(())
        }
        Command::Verify { snapshot } => verify(&snapshot),
        Command::CheckConfig { path } => check_config(&path),
    }
}

fn list(domain: Option<QueueDomain>, json: bool) -> anyhow::Result<()> {
    let queues: Vec<MessageBrokerQueue> = MessageBrokerQueue::ALL
        .into_iter()
        .filter(|q| domain.map_or(true, |d| q.domain() == d))
        .collect();

    if json {
        let entries: Vec<QueueEntry> = queues.into_iter().map(QueueEntry::from).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let width = queues.iter().map(|q| q.name().len()).max().unwrap_or(0);
    for queue in queues {
        println!(
            "{:<5} {:<width$}  {}",
            queue.domain(),
            queue.name(),
            queue.routing_key()
        );
    }
    Ok(())
}

fn verify(path: &str) -> anyhow::Result<()> {
    let deployed = RegistrySnapshot::read_from(path)?;
    let changes = deployed.diff(&RegistrySnapshot::current());

    if changes.is_empty() {
        println!("registry matches {path}");
        return Ok(());
    }

    for change in &changes {
        println!("{change}");
    }

    let breaking = changes.iter().filter(|c| c.is_breaking()).count();
    if breaking > 0 {
        anyhow::bail!(
            "{breaking} breaking change(s) against {path}; producers and consumers must be redeployed together"
        );
    }
    Ok(())
}

fn check_config(path: &str) -> anyhow::Result<()> {
    let config = FeedbusConfig::from_file(path)?;

    for queue in MessageBrokerQueue::ALL {
        let producers = config.producers_of(queue);
        let consumers = config.consumers_of(queue);
        if producers.is_empty() && consumers.is_empty() {
            continue;
        }
        println!(
            "{}: published by [{}], consumed by [{}]",
            queue.routing_key(),
            producers.join(", "),
            consumers.join(", ")
        );
    }

    let unproduced = config.unproduced_queues();
    if !unproduced.is_empty() {
        let keys: Vec<&str> = unproduced.iter().map(|q| q.routing_key()).collect();
        println!("warning: consumed but never published: {}", keys.join(", "));
    }

    println!("{path}: ok ({} services)", config.services.len());
    Ok(())
}
