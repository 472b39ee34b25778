//! Consent store command-line interface.
//!
//! Runs the HTTP API over a local SQLite store, or performs single operations
//! against either a local store (`--mode server`) or a remote API
//! (`--mode client`).
//!
//! Usage:
//!   cstore server --bind 0.0.0.0:1323
//!   cstore record <subject> <custodian> <actor> Observation,Patient
//!   cstore check <subject> <custodian> <actor> Patient --at 2024-06-01
//!   cstore --mode client --address localhost:1323 list <actor>

mod commands;
mod ids;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cstore_config::{ConsentStoreConfig, EngineMode};
use cstore_contracts::ConsentResult;

use commands::RecordRequest;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Record, check and query patient consent.
///
/// Settings come from `--config`, then `CSTORE_*` environment variables,
/// then the flags below.
#[derive(Parser)]
#[command(name = "cstore", about = "Patient consent record store")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// `server` for a local SQLite store, `client` for a remote API.
    #[arg(long, global = true)]
    mode: Option<EngineMode>,

    /// SQLite database path, or `:memory:`.
    #[arg(long, global = true)]
    connection_string: Option<String>,

    /// Server address (`host:port`).
    #[arg(long, global = true)]
    address: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API until Ctrl-C.
    Server {
        /// Listen address, defaults to the configured address.
        #[arg(long)]
        bind: Option<String>,
    },
    /// List consent given to an actor.
    List {
        actor: String,
        subject: Option<String>,
        /// Moment to evaluate validity at (RFC 3339 or YYYY-MM-DD).
        #[arg(long)]
        at: Option<String>,
    },
    /// Record a consent.
    Record(RecordArgs),
    /// Check whether consent is given for a data class.
    Check {
        subject: String,
        custodian: String,
        actor: String,
        data_class: String,
        #[arg(long)]
        at: Option<String>,
    },
    /// Show the consent record with the given hash.
    Find {
        hash: String,
        /// Fail unless the record is the latest version of its chain.
        #[arg(long)]
        latest: bool,
    },
    /// Delete the consent record with the given hash.
    Delete { hash: String },
    /// Report backend health.
    Diagnostics,
}

#[derive(Args)]
struct RecordArgs {
    subject: String,
    custodian: String,
    actor: String,
    /// Comma-separated data classes.
    data_classes: String,
    /// Header id, derived from the triple when omitted.
    #[arg(long)]
    id: Option<String>,
    /// Record hash, derived from the content when omitted.
    #[arg(long)]
    hash: Option<String>,
    /// Hash of the version this record replaces.
    #[arg(long)]
    previous_hash: Option<String>,
    /// Start of validity, defaults to now.
    #[arg(long)]
    valid_from: Option<String>,
    /// End of validity (exclusive), open-ended when omitted.
    #[arg(long)]
    valid_to: Option<String>,
}

impl From<RecordArgs> for RecordRequest {
    fn from(args: RecordArgs) -> Self {
        RecordRequest {
            subject: args.subject,
            custodian: args.custodian,
            actor: args.actor,
            data_classes: args.data_classes,
            id: args.id,
            hash: args.hash,
            previous_hash: args.previous_hash,
            valid_from: args.valid_from,
            valid_to: args.valid_to,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
        Err(e) => {
            eprintln!("cstore error: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> ConsentResult<ConsentStoreConfig> {
    let mut config = match &cli.config {
        Some(path) => ConsentStoreConfig::from_file(path)?,
        None => ConsentStoreConfig::default(),
    };
    config.apply_env()?;

    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(connection_string) = &cli.connection_string {
        config.connection_string = connection_string.clone();
    }
    if let Some(address) = &cli.address {
        config.address = address.clone();
    }

    config.validate()?;
    Ok(config)
}

// ── Command dispatch ──────────────────────────────────────────────────────────

fn run(cli: Cli) -> ConsentResult<Vec<String>> {
    let config = load_config(&cli)?;

    if let Command::Server { bind } = &cli.command {
        commands::server(&config, bind.as_deref())?;
        return Ok(vec!["Server stopped".to_string()]);
    }

    let store = commands::connect(&config)?;
    let store = store.as_ref();

    match cli.command {
        Command::Server { .. } => Ok(Vec::new()),
        Command::List { actor, subject, at } => {
            commands::list(store, &actor, subject.as_deref(), at.as_deref())
        }
        Command::Record(args) => commands::record(store, &RecordRequest::from(args)),
        Command::Check {
            subject,
            custodian,
            actor,
            data_class,
            at,
        } => commands::check(store, &subject, &custodian, &actor, &data_class, at.as_deref()),
        Command::Find { hash, latest } => commands::find(store, &hash, latest),
        Command::Delete { hash } => commands::delete(store, &hash),
        Command::Diagnostics => Ok(commands::diagnostics(store)),
    }
}
