//! vigil - forensics and compliance evidence ledger CLI
//!
//! Operator front end for the drone incident-response evidence ledger. Every
//! ledger command authenticates against the `[[principals]]` table of the
//! configuration file and runs with the resulting identity.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vigil_core::{LedgerError, VigilConfig};

mod commands;

use commands::Session;

/// vigil - forensics and compliance evidence ledger
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "vigil.toml")]
    config: PathBuf,

    /// Ledger database path (overrides `[ledger].database`)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Principal to authenticate as
    #[arg(short, long, env = "VIGIL_USER")]
    user: Option<String>,

    /// Secret of the principal
    #[arg(long, env = "VIGIL_SECRET", hide_env_values = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Events ===
    /// Record a forensic event
    Record(commands::events::RecordArgs),

    /// List forensic events, oldest first
    Events(commands::events::ListArgs),

    // === Evidence ===
    /// Attach manual evidence (enters review as pending)
    Attach(commands::evidence::AttachArgs),

    /// Review evidence (admin only)
    Review(commands::evidence::ReviewArgs),

    /// List evidence, newest first
    Evidence(commands::evidence::ListArgs),

    /// Per-control evidence counts for a framework
    Summary(commands::evidence::SummaryArgs),

    // === Bundles ===
    /// Export a hash-sealed incident bundle
    Export(commands::bundle::ExportArgs),

    /// Verify the hash of an exported bundle file
    Verify(commands::bundle::VerifyArgs),

    // === Incidents and operators ===
    /// Assign an operator to a drone (admin only)
    AssignOperator(commands::incident::AssignArgs),

    /// Incident lifecycle commands
    #[command(subcommand)]
    Incident(commands::incident::IncidentCommand),

    // === Maintenance ===
    /// Show ledger row counts
    Stats,

    /// Print the SHA-256 digest of a secret for `secret_sha256`
    HashSecret {
        /// Secret to digest
        secret: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => return report(&e),
    };

    // Initialize logging
    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

/// Missing config file means defaults; an unreadable or invalid one is an
/// error.
fn load_config(cli: &Cli) -> Result<VigilConfig> {
    let mut config = if cli.config.exists() {
        VigilConfig::from_file(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?
    } else {
        VigilConfig::default()
    };
    if let Some(database) = &cli.database {
        config.ledger.database.clone_from(database);
    }
    Ok(config)
}

fn run(cli: Cli, config: &VigilConfig) -> Result<()> {
    let open = || Session::open(config, cli.user.as_deref(), cli.secret.as_deref());

    match cli.command {
        Commands::Record(args) => commands::events::record(&open()?, &args),
        Commands::Events(args) => commands::events::list(&open()?, &args),
        Commands::Attach(args) => commands::evidence::attach(&open()?, &args),
        Commands::Review(args) => commands::evidence::review(&open()?, &args),
        Commands::Evidence(args) => commands::evidence::list(&open()?, &args),
        Commands::Summary(args) => commands::evidence::summary(&open()?, &args),
        Commands::Export(args) => commands::bundle::export(&open()?, &args),
        Commands::Verify(args) => commands::bundle::verify(&args),
        Commands::AssignOperator(args) => commands::incident::assign(&open()?, &args),
        Commands::Incident(cmd) => commands::incident::run(&open()?, &cmd),
        Commands::Stats => commands::stats(&open()?),
        Commands::HashSecret { secret } => {
            println!("{}", vigil_core::identity::secret_digest_hex(&secret));
            Ok(())
        },
    }
}

/// Prints `error[<kind>]: <message>` and maps every failure to exit code 1.
fn report(err: &anyhow::Error) -> ExitCode {
    let kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<LedgerError>())
        .map_or("error", |ledger_err| ledger_err.kind().as_str());
    eprintln!("error[{kind}]: {err:#}");
    ExitCode::FAILURE
}
