use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use wallet_backend::{BackendConfig, BackendError, FundingRequest, FundingService, CONFIG_FILE};
use wallet_store::NewChangeOutput;

/// Command-line entrypoint for the change pool backend.
#[derive(Parser, Debug)]
#[command(
    name = "wallet-backend",
    version,
    about = "Fund transactions from a persistent pool of change outputs"
)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config file
    Init {
        /// SQLite database file for the change pool
        #[arg(long)]
        database: Option<PathBuf>,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Add a change output to the pool
    AddChange {
        /// Transaction id, 32 bytes hex
        #[arg(long)]
        txid: String,
        #[arg(long)]
        vout: u32,
        #[arg(long)]
        satoshis: u64,
        /// Locking script, hex
        #[arg(long)]
        script: String,
    },
    /// Fund a transaction and print the run id and change plan as JSON
    Fund {
        /// Funding request as JSON, or `@path` to read it from a file
        #[arg(long)]
        request: String,
    },
    /// Release every change output held by a funded run
    Abort {
        #[arg(long)]
        run: i64,
    },
    /// Show the spendable change balance
    Balance,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// `info` by default, `diesel` held at `warn`; `RUST_LOG` overrides both.
fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("diesel", log::LevelFilter::Warn)
        .parse_env(env_logger::Env::default())
        .init();
}

async fn run(cli: Cli) -> Result<(), BackendError> {
    match cli.command {
        Commands::Init { database, force } => {
            if cli.config.exists() && !force {
                return Err(BackendError::Config(format!(
                    "{} already exists, pass --force to overwrite",
                    cli.config.display()
                )));
            }
            let mut config = BackendConfig::default();
            if let Some(database) = database {
                config.database_path = database;
            }
            config.save(&cli.config)?;
            // create the database and run migrations up front
            FundingService::open(config)?;
            log::info!("wrote {}", cli.config.display());
        }
        Commands::AddChange {
            txid,
            vout,
            satoshis,
            script,
        } => {
            let service = open_service(&cli.config)?;
            let output = NewChangeOutput {
                txid: parse_txid(&txid)?,
                vout,
                satoshis,
                locking_script: hex::decode(&script)
                    .map_err(|e| BackendError::Config(format!("invalid script hex: {e}")))?,
            };
            let output_id = service.add_change_output(output).await?;
            println!("{}", serde_json::json!({ "outputId": output_id }));
        }
        Commands::Fund { request } => {
            let service = open_service(&cli.config)?;
            let request = read_request(&request)?;
            let funded = service.fund(request).await?;
            println!("{}", serde_json::to_string_pretty(&funded)?);
        }
        Commands::Abort { run } => {
            let service = open_service(&cli.config)?;
            let released = service.abort(run).await?;
            println!("{}", serde_json::json!({ "runId": run, "released": released }));
        }
        Commands::Balance => {
            let service = open_service(&cli.config)?;
            let balance = service.balance().await?;
            println!("{}", serde_json::to_string_pretty(&balance)?);
        }
    }
    Ok(())
}

fn open_service(config_path: &Path) -> Result<FundingService, BackendError> {
    let config = BackendConfig::load_or_default(config_path)?;
    FundingService::open(config)
}

fn read_request(arg: &str) -> Result<FundingRequest, BackendError> {
    let json = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)?,
        None => arg.to_string(),
    };
    Ok(serde_json::from_str(&json)?)
}

fn parse_txid(s: &str) -> Result<[u8; 32], BackendError> {
    let bytes = hex::decode(s).map_err(|e| BackendError::Config(format!("invalid txid hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| BackendError::Config(format!("txid must be 32 bytes, got {}", b.len())))
}
