use clap::{Parser, Subcommand};
use natours::auth::LogMailer;
use natours::config::{AppConfig, ConfigLayer, RunMode, config_paths, scan_toml_for_secret_keys};
use natours::http::{self, AppState};
use natours::logger::{self, LogSettings};
use natours::{AppError, Database, ndjson};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "natours", version, about = "Tours, users and reviews API", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Directory holding the NDJSON snapshots. Overrides config/env.")]
    data_dir: Option<PathBuf>,
    #[arg(long, value_parser = parse_env, help = "development | production")]
    env: Option<RunMode>,
    #[command(subcommand)]
    command: Commands,
}

fn parse_env(raw: &str) -> Result<RunMode, String> {
    RunMode::parse(raw).ok_or_else(|| format!("unknown mode {raw}"))
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Serve the HTTP API")]
    Serve {
        #[arg(long, help = "Listen port. Overrides config/env.")]
        port: Option<u16>,
    },
    #[command(about = "Load NDJSON or a JSON array into a collection, keeping ids")]
    Import {
        collection: String,
        file: PathBuf,
        #[arg(long, help = "Skip bad lines instead of aborting")]
        skip_errors: bool,
    },
    #[command(about = "Write a collection as NDJSON")]
    Export { collection: String, file: PathBuf },
    #[command(name = "config-check", about = "Show the effective config and flag secrets kept in config files")]
    ConfigCheck,
}

fn init_logging(cfg: &AppConfig) -> Result<(), AppError> {
    if let Some(path) = &cfg.log_config {
        return logger::configure_from_file(path);
    }
    let settings = LogSettings { console_requests: !cfg.env.is_production(), ..LogSettings::from_env() };
    logger::configure_logging(&settings)
}

fn open_db(cfg: &AppConfig) -> Result<Database, AppError> {
    match &cfg.data_dir {
        Some(dir) => Database::open(dir),
        None => Database::in_memory(),
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let port = match &cli.command {
        Commands::Serve { port } => *port,
        _ => None,
    };
    let layer = ConfigLayer { env: cli.env, port, data_dir: cli.data_dir.clone(), ..ConfigLayer::default() };
    let cfg = AppConfig::load(layer, cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { .. } => {
            cfg.validate()?;
            init_logging(&cfg)?;
            let db = Arc::new(open_db(&cfg)?);
            let state = AppState::new(db, cfg, Arc::new(LogMailer))?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(http::serve(state))
        }
        Commands::Import { collection, file, skip_errors } => {
            let db = open_db(&cfg)?;
            db.model(&collection)?;
            let report = ndjson::import_ndjson(&db.collection(&collection), File::open(&file)?, skip_errors)?;
            println!("imported {} records into {collection} ({} skipped)", report.inserted, report.skipped);
            if cfg.data_dir.is_some() {
                db.save_snapshot()?;
            }
            Ok(())
        }
        Commands::Export { collection, file } => {
            let db = open_db(&cfg)?;
            db.model(&collection)?;
            let n = ndjson::export_ndjson(&db.collection(&collection), File::create(&file)?)?;
            println!("exported {n} records from {collection}");
            Ok(())
        }
        Commands::ConfigCheck => {
            let shown = serde_json::to_string_pretty(&cfg)?;
            println!("{shown}");
            for p in config_paths(cli.config.as_deref()) {
                let Ok(raw) = std::fs::read_to_string(&p) else {
                    continue;
                };
                let secrets = scan_toml_for_secret_keys(&raw);
                if secrets.is_empty() {
                    println!("{}: no secrets found", p.display());
                } else {
                    println!("{}: secret-like keys: {}", p.display(), secrets.join(", "));
                }
            }
            match cfg.validate() {
                Ok(()) => println!("config OK"),
                Err(e) => println!("config problem: {e}"),
            }
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
