use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use memu_db::{Config, PgEngine, SessionManager, config, logging};
use sqlx::Connection;
use std::process;
use std::time::Instant;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    config::load_dotenv();

    let matches = build_cli().get_matches();

    if let Err(e) = run_command(matches).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn build_cli() -> Command {
    Command::new("memu-db")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Postgres session manager for memu storage")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .subcommand(
            Command::new("status")
                .about("Open a session, ping the database and report pool state")
                .arg(
                    Arg::new("dsn")
                        .long("dsn")
                        .help("Connection string (defaults to MEMU_DATABASE_URL or DATABASE_URL)"),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective pool configuration as JSON"))
}

async fn run_command(matches: ArgMatches) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    logging::init_tracing(&config.logging);

    match matches.subcommand() {
        Some(("status", sub)) => handle_status(sub, &config).await,
        Some(("config", _)) => handle_config(&config),
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn handle_config(config: &Config) -> Result<()> {
    let output = serde_json::json!({
        "pool": config.pool,
        "engine": config.pool.to_options(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn handle_status(matches: &ArgMatches, config: &Config) -> Result<()> {
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .or_else(|| config.database.url.clone())
        .context("No database URL: pass --dsn or set MEMU_DATABASE_URL")?;

    let manager = SessionManager::<PgEngine>::new(&dsn, config.pool, None).await?;

    let started = Instant::now();
    let ping = match manager.session().await {
        Ok(mut session) => session.ping().await.map_err(anyhow::Error::from),
        Err(e) => Err(e.into()),
    };
    let latency = started.elapsed();

    println!("Engine options: {}", serde_json::to_string(manager.options())?);
    println!("Pool: {}", serde_json::to_string(&manager.engine().stats())?);

    let outcome = match ping {
        Ok(()) => {
            println!("Database reachable ({} ms)", latency.as_millis());
            Ok(())
        }
        Err(e) => Err(e.context("Database unreachable")),
    };

    manager.close().await;
    outcome
}
