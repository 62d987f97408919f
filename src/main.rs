mod backup;
mod cli;
mod dedup;
mod error;
mod fmt;
mod identity;
mod importer;
mod ledger;
mod migration;
mod models;
mod provider;
mod remote;
mod settings;
mod store;
mod version;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{BackupCommands, Cli, Commands};

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SATLEDGER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init {
            data_dir,
            remote_dir,
        } => cli::init::run(data_dir, remote_dir),
        Commands::Import { file } => cli::import::run(&file),
        Commands::Add {
            date,
            exchange,
            kind,
            usd,
            btc,
            price,
            reference,
        } => cli::add::run(cli::add::AddArgs {
            date,
            exchange,
            kind,
            usd,
            btc,
            price,
            reference,
        }),
        Commands::List { exchange } => cli::list::run(exchange),
        Commands::Exchanges => cli::list::exchanges(),
        Commands::Clear { yes } => cli::clear::run(yes),
        Commands::Migrate { force } => cli::migrate::run(force),
        Commands::Validate => cli::migrate::validate_cmd(),
        Commands::Backup { command } => match command {
            BackupCommands::Info => cli::backup::info(),
            BackupCommands::Restore => cli::backup::restore(),
        },
        Commands::Snapshot { output } => cli::backup::snapshot(output),
        Commands::Login { user } => cli::auth::login(&user),
        Commands::Logout => cli::auth::logout(),
        Commands::Sync => cli::auth::sync(),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
