use crate::migrate::{run_migrate, run_validate, MigrateArgs, ValidateArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use publisher_migration::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Publisher Migration",
    about = "Migrate legacy website contacts into shadow publishers, or serve the migration API",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run a migration against a legacy export and write a dated JSON report
    Migrate(MigrateArgs),
    /// Run the pre-migration validator and print its report
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Legacy export used to seed the in-process store
    #[arg(long)]
    pub(crate) legacy_csv: Option<std::path::PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Migrate(args) => run_migrate(args).await,
        Command::Validate(args) => run_validate(args).await,
    }
}
