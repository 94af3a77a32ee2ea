mod cli;
mod infra;
mod migrate;
mod routes;
mod server;

use publisher_migration::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
