mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use companion_registration::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
