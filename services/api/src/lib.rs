mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use interpreter_pool::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
