mod cli;
mod evaluate;
mod infra;
mod routes;
mod server;

use call_compliance::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
