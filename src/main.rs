use anyhow::Result;
use neae::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
