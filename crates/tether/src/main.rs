//! Tether CLI entry point

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tether::run().await?;
    Ok(())
}
