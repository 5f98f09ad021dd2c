use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    reframe_cli::main_entry().await
}
