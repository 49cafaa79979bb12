use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    trace_cli::main_entry().await
}
