use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> { inference_gateway::run().await }
