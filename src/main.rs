use anyhow::Result;
use clap::Parser;
use transcode_eval::{cli::Cli, run};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
