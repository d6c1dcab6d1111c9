//! omni - command line tool for Adobe Analytics reports.

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "omni",
    version,
    about = "Run Adobe Analytics 1.4 reports from saved query descriptors"
)]
struct Cli {
    #[command(flatten)]
    connection: omni_cmd::Connection,

    #[command(subcommand)]
    command: omni_cmd::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    omni_cmd::run(&cli.connection, cli.command).await
}
