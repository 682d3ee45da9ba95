mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    ruload::logger::init_logger(cli.verbose);

    match cli.command {
        Commands::Run(args) => {
            let clean = cli::run(args, cli.verbose).await?;
            if !clean {
                std::process::exit(1);
            }
        }
        Commands::Validate(args) => cli::validate(args, cli.verbose)?,
    }
    Ok(())
}
