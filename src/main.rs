mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    runpost::logger::init_logger(cli.verbose);

    match cli.command {
        Commands::Run(args) => {
            let failed = cli::run(args, cli.verbose).await?;
            if failed {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
