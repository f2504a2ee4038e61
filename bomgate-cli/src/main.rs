//! bomgate CLI entry point

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;

use cli::{Cli, Commands};
use output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 로깅 설정을 읽기 위한 선 로드; 실제 오류는 각 명령이 다시 보고함
    let general = commands::load_config(&cli.config)
        .await
        .map(|c| c.general)
        .unwrap_or_default();
    if let Err(e) = logging::init_tracing(&general, cli.log_level.as_deref()) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    bomgate_core::metrics::describe_all();
    tracing::debug!(config = %cli.config.display(), "bomgate starting");

    let writer = OutputWriter::new(cli.output);
    let result = match cli.command {
        Commands::Ingest(args) => commands::ingest::execute(args, &cli.config, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}
