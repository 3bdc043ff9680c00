use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = league_stats_cli::Cli::parse();
    league_stats_cli::init_logging(&cli)?;
    league_stats_cli::run_cli(cli)
}
