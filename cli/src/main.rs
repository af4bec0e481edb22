mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands};
use commands::{extent, list, render};

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    logging::init(cli.verbose);

    match &cli.command {
        Commands::List(args) => list::run(&cli, args),
        Commands::Render(args) => render::run(&cli, args),
        Commands::Extent(args) => extent::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { run() }
