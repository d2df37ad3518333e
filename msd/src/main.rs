mod commands;
mod logger;
mod transcoder;
mod utils;

use clap::Parser;
use colored::Colorize;
use commands::{Args, Commands};
use std::process;

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(args.verbose);

    match args.command {
        Commands::Convert(args) => args.execute()?,
        Commands::Dump(args) => args.execute()?,
        Commands::Probe(args) => args.execute()?,
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {:#}", "error".bold().red(), e);
        process::exit(1);
    }
}
