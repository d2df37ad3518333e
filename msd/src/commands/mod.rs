mod convert;
mod dump;
mod probe;

pub use convert::Convert;
pub use dump::Dump;
pub use probe::Probe;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use kdam::{BarExt, tqdm};
use log::error;
use rayon::prelude::*;
use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Decrypt NCM music containers and transcode them with ffmpeg.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Print debug logs.
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Convert(Convert),
    Dump(Dump),
    Probe(Probe),
}

/// Expand plain paths and glob patterns into the list of input files.
pub(super) fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = vec![];

    for pattern in patterns {
        let path = Path::new(pattern);

        if path.is_file() {
            files.push(path.to_path_buf());
            continue;
        }

        for file in glob::glob(pattern)? {
            let file = file?;

            if file.is_file() {
                files.push(file);
            }
        }
    }

    if files.is_empty() {
        bail!("no input files matched.");
    }

    Ok(files)
}

/// Run `op` over every file on a bounded pool, one pipeline instance per
/// file. A failing file is reported and skipped, never aborting the rest
/// of the batch; the whole run fails afterwards if anything did.
pub(super) fn run_batch<F>(files: &[PathBuf], threads: u8, desc: &str, op: F) -> Result<()>
where
    F: Fn(&Path) -> Result<()> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads as usize)
        .build()?;
    let bar = Mutex::new(tqdm!(total = files.len(), desc = desc.to_owned()));

    let failures = pool.install(|| {
        files
            .par_iter()
            .filter_map(|file| {
                let result = op(file);

                if let Ok(mut bar) = bar.lock() {
                    let _ = bar.update(1);
                }

                result.err().map(|e| format!("{}: {e:#}", file.display()))
            })
            .collect::<Vec<_>>()
    });

    eprintln!();

    if !failures.is_empty() {
        for failure in &failures {
            error!("{failure}");
        }
        bail!("{} of {} files failed.", failures.len(), files.len());
    }

    Ok(())
}
