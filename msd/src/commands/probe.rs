use anyhow::Result;
use clap::Args;
use log::warn;
use msd_ncm::{ImageKind, NcmContainer, NcmKeys, TrackMetadata, extract_metadata};
use serde_json::json;
use std::{fs::File, io::BufReader, path::Path};

/// Parse container metadata without decrypting any audio.
#[derive(Debug, Clone, Args)]
pub struct Probe {
    /// .ncm files or glob patterns to inspect.
    #[arg(required = true)]
    input: Vec<String>,
}

impl Probe {
    pub fn execute(self) -> Result<()> {
        let files = super::expand_inputs(&self.input)?;
        let keys = NcmKeys::default();

        let records = files
            .iter()
            .map(|file| probe_one(file, &keys))
            .collect::<Result<Vec<_>>>()?;

        serde_json::to_writer_pretty(std::io::stdout(), &records)?;
        println!();
        Ok(())
    }
}

fn probe_one(input: &Path, keys: &NcmKeys) -> Result<serde_json::Value> {
    let mut reader = BufReader::new(File::open(input)?);
    let container = NcmContainer::parse(&mut reader)?;

    // Probing stops short of key recovery on purpose: metadata stays
    // readable even when the audio key cannot be unwrapped.
    let metadata = match extract_metadata(keys, &container.meta_block) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("{}: {e}", input.display());
            TrackMetadata::default()
        }
    };

    let artwork = (!container.image.is_empty()).then(|| {
        json!({
            "format": ImageKind::sniff(&container.image).extension(),
            "size": container.image.len(),
        })
    });

    Ok(json!({
        "file": input.display().to_string(),
        "version": container.version,
        "metadata": metadata,
        "artwork": artwork,
    }))
}
