use crate::utils::{self, TempFile};
use anyhow::{Context, Result};
use clap::Args;
use log::{info, warn};
use msd_ncm::{AudioKind, NcmFile};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Decrypt NCM containers to their native audio files.
#[derive(Debug, Clone, Args)]
pub struct Dump {
    /// .ncm files or glob patterns to decrypt.
    #[arg(required = true)]
    input: Vec<String>,

    /// Directory for decrypted files.
    /// By default each file is written next to its input.
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Also write the embedded album artwork next to the audio file.
    #[arg(long)]
    cover: bool,

    /// Also write the parsed metadata record as a .json file.
    #[arg(long)]
    metadata: bool,

    /// Maximum number of threads for decrypting files in parallel.
    /// Number of threads should be in range 1-16 (inclusive).
    #[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=16))]
    threads: u8,
}

impl Dump {
    pub fn execute(self) -> Result<()> {
        let files = super::expand_inputs(&self.input)?;

        if let Some(directory) = &self.directory
            && !directory.exists()
        {
            fs::create_dir_all(directory)?;
        }

        super::run_batch(&files, self.threads, "decrypted", |file| {
            self.dump_one(file)
        })
    }

    fn dump_one(&self, input: &Path) -> Result<()> {
        let mut reader = BufReader::new(File::open(input)?);
        let ncm = NcmFile::parse(&mut reader)?;

        let directory = match &self.directory {
            Some(directory) => directory.clone(),
            None => input.parent().unwrap_or(Path::new(".")).to_path_buf(),
        };
        let stem = utils::output_stem(input, &ncm.metadata);

        // The extension is only known after sniffing the decrypted
        // stream, so decode into a temporary name and rename it after.
        let temp = TempFile::at(directory.join(format!("{stem}.msd.tmp")));
        let kind = {
            let mut writer = BufWriter::new(File::create(temp.path())?);
            let kind = ncm
                .decode_audio(&mut reader, &mut writer)
                .with_context(|| format!("could not decrypt {}", input.display()))?;
            writer.flush()?;
            kind
        };

        let extension = match kind {
            AudioKind::Unknown if !ncm.metadata.format.is_empty() => ncm.metadata.format.clone(),
            kind => kind.extension().to_owned(),
        };
        if kind == AudioKind::Unknown {
            warn!(
                "{}: decrypted stream has no recognizable audio magic",
                input.display()
            );
        }

        let output = directory.join(format!("{stem}.{extension}"));
        temp.persist(&output)?;

        if self.cover && let Some(artwork) = &ncm.artwork {
            let cover = directory.join(format!("{stem}.{}", artwork.kind.extension()));
            fs::write(&cover, &artwork.data)?;
            info!("Writing {}", cover.display());
        }

        if self.metadata {
            let record = directory.join(format!("{stem}.json"));
            fs::write(&record, serde_json::to_vec_pretty(&ncm.metadata)?)?;
            info!("Writing {}", record.display());
        }

        info!("Decrypted {} -> {}", input.display(), output.display());
        Ok(())
    }
}
