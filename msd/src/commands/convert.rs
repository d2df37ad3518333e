use crate::transcoder::{TargetFormat, TranscodeRequest, Transcoder};
use crate::utils::{self, TempFile};
use anyhow::{Context, Result, anyhow};
use clap::Args;
use log::{info, warn};
use msd_ncm::NcmFile;
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Decrypt NCM containers and transcode them to a target format.
#[derive(Debug, Clone, Args)]
pub struct Convert {
    /// .ncm files or glob patterns to convert.
    #[arg(required = true)]
    input: Vec<String>,

    /// Directory for converted files.
    /// By default each file is written next to its input.
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Target audio format.
    #[arg(short, long, value_enum, default_value_t = TargetFormat::Mp3)]
    format: TargetFormat,

    /// VBR quality for mp3 output (0 = best, 9 = smallest).
    #[arg(long, help_heading = "Codec Options", default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=9))]
    vbr_quality: u8,

    /// Target bitrate for m4a output.
    #[arg(long, help_heading = "Codec Options", default_value = "192k")]
    bitrate: String,

    /// Sample rate in Hz for wav output.
    #[arg(long, help_heading = "Codec Options", default_value_t = 44100)]
    sample_rate: u32,

    /// Channel count for wav output.
    #[arg(long, help_heading = "Codec Options", default_value_t = 2)]
    channels: u8,

    /// Compression level for flac output (0 = fastest, 12 = smallest).
    #[arg(long, help_heading = "Codec Options", default_value_t = 5, value_parser = clap::value_parser!(u8).range(0..=12))]
    compression_level: u8,

    /// Maximum number of threads for converting files in parallel.
    /// Number of threads should be in range 1-16 (inclusive).
    #[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=16))]
    threads: u8,
}

impl Convert {
    pub fn execute(self) -> Result<()> {
        let files = super::expand_inputs(&self.input)?;
        let transcoder = Transcoder::new()?;
        let request = TranscodeRequest {
            format: self.format,
            vbr_quality: self.vbr_quality,
            bitrate: self.bitrate.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            compression_level: self.compression_level,
        };

        if let Some(directory) = &self.directory
            && !directory.exists()
        {
            fs::create_dir_all(directory)?;
        }

        super::run_batch(&files, self.threads, "converted", |file| {
            convert_one(file, self.directory.as_deref(), &transcoder, &request)
        })
    }
}

fn convert_one(
    input: &Path,
    directory: Option<&Path>,
    transcoder: &Transcoder,
    request: &TranscodeRequest,
) -> Result<()> {
    let mut reader = BufReader::new(File::open(input)?);
    let ncm = NcmFile::parse(&mut reader)?;

    let directory = match directory {
        Some(directory) => directory.to_path_buf(),
        None => input.parent().unwrap_or(Path::new(".")).to_path_buf(),
    };
    let stem = utils::output_stem(input, &ncm.metadata);

    // Decrypt into a temporary intermediate which is removed no matter
    // how the transcode ends.
    let temp = TempFile::at(directory.join(format!("{stem}.msd.tmp")));
    let kind = {
        let mut writer = BufWriter::new(File::create(temp.path())?);
        let kind = ncm
            .decode_audio(&mut reader, &mut writer)
            .with_context(|| format!("could not decrypt {}", input.display()))?;
        writer.flush()?;
        kind
    };

    let output = directory.join(format!("{stem}.{}", request.format.extension()));
    let transcoded = transcoder
        .transcode(temp.path(), kind, &output, request)
        .map_err(|e| anyhow!("{e}"))?;

    if transcoded.repaired {
        warn!(
            "Repaired {} by skipping damaged leading bytes",
            input.display()
        );
    }

    info!(
        "Converted {} -> {}",
        input.display(),
        transcoded.path.display()
    );
    Ok(())
}
