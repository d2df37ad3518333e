use crate::utils;
use clap::ValueEnum;
use log::{debug, warn};
use msd_ncm::AudioKind;
use std::{
    fmt, fs,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

/// How long a stalled ffmpeg child is polled before being killed.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Most sync points found in the stream are false positives inside
/// compressed data, so only this many leading candidates are retried.
const MAX_REPAIR_OFFSETS: usize = 4;

/// Output containers the transcoder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetFormat {
    Mp3,
    Wav,
    Flac,
    M4a,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::M4a => "m4a",
        }
    }
}

/// Codec options for one transcode request.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub format: TargetFormat,
    /// VBR quality for mp3 (0 = best, 9 = smallest).
    pub vbr_quality: u8,
    /// Target bitrate for m4a, e.g. "192k".
    pub bitrate: String,
    /// Sample rate in Hz for wav.
    pub sample_rate: u32,
    /// Channel count for wav.
    pub channels: u8,
    /// Compression level for flac.
    pub compression_level: u8,
}

/// Errors crossing the external transcoder boundary.
#[derive(Debug)]
pub enum TranscodeError {
    /// The direct invocation failed: non-zero exit or an empty output.
    Failed(String),
    /// The transcoder exceeded its deadline and was killed.
    Timeout(Duration),
    /// The offset-skip fallback was exhausted as well.
    RepairFailed(String),
}

impl fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "transcode failed: {reason}"),
            Self::Timeout(deadline) => {
                write!(f, "transcode timed out after {}s", deadline.as_secs())
            }
            Self::RepairFailed(reason) => write!(f, "repair failed: {reason}"),
        }
    }
}

impl std::error::Error for TranscodeError {}

/// A finished transcode, with the path of the produced file.
pub struct Transcoded {
    pub path: PathBuf,
    /// True when only the offset-skip fallback produced the output.
    pub repaired: bool,
}

pub struct Transcoder {
    program: PathBuf,
}

impl Transcoder {
    /// Locate ffmpeg up front; nothing can be converted without it.
    pub fn new() -> anyhow::Result<Self> {
        let program = utils::find_ffmpeg().ok_or_else(|| {
            anyhow::anyhow!("ffmpeg couldn't be found, it is required to continue further.")
        })?;

        Ok(Self { program })
    }

    /// Convert `input` into `output` per the request.
    ///
    /// The direct invocation is tried first. When it fails on the stream
    /// itself, the input is re-fed with its damaged leading bytes skipped
    /// so the decoder can pick up at the next frame sync. Repair success
    /// is reported distinctly; a timeout is terminal either way.
    pub fn transcode(
        &self,
        input: &Path,
        kind: AudioKind,
        output: &Path,
        request: &TranscodeRequest,
    ) -> Result<Transcoded, TranscodeError> {
        let input_len = fs::metadata(input).map(|m| m.len()).unwrap_or(0);
        let deadline = timeout_for(input_len);

        match self.invoke(input, kind, output, request, None, deadline) {
            Ok(()) => {
                return Ok(Transcoded {
                    path: output.to_owned(),
                    repaired: false,
                });
            }
            Err(e @ TranscodeError::Timeout(_)) => return Err(e),
            Err(e) => warn!("{e}; retrying past the damaged leading bytes"),
        }

        for offset in repair_offsets(input) {
            debug!("retrying with {offset} leading bytes skipped");

            match self.invoke(input, kind, output, request, Some(offset), deadline) {
                Ok(()) => {
                    return Ok(Transcoded {
                        path: output.to_owned(),
                        repaired: true,
                    });
                }
                Err(e @ TranscodeError::Timeout(_)) => return Err(e),
                Err(e) => debug!("skip {offset}: {e}"),
            }
        }

        Err(TranscodeError::RepairFailed(
            "no skip offset produced a decodable stream".to_owned(),
        ))
    }

    fn invoke(
        &self,
        input: &Path,
        kind: AudioKind,
        output: &Path,
        request: &TranscodeRequest,
        skip: Option<u64>,
        deadline: Duration,
    ) -> Result<(), TranscodeError> {
        let args = build_args(input, kind, output, request, skip);
        debug!("Executing {} {}", self.program.display(), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                TranscodeError::Failed(format!("could not spawn {}: {e}", self.program.display()))
            })?;

        let status = match wait_with_deadline(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                remove_partial_output(output);
                return Err(TranscodeError::Timeout(deadline));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                remove_partial_output(output);
                return Err(TranscodeError::Failed(format!("could not wait on child: {e}")));
            }
        };

        if !status.success() {
            remove_partial_output(output);
            return Err(TranscodeError::Failed(format!(
                "ffmpeg exited with code {}",
                status.code().unwrap_or(1)
            )));
        }

        // Exit code 0 with nothing written still counts as a failure;
        // an empty file must never be reported as a successful convert.
        let written = fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            remove_partial_output(output);
            return Err(TranscodeError::Failed(
                "ffmpeg produced an empty output file".to_owned(),
            ));
        }

        Ok(())
    }
}

fn build_args(
    input: &Path,
    kind: AudioKind,
    output: &Path,
    request: &TranscodeRequest,
    skip: Option<u64>,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".to_owned(), "-y".to_owned()];

    if let Some(offset) = skip {
        args.extend(["-skip_initial_bytes".to_owned(), offset.to_string()]);
    }

    // The declared extension is not authoritative; hint the demuxer from
    // the sniffed magic and let ffmpeg probe only unknown streams.
    if let Some(demuxer) = kind.demuxer() {
        args.extend(["-f".to_owned(), demuxer.to_owned()]);
    }

    args.extend(["-i".to_owned(), input.to_string_lossy().into_owned()]);

    match request.format {
        TargetFormat::Mp3 => args.extend([
            "-c:a".to_owned(),
            "libmp3lame".to_owned(),
            "-q:a".to_owned(),
            request.vbr_quality.to_string(),
        ]),
        TargetFormat::Wav => args.extend([
            "-ar".to_owned(),
            request.sample_rate.to_string(),
            "-ac".to_owned(),
            request.channels.to_string(),
        ]),
        TargetFormat::Flac => args.extend([
            "-compression_level".to_owned(),
            request.compression_level.to_string(),
        ]),
        TargetFormat::M4a => args.extend([
            "-c:a".to_owned(),
            "aac".to_owned(),
            "-b:a".to_owned(),
            request.bitrate.clone(),
        ]),
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

fn wait_with_deadline(child: &mut Child, deadline: Duration) -> io::Result<Option<ExitStatus>> {
    let started = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        if started.elapsed() >= deadline {
            return Ok(None);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// 30 seconds plus one per MiB of decoded input.
fn timeout_for(input_len: u64) -> Duration {
    Duration::from_secs(30 + input_len / (1024 * 1024))
}

fn remove_partial_output(output: &Path) {
    if output.exists() {
        let _ = fs::remove_file(output);
    }
}

/// Candidate skip offsets for the repair path: the next positions in the
/// stream that look like a frame sync or a container magic.
fn repair_offsets(input: &Path) -> Vec<u64> {
    // Damaged leading frames sit at the front; 128 KiB is plenty to find
    // the next clean sync point.
    let mut head = vec![0u8; 128 * 1024];
    let len = match fs::File::open(input).and_then(|mut f| f.read(&mut head)) {
        Ok(len) => len,
        Err(_) => return Vec::new(),
    };
    head.truncate(len);

    let mut offsets = sync_offsets(&head);
    if offsets.is_empty() && len > 2 {
        // Nothing recognizable; skip a fixed amount and hope the decoder
        // can resynchronize on its own.
        offsets.push(1024.min(len as u64 / 2));
    }
    offsets
}

fn sync_offsets(data: &[u8]) -> Vec<u64> {
    let mut offsets = Vec::new();

    for i in 1..data.len() {
        if AudioKind::sniff(&data[i..]) != AudioKind::Unknown {
            offsets.push(i as u64);
            if offsets.len() == MAX_REPAIR_OFFSETS {
                break;
            }
        }
    }

    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(format: TargetFormat) -> TranscodeRequest {
        TranscodeRequest {
            format,
            vbr_quality: 2,
            bitrate: "192k".to_owned(),
            sample_rate: 44100,
            channels: 2,
            compression_level: 5,
        }
    }

    #[test]
    fn mp3_args_use_vbr_quality() {
        let args = build_args(
            Path::new("in.tmp"),
            AudioKind::Flac,
            Path::new("out.mp3"),
            &request(TargetFormat::Mp3),
            None,
        );
        assert_eq!(
            args,
            [
                "-hide_banner", "-y", "-f", "flac", "-i", "in.tmp",
                "-c:a", "libmp3lame", "-q:a", "2", "out.mp3",
            ]
        );
    }

    #[test]
    fn wav_args_pin_rate_and_channels() {
        let args = build_args(
            Path::new("in.tmp"),
            AudioKind::Mp3,
            Path::new("out.wav"),
            &request(TargetFormat::Wav),
            None,
        );
        assert_eq!(
            args,
            [
                "-hide_banner", "-y", "-f", "mp3", "-i", "in.tmp",
                "-ar", "44100", "-ac", "2", "out.wav",
            ]
        );
    }

    #[test]
    fn flac_args_set_compression_level() {
        let args = build_args(
            Path::new("in.tmp"),
            AudioKind::Unknown,
            Path::new("out.flac"),
            &request(TargetFormat::Flac),
            None,
        );
        // Unknown input kind gets no demuxer hint.
        assert_eq!(
            args,
            ["-hide_banner", "-y", "-i", "in.tmp", "-compression_level", "5", "out.flac"]
        );
    }

    #[test]
    fn m4a_args_set_bitrate() {
        let args = build_args(
            Path::new("in.tmp"),
            AudioKind::M4a,
            Path::new("out.m4a"),
            &request(TargetFormat::M4a),
            None,
        );
        // M4a input has no standalone demuxer name; ffmpeg probes it.
        assert_eq!(
            args,
            ["-hide_banner", "-y", "-i", "in.tmp", "-c:a", "aac", "-b:a", "192k", "out.m4a"]
        );
    }

    #[test]
    fn skip_offset_precedes_the_input() {
        let args = build_args(
            Path::new("in.tmp"),
            AudioKind::Mp3,
            Path::new("out.mp3"),
            &request(TargetFormat::Mp3),
            Some(1024),
        );
        assert_eq!(&args[2..4], ["-skip_initial_bytes", "1024"]);
    }

    #[test]
    fn timeout_scales_with_input_size() {
        assert_eq!(timeout_for(0), Duration::from_secs(30));
        assert_eq!(timeout_for(10 * 1024 * 1024), Duration::from_secs(40));
    }

    #[test]
    fn sync_offsets_finds_magic_past_damage() {
        let mut data = vec![0u8; 100];
        data.extend_from_slice(b"fLaC\x00\x00\x00\x22");
        assert_eq!(sync_offsets(&data), [100]);
    }

    #[test]
    fn sync_offsets_are_bounded() {
        let mut data = Vec::new();
        for _ in 0..10 {
            data.extend_from_slice(&[0xFF, 0xFB, 0x00, 0x00]);
        }
        // Offset zero is never a candidate; the direct path already
        // covered it.
        let offsets = sync_offsets(&data);
        assert_eq!(offsets.len(), MAX_REPAIR_OFFSETS);
        assert!(!offsets.contains(&0));
    }
}
