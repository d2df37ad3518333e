use msd_ncm::TrackMetadata;
use regex::Regex;
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

/// Locate the ffmpeg binary: current directory first, then PATH.
pub fn find_ffmpeg() -> Option<PathBuf> {
    let bin = if cfg!(target_os = "windows") {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    };

    if Path::new(bin).exists() {
        return Some(PathBuf::from(bin));
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|p| p.join(bin))
        .find(|p| p.exists())
}

/// Strip characters that are illegal in file names on common filesystems.
pub fn legalize_file_name(name: &str) -> String {
    static ILLEGAL: OnceLock<Regex> = OnceLock::new();

    ILLEGAL
        .get_or_init(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("pattern is valid"))
        .replace_all(name, "")
        .trim()
        .to_owned()
}

/// Output file stem for one input: `artist - title` when the metadata
/// provides it, otherwise the input's own stem.
pub fn output_stem(input: &Path, metadata: &TrackMetadata) -> String {
    let fallback = || {
        input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_owned())
    };

    if metadata.title.is_empty() {
        return fallback();
    }

    let stem = match metadata.artist.first() {
        Some(artist) => legalize_file_name(&format!("{} - {}", artist, metadata.title)),
        None => legalize_file_name(&metadata.title),
    };

    if stem.is_empty() { fallback() } else { stem }
}

/// A file that is removed when the guard drops, unless it was persisted
/// to its final name first. Keeps intermediates from piling up on error
/// paths.
pub struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    pub fn at(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persist(mut self, to: &Path) -> std::io::Result<()> {
        fs::rename(&self.path, to)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}
