/// PATH discovery for the transcoder yt-dlp shells out to.
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn ffmpeg_binary() -> &'static str {
    if cfg!(target_os = "windows") {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if cfg!(target_os = "windows") {
        dirs.push(PathBuf::from(r"C:\ffmpeg\bin"));
        dirs.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin"));
    } else {
        for dir in [
            "/usr/bin",
            "/usr/local/bin",
            "/snap/bin",
            "/opt/homebrew/bin",
            "/home/linuxbrew/.linuxbrew/bin",
        ] {
            dirs.push(PathBuf::from(dir));
        }
    }

    dirs
}

/// Directories that should be appended to the fetcher's PATH so it can
/// find ffmpeg. An explicit location always comes first.
pub fn discover_extra_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut extra = Vec::new();

    if let Some(dir) = explicit {
        // Accept either the binary itself or its directory
        let dir = if dir.is_file() {
            dir.parent().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf())
        } else {
            dir.to_path_buf()
        };
        extra.push(dir);
    }

    for dir in candidate_dirs() {
        if dir.join(ffmpeg_binary()).exists() && !extra.contains(&dir) {
            extra.push(dir);
        }
    }

    // Fallback: ask the shell where ffmpeg lives
    if extra.is_empty() && !cfg!(target_os = "windows") {
        match std::process::Command::new("which").arg("ffmpeg").output() {
            Ok(output) if output.status.success() => {
                let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if let Some(parent) = Path::new(&found).parent() {
                    if !parent.as_os_str().is_empty() {
                        extra.push(parent.to_path_buf());
                    }
                }
            }
            Ok(_) => debug!("`which ffmpeg` found nothing"),
            Err(e) => debug!("Could not run `which ffmpeg`: {}", e),
        }
    }

    if extra.is_empty() {
        warn!("ffmpeg not found; audio extraction will fail unless it is on PATH");
    }

    extra
}

/// Append `extra` to `current`, skipping entries already present.
pub fn augmented_path(current: Option<OsString>, extra: &[PathBuf]) -> OsString {
    let mut entries: Vec<PathBuf> = current
        .as_deref()
        .map(|p| std::env::split_paths(p).collect())
        .unwrap_or_default();

    for dir in extra {
        if !entries.contains(dir) {
            entries.push(dir.clone());
        }
    }

    // join_paths only fails on entries containing the separator itself
    std::env::join_paths(&entries)
        .or_else(|_| std::env::join_paths(extra))
        .unwrap_or_else(|_| current.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_location_first() {
        let dir = tempfile::tempdir().unwrap();
        let extra = discover_extra_paths(Some(dir.path()));
        assert_eq!(extra.first().map(PathBuf::as_path), Some(dir.path()));
    }

    #[test]
    fn test_explicit_binary_resolves_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join(ffmpeg_binary());
        std::fs::write(&bin, b"").unwrap();
        let extra = discover_extra_paths(Some(&bin));
        assert_eq!(extra[0], dir.path());
    }

    #[cfg(unix)]
    #[test]
    fn test_augmented_path_appends_once() {
        let current = OsString::from("/bin:/usr/bin");
        let extra = vec![PathBuf::from("/usr/bin"), PathBuf::from("/opt/ffmpeg/bin")];
        let joined = augmented_path(Some(current), &extra);
        assert_eq!(joined, OsString::from("/bin:/usr/bin:/opt/ffmpeg/bin"));
    }

    #[cfg(unix)]
    #[test]
    fn test_augmented_path_without_current() {
        let joined = augmented_path(None, &[PathBuf::from("/opt/ffmpeg/bin")]);
        assert_eq!(joined, OsString::from("/opt/ffmpeg/bin"));
    }
}
