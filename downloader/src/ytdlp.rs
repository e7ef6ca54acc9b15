/// yt-dlp subprocess fetcher.
///
/// Spawns `yt-dlp` once per download with the options derived from a
/// [`FetchConfig`]. Stdout and stderr are forwarded to tracing; the stderr
/// tail is kept to classify failures. On unix the child leads its own process
/// group, and an abandoned fetch kills the whole group so ffmpeg started by
/// yt-dlp does not keep writing into a removed scratch dir.
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

use songdrop_shared::errors::FetchError;
use songdrop_shared::models::{FetchConfig, PostProcessorKind};

use crate::fetcher::MediaFetcher;
use crate::paths::{augmented_path, discover_extra_paths};

/// Stderr lines kept for error classification.
const STDERR_TAIL_LINES: usize = 40;

/// Kills a spawned child's process group when dropped.
struct ChildGroup {
    #[cfg(unix)]
    pgid: Option<Pid>,
}

impl ChildGroup {
    #[cfg(unix)]
    fn of(child: &Child) -> Self {
        Self {
            pgid: child.id().map(|id| Pid::from_raw(id as i32)),
        }
    }

    #[cfg(not(unix))]
    fn of(_child: &Child) -> Self {
        Self {}
    }

    /// The leader exited on its own; leave the group alone.
    #[cfg(unix)]
    fn release(&mut self) {
        self.pgid = None;
    }

    #[cfg(not(unix))]
    fn release(&mut self) {}
}

#[cfg(unix)]
impl Drop for ChildGroup {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            match killpg(pgid, Signal::SIGKILL) {
                Ok(()) => debug!("Killed fetcher process group {}", pgid),
                Err(Errno::ESRCH) => {}
                Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
            }
        }
    }
}

/// Spawn `cmd` as the leader of a new process group.
fn spawn_grouped(cmd: &mut Command) -> std::io::Result<(Child, ChildGroup)> {
    #[cfg(unix)]
    cmd.process_group(0);
    let child = cmd.kill_on_drop(true).spawn()?;
    let group = ChildGroup::of(&child);
    Ok((child, group))
}

pub struct YtDlpFetcher {
    /// yt-dlp executable.
    bin: String,
    /// Passed as `--ffmpeg-location` when set.
    ffmpeg_location: Option<PathBuf>,
    /// PATH for the child, with ffmpeg locations appended.
    path_env: OsString,
}

impl YtDlpFetcher {
    pub fn new(bin: impl Into<String>, ffmpeg_location: Option<PathBuf>) -> Self {
        let extra = discover_extra_paths(ffmpeg_location.as_deref());
        let path_env = augmented_path(std::env::var_os("PATH"), &extra);
        if !extra.is_empty() {
            info!("Adding to fetcher PATH: {:?}", extra);
        }
        Self {
            bin: bin.into(),
            ffmpeg_location,
            path_env,
        }
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Command-line arguments for one download. The URL always follows `--`.
    pub fn build_args(&self, url: &str, config: &FetchConfig) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            config.format.as_arg().into(),
            "-o".into(),
            config.output_template.clone().into(),
            "--no-playlist".into(),
            "--no-progress".into(),
            "--newline".into(),
        ];

        for step in &config.post_processors {
            match step.kind {
                PostProcessorKind::ExtractAudio => {
                    args.push("-x".into());
                    args.push("--audio-format".into());
                    args.push(step.codec.name().into());
                    args.push("--audio-quality".into());
                    args.push(step.quality.clone().into());
                }
            }
        }

        if let Some(ffmpeg) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.clone().into_os_string());
        }

        args.push("--".into());
        args.push(url.into());
        args
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, config: &FetchConfig) -> Result<(), FetchError> {
        let args = self.build_args(url, config);
        info!("Starting yt-dlp: url={} out={}", url, config.output_template);

        let mut cmd = Command::new(&self.bin);
        cmd.args(&args)
            .env("PATH", &self.path_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Dropped before `child` if this future is abandoned
        let (mut child, mut group) = spawn_grouped(&mut cmd)
            .map_err(|e| FetchError::SpawnFailed(format!("{}: {}", self.bin, e)))?;

        debug!("yt-dlp spawned (pid: {:?})", child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::SpawnFailed("No stdout handle".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::SpawnFailed("No stderr handle".into()))?;

        // Stdout reader task - forward to tracing
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "yt_dlp", "{}", line);
            }
        });

        // Stderr reader task - forward to tracing and keep the tail
        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "yt_dlp", "{}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let status = child.wait().await?;
        group.release();
        let _ = stdout_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            info!("yt-dlp finished: url={}", url);
            Ok(())
        } else {
            let code = status.code().unwrap_or(-1);
            let err = FetchError::from_stderr(code, &stderr_tail);
            if err.is_client_error() {
                info!("yt-dlp rejected {} (exit {}): {}", url, code, err);
            } else {
                warn!("yt-dlp failed (exit {}): {}", code, err);
            }
            Err(err)
        }
    }

    async fn version(&self) -> Result<String, FetchError> {
        let output = Command::new(&self.bin)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchError::SpawnFailed(format!("{}: {}", self.bin, e)))?;

        if !output.status.success() {
            return Err(FetchError::from_stderr(
                output.status.code().unwrap_or(-1),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use songdrop_shared::models::AudioCodec;
    use std::path::Path;
    #[cfg(target_os = "linux")]
    use std::time::Duration;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_build_args() {
        let fetcher = YtDlpFetcher::new("yt-dlp", None);
        let cfg = FetchConfig::audio(Path::new("/srv/dl/req-1"), AudioCodec::Mp3, "192");
        let args = strings(&fetcher.build_args("https://youtu.be/dQw4w9WgXcQ", &cfg));

        assert_eq!(
            args,
            vec![
                "-f",
                "bestaudio/best",
                "-o",
                "/srv/dl/req-1/downloaded_song.%(ext)s",
                "--no-playlist",
                "--no-progress",
                "--newline",
                "-x",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "192",
                "--",
                "https://youtu.be/dQw4w9WgXcQ",
            ]
        );
    }

    #[test]
    fn test_build_args_with_ffmpeg_location() {
        let fetcher = YtDlpFetcher::new("yt-dlp", Some(PathBuf::from("/opt/ffmpeg/bin")));
        let cfg = FetchConfig::audio(Path::new("out"), AudioCodec::Opus, "0");
        let args = strings(&fetcher.build_args("https://example.com/--help", &cfg));

        let loc = args.iter().position(|a| a == "--ffmpeg-location").unwrap();
        assert_eq!(args[loc + 1], "/opt/ffmpeg/bin");
        // URL can never be read as an option
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args[args.len() - 1], "https://example.com/--help");
        assert!(args.contains(&"opus".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let fetcher = YtDlpFetcher::new("songdrop-no-such-binary", None);
        let cfg = FetchConfig::audio(Path::new("out"), AudioCodec::Mp3, "192");

        let err = fetcher.fetch("https://example.com/a", &cfg).await.unwrap_err();
        assert!(matches!(err, FetchError::SpawnFailed(_)));
        assert!(matches!(fetcher.version().await, Err(FetchError::SpawnFailed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit() {
        // `false` ignores its arguments and exits 1
        let fetcher = YtDlpFetcher::new("false", None);
        let cfg = FetchConfig::audio(Path::new("out"), AudioCodec::Mp3, "192");

        let err = fetcher.fetch("https://example.com/a", &cfg).await.unwrap_err();
        assert!(matches!(err, FetchError::Failed { code: 1, .. }));
    }

    #[cfg(target_os = "linux")]
    fn is_dead(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => true,
            // State follows the parenthesised command name; Z is an unreaped zombie
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .map_or(false, |rest| rest.trim_start().starts_with('Z')),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_abandoned_child_takes_grandchild_down() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 30 & echo $!; wait"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped());
        let (mut child, group) = spawn_grouped(&mut cmd).unwrap();

        let stdout = child.stdout.take().unwrap();
        let mut lines = BufReader::new(stdout).lines();
        let grandchild: i32 = lines.next_line().await.unwrap().unwrap().trim().parse().unwrap();
        assert!(!is_dead(grandchild));

        drop(group);
        drop(child);

        let mut dead = false;
        for _ in 0..200 {
            if is_dead(grandchild) {
                dead = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dead, "grandchild {grandchild} outlived its process group");
    }
}
