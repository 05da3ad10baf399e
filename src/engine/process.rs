use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{ClipfitError, Result};
use super::{EngineBackend, EngineVariant, LoadConfig, LogSink, Progress, ProgressSink};

struct Loaded {
    variant: EngineVariant,
    logs: LogSink,
}

/// Engine backed by local `ffmpeg`/`ffprobe` binaries.
///
/// The virtual filesystem is a private temporary directory that both
/// binaries run in, so argument vectors refer to virtual files by bare
/// name. File operations work before `load`; exec and probe do not.
pub struct ProcessEngine {
    ffmpeg_path: String,
    ffprobe_path: String,
    root: TempDir,
    loaded: OnceLock<Loaded>,
}

impl ProcessEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let root = tempfile::Builder::new().prefix("clipfit-vfs-").tempdir()?;
        debug!("Virtual filesystem at {}", root.path().display());

        Ok(Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            root,
            loaded: OnceLock::new(),
        })
    }

    /// Names currently present in the virtual filesystem.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(self.root.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.path().join(name))
    }

    fn loaded(&self) -> Result<&Loaded> {
        self.loaded
            .get()
            .ok_or_else(|| ClipfitError::Engine("engine is not loaded".to_string()))
    }

    async fn check_binary(path: &str) -> Result<String> {
        let output = Command::new(path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| ClipfitError::Engine(format!("{} not found: {}", path, e)))?;

        if !output.status.success() {
            return Err(ClipfitError::Engine(format!("{} version check failed", path)));
        }

        let version_info = String::from_utf8_lossy(&output.stdout);
        Ok(version_info.lines().next().unwrap_or("Unknown version").to_string())
    }
}

#[async_trait]
impl EngineBackend for ProcessEngine {
    async fn load(&self, config: &LoadConfig, logs: LogSink) -> Result<()> {
        if self.loaded.get().is_some() {
            return Ok(());
        }

        let ffmpeg_version = Self::check_binary(&self.ffmpeg_path).await?;
        let ffprobe_version = Self::check_binary(&self.ffprobe_path).await?;
        info!("Using {}", ffmpeg_version);
        debug!("Using {}", ffprobe_version);

        let _ = self.loaded.set(Loaded {
            variant: config.variant,
            logs,
        });
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<bool> {
        let path = self.path_for(name)?;
        fs::write(&path, data).await?;
        Ok(true)
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name)?;
        fs::read(&path)
            .await
            .map_err(|e| ClipfitError::Engine(format!("cannot read {}: {}", name, e)))
    }

    async fn delete_file(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exec(&self, args: &[String], progress: Option<ProgressSink>) -> Result<i32> {
        let loaded = self.loaded()?;

        let mut full_args: Vec<String> = ["-hide_banner", "-nostdin", "-nostats", "-y", "-progress", "pipe:1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        full_args.extend_from_slice(args);
        if loaded.variant == EngineVariant::SingleThreaded && !args.is_empty() {
            // Output options go right before the output name.
            let at = full_args.len() - 1;
            full_args.insert(at, "1".to_string());
            full_args.insert(at, "-threads".to_string());
        }
        debug!("ffmpeg {:?}", full_args);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&full_args)
            .current_dir(self.root.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClipfitError::Engine(format!("failed to start ffmpeg: {}", e)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        // Input duration in microseconds, learned from stderr.
        let total_us = Arc::new(AtomicU64::new(0));

        let log_task = forward_logs(stderr, &loaded.logs, Some(&total_us));
        let progress_task = forward_progress(stdout, progress, &total_us);
        let (status, (), ()) = tokio::join!(child.wait(), log_task, progress_task);

        let status = status.map_err(|e| ClipfitError::Engine(format!("ffmpeg did not finish: {}", e)))?;
        exit_code("ffmpeg", status)
    }

    async fn probe(&self, args: &[String]) -> Result<i32> {
        let loaded = self.loaded()?;
        let (probe_args, report) = split_report_target(args);
        debug!("ffprobe {:?} (report: {:?})", probe_args, report);

        let mut child = Command::new(&self.ffprobe_path)
            .args(&probe_args)
            .current_dir(self.root.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClipfitError::Engine(format!("failed to start ffprobe: {}", e)))?;

        let mut stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let read_report = async {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                use tokio::io::AsyncReadExt;
                out.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };

        let (status, report_bytes, ()) =
            tokio::join!(child.wait(), read_report, forward_logs(stderr, &loaded.logs, None));
        let status = status.map_err(|e| ClipfitError::Engine(format!("ffprobe did not finish: {}", e)))?;
        let code = exit_code("ffprobe", status)?;
        let report_bytes = report_bytes?;

        match report {
            Some(name) => {
                fs::write(self.path_for(&name)?, &report_bytes).await?;
            }
            None => {
                for line in String::from_utf8_lossy(&report_bytes).lines() {
                    (*loaded.logs)(line);
                }
            }
        }

        Ok(code)
    }
}

/// Exit code of a finished binary. A process killed by a signal has no
/// code and must not be mistaken for any status the engine reports.
fn exit_code(program: &str, status: ExitStatus) -> Result<i32> {
    status
        .code()
        .ok_or_else(|| ClipfitError::Engine(format!("{} was terminated ({})", program, status)))
}

/// Virtual file names are bare file names.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ClipfitError::Engine(format!("invalid virtual file name {:?}", name)));
    }
    Ok(())
}

/// Pull the `-o <file>` report redirection out of a probe argument vector.
fn split_report_target(args: &[String]) -> (Vec<String>, Option<String>) {
    let mut rest = Vec::with_capacity(args.len());
    let mut report = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == "-o" {
            report = iter.next().cloned();
        } else {
            rest.push(arg.clone());
        }
    }

    (rest, report)
}

async fn forward_logs<R: AsyncRead + Unpin>(stream: Option<R>, logs: &LogSink, total_us: Option<&Arc<AtomicU64>>) {
    let Some(stream) = stream else { return };
    let mut lines = BufReader::new(stream).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(total) = total_us {
            if total.load(Ordering::Relaxed) == 0 {
                if let Some(seconds) = parse_input_duration(&line) {
                    total.store((seconds * 1_000_000.0) as u64, Ordering::Relaxed);
                }
            }
        }
        (**logs)(line.as_str());
    }
}

async fn forward_progress<R: AsyncRead + Unpin>(
    stream: Option<R>,
    sink: Option<ProgressSink>,
    total_us: &Arc<AtomicU64>,
) {
    let Some(stream) = stream else { return };
    let mut lines = BufReader::new(stream).lines();
    let mut time_us: i64 = 0;

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        // out_time_ms is also microseconds despite its name.
        if let Some(value) = line
            .strip_prefix("out_time_us=")
            .or_else(|| line.strip_prefix("out_time_ms="))
        {
            time_us = value.trim().parse().unwrap_or(time_us);
        } else if let Some(state) = line.strip_prefix("progress=") {
            let Some(sink) = sink.as_ref() else { continue };
            let total = total_us.load(Ordering::Relaxed);
            let ratio = if state == "end" {
                1.0
            } else if total > 0 {
                (time_us.max(0) as f64 / total as f64).min(1.0)
            } else {
                0.0
            };
            let _ = sink.send(Progress { ratio, time_us });
        }
    }
}

/// Parse `HH:MM:SS.xx` into seconds.
fn parse_timestamp(text: &str) -> Option<f64> {
    let mut parts = text.trim().split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Input duration from an ffmpeg banner line such as
/// `  Duration: 00:01:00.00, start: 0.000000, bitrate: 1205 kb/s`.
fn parse_input_duration(line: &str) -> Option<f64> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let stamp = rest.split(',').next()?;
    parse_timestamp(stamp).filter(|s| *s > 0.0)
}
