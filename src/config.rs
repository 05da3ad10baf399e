use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{ClipfitError, Result};
use crate::planner::{self, AudioPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub audio: AudioConfig,
    pub encode: EncodeConfig,
    pub engine: EngineConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Output size cap in MiB
    pub size_mib: u64,
    /// Skip inputs that are already at or under the cap
    pub skip_if_smaller: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Either `{ fixed = 96000 }` or `{ ladder = [131072, 65536, ...] }`
    pub policy: AudioPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Video encoder passed to `-c:v`
    pub video_codec: String,
    /// Encoder speed preset (ultrafast, superfast, veryfast, fast, medium)
    pub preset: String,
    /// Audio encoder passed to `-c:a`
    pub audio_codec: String,
    /// Tag inserted into output names: `<stem>_<tag>_<size>mb.mp4`
    pub tag: String,
    /// Skip inputs that do not look like video
    pub video_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to ffprobe binary
    pub ffprobe_path: String,
    /// Base location of engine assets
    pub asset_base: String,
    /// Use the multi-threaded engine build
    pub multi_threaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory encoded files are delivered into
    pub dir: PathBuf,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            size_mib: 8,
            skip_if_smaller: true,
        }
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            audio_codec: "aac".to_string(),
            tag: "clipfit".to_string(),
            video_only: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            asset_base: String::new(),
            multi_threaded: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

impl TargetConfig {
    pub fn size_bits(&self) -> u64 {
        planner::target_bits_from_mib(self.size_mib)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClipfitError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClipfitError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ClipfitError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.size_mib == 0 {
            return Err(ClipfitError::Config("target.size_mib must be greater than zero".to_string()));
        }

        match &self.audio.policy {
            AudioPolicy::Fixed(0) => {
                return Err(ClipfitError::Config("audio.policy.fixed must be greater than zero".to_string()));
            }
            AudioPolicy::Ladder(rates) if rates.is_empty() => {
                return Err(ClipfitError::Config("audio.policy.ladder must not be empty".to_string()));
            }
            AudioPolicy::Ladder(rates) if rates.contains(&0) => {
                return Err(ClipfitError::Config("audio.policy.ladder must not contain zero".to_string()));
            }
            _ => {}
        }

        for (field, value) in [
            ("encode.video_codec", &self.encode.video_codec),
            ("encode.audio_codec", &self.encode.audio_codec),
            ("encode.preset", &self.encode.preset),
        ] {
            if value.trim().is_empty() {
                return Err(ClipfitError::Config(format!("{} must not be empty", field)));
            }
        }

        Ok(())
    }
}
