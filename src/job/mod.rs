// Per-file transcode jobs
//
// - data model shared by the pipeline (MediaFile, JobResult, stages)
// - scratch: ledger of virtual files a job has created
// - orchestrator: the stage-in -> probe -> plan -> encode -> extract ->
//   deliver state machine

pub mod orchestrator;
pub mod scratch;

use serde::{Serialize, Serializer};
use std::fmt;

pub use orchestrator::*;
pub use scratch::*;

use crate::error::ClipfitError;

/// Declared type of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Other,
}

/// One input selected for a batch.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub kind: MediaKind,
}

impl MediaFile {
    pub fn new<S: Into<String>>(name: S, bytes: Vec<u8>, kind: MediaKind) -> Self {
        Self {
            name: name.into(),
            bytes,
            kind,
        }
    }

    pub fn size_bits(&self) -> u64 {
        (self.bytes.len() as u64).saturating_mul(8)
    }
}

/// Job stages that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    StageIn,
    Probe,
    Plan,
    Encode,
    Extract,
    Deliver,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::StageIn => "stage-in",
            Stage::Probe => "probe",
            Stage::Plan => "plan",
            Stage::Encode => "encode",
            Stage::Extract => "extract",
            Stage::Deliver => "deliver",
        };
        f.write_str(name)
    }
}

/// Progress of a job through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Staged,
    Probed,
    Planned,
    Encoded,
    Delivered,
    Done,
    Skipped,
    Failed(Stage),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Skipped | JobState::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Input already fits under the target.
    AlreadySmallEnough { size_bits: u64, target_bits: u64 },
    /// Input's declared type is not video.
    NotVideo,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadySmallEnough { size_bits, target_bits } => write!(
                f,
                "already within target ({} <= {} bits)",
                size_bits, target_bits
            ),
            SkipReason::NotVideo => f.write_str("not a video file"),
        }
    }
}

/// Outcome of one input's run through the pipeline.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult {
    Skipped {
        reason: SkipReason,
    },
    Failed {
        stage: Stage,
        #[serde(serialize_with = "serialize_cause")]
        cause: ClipfitError,
    },
    Succeeded {
        output_name: String,
        /// Size of the delivered output in bytes.
        bytes: u64,
    },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Succeeded { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, JobResult::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobResult::Failed { .. })
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            JobResult::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

fn serialize_cause<S: Serializer>(cause: &ClipfitError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(cause)
}

/// Name of the delivered file: input name minus its last extension,
/// then `_<tag>_<size>mb.mp4`. Names without a `.` keep their full text.
pub fn output_name(input_name: &str, tag: &str, size_mib: u64) -> String {
    let stem = match input_name.rfind('.') {
        Some(idx) => &input_name[..idx],
        None => input_name,
    };
    format!("{}_{}_{}mb.mp4", stem, tag, size_mib)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name_strips_last_extension() {
        assert_eq!(output_name("clip.mov", "clipfit", 8), "clip_clipfit_8mb.mp4");
        assert_eq!(output_name("my.holiday.clip.webm", "clipfit", 8), "my.holiday.clip_clipfit_8mb.mp4");
    }

    #[test]
    fn test_output_name_without_extension_keeps_whole_name() {
        assert_eq!(output_name("clipnoext", "clipfit", 8), "clipnoext_clipfit_8mb.mp4");
    }

    #[test]
    fn test_output_name_uses_target_size() {
        assert_eq!(output_name("a.mp4", "discord", 25), "a_discord_25mb.mp4");
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Skipped.is_terminal());
        assert!(JobState::Failed(Stage::Probe).is_terminal());
        assert!(!JobState::Planned.is_terminal());
    }

    #[test]
    fn test_result_serializes_cause_as_text() {
        let result = JobResult::Failed {
            stage: Stage::Encode,
            cause: ClipfitError::Encode("status 1".to_string()),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "encode");
        assert_eq!(json["cause"], "Encoding failed: status 1");
    }
}
