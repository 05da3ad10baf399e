use thiserror::Error;

use crate::planner::PlanError;

#[derive(Error, Debug)]
pub enum ClipfitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine failed to load: {0}")]
    LoadFailed(String),

    #[error("Failed to stage input: {0}")]
    StageIn(String),

    #[error("Duration probe failed: {0}")]
    Probe(String),

    #[error("No feasible encoding plan: {0}")]
    PlanInfeasible(#[from] PlanError),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Failed to extract encoded output: {0}")]
    Extract(String),

    #[error("Failed to deliver output: {0}")]
    Delivery(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Fatal engine fault, reload required: {0}")]
    FatalEngineFault(String),

    #[error("A batch is already running")]
    Busy,

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl ClipfitError {
    /// Errors that must abort the whole batch rather than a single job.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            ClipfitError::FatalEngineFault(_) | ClipfitError::LoadFailed(_) | ClipfitError::Busy
        )
    }

    /// Re-label an engine error as a stage failure, keeping fatal faults intact.
    pub fn in_stage(self, wrap: fn(String) -> ClipfitError) -> ClipfitError {
        match self {
            ClipfitError::FatalEngineFault(_) => self,
            other => wrap(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClipfitError>;
