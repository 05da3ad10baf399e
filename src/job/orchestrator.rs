use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{Config, EncodeConfig};
use crate::engine::{Completion, EngineClient, EngineCommandBuilder, EngineHandle, Progress};
use crate::error::{ClipfitError, Result};
use crate::output::OutputSink;
use crate::planner::{self, AudioPolicy, EncodingPlan};
use crate::probe;
use super::{output_name, FilePurpose, JobResult, JobScratch, JobState, MediaFile, MediaKind, SkipReason, Stage};

/// Per-job policy, fixed for the whole batch.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub target_size_bits: u64,
    /// Target size label used in output names.
    pub size_mib: u64,
    pub skip_if_smaller: bool,
    pub audio_policy: AudioPolicy,
    pub encode: EncodeConfig,
}

impl JobSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_size_bits: config.target.size_bits(),
            size_mib: config.target.size_mib,
            skip_if_smaller: config.target.skip_if_smaller,
            audio_policy: config.audio.policy.clone(),
            encode: config.encode.clone(),
        }
    }
}

/// Hooks for surfacing encode progress. All methods default to no-ops.
pub trait JobObserver: Send + Sync {
    fn encode_started(&self, _name: &str) {}
    fn encode_progress(&self, _name: &str, _progress: Progress) {}
    fn encode_finished(&self, _name: &str, _success: bool) {}
    /// Called once per job with its terminal state.
    fn job_finished(&self, _name: &str, _state: JobState) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl JobObserver for NoopObserver {}

/// Virtual file names used by one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobNames {
    pub input: String,
    pub output: String,
    pub report: &'static str,
}

impl JobNames {
    pub fn new(input_name: &str, settings: &JobSettings) -> Self {
        let mut output = output_name(input_name, &settings.encode.tag, settings.size_mib);
        if output == input_name {
            output = format!("out_{}", output);
        }
        let report = probe::report_name(input_name, &output);

        Self {
            input: input_name.to_string(),
            output,
            report,
        }
    }
}

type StageResult<T> = std::result::Result<T, (Stage, ClipfitError)>;

/// Runs one input through stage-in, probe, plan, encode, extract and
/// deliver against the shared engine.
///
/// Every virtual file a job creates is gone by the time `run` returns,
/// whatever the outcome. Stage failures come back as
/// `JobResult::Failed`; only faults that make the engine unusable are
/// returned as errors.
pub struct Orchestrator {
    engine: Arc<EngineClient>,
    sink: Arc<dyn OutputSink>,
    settings: JobSettings,
    observer: Arc<dyn JobObserver>,
}

impl Orchestrator {
    pub fn new(engine: Arc<EngineClient>, sink: Arc<dyn OutputSink>, settings: JobSettings) -> Self {
        Self {
            engine,
            sink,
            settings,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn engine(&self) -> &EngineClient {
        &self.engine
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Decide, without touching the engine, whether a file needs work.
    pub fn skip_reason(&self, file: &MediaFile) -> Option<SkipReason> {
        if self.settings.encode.video_only && file.kind != MediaKind::Video {
            return Some(SkipReason::NotVideo);
        }

        let size_bits = file.size_bits();
        if self.settings.skip_if_smaller && size_bits <= self.settings.target_size_bits {
            return Some(SkipReason::AlreadySmallEnough {
                size_bits,
                target_bits: self.settings.target_size_bits,
            });
        }

        None
    }

    pub async fn run(&self, file: &MediaFile) -> Result<JobResult> {
        let span = info_span!("job", id = %Uuid::new_v4(), file = %file.name);
        self.run_job(file).instrument(span).await
    }

    async fn run_job(&self, file: &MediaFile) -> Result<JobResult> {
        let mut state = JobState::Idle;

        if let Some(reason) = self.skip_reason(file) {
            info!("Skipping {}: {}", file.name, reason);
            self.finish(file, &mut state, JobState::Skipped);
            return Ok(JobResult::Skipped { reason });
        }

        let engine = self.engine.acquire().await?;
        let mut scratch = JobScratch::new();
        let outcome = self.run_stages(&engine, &mut scratch, &mut state, file).await;
        scratch.release_all(&engine).await;

        let (terminal, result) = match outcome {
            Ok((output_name, bytes)) => {
                info!("Finished {} -> {} ({} bytes)", file.name, output_name, bytes);
                (JobState::Done, Ok(JobResult::Succeeded { output_name, bytes }))
            }
            Err((stage, cause @ ClipfitError::FatalEngineFault(_))) => (JobState::Failed(stage), Err(cause)),
            Err((stage, cause)) => {
                warn!("Failed {} at {}: {}", file.name, stage, cause);
                (JobState::Failed(stage), Ok(JobResult::Failed { stage, cause }))
            }
        };
        self.finish(file, &mut state, terminal);

        if let Some(fault) = self.engine.fatal_fault() {
            return Err(ClipfitError::FatalEngineFault(fault.to_string()));
        }
        result
    }

    fn finish(&self, file: &MediaFile, state: &mut JobState, terminal: JobState) {
        advance(state, terminal);
        debug_assert!(state.is_terminal(), "job ended in {:?}", state);
        self.observer.job_finished(&file.name, *state);
    }

    async fn run_stages(
        &self,
        engine: &EngineHandle<'_>,
        scratch: &mut JobScratch,
        state: &mut JobState,
        file: &MediaFile,
    ) -> StageResult<(String, u64)> {
        let names = JobNames::new(&file.name, &self.settings);

        scratch.track(&names.input, FilePurpose::Input);
        engine
            .write_file(&names.input, &file.bytes)
            .await
            .map_err(|e| (Stage::StageIn, e.in_stage(ClipfitError::StageIn)))?;
        advance(state, JobState::Staged);

        let duration = probe::probe_duration(engine, scratch, &names.input, names.report)
            .await
            .map_err(|e| (Stage::Probe, e))?;
        advance(state, JobState::Probed);

        let plan = planner::plan(self.settings.target_size_bits, duration, &self.settings.audio_policy)
            .map_err(|e| (Stage::Plan, ClipfitError::from(e)))?;
        info!(
            "Plan for {}: video {} bps, audio {} bps over {:.3}s",
            file.name, plan.video_bitrate_bps, plan.audio_bitrate_bps, plan.duration_seconds
        );
        advance(state, JobState::Planned);

        scratch.track(&names.output, FilePurpose::EncodedOutput);
        let encoded = self.encode(engine, &names, &plan).await;
        scratch.release(engine, &names.input).await;
        match encoded {
            Ok(Completion::Success) => {}
            Ok(Completion::Failed(status)) => {
                return Err((
                    Stage::Encode,
                    ClipfitError::Encode(format!("engine exited with status {}", status)),
                ));
            }
            Err(e) => return Err((Stage::Encode, e.in_stage(ClipfitError::Encode))),
        }
        advance(state, JobState::Encoded);

        let bytes = engine
            .read_file(&names.output)
            .await
            .map_err(|e| (Stage::Extract, e.in_stage(ClipfitError::Extract)))?;
        if bytes.is_empty() {
            return Err((Stage::Extract, ClipfitError::Extract("engine produced an empty output".to_string())));
        }
        advance(state, JobState::Delivered);

        let size = bytes.len() as u64;
        let delivered = self.sink.deliver(&names.output, bytes).await;
        scratch.release(engine, &names.output).await;
        delivered.map_err(|e| match e {
            ClipfitError::Delivery(_) => (Stage::Deliver, e),
            other => (Stage::Deliver, other.in_stage(ClipfitError::Delivery)),
        })?;

        Ok((names.output, size))
    }

    /// Run the encode with a progress channel that lives exactly as long
    /// as the call.
    async fn encode(&self, engine: &EngineHandle<'_>, names: &JobNames, plan: &EncodingPlan) -> Result<Completion> {
        let command = EngineCommandBuilder::encode(&names.input, &names.output, plan, &self.settings.encode);
        info!("{}: {} -> {}", command.description, names.input, names.output);

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<Progress>();
        let relay = async {
            while let Some(progress) = progress_rx.recv().await {
                self.observer.encode_progress(&names.input, progress);
            }
        };

        self.observer.encode_started(&names.input);
        let (completion, ()) = tokio::join!(engine.exec(&command.args, Some(progress_tx)), relay);
        let success = matches!(completion, Ok(Completion::Success));
        self.observer.encode_finished(&names.input, success);

        completion
    }
}

fn advance(state: &mut JobState, next: JobState) {
    debug!("{:?} -> {:?}", state, next);
    *state = next;
}
