use crate::config::EncodeConfig;
use crate::planner::EncodingPlan;

/// Argument vector for one engine invocation
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCommand {
    pub args: Vec<String>,
    pub description: String,
}

impl EngineCommand {
    /// Create an empty command
    pub fn new<S: Into<String>>(description: S) -> Self {
        Self {
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input virtual file
    pub fn input<S: Into<String>>(self, name: S) -> Self {
        self.arg("-i").arg(name)
    }

    /// Add output virtual file
    pub fn output<S: Into<String>>(self, name: S) -> Self {
        self.arg(name)
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set encoder speed preset
    pub fn preset<S: Into<String>>(self, preset: S) -> Self {
        self.arg("-preset").arg(preset)
    }

    /// Set average video bitrate in bits per second
    pub fn video_bitrate(self, bps: u32) -> Self {
        self.arg("-b:v").arg(bps.to_string())
    }

    /// Set video rate ceiling in bits per second
    pub fn max_rate(self, bps: u32) -> Self {
        self.arg("-maxrate").arg(bps.to_string())
    }

    /// Set rate control buffer size in bits. Without it `-maxrate` is ignored.
    pub fn buf_size(self, bits: u32) -> Self {
        self.arg("-bufsize").arg(bits.to_string())
    }

    /// Set audio bitrate in bits per second
    pub fn audio_bitrate(self, bps: u32) -> Self {
        self.arg("-b:a").arg(bps.to_string())
    }

    /// Set log verbosity
    pub fn log_level<S: Into<String>>(self, level: S) -> Self {
        self.arg("-v").arg(level)
    }

    /// Redirect the probe report into a virtual file
    pub fn report_to<S: Into<String>>(self, name: S) -> Self {
        self.arg("-o").arg(name)
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}

/// Builders for the two invocations a job makes
pub struct EngineCommandBuilder;

impl EngineCommandBuilder {
    /// Size-capped encode: average bitrate and ceiling both pinned to the plan.
    pub fn encode(
        input: &str,
        output: &str,
        plan: &EncodingPlan,
        settings: &EncodeConfig,
    ) -> EngineCommand {
        EngineCommand::new("Size-capped encode")
            .input(input)
            .video_codec(settings.video_codec.as_str())
            .preset(settings.preset.as_str())
            .video_bitrate(plan.video_bitrate_bps)
            .max_rate(plan.video_bitrate_bps)
            .buf_size(plan.video_bitrate_bps)
            .audio_codec(settings.audio_codec.as_str())
            .audio_bitrate(plan.audio_bitrate_bps)
            .output(output)
    }

    /// Container duration as a bare number, written to `report`.
    pub fn probe_duration(input: &str, report: &str) -> EngineCommand {
        EngineCommand::new("Duration probe")
            .log_level("error")
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(input)
            .report_to(report)
    }
}
