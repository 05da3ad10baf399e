//! Duration probe stage.
//!
//! Runs the engine's metadata probe against a staged input, asking for
//! the container duration only, with the report redirected into a
//! separate virtual file. The report is read back, deleted, and parsed.

use tracing::{debug, info};

use crate::engine::{Completion, EngineCommandBuilder, EngineHandle};
use crate::error::{ClipfitError, Result};
use crate::job::{FilePurpose, JobScratch};

/// Virtual file the probe report is written to.
pub const REPORT_NAME: &str = "duration.txt";

/// Used instead of `REPORT_NAME` when a media file already has that name.
pub const REPORT_ALT_NAME: &str = "duration.probe.txt";

/// Pick a report name that does not collide with the job's media files.
pub fn report_name(input_name: &str, output_name: &str) -> &'static str {
    if input_name == REPORT_NAME || output_name == REPORT_NAME {
        REPORT_ALT_NAME
    } else {
        REPORT_NAME
    }
}

/// Parse the bare numeric probe report into seconds.
pub fn parse_duration(report: &str) -> Result<f64> {
    let text = report.trim();
    let seconds: f64 = text
        .parse()
        .map_err(|_| ClipfitError::Probe(format!("unparseable duration {:?}", text)))?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ClipfitError::Probe(format!("duration must be positive, got {}", seconds)));
    }

    Ok(seconds)
}

/// Probe the duration of an already staged input.
///
/// The report file is tracked in `scratch` before the probe runs and is
/// released as soon as it has been read, whether or not the read worked.
pub async fn probe_duration(
    engine: &EngineHandle<'_>,
    scratch: &mut JobScratch,
    input_name: &str,
    report: &str,
) -> Result<f64> {
    scratch.track(report, FilePurpose::ProbeOutput);

    let args = EngineCommandBuilder::probe_duration(input_name, report).into_args();
    let completion = engine
        .probe(&args)
        .await
        .map_err(|e| e.in_stage(ClipfitError::Probe))?;

    if let Completion::Failed(status) = completion {
        return Err(ClipfitError::Probe(format!("probe exited with status {}", status)));
    }

    let text = engine.read_text(report).await;
    scratch.release(engine, report).await;
    let text = text.map_err(|e| e.in_stage(ClipfitError::Probe))?;
    debug!("probe report for {}: {:?}", input_name, text.trim());

    let seconds = parse_duration(&text)?;
    info!("Probed duration of {}: {:.3}s", input_name, seconds);
    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60.000000\n").unwrap(), 60.0);
        assert_eq!(parse_duration("  12.5 ").unwrap(), 12.5);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for report in ["", "N/A", "abc", "0", "0.0", "-3.2", "NaN", "inf"] {
            assert!(
                matches!(parse_duration(report), Err(ClipfitError::Probe(_))),
                "report {:?}",
                report
            );
        }
    }

    #[test]
    fn test_report_name_avoids_collisions() {
        assert_eq!(report_name("clip.mov", "clip_clipfit_8mb.mp4"), REPORT_NAME);
        assert_eq!(report_name("duration.txt", "duration_clipfit_8mb.mp4"), REPORT_ALT_NAME);
        assert_eq!(report_name("clip.mov", "duration.txt"), REPORT_ALT_NAME);
    }
}
