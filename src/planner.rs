//! Size-constrained bitrate planning.
//!
//! Converts a target output size and a probed duration into an
//! (audio, video) bitrate pair whose combined stream size stays within
//! the target. Pure and deterministic; never touches the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bits in one mebibyte.
pub const MIB_BITS: u64 = 1024 * 1024 * 8;

/// Audio rates tried from highest to lowest when no fixed rate is configured.
pub const DEFAULT_AUDIO_LADDER: [u32; 4] = [128 * 1024, 64 * 1024, 32 * 1024, 16 * 1024];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("duration must be a positive finite number of seconds, got {0}")]
    InvalidDuration(f64),

    #[error("audio at {lowest_bps} bps for {duration_seconds}s alone reaches the {target_bits}-bit target")]
    AudioExceedsTarget {
        lowest_bps: u32,
        duration_seconds: f64,
        target_bits: u64,
    },

    #[error("no bits left for video at {audio_bps} bps audio over {duration_seconds}s")]
    NoVideoBudget {
        audio_bps: u32,
        duration_seconds: f64,
    },

    #[error("audio policy has no candidate bitrates")]
    NoAudioCandidates,
}

/// How the audio bitrate is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioPolicy {
    /// Always use this rate.
    Fixed(u32),
    /// Try each rate, highest first, and keep the first that fits.
    Ladder(Vec<u32>),
}

impl Default for AudioPolicy {
    fn default() -> Self {
        AudioPolicy::Ladder(DEFAULT_AUDIO_LADDER.to_vec())
    }
}

impl AudioPolicy {
    /// Candidate rates in descending order, zero rates dropped.
    pub fn candidates(&self) -> Vec<u32> {
        let mut rates = match self {
            AudioPolicy::Fixed(rate) => vec![*rate],
            AudioPolicy::Ladder(rates) => rates.clone(),
        };
        rates.retain(|&r| r > 0);
        rates.sort_unstable_by(|a, b| b.cmp(a));
        rates.dedup();
        rates
    }
}

/// Bitrates chosen for one job. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EncodingPlan {
    pub target_size_bits: u64,
    pub duration_seconds: f64,
    pub audio_bitrate_bps: u32,
    pub video_bitrate_bps: u32,
}

impl EncodingPlan {
    /// Projected size of both streams in bits.
    pub fn projected_bits(&self) -> f64 {
        (self.audio_bitrate_bps as f64 + self.video_bitrate_bps as f64) * self.duration_seconds
    }
}

/// Target size in bits for a size expressed in MiB.
pub fn target_bits_from_mib(mib: u64) -> u64 {
    mib.saturating_mul(MIB_BITS)
}

/// Plan bitrates so that `(audio + video) * duration` never exceeds the target.
pub fn plan(
    target_size_bits: u64,
    duration_seconds: f64,
    policy: &AudioPolicy,
) -> Result<EncodingPlan, PlanError> {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(PlanError::InvalidDuration(duration_seconds));
    }

    let candidates = policy.candidates();
    let lowest = *candidates.last().ok_or(PlanError::NoAudioCandidates)?;
    let target = target_size_bits as f64;

    let (audio_bps, audio_bits) = candidates
        .iter()
        .map(|&rate| (rate, rate as f64 * duration_seconds))
        .find(|&(_, bits)| bits < target)
        .ok_or(PlanError::AudioExceedsTarget {
            lowest_bps: lowest,
            duration_seconds,
            target_bits: target_size_bits,
        })?;

    let raw_video = ((target - audio_bits) / duration_seconds).floor();
    if raw_video < 1.0 {
        return Err(PlanError::NoVideoBudget {
            audio_bps,
            duration_seconds,
        });
    }

    let mut video_bps = raw_video.min(u32::MAX as f64) as u32;
    // Float rounding can push the reconstruction a hair over the target.
    while video_bps > 0 && (audio_bps as f64 + video_bps as f64) * duration_seconds > target {
        video_bps -= 1;
    }
    if video_bps == 0 {
        return Err(PlanError::NoVideoBudget {
            audio_bps,
            duration_seconds,
        });
    }

    Ok(EncodingPlan {
        target_size_bits,
        duration_seconds,
        audio_bitrate_bps: audio_bps,
        video_bitrate_bps: video_bps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EIGHT_MIB: u64 = 8 * MIB_BITS;

    #[test]
    fn test_one_minute_clip_keeps_top_audio_rate() {
        let plan = plan(EIGHT_MIB, 60.0, &AudioPolicy::default()).unwrap();
        assert_eq!(plan.audio_bitrate_bps, 131_072);
        assert_eq!(plan.video_bitrate_bps, 987_409);
        assert_eq!(plan.target_size_bits, 67_108_864);
    }

    #[test]
    fn test_reconstructed_size_never_exceeds_target() {
        for duration in [0.5, 1.0, 7.3, 33.333, 60.0, 119.9, 400.0, 1234.5678] {
            let plan = plan(EIGHT_MIB, duration, &AudioPolicy::default()).unwrap();
            assert!(plan.video_bitrate_bps > 0, "duration {duration}");
            assert!(plan.projected_bits() <= EIGHT_MIB as f64, "duration {duration}");
        }
    }

    #[test]
    fn test_ladder_steps_down_for_long_clips() {
        // 128k * 600s = 78.6M bits > 8 MiB, 64k * 600s = 39.3M bits fits.
        let plan = plan(EIGHT_MIB, 600.0, &AudioPolicy::default()).unwrap();
        assert_eq!(plan.audio_bitrate_bps, 65_536);
    }

    #[test]
    fn test_ladder_order_does_not_matter() {
        let shuffled = AudioPolicy::Ladder(vec![16 * 1024, 128 * 1024, 32 * 1024, 64 * 1024]);
        assert_eq!(
            plan(EIGHT_MIB, 60.0, &shuffled),
            plan(EIGHT_MIB, 60.0, &AudioPolicy::default())
        );
    }

    #[test]
    fn test_infeasible_when_lowest_audio_fills_target() {
        // 16k * 4096s = exactly 8 MiB: meeting the target is not enough.
        let err = plan(EIGHT_MIB, 4096.0, &AudioPolicy::default()).unwrap_err();
        assert!(matches!(err, PlanError::AudioExceedsTarget { lowest_bps: 16_384, .. }));

        let err = plan(EIGHT_MIB, 10_000.0, &AudioPolicy::default()).unwrap_err();
        assert!(matches!(err, PlanError::AudioExceedsTarget { .. }));
    }

    #[test]
    fn test_infeasible_when_video_budget_rounds_to_zero() {
        // Audio leaves less than one bit per second for video.
        let err = plan(1005, 10.0, &AudioPolicy::Fixed(100)).unwrap_err();
        assert!(matches!(err, PlanError::NoVideoBudget { audio_bps: 100, .. }));
    }

    #[test]
    fn test_fixed_policy() {
        let plan = plan(EIGHT_MIB, 60.0, &AudioPolicy::Fixed(96_000)).unwrap();
        assert_eq!(plan.audio_bitrate_bps, 96_000);
        assert_eq!(plan.video_bitrate_bps, ((67_108_864.0 - 96_000.0 * 60.0) / 60.0_f64).floor() as u32);
    }

    #[test]
    fn test_degenerate_inputs_rejected() {
        for duration in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                plan(EIGHT_MIB, duration, &AudioPolicy::default()),
                Err(PlanError::InvalidDuration(_))
            ));
        }
        assert_eq!(
            plan(EIGHT_MIB, 60.0, &AudioPolicy::Ladder(vec![])),
            Err(PlanError::NoAudioCandidates)
        );
        assert_eq!(
            plan(EIGHT_MIB, 60.0, &AudioPolicy::Fixed(0)),
            Err(PlanError::NoAudioCandidates)
        );
    }
}
