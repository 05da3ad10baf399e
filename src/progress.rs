use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::engine::Progress;
use crate::job::JobObserver;

const BAR_LENGTH: u64 = 1000;

/// Terminal progress bars, one per encode.
pub struct ProgressBars {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressBars {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }
}

impl Default for ProgressBars {
    fn default() -> Self {
        Self::new()
    }
}

impl JobObserver for ProgressBars {
    fn encode_started(&self, name: &str) {
        let pb = self.multi.add(ProgressBar::new(BAR_LENGTH));
        pb.set_style(Self::style());
        pb.set_message(name.to_string());
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(name.to_string(), pb);
        }
    }

    fn encode_progress(&self, name: &str, progress: Progress) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(pb) = bars.get(name) {
                pb.set_position((progress.ratio.clamp(0.0, 1.0) * BAR_LENGTH as f64) as u64);
            }
        }
    }

    fn encode_finished(&self, name: &str, success: bool) {
        let pb = self.bars.lock().ok().and_then(|mut bars| bars.remove(name));
        if let Some(pb) = pb {
            if success {
                pb.finish_with_message(format!("Encoded {}", name));
            } else {
                pb.abandon_with_message(format!("Encoding failed: {}", name));
            }
        }
    }
}
