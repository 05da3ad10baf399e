#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use clipfit::config::Config;
use clipfit::engine::{EngineBackend, EngineClient, LoadConfig, LogSink, Progress, ProgressSink};
use clipfit::error::{ClipfitError, Result};
use clipfit::job::{JobSettings, MediaFile, MediaKind, Orchestrator};
use clipfit::output::OutputSink;

/// Where the fake engine should misbehave for a given input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    /// Write half the input, then error.
    StageIn,
    /// Probe exits non-zero after leaving a partial report behind.
    Probe,
    /// Probe succeeds but reports something that is not a duration.
    ProbeGarbage,
    /// Encode exits non-zero after leaving a partial output behind.
    Encode,
    /// Reading the encoded output fails.
    Extract,
    /// The engine worker aborts during encode.
    Fatal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load,
    Write(String),
    Read(String),
    Delete(String),
    Exec(Vec<String>),
    Probe(Vec<String>),
}

/// In-memory engine with failure injection keyed by input file name.
#[derive(Default)]
pub struct FakeEngine {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    durations: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, FailAt>>,
    unreadable: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
    logs: Mutex<Option<LogSink>>,
    load_failures_left: AtomicUsize,
    failing_deletes: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_duration(&self, input: &str, report: &str) {
        self.durations.lock().unwrap().insert(input.to_string(), report.to_string());
    }

    pub fn fail(&self, input: &str, at: FailAt) {
        self.failures.lock().unwrap().insert(input.to_string(), at);
    }

    pub fn fail_next_loads(&self, count: usize) {
        self.load_failures_left.store(count, Ordering::SeqCst);
    }

    /// Make every delete report failure until `count` deletes have failed.
    pub fn fail_next_deletes(&self, count: usize) {
        self.failing_deletes.store(count, Ordering::SeqCst);
    }

    pub fn files(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn load_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Load).count()
    }

    pub fn exec_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Exec(args) => Some(args),
                _ => None,
            })
            .collect()
    }

    pub fn deletes_of(&self, name: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Delete(n) if n == name))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure_for(&self, input: &str) -> Option<FailAt> {
        self.failures.lock().unwrap().get(input).copied()
    }

    fn log(&self, message: &str) {
        if let Some(logs) = self.logs.lock().unwrap().as_ref() {
            (**logs)(message);
        }
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[async_trait]
impl EngineBackend for FakeEngine {
    async fn load(&self, _config: &LoadConfig, logs: LogSink) -> Result<()> {
        self.record(Call::Load);
        let left = self.load_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.load_failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ClipfitError::Engine("failed to fetch ffmpeg-core.wasm".to_string()));
        }
        *self.logs.lock().unwrap() = Some(logs);
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<bool> {
        self.record(Call::Write(name.to_string()));
        if self.failure_for(name) == Some(FailAt::StageIn) {
            let half = data[..data.len() / 2].to_vec();
            self.files.lock().unwrap().insert(name.to_string(), half);
            return Err(ClipfitError::Engine("out of memory".to_string()));
        }
        self.files.lock().unwrap().insert(name.to_string(), data.to_vec());
        Ok(true)
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.record(Call::Read(name.to_string()));
        let failing_extract = self.unreadable.lock().unwrap().contains(name);
        if failing_extract {
            return Err(ClipfitError::Engine(format!("ENOENT: {}", name)));
        }
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClipfitError::Engine(format!("ENOENT: {}", name)))
    }

    async fn delete_file(&self, name: &str) -> Result<bool> {
        self.record(Call::Delete(name.to_string()));
        let failing = self.failing_deletes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_deletes.store(failing - 1, Ordering::SeqCst);
            self.files.lock().unwrap().remove(name);
            return Err(ClipfitError::Engine(format!("EBUSY: {}", name)));
        }
        Ok(self.files.lock().unwrap().remove(name).is_some())
    }

    async fn exec(&self, args: &[String], progress: Option<ProgressSink>) -> Result<i32> {
        self.record(Call::Exec(args.to_vec()));
        let input = value_after(args, "-i").unwrap_or_default().to_string();
        let output = args.last().cloned().unwrap_or_default();

        if !self.files.lock().unwrap().contains_key(&input) {
            return Ok(1);
        }

        if let Some(sink) = progress.as_ref() {
            let _ = sink.send(Progress { ratio: 0.5, time_us: 30_000_000 });
            let _ = sink.send(Progress { ratio: 1.0, time_us: 60_000_000 });
        }

        match self.failure_for(&input) {
            Some(FailAt::Encode) => {
                self.files.lock().unwrap().insert(output, b"partial".to_vec());
                Ok(1)
            }
            Some(FailAt::Fatal) => {
                self.files.lock().unwrap().insert(output, b"partial".to_vec());
                self.log("Aborted(OOM)");
                Ok(1)
            }
            Some(FailAt::Extract) => {
                self.unreadable.lock().unwrap().insert(output.clone());
                self.files.lock().unwrap().insert(output, b"encoded".to_vec());
                Ok(0)
            }
            _ => {
                let mut encoded = b"encoded:".to_vec();
                encoded.extend_from_slice(input.as_bytes());
                self.files.lock().unwrap().insert(output, encoded);
                Ok(0)
            }
        }
    }

    async fn probe(&self, args: &[String]) -> Result<i32> {
        self.record(Call::Probe(args.to_vec()));
        let report = value_after(args, "-o").unwrap_or_default().to_string();
        let input = args
            .iter()
            .position(|a| a == "-o")
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| args.get(i))
            .cloned()
            .unwrap_or_default();

        if !self.files.lock().unwrap().contains_key(&input) {
            return Ok(1);
        }

        match self.failure_for(&input) {
            Some(FailAt::Probe) => {
                self.files.lock().unwrap().insert(report, Vec::new());
                Ok(1)
            }
            Some(FailAt::ProbeGarbage) => {
                self.files.lock().unwrap().insert(report, b"N/A\n".to_vec());
                Ok(-1)
            }
            _ => {
                let text = self
                    .durations
                    .lock()
                    .unwrap()
                    .get(&input)
                    .cloned()
                    .unwrap_or_else(|| "60.000000\n".to_string());
                self.files.lock().unwrap().insert(report, text.into_bytes());
                // The wasm probe reports -1 when its output is redirected.
                Ok(-1)
            }
        }
    }
}

/// Collects delivered outputs in memory.
#[derive(Default)]
pub struct MemorySink {
    pub delivered: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail: bool,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.delivered.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn deliver(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        if self.fail {
            return Err(ClipfitError::Delivery("disk full".to_string()));
        }
        self.delivered.lock().unwrap().push((name.to_string(), bytes));
        Ok(())
    }
}

/// A video larger than the default 8 MiB target.
pub fn big_video(name: &str) -> MediaFile {
    MediaFile::new(name, vec![7u8; 9 * 1024 * 1024], MediaKind::Video)
}

pub fn settings() -> JobSettings {
    JobSettings::from_config(&Config::default())
}

pub fn orchestrator(engine: &Arc<FakeEngine>, sink: &Arc<MemorySink>) -> Orchestrator {
    let client = Arc::new(EngineClient::new(engine.clone(), LoadConfig::resolve("", false)));
    Orchestrator::new(client, sink.clone(), settings())
}
