//! Token, byte and line accounting for everything that goes into a prompt.
//!
//! Counting runs on a small worker pool fed by a bounded queue. Results are
//! readable only after [`MetricsCollector::wait`], which also closes the queue.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use moka::sync::Cache;
use serde::Serialize;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base};
use tracing::{debug, warn};
use xxhash_rust::xxh64::Xxh64;

/// Pseudo-model name selecting [`ApproxCounter`].
pub const APPROX_MODEL: &str = "approx";

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics collector is closed; add() after wait()")]
    Closed,

    #[error("metrics are still being collected; call wait() first")]
    Pending,

    #[error("a metrics worker panicked")]
    WorkerPanicked,

    #[error("failed to start metrics worker")]
    Spawn(#[source] std::io::Error),

    #[error("unsupported model or encoding: {0}")]
    UnsupportedModel(String),
}

/// Where a piece of content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    File,
    Template,
    User,
    Final,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::File => "file",
            MetricKind::Template => "template",
            MetricKind::User => "user",
            MetricKind::Final => "final",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricKey {
    pub kind: MetricKind,
    pub key: String,
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.key)
    }
}

/// Size of one piece of content. Adding items is commutative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricItem {
    pub bytes: usize,
    pub tokens: usize,
    pub lines: usize,
}

impl Add for MetricItem {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            bytes: self.bytes + rhs.bytes,
            tokens: self.tokens + rhs.tokens,
            lines: self.lines + rhs.lines,
        }
    }
}

impl AddAssign for MetricItem {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for MetricItem {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Lines in `text`; a trailing fragment without a newline counts as a line.
pub fn line_count(text: &str) -> usize {
    let newlines = memchr::memchr_iter(b'\n', text.as_bytes()).count();
    if text.is_empty() || text.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}

/// Measures text. Implementations must be cheap to share across threads.
pub trait Counter: Send + Sync {
    fn tokens(&self, text: &str) -> usize;

    fn count(&self, text: &str) -> MetricItem {
        MetricItem {
            bytes: text.len(),
            tokens: self.tokens(text),
            lines: line_count(text),
        }
    }
}

/// BPE token counts via tiktoken-rs, memoized by content hash.
pub struct TiktokenCounter {
    bpe: CoreBPE,
    cache: Cache<u64, usize>,
}

impl TiktokenCounter {
    /// Accepts a model name ("gpt-4o") or an encoding name ("o200k_base").
    pub fn new(model_or_encoding: &str) -> Result<Self, MetricsError> {
        let lower = model_or_encoding.to_ascii_lowercase();
        let unsupported = || MetricsError::UnsupportedModel(model_or_encoding.to_string());

        let bpe = match get_bpe_from_model(&lower) {
            Ok(b) => b,
            Err(_) => match lower.as_str() {
                "o200k_base" => o200k_base().map_err(|_| unsupported())?,
                "cl100k_base" => cl100k_base().map_err(|_| unsupported())?,
                _ => return Err(unsupported()),
            },
        };

        Ok(Self {
            bpe,
            cache: Cache::new(100_000),
        })
    }
}

impl Counter for TiktokenCounter {
    fn tokens(&self, text: &str) -> usize {
        let mut hasher = Xxh64::new(0);
        hasher.update(text.as_bytes());
        let key = hasher.digest();

        if let Some(t) = self.cache.get(&key) {
            return t;
        }

        let t = self.bpe.encode_ordinary(text).len();
        self.cache.insert(key, t);
        t
    }
}

/// Roughly four bytes per token; needs no model data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxCounter;

impl Counter for ApproxCounter {
    fn tokens(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

/// Counter for a configured model name.
pub fn counter_for(model: &str) -> Result<Arc<dyn Counter>, MetricsError> {
    if model.eq_ignore_ascii_case(APPROX_MODEL) {
        return Ok(Arc::new(ApproxCounter));
    }
    Ok(Arc::new(TiktokenCounter::new(model)?))
}

struct Job {
    key: MetricKey,
    content: String,
}

type Results = Arc<Mutex<HashMap<MetricKey, MetricItem>>>;

/// Concurrent accounting keyed by `(kind, key)`.
pub struct MetricsCollector {
    sender: Mutex<Option<SyncSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    results: Results,
    finished: AtomicBool,
}

impl MetricsCollector {
    /// One worker per available CPU.
    pub fn new(counter: Arc<dyn Counter>) -> Result<Self, MetricsError> {
        let workers = thread::available_parallelism().map_or(4, |n| n.get());
        Self::with_workers(counter, workers)
    }

    pub fn with_workers(counter: Arc<dyn Counter>, workers: usize) -> Result<Self, MetricsError> {
        let workers = workers.max(1);
        let (tx, rx) = sync_channel::<Job>(workers * 4);
        let rx = Arc::new(Mutex::new(rx));
        let results: Results = Arc::default();

        let handles = (0..workers)
            .map(|i| {
                let rx = Arc::clone(&rx);
                let counter = Arc::clone(&counter);
                let results = Arc::clone(&results);
                thread::Builder::new()
                    .name(format!("metrics-{i}"))
                    .spawn(move || work(&rx, counter.as_ref(), &results))
                    .map_err(MetricsError::Spawn)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(workers, "metrics pool started");
        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            results,
            finished: AtomicBool::new(false),
        })
    }

    /// Queue `content` for counting. Blocks while the queue is full.
    pub fn add(
        &self,
        kind: MetricKind,
        key: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), MetricsError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(MetricsError::Closed)?;

        let job = Job {
            key: MetricKey {
                kind,
                key: key.into(),
            },
            content: content.into(),
        };
        sender.send(job).map_err(|_| MetricsError::Closed)
    }

    /// Close the queue and join the workers. Later calls do nothing.
    pub fn wait(&self) -> Result<(), MetricsError> {
        // Dropping the last sender ends each worker's recv loop
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let mut panicked = false;
        for handle in handles {
            if handle.join().is_err() {
                warn!("metrics worker panicked");
                panicked = true;
            }
        }

        self.finished.store(true, Ordering::Release);
        if panicked {
            return Err(MetricsError::WorkerPanicked);
        }
        Ok(())
    }

    pub fn get(&self, kind: MetricKind, key: &str) -> Result<Option<MetricItem>, MetricsError> {
        let key = MetricKey {
            kind,
            key: key.to_string(),
        };
        Ok(self.read()?.get(&key).copied())
    }

    pub fn sum_by(&self, kind: MetricKind) -> Result<MetricItem, MetricsError> {
        Ok(self
            .read()?
            .iter()
            .filter(|(k, _)| k.kind == kind)
            .map(|(_, v)| *v)
            .sum())
    }

    /// Everything that fed the prompt; the rendered `final` output is excluded.
    pub fn total(&self) -> Result<MetricItem, MetricsError> {
        Ok(self
            .read()?
            .iter()
            .filter(|(k, _)| k.kind != MetricKind::Final)
            .map(|(_, v)| *v)
            .sum())
    }

    /// All entries sorted by kind, then key.
    pub fn entries(&self) -> Result<Vec<(MetricKey, MetricItem)>, MetricsError> {
        let mut out: Vec<_> = self
            .read()?
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// `{"type:key": {bytes, tokens, lines}}`
    pub fn to_json(&self) -> Result<String, MetricsError> {
        let map: BTreeMap<String, MetricItem> = self
            .entries()?
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        // A map of plain integers always serializes
        Ok(serde_json::to_string_pretty(&map).unwrap_or_default())
    }

    fn read(&self) -> Result<std::sync::MutexGuard<'_, HashMap<MetricKey, MetricItem>>, MetricsError> {
        if !self.finished.load(Ordering::Acquire) {
            return Err(MetricsError::Pending);
        }
        Ok(self.results.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Drop for MetricsCollector {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::Acquire) {
            let _ = self.wait();
        }
    }
}

fn work(rx: &Mutex<Receiver<Job>>, counter: &dyn Counter, results: &Mutex<HashMap<MetricKey, MetricItem>>) {
    loop {
        // Hold the receiver lock only while waiting for the next job
        let job = match rx.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => return,
        };
        let Ok(job) = job else {
            return;
        };

        let item = counter.count(&job.content);
        *results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job.key)
            .or_default() += item;
    }
}
