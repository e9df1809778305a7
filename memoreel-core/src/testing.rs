//! Test doubles shared by the unit tests

use crate::engine::{EngineError, EngineLoader, TranscodeEngine};
use crate::storage::{BlobRecord, BlobStore, MemoryBlobStore, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory engine filesystem plus a log of every command.
///
/// A trim (`-i <in> ... <out>`) writes `[<in bytes>]` to `<out>`; a concat
/// reads the manifest and joins the listed files.
#[derive(Default)]
pub struct FakeEngineState {
    files: Mutex<BTreeMap<String, Bytes>>,
    writes: Mutex<Vec<String>>,
    reads: Mutex<Vec<String>>,
    runs: Mutex<Vec<Vec<String>>>,
    manifest: Mutex<Option<String>>,
    fail_on: Mutex<Option<String>>,
    empty_for: Mutex<HashSet<String>>,
    run_delay: Mutex<Duration>,
}

impl FakeEngineState {
    pub fn files(&self) -> Vec<String> {
        self.files.lock().keys().cloned().collect()
    }

    /// Names passed to `read_file`, in call order
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().clone()
    }

    pub fn runs(&self) -> Vec<Vec<String>> {
        self.runs.lock().clone()
    }

    pub fn staged_inputs(&self) -> usize {
        self.writes
            .lock()
            .iter()
            .filter(|n| n.starts_with("input_"))
            .count()
    }

    pub fn trim_runs(&self) -> usize {
        self.runs.lock().iter().filter(|a| a.first().map(String::as_str) == Some("-i")).count()
    }

    pub fn concat_runs(&self) -> usize {
        self.runs.lock().iter().filter(|a| a.iter().any(|s| s == "concat")).count()
    }

    /// Last manifest the engine was handed
    pub fn manifest(&self) -> Option<String> {
        self.manifest.lock().clone()
    }

    pub fn fail_runs_containing(&self, arg: &str) {
        *self.fail_on.lock() = Some(arg.to_string());
    }

    pub fn clear_failures(&self) {
        *self.fail_on.lock() = None;
    }

    pub fn produce_empty_clip_for(&self, input: &str) {
        self.empty_for.lock().insert(input.to_string());
    }

    pub fn set_run_delay(&self, delay: Duration) {
        *self.run_delay.lock() = delay;
    }

    fn command_failed(stderr: String) -> EngineError {
        EngineError::Command {
            status: "exit status: 1".into(),
            stderr,
        }
    }
}

pub struct FakeEngine(Arc<FakeEngineState>);

#[async_trait]
impl TranscodeEngine for FakeEngine {
    async fn write_file(&self, name: &str, data: Bytes) -> Result<(), EngineError> {
        if name == "filelist.txt" {
            *self.0.manifest.lock() = Some(String::from_utf8_lossy(&data).to_string());
        }
        self.0.writes.lock().push(name.to_string());
        self.0.files.lock().insert(name.to_string(), data);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Bytes, EngineError> {
        self.0.reads.lock().push(name.to_string());
        self.0
            .files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn file_size(&self, name: &str) -> Result<u64, EngineError> {
        self.0
            .files
            .lock()
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn unlink(&self, name: &str) -> Result<(), EngineError> {
        self.0
            .files
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn run(&self, args: &[String]) -> Result<(), EngineError> {
        let delay = *self.0.run_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.0.runs.lock().push(args.to_vec());

        if let Some(needle) = self.0.fail_on.lock().clone() {
            if args.iter().any(|a| *a == needle) {
                return Err(FakeEngineState::command_failed(format!("{} failed", needle)));
            }
        }

        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_default();
        let output = args.last().cloned().unwrap_or_default();

        let mut files = self.0.files.lock();
        let produced = if args.iter().any(|a| a == "concat") {
            let manifest = files
                .get(&input)
                .cloned()
                .ok_or_else(|| Self::missing(&input))?;
            let mut joined = Vec::new();
            for line in String::from_utf8_lossy(&manifest).lines() {
                let name = line.trim_start_matches("file '").trim_end_matches('\'');
                let part = files.get(name).ok_or_else(|| Self::missing(name))?;
                joined.extend_from_slice(part);
            }
            Bytes::from(joined)
        } else if self.0.empty_for.lock().contains(&input) {
            Bytes::new()
        } else {
            let source = files.get(&input).ok_or_else(|| Self::missing(&input))?;
            let mut wrapped = b"[".to_vec();
            wrapped.extend_from_slice(source);
            wrapped.push(b']');
            Bytes::from(wrapped)
        };
        files.insert(output, produced);
        Ok(())
    }
}

impl FakeEngine {
    fn missing(name: &str) -> EngineError {
        FakeEngineState::command_failed(format!("{}: No such file or directory", name))
    }
}

pub struct FakeLoader {
    state: Arc<FakeEngineState>,
    loads: AtomicUsize,
    fail_next: AtomicBool,
}

impl FakeLoader {
    pub fn new(state: Arc<FakeEngineState>) -> Self {
        Self {
            state,
            loads: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn fail_next_load(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EngineLoader for FakeLoader {
    async fn load(&self) -> Result<Box<dyn TranscodeEngine>, EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Load("engine assets unreachable".into()));
        }
        Ok(Box::new(FakeEngine(self.state.clone())))
    }
}

/// Blob store whose reads, writes or clears can be made to fail
pub struct FlakyBlobStore {
    inner: MemoryBlobStore,
    fail_writes: AtomicBool,
    fail_clear: AtomicBool,
    /// Reads succeed this many times, then fail; `usize::MAX` never fails
    reads_left: AtomicUsize,
}

impl Default for FlakyBlobStore {
    fn default() -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            fail_writes: AtomicBool::new(false),
            fail_clear: AtomicBool::new(false),
            reads_left: AtomicUsize::new(usize::MAX),
        }
    }
}

impl FlakyBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_clear(&self, fail: bool) {
        self.fail_clear.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads_after(&self, reads: usize) {
        self.reads_left.store(reads, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.inner.contains(id)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("quota exceeded".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn get(&self, id: u64) -> Result<Option<Bytes>, StoreError> {
        let left = self.reads_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Unavailable("read failed".into()));
        }
        if left != usize::MAX {
            self.reads_left.store(left - 1, Ordering::SeqCst);
        }
        self.inner.get(id).await
    }

    async fn put(&self, id: u64, blob: Bytes) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put(id, blob).await
    }

    async fn bulk_put(&self, records: Vec<BlobRecord>) -> Result<(), StoreError> {
        self.check()?;
        self.inner.bulk_put(records).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("clear failed".into()));
        }
        self.inner.clear().await
    }
}
