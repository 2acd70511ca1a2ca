#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bulkup_core::integrity::digest_bytes;
use bulkup_core::{
    Digest, ErrorKind, ObjectStore, PutReceipt, PutRequest, StoreError, TransferTask,
    UploadSettings,
};
use tempfile::TempDir;

/// What the fake store saw for one `put`
#[derive(Debug, Clone)]
pub struct PutRecord {
    pub name: String,
    pub size: u64,
    pub metadata: HashMap<String, String>,
    pub content_type: String,
    pub overwrite: bool,
}

/// In-memory object store with scripted failures and latency
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashSet<String>>,
    put_failures: Mutex<HashMap<String, VecDeque<ErrorKind>>>,
    exists_failures: Mutex<HashMap<String, VecDeque<ErrorKind>>>,
    latency: Mutex<HashMap<String, Duration>>,
    default_latency: Mutex<Duration>,
    exists_latency: Mutex<Duration>,
    wrong_digest: Mutex<HashSet<String>>,
    puts: Mutex<Vec<PutRecord>>,
    exists_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend an object already exists
    pub fn insert_existing(&self, name: &str) {
        self.objects.lock().unwrap().insert(name.to_string());
    }

    /// Fail the next `put` calls for `name` with these kinds, in order
    pub fn fail_puts(&self, name: &str, kinds: &[ErrorKind]) {
        self.put_failures
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .extend(kinds.iter().copied());
    }

    pub fn fail_exists(&self, name: &str, kinds: &[ErrorKind]) {
        self.exists_failures
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .extend(kinds.iter().copied());
    }

    pub fn set_latency(&self, name: &str, latency: Duration) {
        self.latency
            .lock()
            .unwrap()
            .insert(name.to_string(), latency);
    }

    pub fn set_default_latency(&self, latency: Duration) {
        *self.default_latency.lock().unwrap() = latency;
    }

    /// Delay every `exists` call
    pub fn set_exists_latency(&self, latency: Duration) {
        *self.exists_latency.lock().unwrap() = latency;
    }

    /// Report a digest that does not match the uploaded bytes
    pub fn corrupt_digest(&self, name: &str) {
        self.wrong_digest.lock().unwrap().insert(name.to_string());
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    pub fn put_count_for(&self, name: &str) -> usize {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name == name)
            .count()
    }

    pub fn puts(&self) -> Vec<PutRecord> {
        self.puts.lock().unwrap().clone()
    }

    /// Target names in the order their first `put` started
    pub fn put_order(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.puts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| seen.insert(p.name.clone()))
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.lock().unwrap().contains(name)
    }

    fn latency_for(&self, name: &str) -> Duration {
        self.latency
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or_else(|| *self.default_latency.lock().unwrap())
    }

    fn next_failure(map: &Mutex<HashMap<String, VecDeque<ErrorKind>>>, name: &str) -> Option<ErrorKind> {
        map.lock()
            .unwrap()
            .get_mut(name)
            .and_then(|queue| queue.pop_front())
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.exists_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(kind) = Self::next_failure(&self.exists_failures, name) {
            return Err(StoreError::new(kind, format!("scripted exists failure for {name}")));
        }
        Ok(self.contains(name))
    }

    async fn put(&self, request: PutRequest<'_>) -> Result<PutReceipt, StoreError> {
        self.puts.lock().unwrap().push(PutRecord {
            name: request.name.to_string(),
            size: request.size,
            metadata: request.metadata.clone(),
            content_type: request.content_type.to_string(),
            overwrite: request.overwrite,
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let latency = self.latency_for(request.name);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = if let Some(kind) = Self::next_failure(&self.put_failures, request.name) {
            Err(StoreError::new(
                kind,
                format!("scripted put failure for {}", request.name),
            ))
        } else if !request.overwrite && self.contains(request.name) {
            Err(StoreError::new(ErrorKind::AlreadyExists, "precondition failed"))
        } else {
            match std::fs::read(request.source) {
                Ok(bytes) => {
                    self.objects
                        .lock()
                        .unwrap()
                        .insert(request.name.to_string());
                    let digest = if self.wrong_digest.lock().unwrap().contains(request.name) {
                        digest_bytes(b"something else")
                    } else {
                        digest_bytes(&bytes)
                    };
                    Ok(PutReceipt {
                        remote_digest: Some(digest),
                    })
                }
                Err(e) => Err(StoreError::new(ErrorKind::Io, e.to_string())),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Store that reports no digest at all
pub struct NoDigestStore;

#[async_trait]
impl ObjectStore for NoDigestStore {
    async fn exists(&self, _name: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn put(&self, _request: PutRequest<'_>) -> Result<PutReceipt, StoreError> {
        Ok(PutReceipt::default())
    }
}

/// Fast retry settings for tests
pub fn settings(max_workers: usize, max_retries: u32) -> UploadSettings {
    UploadSettings {
        max_workers,
        max_retries,
        base_delay_ms: 1,
        max_delay_ms: 5,
        exclude: Vec::new(),
        ..Default::default()
    }
}

/// Write `files` (relative path, contents) under a fresh temp dir
pub fn tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (rel, contents) in files {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }
    dir
}

/// One task per file, targets named after the relative path
pub fn tasks_for(root: &Path, names: &[&str]) -> Vec<TransferTask> {
    names
        .iter()
        .map(|name| TransferTask::new(root.join(name), *name))
        .collect()
}

pub fn file_in(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

pub fn digest_of(contents: &str) -> Digest {
    digest_bytes(contents.as_bytes())
}
