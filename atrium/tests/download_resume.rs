//! Resumable downloads against an in-memory server.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use atrium::HostError;
use atrium::download::{Fetcher, Transfer, download, partial_path};
use atrium::jobs::{JobHandle, JobRegistry};

const BODY: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Serves `BODY` in 4-byte chunks, optionally honoring range requests.
struct MemoryServer {
    ranges: bool,
    /// Close the connection after this many bytes.
    cut_at: Option<usize>,
    offsets: Mutex<Vec<u64>>,
}

impl MemoryServer {
    fn new(ranges: bool) -> Self {
        Self { ranges, cut_at: None, offsets: Mutex::new(Vec::new()) }
    }
}

struct MemoryTransfer {
    data: Vec<u8>,
    resumed: bool,
    declared: u64,
}

#[async_trait]
impl Transfer for MemoryTransfer {
    fn resumed(&self) -> bool {
        self.resumed
    }

    fn remaining(&self) -> Option<u64> {
        Some(self.declared)
    }

    async fn chunk(&mut self) -> atrium::Result<Option<Vec<u8>>> {
        if self.data.is_empty() {
            return Ok(None);
        }
        let n = self.data.len().min(4);
        Ok(Some(self.data.drain(..n).collect()))
    }
}

#[async_trait]
impl Fetcher for MemoryServer {
    async fn open(&self, _url: &str, offset: u64) -> atrium::Result<Box<dyn Transfer>> {
        self.offsets.lock().unwrap().push(offset);
        let start = if self.ranges { offset as usize } else { 0 };
        let declared = (BODY.len() - start) as u64;
        let end = self.cut_at.unwrap_or(BODY.len()).max(start);
        Ok(Box::new(MemoryTransfer { data: BODY[start..end].to_vec(), resumed: self.ranges && offset > 0, declared }))
    }
}

#[tokio::test]
async fn resumes_from_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("model.bin");
    std::fs::write(partial_path(&target), &BODY[..10]).unwrap();

    let server = MemoryServer::new(true);
    let job = JobHandle::default();
    download(&server, "http://example.invalid/model.bin", &target, &job).await.unwrap();

    assert_eq!(*server.offsets.lock().unwrap(), vec![10]);
    assert_eq!(std::fs::read(&target).unwrap(), BODY);
    assert!(!partial_path(&target).exists());
    assert!(job.snapshot().progress > 0.99);
}

#[tokio::test]
async fn server_without_ranges_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("model.bin");
    std::fs::write(partial_path(&target), b"stale bytes").unwrap();

    let server = MemoryServer::new(false);
    download(&server, "http://example.invalid/model.bin", &target, &JobHandle::default()).await.unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), BODY);
}

#[tokio::test]
async fn short_body_keeps_partial_for_next_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("model.bin");

    let mut server = MemoryServer::new(true);
    server.cut_at = Some(12);
    let err = download(&server, "http://example.invalid/model.bin", &target, &JobHandle::default()).await.unwrap_err();
    assert!(matches!(err, HostError::Download(_)), "{err}");
    assert!(!target.exists());
    assert_eq!(std::fs::read(partial_path(&target)).unwrap(), &BODY[..12]);

    server.cut_at = None;
    download(&server, "http://example.invalid/model.bin", &target, &JobHandle::default()).await.unwrap();
    assert_eq!(*server.offsets.lock().unwrap(), vec![0, 12]);
    assert_eq!(std::fs::read(&target).unwrap(), BODY);
}

#[test]
fn registry_reports_finished_download() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("weights.bin");
    let server: Arc<dyn Fetcher> = Arc::new(MemoryServer::new(true));
    let jobs = JobRegistry::new().unwrap();

    let spawned = {
        let target = target.clone();
        jobs.spawn("weights", move |job| async move {
            download(&*server, "http://example.invalid/weights.bin", &target, &job).await
        })
    };
    assert!(spawned);

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while jobs.is_running("weights") && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    let status = jobs.status("weights").unwrap();
    assert!(!status.running);
    assert!(!status.failed, "{}", status.info);
    assert_eq!(status.info, "done");
    assert_eq!(std::fs::read(&target).unwrap(), BODY);
}
