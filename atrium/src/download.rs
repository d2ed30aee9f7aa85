//! Resumable downloads.
//!
//! Data is appended to `<target>.download`; an interrupted download resumes
//! from that file's length with a `Range` request and the file is renamed
//! onto the target once complete.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tokio::io::AsyncWriteExt;

use crate::error::{HostError, Result};
use crate::jobs::JobHandle;

/// Width of the rolling speed window.
pub const SPEED_WINDOW: Duration = Duration::from_secs(3);

/// An open HTTP body.
#[async_trait]
pub trait Transfer: Send {
    /// The server honored the range request.
    fn resumed(&self) -> bool;

    /// Bytes left in this response, when known.
    fn remaining(&self) -> Option<u64>;

    /// Next chunk, `None` at the end.
    async fn chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Request `url` starting at byte `offset`.
    async fn open(&self, url: &str, offset: u64) -> Result<Box<dyn Transfer>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

struct HttpTransfer {
    response: Option<reqwest::Response>,
    resumed: bool,
}

#[async_trait]
impl Transfer for HttpTransfer {
    fn resumed(&self) -> bool {
        self.resumed
    }

    fn remaining(&self) -> Option<u64> {
        match &self.response {
            Some(r) => r.content_length(),
            None => Some(0),
        }
    }

    async fn chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match &mut self.response {
            Some(r) => Ok(r.chunk().await?.map(|b| b.to_vec())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn open(&self, url: &str, offset: u64) -> Result<Box<dyn Transfer>> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        let response = request.send().await?;
        let status = response.status();
        // The partial file already holds everything.
        if offset > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(Box::new(HttpTransfer { response: None, resumed: true }));
        }
        let response = response.error_for_status()?;
        let resumed = status == StatusCode::PARTIAL_CONTENT;
        Ok(Box::new(HttpTransfer { response: Some(response), resumed }))
    }
}

/// Bytes per second over the last [`SPEED_WINDOW`].
#[derive(Debug, Default)]
pub struct SpeedWindow {
    samples: VecDeque<(Instant, u64)>,
}

impl SpeedWindow {
    pub fn push(&mut self, now: Instant, bytes: u64) {
        self.samples.push_back((now, bytes));
        while let Some((t, _)) = self.samples.front() {
            if now.saturating_duration_since(*t) > SPEED_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn bytes_per_sec(&self, now: Instant) -> f64 {
        let Some((first, _)) = self.samples.front() else {
            return 0.0;
        };
        let elapsed = now.saturating_duration_since(*first).as_secs_f64();
        if elapsed < 1e-3 {
            return 0.0;
        }
        self.samples.iter().map(|(_, b)| *b).sum::<u64>() as f64 / elapsed
    }

    /// Seconds left for `remaining` bytes, `None` while the speed is unknown.
    pub fn eta(&self, now: Instant, remaining: u64) -> Option<f64> {
        let speed = self.bytes_per_sec(now);
        (speed > 0.0).then(|| remaining as f64 / speed)
    }
}

/// `<target>.download`.
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".download");
    PathBuf::from(name)
}

fn human_bytes(n: f64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut v = n;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    format!("{v:.1} {}", UNITS[unit])
}

/// Download `url` to `target`, resuming a previous partial file.
pub async fn download(fetcher: &dyn Fetcher, url: &str, target: &Path, job: &JobHandle) -> Result<()> {
    let partial = partial_path(target);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    job.check()?;
    let have = tokio::fs::metadata(&partial).await.map(|m| m.len()).unwrap_or(0);
    let mut transfer = fetcher.open(url, have).await?;
    job.check()?;

    let mut done = if transfer.resumed() { have } else { 0 };
    let mut file = if done > 0 {
        tokio::fs::OpenOptions::new().append(true).open(&partial).await?
    } else {
        tokio::fs::File::create(&partial).await?
    };
    let total = transfer.remaining().map(|r| r + done);
    tracing::info!(url, resumed_at = done, ?total, "download started");

    let mut speed = SpeedWindow::default();
    while let Some(chunk) = transfer.chunk().await? {
        if job.should_stop() {
            file.flush().await?;
            return Err(HostError::Stopped);
        }
        file.write_all(&chunk).await?;
        done += chunk.len() as u64;
        let now = Instant::now();
        speed.push(now, chunk.len() as u64);
        let rate = speed.bytes_per_sec(now);
        let info = match total {
            Some(t) => {
                let eta = speed.eta(now, t.saturating_sub(done)).map(|s| format!(", {s:.0}s left")).unwrap_or_default();
                format!("{} / {} at {}/s{eta}", human_bytes(done as f64), human_bytes(t as f64), human_bytes(rate))
            }
            None => format!("{} at {}/s", human_bytes(done as f64), human_bytes(rate)),
        };
        let progress = total.filter(|t| *t > 0).map(|t| done as f64 / t as f64).unwrap_or(0.0);
        job.set_progress(progress, info);
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if let Some(t) = total {
        if done < t {
            return Err(HostError::Download(format!("connection closed at {done} of {t} bytes")));
        }
    }
    tokio::fs::rename(&partial, target).await?;
    tracing::info!(?target, bytes = done, "download complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_window_drops_old_samples() {
        let t0 = Instant::now();
        let mut w = SpeedWindow::default();
        w.push(t0, 1000);
        assert_eq!(w.bytes_per_sec(t0), 0.0);
        assert_eq!(w.eta(t0, 10), None);
        w.push(t0 + Duration::from_secs(1), 1000);
        assert_eq!(w.bytes_per_sec(t0 + Duration::from_secs(1)), 2000.0);
        w.push(t0 + Duration::from_secs(5), 500);
        // Only the last sample remains in the window.
        assert_eq!(w.bytes_per_sec(t0 + Duration::from_secs(6)), 500.0);
        assert_eq!(w.eta(t0 + Duration::from_secs(6), 1000), Some(2.0));
    }

    #[test]
    fn partial_file_name() {
        assert_eq!(partial_path(Path::new("/x/model.bin")), PathBuf::from("/x/model.bin.download"));
        assert_eq!(human_bytes(1536.0), "1.5 KB");
    }
}
