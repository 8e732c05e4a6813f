use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use crate::download::playlist::{segment_path, segment_url};
use crate::download::DownloadClient;
use crate::error::{Error, Result};
use crate::options::Options;

#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    pub uri: Url,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    Downloaded,
    /// the file was already on disk
    Skipped,
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub downloaded: usize,
    pub skipped: usize,
    /// names of the segments that ran out of attempts
    pub failed: Vec<String>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    attempts: usize,
    delay: Duration,
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

impl Segment {
    pub fn new(prefix: &Url, folder: &Path, index: usize, name: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            uri: segment_url(prefix, name)?,
            path: segment_path(folder, index),
        })
    }

    async fn download(&self, client: &DownloadClient, policy: RetryPolicy) -> Result<Fetched> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!(segment = %self.name, "segment already on disk");
            return Ok(Fetched::Skipped);
        }

        let mut attempt = 1;
        loop {
            match self.try_download(client).await {
                Ok(()) => return Ok(Fetched::Downloaded),
                Err(err) if attempt >= policy.attempts => return Err(err),
                Err(err) => {
                    warn!(segment = %self.name, attempt, error = %err, "segment download failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    /// One attempt. The body lands in a `.part` file that only replaces the
    /// final path once it is complete.
    async fn try_download(&self, client: &DownloadClient) -> Result<()> {
        let part = part_path(&self.path);

        if let Err(err) = self.write_part(client, &part).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(err);
        }

        match tokio::fs::rename(&part, &self.path).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(Error::io(&self.path, err))
            }
        }
    }

    async fn write_part(&self, client: &DownloadClient, part: &Path) -> Result<()> {
        let mut response = client.send(&self.uri).await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::Status { url: self.uri.to_string(), status });
        }

        let file = tokio::fs::File::create(part)
            .await
            .map_err(|err| Error::io(part, err))?;
        let mut writer = BufWriter::new(file);

        while let Some(chunk) = response.chunk().await.map_err(|err| Error::http(&self.uri, err))? {
            writer.write_all(&chunk).await.map_err(|err| Error::io(part, err))?;
        }
        writer.flush().await.map_err(|err| Error::io(part, err))?;

        Ok(())
    }
}

async fn fetch_with_permit(
    semaphore: &Arc<Semaphore>,
    segment: &Segment,
    client: &DownloadClient,
    policy: RetryPolicy,
) -> Result<Fetched> {
    let _permit = semaphore.acquire().await.map_err(|_| Error::PoolClosed)?;
    segment.download(client, policy).await
}

/// Downloads every segment of `names` into `folder` with at most
/// `options.max_parallel_downloads` requests in flight. Returns once every
/// segment either landed on disk or used up its attempts.
pub async fn download_segments(
    client: &DownloadClient,
    names: &[String],
    prefix: &Url,
    folder: &Path,
    options: &Options,
) -> Result<FetchReport> {
    let segments = names
        .iter()
        .enumerate()
        .map(|(index, name)| Segment::new(prefix, folder, index, name))
        .collect::<Result<Vec<_>>>()?;

    let semaphore = Arc::new(Semaphore::new(options.max_parallel_downloads.max(1)));
    let finished = Arc::new(AtomicUsize::new(0));
    let total = segments.len();
    let policy = RetryPolicy {
        attempts: options.max_download_retries.max(1),
        delay: options.retry_delay,
    };

    let tasks = segments
        .into_iter()
        .map(|segment| {
            let client = client.clone();
            let semaphore = Arc::clone(&semaphore);
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                let result = fetch_with_permit(&semaphore, &segment, &client, policy).await;
                if result.is_ok() {
                    let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(segment = %segment.name, done, total, "segment finished");
                }

                (segment.name, result)
            })
        })
        .collect::<Vec<_>>();

    let mut report = FetchReport::default();

    for task in tasks {
        match task.await {
            Ok((_, Ok(Fetched::Downloaded))) => report.downloaded += 1,
            Ok((_, Ok(Fetched::Skipped))) => report.skipped += 1,
            Ok((name, Err(err))) => {
                warn!(segment = %name, error = %err, "giving up on segment");
                report.failed.push(name);
            }
            Err(err) => {
                warn!(error = %err, "segment task did not finish");
                report.failed.push(String::from("<unknown>"));
            }
        }
    }

    info!(
        downloaded = report.downloaded,
        skipped = report.skipped,
        failed = report.failed.len(),
        "segments done"
    );

    Ok(report)
}
