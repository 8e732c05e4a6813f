use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::download::api::{self, Video};
use crate::download::video::download_video;
use crate::download::DownloadClient;
use crate::error::Result;
use crate::options::Options;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub archived: usize,
    pub failed: usize,
    /// videos whose output already existed
    pub skipped: usize,
    /// videos left out because their id is not numeric
    pub ignored: usize,
}

#[derive(Debug, Default)]
pub struct Selection {
    /// oldest first
    pub pending: Vec<Video>,
    pub skipped: usize,
    pub ignored: usize,
}

/// Drops videos that are already archived or carry an unexpected id and
/// orders the rest oldest first.
pub fn select_pending(videos: Vec<Video>, options: &Options) -> Selection {
    let mut selection = Selection::default();
    let mut keyed = Vec::with_capacity(videos.len());

    for video in videos {
        if options.output_path(&video).exists() {
            info!(video_id = %video.id, "already archived, skipping");
            selection.skipped += 1;
            continue;
        }

        match video.sort_key() {
            Some(key) => keyed.push((key, video)),
            None => {
                warn!(video_id = %video.id, "ignoring video with non numeric id");
                selection.ignored += 1;
            }
        }
    }

    keyed.sort_by_key(|(key, _)| *key);
    selection.pending = keyed.into_iter().map(|(_, video)| video).collect();

    selection
}

/// Archives every video of `login`. Only a failure to look up the user or the
/// video list is returned as an error, failed videos are counted and logged.
pub async fn archive_user(login: &str, options: Arc<Options>) -> Result<ArchiveSummary> {
    let client = DownloadClient::new(&options)?;

    let user_id = api::fetch_user_id(&client, &options, login).await?;
    let videos = api::fetch_videos(&client, &options, &user_id).await?;

    let Selection { pending, skipped, ignored } = select_pending(videos, &options);
    info!(login, pending = pending.len(), skipped, ignored, "starting archive");

    let mut summary = archive_videos(&client, pending, Arc::clone(&options)).await;
    summary.skipped = skipped;
    summary.ignored = ignored;

    Ok(summary)
}

/// Runs the videos with at most `options.max_parallel_videos` at a time and
/// waits for all of them.
pub async fn archive_videos(client: &DownloadClient, videos: Vec<Video>, options: Arc<Options>) -> ArchiveSummary {
    let semaphore = Arc::new(Semaphore::new(options.max_parallel_videos.max(1)));

    let tasks = videos
        .into_iter()
        .map(|video| {
            let client = client.clone();
            let options = Arc::clone(&options);
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Some(download_video(&client, &video, &options).await)
            })
        })
        .collect::<Vec<_>>();

    let mut summary = ArchiveSummary::default();

    for task in tasks {
        match task.await {
            Ok(Some(Ok(output))) => {
                info!(output = %output.display(), "archived video");
                summary.archived += 1;
            }
            Ok(Some(Err(err))) => {
                error!(video_id = %err.video_id, stage = %err.stage, error = %err.source, "video failed");
                summary.failed += 1;
            }
            Ok(None) => {
                error!("video pool closed before the video could start");
                summary.failed += 1;
            }
            Err(err) => {
                error!(error = %err, "video task did not finish");
                summary.failed += 1;
            }
        }
    }

    summary
}
