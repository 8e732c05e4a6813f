pub mod mux;

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::download::api::Video;
use crate::download::playlist::segment::download_segments;
use crate::download::playlist::{list_segments, segment_prefix};
use crate::download::{manifest, DownloadClient};
use crate::error::{Error, StageError};
use crate::options::Options;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Listing,
    Fetching,
    Reassembling,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Stage::Resolving => "resolving",
            Stage::Listing => "listing",
            Stage::Fetching => "fetching",
            Stage::Reassembling => "reassembling",
        };
        write!(f, "{}", name)
    }
}

impl Stage {
    fn wrap(self, video_id: &str) -> impl FnOnce(Error) -> StageError + '_ {
        move |source| StageError {
            video_id: video_id.to_string(),
            stage: self,
            source,
        }
    }
}

/// Segment folder of one video, deleted again when dropped.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    pub fn create(path: PathBuf) -> Result<Self, Error> {
        std::fs::create_dir_all(&path).map_err(|err| Error::io(&path, err))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed segment folder"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), error = %err, "could not remove segment folder"),
        }
    }
}

/// Runs one video through resolve, list, fetch and combine. The first failing
/// stage ends the run, the segment folder is removed either way.
pub async fn download_video(client: &DownloadClient, video: &Video, options: &Options) -> Result<PathBuf, StageError> {
    let id = video.id.as_str();
    let output = options.output_path(video);

    info!(video_id = id, title = %video.title, stage = %Stage::Resolving, "starting video");
    let manifest = manifest::resolve(client, options, id)
        .await
        .map_err(Stage::Resolving.wrap(id))?;
    let playlist_url = manifest
        .playlist_url(id, &options.rendition)
        .map_err(Stage::Resolving.wrap(id))?;

    debug!(video_id = id, stage = %Stage::Listing, url = %playlist_url);
    let segments = list_segments(client, &playlist_url)
        .await
        .map_err(Stage::Listing.wrap(id))?;
    let prefix = segment_prefix(&playlist_url).map_err(Stage::Listing.wrap(id))?;

    info!(video_id = id, stage = %Stage::Fetching, segments = segments.len());
    let work_dir = WorkDir::create(options.work_dir(video)).map_err(Stage::Fetching.wrap(id))?;
    let report = download_segments(client, &segments, &prefix, work_dir.path(), options)
        .await
        .map_err(Stage::Fetching.wrap(id))?;
    if !report.is_complete() {
        return Err(Stage::Fetching.wrap(id)(Error::MissingSegments {
            missing: report.failed.len(),
            total: segments.len(),
        }));
    }

    info!(video_id = id, stage = %Stage::Reassembling, output = %output.display());
    mux::combine(options, work_dir.path(), &segments, &output)
        .await
        .map_err(Stage::Reassembling.wrap(id))?;

    drop(work_dir);
    Ok(output)
}
