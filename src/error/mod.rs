use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::download::video::Stage;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("could not decode response from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("response from {url} is not valid utf-8")]
    Utf8 { url: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("user {0} does not exist")]
    UserNotFound(String),

    #[error("user {0} has no videos")]
    NoVideos(String),

    #[error("manifest of video {video_id} lists no variants")]
    NoVariants { video_id: String },

    #[error("video {video_id} has no {rendition} rendition")]
    MissingRendition { video_id: String, rendition: String },

    #[error("playlist lists no segments")]
    EmptyPlaylist,

    #[error("{missing} of {total} segments are missing")]
    MissingSegments { missing: usize, total: usize },

    #[error("worker pool was closed before the task could start")]
    PoolClosed,

    #[error("could not start {}: {source}", program.display())]
    MuxerSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("muxer exited with {status}: {stderr}")]
    Muxer {
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("muxer did not finish within {0:?}")]
    MuxerTimeout(Duration),
}

impl Error {
    pub fn http(url: impl ToString, source: reqwest::Error) -> Self {
        Error::Http { url: url.to_string(), source }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}

/// Failure of one video together with the pipeline stage it happened in.
#[derive(Debug, Error)]
#[error("video {video_id} failed while {stage}: {source}")]
pub struct StageError {
    pub video_id: String,
    pub stage: Stage,
    #[source]
    pub source: Error,
}
