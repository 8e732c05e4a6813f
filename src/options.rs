use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::download::api::Video;

pub const CLIENT_ID: &str = "5mb1rkkrde9bnnm6d5q26pyw8rsosc";
pub const API_BASE: &str = "https://api.twitch.tv/";
pub const USHER_BASE: &str = "https://usher.twitch.tv/";

#[derive(Debug, Clone)]
pub struct Options {
    pub client_id: String,
    pub api_base: Url,
    pub usher_base: Url,
    /// rendition that gets archived, "chunked" is the source quality
    pub rendition: String,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub max_parallel_videos: usize,
    pub max_parallel_downloads: usize,
    pub max_download_retries: usize,
    pub retry_delay: Duration,
    pub http_timeout: Duration,
    pub ffmpeg: PathBuf,
    pub mux_timeout: Duration,
    pub page_size: u32,
    pub max_pages: usize,
    pub extension: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            client_id: CLIENT_ID.to_string(),
            api_base: Url::parse(API_BASE).expect("API_BASE is a valid url"),
            usher_base: Url::parse(USHER_BASE).expect("USHER_BASE is a valid url"),
            rendition: "chunked".to_string(),
            output_dir: PathBuf::from("."),
            temp_dir: PathBuf::from("."),
            max_parallel_videos: 4,
            max_parallel_downloads: 4,
            max_download_retries: 3,
            retry_delay: Duration::from_secs(1),
            http_timeout: Duration::from_secs(30),
            ffmpeg: PathBuf::from("ffmpeg"),
            mux_timeout: Duration::from_secs(4 * 60 * 60),
            page_size: 100,
            max_pages: 1,
            extension: "mp4".to_string(),
        }
    }
}

impl Options {
    /// Final location of an archived video, `<output>/<id>_<title>_<duration>.<ext>`.
    pub fn output_path(&self, video: &Video) -> PathBuf {
        self.output_dir.join(video.file_name(&self.extension))
    }

    /// Scratch folder that holds the segments of a video while it is downloaded.
    pub fn work_dir(&self, video: &Video) -> PathBuf {
        work_dir_in(&self.temp_dir, &video.id)
    }
}

fn work_dir_in(base: &Path, video_id: &str) -> PathBuf {
    base.join(format!("_{}", video_id))
}
