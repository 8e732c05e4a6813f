pub mod segment;

use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;

use crate::download::DownloadClient;
use crate::error::Result;

/// Segment names in playlist order, every line that is neither empty nor a tag.
pub fn parse_segment_names(playlist: &str) -> Vec<String> {
    playlist
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub async fn list_segments(client: &DownloadClient, playlist_url: &Url) -> Result<Vec<String>> {
    let playlist = client.text(playlist_url).await?;
    let segments = parse_segment_names(&playlist);
    debug!(url = %playlist_url, count = segments.len(), "parsed playlist");

    Ok(segments)
}

/// Folder of the playlist, segment names are relative to it.
pub fn segment_prefix(playlist_url: &Url) -> Result<Url> {
    Ok(playlist_url.join("./")?)
}

pub fn segment_url(prefix: &Url, name: &str) -> Result<Url> {
    match Url::parse(name) {
        Ok(uri) => Ok(uri),
        Err(_) => Ok(prefix.join(name)?),
    }
}

/// Local file name of the segment at `index` in the playlist. Names come from
/// the position only, so every playlist entry gets a file of its own.
pub fn segment_file_name(index: usize) -> String {
    format!("{:06}.ts", index)
}

pub fn segment_path(folder: &Path, index: usize) -> PathBuf {
    folder.join(segment_file_name(index))
}
