use std::collections::HashMap;

use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::download::{endpoint, DownloadClient};
use crate::error::{Error, Result};
use crate::options::Options;

#[derive(Deserialize, Debug)]
struct TokenResponse {
    token: String,
    sig: String,
    #[serde(default)]
    expires_at: Value,
}

/// Short lived playback credential of a single video.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub video_id: String,
    pub token: String,
    pub signature: String,
    pub expiry: Option<String>,
}

/// Playlist url of every rendition a video offers.
#[derive(Debug, Default)]
pub struct Manifest {
    renditions: HashMap<String, String>,
}

impl Manifest {
    pub fn rendition(&self, name: &str) -> Option<&str> {
        self.renditions.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.renditions.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.renditions.is_empty()
    }

    /// Playlist url of `name`, a missing rendition fails the video.
    pub fn playlist_url(&self, video_id: &str, name: &str) -> Result<Url> {
        match self.rendition(name) {
            Some(url) => Ok(Url::parse(url)?),
            None => Err(Error::MissingRendition {
                video_id: video_id.to_string(),
                rendition: name.to_string(),
            }),
        }
    }
}

fn variant_name(line: &str) -> Option<&str> {
    let search = "VIDEO=\"";
    let idx_start = line.find(search)? + search.len();
    let idx_end = idx_start + line[idx_start..].find('"')?;
    Some(&line[idx_start..idx_end])
}

/// Collects `VIDEO="<name>"` lines together with the url on the line after them.
pub fn parse_manifest(body: &str) -> Manifest {
    let lines = body.lines().collect::<Vec<&str>>();
    let mut renditions = HashMap::new();

    lines.iter().enumerate().for_each(|(i, line)| {
        let Some(name) = variant_name(line) else {
            return;
        };
        match lines.get(i + 1).map(|uri| uri.trim()) {
            Some(uri) if !uri.is_empty() && !uri.starts_with('#') => {
                renditions.insert(name.to_string(), uri.to_string());
            }
            _ => {}
        }
    });

    Manifest { renditions }
}

pub async fn get_token(client: &DownloadClient, options: &Options, video_id: &str) -> Result<AccessToken> {
    let mut url = endpoint(&options.api_base, &format!("api/vods/{}/access_token", video_id))?;
    url.query_pairs_mut().append_pair("client_id", &options.client_id);

    let response: TokenResponse = client.json(&url, &HeaderMap::new()).await?;

    let expiry = match response.expires_at {
        Value::String(at) => Some(at),
        Value::Null => None,
        other => Some(other.to_string()),
    };

    Ok(AccessToken {
        video_id: video_id.to_string(),
        token: response.token,
        signature: response.sig,
        expiry,
    })
}

impl AccessToken {
    pub async fn manifest(&self, client: &DownloadClient, options: &Options) -> Result<Manifest> {
        let mut url = endpoint(&options.usher_base, &format!("vod/{}", self.video_id))?;
        url.query_pairs_mut()
            .append_pair("nauthsig", &self.signature)
            .append_pair("nauth", &self.token)
            .append_pair("allow_source", "true");

        let body = client.text(&url).await?;
        let manifest = parse_manifest(&body);

        if manifest.is_empty() {
            return Err(Error::NoVariants { video_id: self.video_id.clone() });
        }

        Ok(manifest)
    }
}

/// Exchanges a video id for its rendition map. The token is used once and dropped.
pub async fn resolve(client: &DownloadClient, options: &Options, video_id: &str) -> Result<Manifest> {
    let token = get_token(client, options, video_id).await?;
    debug!(video_id, expiry = ?token.expiry, "got access token");

    let manifest = token.manifest(client, options).await?;
    debug!(video_id, renditions = ?manifest.names().collect::<Vec<_>>(), "got manifest");

    Ok(manifest)
}
