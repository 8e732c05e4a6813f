use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::download::{endpoint, DownloadClient};
use crate::error::{Error, Result};
use crate::options::Options;

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Video {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub title: String,
    pub description: String,
    pub created_at: String,
    pub published_at: String,
    pub url: String,
    pub thumbnail_url: String,
    pub viewable: String,
    pub view_count: u64,
    pub language: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub duration: String,
}

impl Video {
    /// Ids are handed out in increasing order, so this sorts chronologically.
    pub fn sort_key(&self) -> Option<u64> {
        self.id.parse().ok()
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "{}_{}_{}.{}",
            self.id,
            sanitize(&self.title),
            self.duration,
            extension
        )
    }
}

/// Longest title, in bytes, that goes into a file name. Leaves room for the
/// id, duration, extension and the muxer's `.part` suffix under the usual
/// 255 byte name limit.
const MAX_TITLE_BYTES: usize = 180;

fn sanitize(title: &str) -> String {
    let mut name = String::with_capacity(title.len().min(MAX_TITLE_BYTES));
    for c in title.chars() {
        let c = match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        };
        if name.len() + c.len_utf8() > MAX_TITLE_BYTES {
            break;
        }
        name.push(c);
    }
    name
}

#[derive(Deserialize, Debug)]
struct UserItem {
    id: String,
}

#[derive(Deserialize, Debug)]
struct Users {
    data: Vec<UserItem>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct Pagination {
    cursor: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Videos {
    data: Vec<Video>,
    #[serde(default)]
    pagination: Pagination,
}

fn client_id_header(options: &Options) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&options.client_id)
        .map_err(|_| Error::Config(format!("invalid client id {:?}", options.client_id)))?;
    headers.insert("Client-ID", value);
    Ok(headers)
}

pub async fn fetch_user_id(client: &DownloadClient, options: &Options, login: &str) -> Result<String> {
    let mut url = endpoint(&options.api_base, "helix/users")?;
    url.query_pairs_mut().append_pair("login", login);

    let users: Users = client.json(&url, &client_id_header(options)?).await?;

    match users.data.into_iter().next() {
        Some(user) => {
            debug!(login, user_id = %user.id, "resolved user");
            Ok(user.id)
        }
        None => Err(Error::UserNotFound(login.to_string())),
    }
}

/// Lists the videos of a user, following the page cursor up to `options.max_pages` pages.
pub async fn fetch_videos(client: &DownloadClient, options: &Options, user_id: &str) -> Result<Vec<Video>> {
    let headers = client_id_header(options)?;
    let mut videos = Vec::new();
    let mut cursor: Option<String> = None;

    for page in 0..options.max_pages.max(1) {
        let mut url = endpoint(&options.api_base, "helix/videos")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("user_id", user_id);
            query.append_pair("first", &options.page_size.to_string());
            if let Some(after) = &cursor {
                query.append_pair("after", after);
            }
        }

        let response: Videos = client.json(&url, &headers).await?;
        debug!(page, count = response.data.len(), "fetched video page");
        let fetched = response.data.len();
        videos.extend(response.data);

        cursor = response.pagination.cursor.filter(|c| !c.is_empty());
        if cursor.is_none() || fetched == 0 {
            break;
        }
    }

    if cursor.is_some() {
        warn!(
            user_id,
            pages = options.max_pages,
            "catalogue has more pages than requested, older videos are left out"
        );
    }

    if videos.is_empty() {
        return Err(Error::NoVideos(user_id.to_string()));
    }

    info!(user_id, count = videos.len(), "fetched video list");
    Ok(videos)
}
