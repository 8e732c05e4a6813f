//! Test doubles: an in-process HTTP server playing the streaming platform and
//! shell scripts standing in for ffmpeg.

use std::collections::{HashMap, HashSet};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path as UrlPath, Query, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Value};
use url::Url;

use crate::options::Options;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Tracks how many requests of one kind are being served at the same time.
#[derive(Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) -> GaugeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct GaugeGuard<'a>(&'a Gauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakePlatform {
    /// login -> user id
    pub users: HashMap<String, String>,
    pub videos: Vec<Value>,
    /// video id -> rendition names offered in its manifest, "chunked" when absent
    pub renditions: HashMap<String, Vec<String>>,
    pub segments: Vec<String>,
    /// segment file -> number of requests answered with 500 before it succeeds
    pub failures: Mutex<HashMap<String, usize>>,
    /// segment file -> number of responses whose body breaks off halfway
    pub cut_off: Mutex<HashMap<String, usize>>,
    /// segment files that always answer 404
    pub missing: HashSet<String>,
    pub delay: Duration,
    pub requests: Mutex<Vec<String>>,
    pub token_gauge: Gauge,
    pub segment_gauge: Gauge,
}

pub struct TestServer {
    pub base: Url,
    pub platform: Arc<FakePlatform>,
}

impl TestServer {
    /// Options that route every endpoint to this server.
    pub fn options(&self, output_dir: &Path, temp_dir: &Path, ffmpeg: PathBuf) -> Options {
        Options {
            api_base: self.base.clone(),
            usher_base: self.base.clone(),
            output_dir: output_dir.to_path_buf(),
            temp_dir: temp_dir.to_path_buf(),
            ffmpeg,
            retry_delay: Duration::ZERO,
            http_timeout: Duration::from_secs(5),
            ..Options::default()
        }
    }

    pub fn segment_url(&self, video_id: &str, name: &str) -> Url {
        self.base
            .join(&format!("vods/{}/chunked/{}", video_id, name))
            .unwrap()
    }

    pub fn playlist_url(&self, video_id: &str) -> Url {
        self.segment_url(video_id, "index-dvr.m3u8")
    }
}

pub fn video(id: &str, title: &str, duration: &str) -> Value {
    json!({
        "id": id,
        "user_id": "42",
        "user_name": "streamer",
        "title": title,
        "duration": duration,
        "view_count": 7,
        "type": "archive",
    })
}

/// Body the fake platform serves for a segment, `name` includes the query if any.
pub fn segment_body(video_id: &str, name: &str) -> String {
    format!("{}/{};", video_id, name)
}

impl FakePlatform {
    pub async fn serve(self) -> TestServer {
        init_tracing();
        let platform = Arc::new(self);
        let app = Router::new()
            .route("/helix/users", get(users))
            .route("/helix/videos", get(videos))
            .route("/api/vods/{id}/access_token", get(access_token))
            .route("/vod/{id}", get(usher))
            .route("/vods/{id}/{rendition}/{file}", get(vod_file))
            .with_state(Arc::clone(&platform));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base: Url::parse(&format!("http://{}/", addr)).unwrap(),
            platform,
        }
    }

    fn record(&self, path: String) {
        self.requests.lock().unwrap().push(path);
    }

    /// Number of requests whose path starts with `prefix`.
    pub fn hits(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|path| path.starts_with(prefix))
            .count()
    }
}

type Platform = State<Arc<FakePlatform>>;

async fn users(
    State(platform): Platform,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    platform.record("/helix/users".to_string());
    if !headers.contains_key("Client-ID") {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let login = query.get("login").cloned().unwrap_or_default();
    let data = match platform.users.get(&login) {
        Some(id) => vec![json!({ "id": id, "login": login })],
        None => vec![],
    };
    Json(json!({ "data": data })).into_response()
}

async fn videos(
    State(platform): Platform,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    platform.record("/helix/videos".to_string());
    if !headers.contains_key("Client-ID") {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let first: usize = query.get("first").and_then(|v| v.parse().ok()).unwrap_or(20);
    let offset: usize = query.get("after").and_then(|v| v.parse().ok()).unwrap_or(0);
    let end = (offset + first).min(platform.videos.len());
    let data = platform.videos.get(offset..end).unwrap_or_default().to_vec();

    let pagination = if end < platform.videos.len() {
        json!({ "cursor": end.to_string() })
    } else {
        json!({})
    };
    Json(json!({ "data": data, "pagination": pagination })).into_response()
}

async fn access_token(State(platform): Platform, UrlPath(id): UrlPath<String>) -> Response {
    platform.record(format!("/api/vods/{}", id));
    let _inflight = platform.token_gauge.enter();
    tokio::time::sleep(platform.delay).await;

    Json(json!({
        "token": format!("tok-{}", id),
        "sig": format!("sig-{}", id),
        "expires_at": "2030-01-01T00:00:00Z",
    }))
    .into_response()
}

async fn usher(
    State(platform): Platform,
    UrlPath(id): UrlPath<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    platform.record(format!("/vod/{}", id));
    let authorized = query.get("nauth") == Some(&format!("tok-{}", id))
        && query.get("nauthsig") == Some(&format!("sig-{}", id))
        && query.get("allow_source").map(String::as_str) == Some("true");
    if !authorized {
        return StatusCode::FORBIDDEN.into_response();
    }

    let host = headers
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("127.0.0.1")
        .to_string();
    let renditions = platform
        .renditions
        .get(&id)
        .cloned()
        .unwrap_or_else(|| vec!["chunked".to_string()]);

    let mut body = String::from("#EXTM3U\n#EXT-X-TWITCH-INFO:ORIGIN=\"s3\"\n");
    for name in renditions {
        body += &format!(
            "#EXT-X-MEDIA:TYPE=VIDEO,GROUP-ID=\"{name}\",NAME=\"{name}\",AUTOSELECT=YES\n\
             #EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=6000000,VIDEO=\"{name}\"\n\
             http://{host}/vods/{id}/{name}/index-dvr.m3u8\n"
        );
    }
    body.into_response()
}

async fn vod_file(
    State(platform): Platform,
    UrlPath((id, rendition, file)): UrlPath<(String, String, String)>,
    RawQuery(query): RawQuery,
) -> Response {
    platform.record(format!("/vods/{}/{}/{}", id, rendition, file));

    if file == "index-dvr.m3u8" {
        let mut body = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n");
        for segment in &platform.segments {
            body += &format!("#EXTINF:10.000,\n{}\n", segment);
        }
        body += "#EXT-X-ENDLIST\n";
        return body.into_response();
    }

    let _inflight = platform.segment_gauge.enter();
    tokio::time::sleep(platform.delay).await;

    if platform.missing.contains(&file) {
        return StatusCode::NOT_FOUND.into_response();
    }
    if take_one(&platform.failures, &file) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let name = match query {
        Some(query) => format!("{}?{}", file, query),
        None => file.clone(),
    };
    let body = segment_body(&id, &name).into_bytes();

    if take_one(&platform.cut_off, &file) {
        return cut_off_body(body);
    }

    body.into_response()
}

fn take_one(counters: &Mutex<HashMap<String, usize>>, file: &str) -> bool {
    let mut counters = counters.lock().unwrap();
    match counters.get_mut(file) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

/// Streams the first half of `body`, then aborts the connection.
fn cut_off_body(body: Vec<u8>) -> Response {
    let half = Bytes::from(body[..body.len() / 2].to_vec());
    let chunks: Vec<std::io::Result<Bytes>> = vec![
        Ok(half),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "cut off")),
    ];
    let stream = futures::stream::iter(chunks).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        chunk
    });

    Response::new(Body::from_stream(stream))
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Muxer stand-in: concatenates the files of the `-i` list into the last argument.
pub fn stub_muxer(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "concat.sh",
        r#"#!/bin/sh
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then list="$arg"; fi
  prev="$arg"
  out="$arg"
done
: > "$out"
sed -n "s/^file '\(.*\)'\$/\1/p" "$list" | while IFS= read -r f; do
  cat "$f" >> "$out"
done
"#,
    )
}

/// Muxer stand-in that writes a partial output and fails.
pub fn failing_muxer(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fail.sh",
        r#"#!/bin/sh
for arg in "$@"; do out="$arg"; done
echo "garbage" > "$out"
echo "Invalid data found when processing input" >&2
exit 1
"#,
    )
}

pub fn hanging_muxer(dir: &Path) -> PathBuf {
    write_script(dir, "hang.sh", "#!/bin/sh\nexec sleep 30\n")
}
