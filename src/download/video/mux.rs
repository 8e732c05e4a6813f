use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tracing::{debug, info, warn};

use crate::download::playlist::segment_path;
use crate::error::{Error, Result};
use crate::options::Options;

/// `<stem>.part.<ext>` next to the final file, the muxer writes here first.
pub fn partial_path(output: &Path) -> PathBuf {
    match output.extension() {
        Some(ext) => output.with_extension(format!("part.{}", ext.to_string_lossy())),
        None => output.with_extension("part"),
    }
}

/// Concat demuxer input: one `file '<absolute path>'` line per segment, in list order.
pub fn concat_list(folder: &Path, segments: &[String]) -> Result<String> {
    let mut list = String::new();

    for index in 0..segments.len() {
        let path = segment_path(folder, index);
        let path = std::path::absolute(&path).map_err(|err| Error::io(&path, err))?;
        let escaped = path.to_string_lossy().replace('\'', "'\\''");
        list += &format!("file '{}'\n", escaped);
    }

    Ok(list)
}

fn missing_segments(folder: &Path, segments: &[String]) -> usize {
    (0..segments.len())
        .filter(|index| !segment_path(folder, *index).is_file())
        .count()
}

/// Joins the segments of `folder` into `output` without re-encoding.
///
/// Every listed segment has to be present, a gap fails the video instead of
/// producing a shortened file. `output` only appears after the muxer exited
/// cleanly.
pub async fn combine(options: &Options, folder: &Path, segments: &[String], output: &Path) -> Result<()> {
    if segments.is_empty() {
        return Err(Error::EmptyPlaylist);
    }

    let missing = missing_segments(folder, segments);
    if missing > 0 {
        return Err(Error::MissingSegments { missing, total: segments.len() });
    }

    // removed when dropped, whichever way this function returns
    let mut list_file = tempfile::Builder::new()
        .prefix("concat_")
        .suffix(".txt")
        .tempfile_in(folder)
        .map_err(|err| Error::io(folder, err))?;
    let list_path = list_file.path().to_path_buf();
    list_file
        .write_all(concat_list(folder, segments)?.as_bytes())
        .map_err(|err| Error::io(&list_path, err))?;
    list_file.flush().map_err(|err| Error::io(&list_path, err))?;

    let partial = partial_path(output);
    debug!(list = %list_path.display(), output = %partial.display(), "starting muxer");

    let mut command = tokio::process::Command::new(&options.ffmpeg);
    command
        .args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
        .arg(&list_path)
        .args(["-c", "copy", "-bsf:a", "aac_adtstoasc", "-fflags", "+genpts"])
        .arg(&partial)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let result = match tokio::time::timeout(options.mux_timeout, command.output()).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            return Err(Error::MuxerSpawn { program: options.ffmpeg.clone(), source: err });
        }
        Err(_) => {
            warn!(output = %output.display(), "muxer timed out");
            remove_partial(&partial).await;
            return Err(Error::MuxerTimeout(options.mux_timeout));
        }
    };

    if !result.status.success() {
        remove_partial(&partial).await;
        return Err(Error::Muxer {
            status: result.status,
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }

    if let Err(err) = tokio::fs::rename(&partial, output).await {
        remove_partial(&partial).await;
        return Err(Error::io(output, err));
    }

    info!(output = %output.display(), segments = segments.len(), "combined segments");
    Ok(())
}

async fn remove_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => debug!(path = %partial.display(), "removed partial output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %partial.display(), error = %err, "could not remove partial output"),
    }
}
