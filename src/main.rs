mod archive;
mod download;
mod error;
mod options;

#[cfg(test)]
mod test_utils;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::options::{Options, CLIENT_ID};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// login name of the channel whose videos get archived
    user: String,

    #[clap(default_value = ".")]
    /// directory the finished videos are written to
    output_dir: PathBuf,

    #[clap(default_value = ".")]
    /// directory that holds the segments while a video is downloaded
    temp_dir: PathBuf,

    #[clap(short, long, default_value = "4")]
    /// set the maximum number of videos downloaded in parallel
    parallel: usize,

    #[clap(short, long, default_value = "4")]
    /// set the maximum number of parallel segment downloads per video
    segment_parallel: usize,

    #[clap(short, long, default_value = "3")]
    /// set the maximum number of attempts per segment
    retries: usize,

    #[clap(long, default_value = "chunked")]
    /// rendition to archive
    rendition: String,

    #[clap(long, default_value = "ffmpeg")]
    /// ffmpeg executable used to combine the segments
    ffmpeg: PathBuf,

    #[clap(long, default_value = "14400")]
    /// seconds ffmpeg may take to combine one video
    mux_timeout: u64,

    #[clap(long, default_value = "1")]
    /// number of video list pages to fetch
    pages: usize,

    #[clap(long, env = "TWITCH_CLIENT_ID", default_value = CLIENT_ID)]
    client_id: String,

    #[clap(short, long)]
    /// log debug output
    verbose: bool,

    #[clap(short, long, conflicts_with = "verbose")]
    /// only log errors
    quiet: bool,
}

impl Args {
    fn options(&self) -> Options {
        Options {
            client_id: self.client_id.clone(),
            rendition: self.rendition.clone(),
            output_dir: self.output_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            max_parallel_videos: self.parallel,
            max_parallel_downloads: self.segment_parallel,
            max_download_retries: self.retries,
            ffmpeg: self.ffmpeg.clone(),
            mux_timeout: Duration::from_secs(self.mux_timeout),
            max_pages: self.pages,
            ..Options::default()
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let options = args.options();
    info!(?options, "options");

    match archive::archive_user(&args.user, Arc::new(options)).await {
        Ok(summary) => {
            info!(
                user = %args.user,
                archived = summary.archived,
                failed = summary.failed,
                skipped = summary.skipped,
                ignored = summary.ignored,
                "finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(user = %args.user, error = %err, "could not read the video list");
            ExitCode::FAILURE
        }
    }
}
