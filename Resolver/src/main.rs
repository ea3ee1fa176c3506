// main.rs

use std::time::Duration;

use clap::Parser;
use dash_manifest::build_manifest;
use manifest_server::start_server;
use range_locator::{HttpFetcher, RangeLocator};
use tokio::runtime;
use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, Layer};

mod args;
mod info;

use args::{get_log_level_filter, Args};
use info::MediaInfo;

#[instrument(skip_all)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr, stdout carries only the manifest URL
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(get_log_level_filter(&args));
    let subscriber = tracing_subscriber::registry().with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{:?}", args);

    let media = MediaInfo::load(&args.info_json)?;
    let duration = media.duration()?;
    let (audio, video) = media.select(args.audio_format.as_deref(), args.video_format.as_deref())?;
    info!(
        "Using audio format {} and video format {}",
        audio.format_id, video.format_id
    );

    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let fetcher = HttpFetcher::new(Duration::from_secs(args.fetch_timeout))?;
        let locator = RangeLocator::new(fetcher);
        let manifest = build_manifest(duration, audio, video, &locator).await?;

        let server = start_server(manifest).await?;
        println!("{}", server.url());

        server.wait().await;
        info!("Manifest server stopped");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
