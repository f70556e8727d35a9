//! Main entry point for ytgrab CLI

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ytgrab::cli::{Args, OutputFormatter, ProgressDisplay, VerbosityLevel};
use ytgrab::core::progress::EventSink;
use ytgrab::core::Probe;
use ytgrab::{Downloader, YtDlpEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    init_logging(args.verbosity_level())?;
    debug!("Starting ytgrab with args: {:?}", args);

    let formatter = OutputFormatter::new(args.verbosity_level());
    let engine = Arc::new(
        YtDlpEngine::new()
            .with_binary(&args.yt_dlp)
            .with_extra_args(args.engine_arg.clone()),
    );
    let downloader = Downloader::new(engine).with_options(args.download_options());

    let ok = if args.info {
        handle_info(&downloader, &args, &formatter).await?
    } else if args.list_formats {
        handle_list_formats(&downloader, &args, &formatter).await?
    } else {
        let cancel = CancellationToken::new();
        spawn_interrupt_handler(cancel.clone());

        let show_progress = !args.no_progress && !args.json && args.verbosity_level() != VerbosityLevel::Quiet;
        let (events, rx) = EventSink::channel();
        let display = tokio::spawn(ProgressDisplay::new(show_progress).run(rx));

        let downloader = downloader.with_events(events).with_cancellation(cancel);
        if args.is_playlist() {
            handle_playlist_download(downloader, &args, &formatter, display).await?
        } else {
            handle_single_download(downloader, &args, &formatter, display).await?
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Handle `--info`
async fn handle_info(downloader: &Downloader, args: &Args, formatter: &OutputFormatter) -> anyhow::Result<bool> {
    let probe = match downloader.probe(&args.url).await {
        Ok(probe) => probe,
        Err(e) => {
            formatter.error(&e.to_string());
            return Ok(false);
        }
    };

    match probe {
        Probe::Item(details) if args.json => formatter.print_json(&details)?,
        Probe::Item(details) => formatter.print_item_info(&details),
        Probe::Playlist(playlist) if args.json => formatter.print_json(&playlist)?,
        Probe::Playlist(playlist) => formatter.print_playlist_info(&playlist),
    }
    Ok(true)
}

/// Handle `--list-formats`
async fn handle_list_formats(
    downloader: &Downloader,
    args: &Args,
    formatter: &OutputFormatter,
) -> anyhow::Result<bool> {
    let (details, formats) = match downloader.list_formats(&args.url).await {
        Ok(listing) => listing,
        Err(e) => {
            formatter.error(&e.to_string());
            return Ok(false);
        }
    };

    if args.json {
        formatter.print_json(&details.raw_formats)?;
    } else {
        formatter.print_formats(&details, &formats);
    }
    Ok(true)
}

/// Handle single video download
async fn handle_single_download(
    downloader: Downloader,
    args: &Args,
    formatter: &OutputFormatter,
    display: tokio::task::JoinHandle<()>,
) -> anyhow::Result<bool> {
    info!("Starting download for URL: {}", args.url);
    let result = downloader.download(&args.url).await;

    // The display task ends once the downloader's event sink is gone
    drop(downloader);
    display.await.context("progress display task failed")?;

    match result {
        Ok(outcome) => {
            if args.json {
                formatter.print_json(&outcome)?;
            } else {
                formatter.print_outcome(&outcome);
            }
            Ok(true)
        }
        Err(e) => {
            formatter.error(&e.to_string());
            Ok(false)
        }
    }
}

/// Handle playlist download
async fn handle_playlist_download(
    downloader: Downloader,
    args: &Args,
    formatter: &OutputFormatter,
    display: tokio::task::JoinHandle<()>,
) -> anyhow::Result<bool> {
    let filter = args.item_filter();
    info!("Processing playlist {} ({})", args.url, filter);
    let result = downloader.download_playlist(&args.url, &filter).await;

    drop(downloader);
    display.await.context("progress display task failed")?;

    match result {
        Ok(summary) => {
            if args.json {
                formatter.print_json(&summary)?;
            } else {
                formatter.print_summary(&summary);
            }
            Ok(!summary.has_failures())
        }
        Err(e) => {
            formatter.error(&e.to_string());
            Ok(false)
        }
    }
}

/// Cancel pending work on Ctrl-C; in-flight items run to completion
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing items already in progress");
            cancel.cancel();
        }
    });
}

/// Initialize logging system
fn init_logging(verbosity: VerbosityLevel) -> anyhow::Result<()> {
    let default_level = match verbosity {
        VerbosityLevel::Quiet => "error",
        VerbosityLevel::Normal => "warn",
        VerbosityLevel::Verbose => "debug",
    };

    // RUST_LOG wins over the verbosity flags
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init()
        .context("failed to initialize logging")?;

    Ok(())
}
