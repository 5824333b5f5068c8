use clap::{ArgAction, Parser};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;

use shoka::converter::Toolchain;
use shoka::error::Result;
use shoka::sync::{CancellationFlag, SyncConfig, Synchronizer};
use shoka::types::SyncReport;

#[derive(Parser, Debug)]
#[command(
    name = "shoka",
    version,
    about = "Sort light novel folders into a Kavita library, converting to EPUB as needed"
)]
struct Cli {
    /// Source folder; every sub-folder is a series
    #[arg(short, long, value_name = "DIR")]
    src: Option<PathBuf>,

    /// Kavita library folder to write into
    #[arg(short, long, value_name = "DIR")]
    target: Option<PathBuf>,

    /// Keep chapters together instead of splitting at page breaks
    #[arg(long, action = ArgAction::SetTrue)]
    dont_split_on_page_breaks: bool,

    /// Do not render the cover as SVG
    #[arg(long, action = ArgAction::SetTrue)]
    no_svg_cover: bool,

    /// Maximum number of simultaneous conversions (default: number of CPUs)
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Skip the DeDRM plugin even if it is installed
    #[arg(long, action = ArgAction::SetTrue)]
    no_drm_removal: bool,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

async fn run(cli: Cli) -> Result<SyncReport> {
    let mut builder = SyncConfig::builder();
    builder
        .source_path(cli.src.unwrap_or_default())
        .target_path(cli.target.unwrap_or_default())
        .split_on_page_breaks(!cli.dont_split_on_page_breaks)
        .svg_cover(!cli.no_svg_cover)
        .remove_drm(!cli.no_drm_removal);
    if let Some(jobs) = cli.jobs {
        builder.max_concurrent_conversions(jobs);
    }
    let config = builder.build()?;
    config.preflight_check()?;

    let synchronizer = Synchronizer::new(config, Toolchain::calibre());
    let cancellation = synchronizer.cancellation_flag();
    tokio::spawn(async move {
        if watch_interrupts(&cancellation, tokio::signal::ctrl_c).await {
            log::error!("Interrupted again, aborting");
            std::process::exit(130);
        }
    });

    synchronizer.run().await
}

/// Cancels on the first interrupt and returns `true` on the second.
///
/// Returns `false` if listening for the signal fails.
async fn watch_interrupts<S, F>(cancellation: &CancellationFlag, mut interrupt: S) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    log::warn!("Interrupted, finishing files in progress (press Ctrl-C again to abort)");
    cancellation.cancel();
    interrupt().await.is_ok()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(report) => {
            let summary = report.summary();
            if summary.failed > 0 {
                log::warn!("{} files could not be produced", summary.failed);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
