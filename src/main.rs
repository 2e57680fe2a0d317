//! vidframe - extract still frames from videos by time interval or scene change.

use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use vidframe::core::video::ExtractionManager;
use vidframe::core::{ExtractionConfig, ExtractorError, Result, RunOptions, DEFAULT_CONFIG_FILE};
use vidframe::init_logging;

/// Extract frames from a video file or a directory of videos.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video file or directory to process
    #[arg(required_unless_present = "create_config")]
    input: Option<PathBuf>,

    /// Config file location (created with defaults when missing)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Write a default config file and exit
    #[arg(long)]
    create_config: bool,

    /// Time interval mode with this many seconds between frames
    #[arg(long, value_name = "SECONDS", conflicts_with = "scene")]
    time: Option<f64>,

    /// Scene change mode with this change threshold (percent)
    #[arg(long, value_name = "PERCENT")]
    scene: Option<f64>,

    /// Also write the log to DIR/logs/
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Videos processed in parallel (0 = one per CPU)
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Only look at the top level of an input directory
    #[arg(long)]
    no_recursive: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn run(args: Args) -> Result<()> {
    if args.create_config {
        ExtractionConfig::create_default_file(&args.config)?;
        return Ok(());
    }

    let input = args
        .input
        .ok_or_else(|| ExtractorError::InvalidConfig("no input path given".to_string()))?;

    let mut config = ExtractionConfig::load(&args.config)?;
    config.apply_overrides(args.time, args.scene)?;

    let options = RunOptions {
        recursive: !args.no_recursive,
        workers: args.workers,
        ..Default::default()
    };

    let cancel = options.cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("⏹️ Interrupt received, stopping after the current frame");
        cancel.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let stats = ExtractionManager::new().run(&input, &config, &options)?;
    stats.log_summary(&config.output_directory);

    if options.cancel.load(Ordering::Relaxed) {
        warn!("Run was cancelled before all videos were processed");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    match init_logging(args.log_level.as_str(), args.log_dir.as_deref()) {
        Ok(Some(path)) => info!("📝 Logging to {:?}", path),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            return ExitCode::FAILURE;
        }
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}
