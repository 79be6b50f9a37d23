use clap::Parser;
use log::{error, info, warn, LevelFilter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use upscayl_lib::commands::settings::get_settings_from;
use upscayl_lib::utils::get_settings_json_path;
use upscayl_lib::{
    initialize_app_data, logging, EventSink, JsonLinesSink, OutputFormat, Settings, UpscaleEvent,
    UpscaleMode, UpscaleRequest, UpscaylError, UpscaylService,
};

const EXIT_DONE: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "upscayl",
    version,
    about = "Upscale images with an external upscaling engine, printing progress as JSON lines"
)]
struct Cli {
    /// Image file, or folder with --batch
    source: String,

    /// Output folder (defaults to the input's folder)
    #[arg(short, long)]
    output: Option<String>,

    /// Model name (defaults to the one in settings)
    #[arg(short, long)]
    model: Option<String>,

    /// Scale multiplier (defaults to the model's native scale)
    #[arg(short, long)]
    scale: Option<f64>,

    /// Output width in pixels, instead of a multiplier
    #[arg(short, long, conflicts_with = "scale")]
    width: Option<u32>,

    /// GPU id passed to the engine
    #[arg(long)]
    gpu: Option<String>,

    /// Output image format
    #[arg(long, value_parser = ["png", "jpg", "jpeg", "webp"])]
    format: Option<String>,

    /// Compression quality for jpg/webp (0-100)
    #[arg(long)]
    quality: Option<u8>,

    /// Re-run even if the output file already exists
    #[arg(long)]
    overwrite: bool,

    /// Keep the raw engine output
    #[arg(long)]
    skip_post_processing: bool,

    /// Run the engine twice, feeding the first result into the second pass
    #[arg(long, conflicts_with = "batch")]
    double: bool,

    /// Treat SOURCE as a folder and upscale every image in it
    #[arg(long)]
    batch: bool,

    /// Settings file (defaults to the app data settings)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Folder containing the engine executables
    #[arg(long)]
    bin_dir: Option<String>,

    /// Folder containing the bundled models
    #[arg(long)]
    models_dir: Option<String>,

    /// Write logs to the app data logs folder instead of stderr
    #[arg(long)]
    log_file: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_settings(cli: &Cli) -> Result<Settings, UpscaylError> {
    let path = match &cli.settings {
        Some(path) => path.clone(),
        None => {
            if let Err(e) = initialize_app_data() {
                warn!("Failed to initialize app data: {}", e);
            }
            get_settings_json_path()
        }
    };

    let mut settings = get_settings_from(&path)?;
    if let Some(bin_dir) = &cli.bin_dir {
        settings.bin_dir = Some(bin_dir.clone());
    }
    if let Some(models_dir) = &cli.models_dir {
        settings.models_dir = Some(models_dir.clone());
    }
    Ok(settings)
}

/// Command-line flags win; anything left unset comes from settings.
fn build_request(cli: &Cli, settings: &Settings) -> UpscaleRequest {
    let model = cli
        .model
        .clone()
        .unwrap_or_else(|| settings.default_model.clone());
    let mut request = UpscaleRequest::new(cli.source.clone(), model);

    request.output_directory = cli.output.clone();
    request.scale_factor = cli.scale;
    request.target_width = if cli.scale.is_some() {
        cli.width
    } else {
        cli.width.or_else(|| settings.target_width())
    };
    request.gpu_selector = cli.gpu.clone().unwrap_or_else(|| settings.gpu_id.clone());

    let quality = cli.quality.unwrap_or(settings.compression);
    request.output_format = match &cli.format {
        Some(name) => OutputFormat::from_name(name, quality).unwrap_or_default(),
        None => OutputFormat::from_name(&settings.save_image_as, quality).unwrap_or_default(),
    };

    request.overwrite_existing = cli.overwrite;
    request.skip_post_processing = cli.skip_post_processing;
    request.mode = if cli.batch {
        UpscaleMode::Batch
    } else if cli.double {
        UpscaleMode::DoublePass
    } else {
        UpscaleMode::Single
    };
    request
}

fn exit_code_for(event: &UpscaleEvent) -> u8 {
    match event {
        UpscaleEvent::Done { .. } => EXIT_DONE,
        UpscaleEvent::Cancelled { .. } => EXIT_CANCELLED,
        _ => EXIT_ERROR,
    }
}

async fn run(cli: Cli) -> u8 {
    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load settings: {}", e);
            return EXIT_ERROR;
        }
    };
    let request = build_request(&cli, &settings);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let service = UpscaylService::new(settings, Arc::new(tx));
    let job_id = match service.submit_upscale_request(request) {
        Ok(job_id) => job_id,
        Err(e) => {
            error!("{}", e);
            return if e.is_configuration() { EXIT_CONFIG } else { EXIT_ERROR };
        }
    };
    info!("Submitted job {}", job_id);

    let printer = JsonLinesSink;
    let mut watch_ctrl_c = true;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if watch_ctrl_c => {
                match signal {
                    Ok(()) => {
                        warn!("Interrupted, stopping");
                        service.cancel_all_jobs();
                    }
                    Err(e) => {
                        warn!("Cannot listen for Ctrl-C: {}", e);
                        watch_ctrl_c = false;
                    }
                }
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    return EXIT_ERROR;
                };
                let finished = event.is_terminal() && event.job_id() == Some(job_id.as_str());
                let code = exit_code_for(&event);
                printer.emit(event);
                if finished {
                    return code;
                }
            }
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    logging::init_logging(level, cli.log_file);
    logging::cleanup_old_logs();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    ExitCode::from(runtime.block_on(run(cli)))
}
