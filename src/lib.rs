pub mod commands;
pub mod error;
pub mod file_manager;
pub mod logging;
pub mod models;
pub mod process_manager;
pub mod upscale;
pub mod utils;

pub use commands::UpscaylService;
pub use error::{ConfigurationError, Result, UpscaylError};
pub use models::{
    EventSink, JobId, JobState, JobSummary, JsonLinesSink, OutputFormat, Settings, UpscaleEvent,
    UpscaleMode, UpscaleRequest,
};

use file_manager::initialize_json_file;
use log::info;
use utils::{get_settings_json_path, initialize_data_directories};

/// Create the data directory tree and seed a default settings file.
pub fn initialize_app_data() -> Result<()> {
    initialize_data_directories()?;
    initialize_json_file(&get_settings_json_path(), &Settings::default())?;

    info!("App data initialized");
    Ok(())
}
