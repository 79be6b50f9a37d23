// Settings data models
use super::upscale::{OutputFormat, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub remember_output_folder: bool,
    #[serde(default)]
    pub saved_output_path: Option<String>,
    /// Output folder chosen for batch runs
    #[serde(default)]
    pub batch_output_path: Option<String>,
    #[serde(default)]
    pub custom_models_path: Option<String>,
    #[serde(default)]
    pub compression: u8,
    #[serde(default)]
    pub no_image_processing: bool,
    #[serde(default)]
    pub use_custom_width: bool,
    #[serde(default)]
    pub custom_width: Option<u32>,
    #[serde(default)]
    pub gpu_id: String,
    #[serde(default = "default_image_format")]
    pub save_image_as: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub bin_dir: Option<String>,
    #[serde(default)]
    pub models_dir: Option<String>,
}

fn default_image_format() -> String {
    String::from("png")
}

fn default_model() -> String {
    String::from(DEFAULT_MODEL)
}

fn non_empty_path(value: &Option<String>) -> Option<PathBuf> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remember_output_folder: false,
            saved_output_path: None,
            batch_output_path: None,
            custom_models_path: None,
            compression: 0,
            no_image_processing: false,
            use_custom_width: false,
            custom_width: None,
            gpu_id: String::new(),
            save_image_as: default_image_format(),
            default_model: default_model(),
            bin_dir: None,
            models_dir: None,
        }
    }
}

impl Settings {
    /// The pinned output folder, only when the user asked to remember it.
    pub fn remembered_output_dir(&self) -> Option<PathBuf> {
        if self.remember_output_folder {
            non_empty_path(&self.saved_output_path)
        } else {
            None
        }
    }

    pub fn batch_output_dir(&self) -> Option<PathBuf> {
        non_empty_path(&self.batch_output_path)
    }

    pub fn custom_models_dir(&self) -> Option<PathBuf> {
        non_empty_path(&self.custom_models_path)
    }

    pub fn target_width(&self) -> Option<u32> {
        if self.use_custom_width {
            self.custom_width.filter(|w| *w > 0)
        } else {
            None
        }
    }

    /// Preferred output format, falling back to PNG for unknown names.
    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::from_name(&self.save_image_as, self.compression).unwrap_or_default()
    }
}
